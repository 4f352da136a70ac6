//! Backend trait definitions
//!
//! A backend is whatever actually reaches the hardware: the Linux spidev
//! interface, an in-memory emulator, a USB bridge. The device handle only
//! ever talks to these two traits.
//!
//! - [`SpiBackend`] turns a device path into an open [`SpiPort`]
//! - [`SpiPort`] accepts parameter updates and performs transfers
//!
//! ## Example: minimal backend
//!
//! ```ignore
//! struct Null;
//! struct NullPort;
//!
//! impl SpiBackend for Null {
//!     fn name(&self) -> &'static str {
//!         "null"
//!     }
//!
//!     fn open_port(&mut self, _path: &str) -> Result<Box<dyn SpiPort>> {
//!         Ok(Box::new(NullPort))
//!     }
//! }
//!
//! impl SpiPort for NullPort {
//!     fn apply(&mut self, _params: &TransferParameters) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     fn exchange(
//!         &mut self,
//!         segments: &mut [Segment<'_>],
//!         _params: &TransferParameters,
//!     ) -> Result<()> {
//!         for seg in segments {
//!             if let Some(read) = seg.rx_mut() {
//!                 read.fill(0xFF);
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use crate::error::{Error, Result};
use crate::params::TransferParameters;
use alloc::boxed::Box;

/// One leg of an SPI message
///
/// Equivalent to a kernel `struct spi_ioc_transfer`. When both sides are
/// present they have the same length; the constructors are the only way to
/// build a segment. A missing write side means the controller shifts out its
/// idle level; a missing read side means received bits are dropped.
#[derive(Debug)]
pub struct Segment<'a> {
    write: Option<&'a [u8]>,
    read: Option<&'a mut [u8]>,
}

impl<'a> Segment<'a> {
    /// Segment that clocks out and in at the same time
    ///
    /// Fails with [`Error::BufferSizeMismatch`] unless both buffers have the
    /// same length.
    pub fn duplex(write: &'a [u8], read: &'a mut [u8]) -> Result<Self> {
        if write.len() != read.len() {
            return Err(Error::BufferSizeMismatch {
                write_len: write.len(),
                read_len: read.len(),
            });
        }
        Ok(Self {
            write: Some(write),
            read: Some(read),
        })
    }

    /// Transmit-only segment
    pub fn write_only(write: &'a [u8]) -> Self {
        Self {
            write: Some(write),
            read: None,
        }
    }

    /// Receive-only segment
    pub fn read_only(read: &'a mut [u8]) -> Self {
        Self {
            write: None,
            read: Some(read),
        }
    }

    /// Bytes to clock out
    pub fn tx(&self) -> Option<&'a [u8]> {
        self.write
    }

    /// Buffer for bytes clocked in
    pub fn rx(&self) -> Option<&[u8]> {
        self.read.as_deref()
    }

    /// Buffer for bytes clocked in, writable
    pub fn rx_mut(&mut self) -> Option<&mut [u8]> {
        self.read.as_deref_mut()
    }

    /// Both sides at once, for backends that fill `rx` from `tx`
    pub fn split_mut(&mut self) -> (Option<&'a [u8]>, Option<&mut [u8]>) {
        (self.write, self.read.as_deref_mut())
    }

    /// Number of bytes clocked by this segment
    pub fn len(&self) -> usize {
        match (&self.write, &self.read) {
            (Some(w), _) => w.len(),
            (None, Some(r)) => r.len(),
            (None, None) => 0,
        }
    }

    /// Whether the segment clocks no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Something that can open SPI device paths
pub trait SpiBackend {
    /// Short backend name, used in log messages
    fn name(&self) -> &'static str;

    /// Open a device path
    ///
    /// Implementations report a missing path, missing permission or a busy
    /// device through [`crate::Error::DeviceOpen`].
    fn open_port(&mut self, path: &str) -> Result<Box<dyn SpiPort>>;
}

impl<B: SpiBackend + ?Sized> SpiBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn open_port(&mut self, path: &str) -> Result<Box<dyn SpiPort>> {
        (**self).open_port(path)
    }
}

/// An open SPI device
///
/// Ports are `Send` so a device handle can move to another thread.
pub trait SpiPort: Send {
    /// Write the full parameter set to the device
    ///
    /// Called once right after opening and again whenever a parameter
    /// changes while open. On error the device may have taken part of the
    /// set; the handle re-applies its stored parameters before the next
    /// change or transfer.
    fn apply(&mut self, params: &TransferParameters) -> Result<()>;

    /// Perform one message made of `segments`, in order
    ///
    /// Chip select stays asserted across all segments of the message. Returns
    /// only after the hardware exchange has completed.
    fn exchange(
        &mut self,
        segments: &mut [Segment<'_>],
        params: &TransferParameters,
    ) -> Result<()>;

    /// Largest number of bytes one message may carry
    fn max_transfer_len(&self) -> usize {
        usize::MAX
    }

    /// Release the device
    ///
    /// Called exactly once per opened port. The default drops the port,
    /// which is enough for backends that release on drop.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
