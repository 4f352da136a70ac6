//! Device handle
//!
//! [`SpiDevice`] owns one backend, the path it was last opened with, the
//! open port (if any) and the current [`TransferParameters`].
//!
//! Lifecycle rules:
//!
//! - `open` on an open handle fails with [`Error::InvalidState`]
//! - `close` on a closed handle does nothing
//! - dropping an open handle closes it
//! - parameters may change at any time; while open, changes go straight to
//!   the device and are rolled back if the device refuses them
//! - if a rollback fails too, the stored parameters are written again before
//!   the next change or transfer

use crate::backend::{SpiBackend, SpiPort};
use crate::error::{Error, Result};
use crate::options::SpiOptions;
use crate::params::{BitOrder, ChipSelect, Mode, TransferParameters};
use alloc::boxed::Box;
use alloc::string::{String, ToString};

/// Handle to one SPI device
///
/// The handle does no locking. Use one handle per thread, or wrap it in a
/// mutex if several callers must share it. The handle is `Send` whenever
/// its backend is.
pub struct SpiDevice<B: SpiBackend> {
    backend: B,
    path: Option<String>,
    port: Option<Box<dyn SpiPort>>,
    params: TransferParameters,
    /// Device may hold settings other than `params`
    stale: bool,
}

impl<B: SpiBackend> SpiDevice<B> {
    /// Create a closed handle with default parameters
    pub fn new(backend: B) -> Self {
        Self::with_parameters(backend, TransferParameters::default())
    }

    /// Create a closed handle with the given parameters
    pub fn with_parameters(backend: B, params: TransferParameters) -> Self {
        Self {
            backend,
            path: None,
            port: None,
            params,
            stale: false,
        }
    }

    /// Configure and open in one step
    ///
    /// The handle is only returned if both the options are valid and the
    /// device opened.
    pub fn open_with(backend: B, path: &str, options: &SpiOptions) -> Result<Self> {
        let mut dev = Self::new(backend);
        dev.configure(options)?;
        dev.open(path)?;
        Ok(dev)
    }

    /// Apply a configuration set
    ///
    /// Every field is validated before anything changes. If the handle is
    /// open, the new parameters are written to the device; if the device
    /// refuses them the old parameters are restored.
    pub fn configure(&mut self, options: &SpiOptions) -> Result<&mut Self> {
        let mut next = self.params;
        options.apply_to(&mut next)?;
        self.commit(next)?;
        Ok(self)
    }

    /// Open the device at `path`
    ///
    /// The full parameter set is written to the device right after opening.
    /// If that fails the device is closed again and the handle stays closed.
    pub fn open(&mut self, path: &str) -> Result<&mut Self> {
        if self.port.is_some() {
            return Err(Error::InvalidState("device already open"));
        }

        log::debug!("spilink: Opening {} via {}", path, self.backend.name());
        let mut port = self.backend.open_port(path)?;

        if let Err(e) = port.apply(&self.params) {
            log::debug!("spilink: Configuring {} failed: {}", path, e);
            if let Err(close_err) = port.close() {
                log::warn!("spilink: Closing {} failed: {}", path, close_err);
            }
            return Err(e);
        }

        log::info!("spilink: Opened {} ({})", path, self.params);

        self.path = Some(path.to_string());
        self.port = Some(port);
        self.stale = false;
        Ok(self)
    }

    /// Close the device
    ///
    /// Does nothing if the handle is not open. The port is released even if
    /// the backend reports an error while closing.
    pub fn close(&mut self) -> Result<()> {
        self.stale = false;
        match self.port.take() {
            Some(mut port) => {
                log::debug!("spilink: Closing {}", self.path_or_unknown());
                port.close()
            }
            None => Ok(()),
        }
    }

    /// Whether the device is open
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Path last passed to a successful `open`
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The backend this handle opens devices through
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current parameters
    pub fn parameters(&self) -> &TransferParameters {
        &self.params
    }

    /// Current clock mode
    pub fn mode(&self) -> Mode {
        self.params.mode()
    }

    /// Current chip-select behavior
    pub fn chip_select(&self) -> ChipSelect {
        self.params.chip_select()
    }

    /// Current bit order
    pub fn bit_order(&self) -> BitOrder {
        self.params.bit_order()
    }

    /// Current word size in bits
    pub fn bits_per_word(&self) -> u8 {
        self.params.bits_per_word()
    }

    /// Current maximum clock speed in Hz
    pub fn max_speed_hz(&self) -> u32 {
        self.params.max_speed_hz()
    }

    /// Whether half-duplex operation is enabled
    pub fn half_duplex(&self) -> bool {
        self.params.half_duplex()
    }

    /// Whether loopback is enabled
    pub fn loopback(&self) -> bool {
        self.params.loopback()
    }

    /// Set the clock mode
    pub fn set_mode(&mut self, mode: Mode) -> Result<&mut Self> {
        let mut next = self.params;
        next.set_mode(mode);
        self.commit(next)?;
        Ok(self)
    }

    /// Set chip-select behavior
    pub fn set_chip_select(&mut self, chip_select: ChipSelect) -> Result<&mut Self> {
        let mut next = self.params;
        next.set_chip_select(chip_select);
        self.commit(next)?;
        Ok(self)
    }

    /// Set the bit order
    pub fn set_bit_order(&mut self, bit_order: BitOrder) -> Result<&mut Self> {
        let mut next = self.params;
        next.set_bit_order(bit_order);
        self.commit(next)?;
        Ok(self)
    }

    /// Set the word size; must be greater than 1
    pub fn set_bits_per_word(&mut self, bits: u8) -> Result<&mut Self> {
        let mut next = self.params;
        next.set_bits_per_word(bits)?;
        self.commit(next)?;
        Ok(self)
    }

    /// Set the maximum clock speed in Hz; must be positive
    pub fn set_max_speed_hz(&mut self, speed_hz: u32) -> Result<&mut Self> {
        let mut next = self.params;
        next.set_max_speed_hz(speed_hz)?;
        self.commit(next)?;
        Ok(self)
    }

    /// Enable or disable half-duplex operation
    pub fn set_half_duplex(&mut self, half_duplex: bool) -> Result<&mut Self> {
        let mut next = self.params;
        next.set_half_duplex(half_duplex);
        self.commit(next)?;
        Ok(self)
    }

    /// Enable or disable loopback
    pub fn set_loopback(&mut self, loopback: bool) -> Result<&mut Self> {
        let mut next = self.params;
        next.set_loopback(loopback);
        self.commit(next)?;
        Ok(self)
    }

    /// Store `next`, writing it to the device first if open
    fn commit(&mut self, next: TransferParameters) -> Result<()> {
        if next == self.params && !self.stale {
            return Ok(());
        }
        if let Some(port) = self.port.as_deref_mut() {
            if let Err(e) = port.apply(&next) {
                // Put the device back the way the handle sees it
                match port.apply(&self.params) {
                    Ok(()) => self.stale = false,
                    Err(restore_err) => {
                        log::warn!(
                            "spilink: Restoring {} on {} failed: {}",
                            self.params,
                            self.path.as_deref().unwrap_or("<unknown>"),
                            restore_err
                        );
                        self.stale = true;
                    }
                }
                return Err(e);
            }
            self.stale = false;
            log::debug!("spilink: Parameters now {}", next);
        }
        self.params = next;
        Ok(())
    }

    /// Open port together with the current parameters, for the transfer engine
    ///
    /// Writes the stored parameters first if an earlier rollback failed.
    pub(crate) fn port_mut(&mut self) -> Result<(&mut dyn SpiPort, &TransferParameters)> {
        let port = self.port.as_deref_mut().ok_or(Error::NotOpen)?;
        if self.stale {
            port.apply(&self.params)?;
            self.stale = false;
            log::debug!("spilink: Parameters restored to {}", self.params);
        }
        Ok((port, &self.params))
    }

    fn path_or_unknown(&self) -> &str {
        self.path.as_deref().unwrap_or("<unknown>")
    }
}

impl<B: SpiBackend> Drop for SpiDevice<B> {
    fn drop(&mut self) {
        if let Some(mut port) = self.port.take() {
            log::debug!("spilink: Closing {} on drop", self.path_or_unknown());
            if let Err(e) = port.close() {
                log::warn!("spilink: Closing {} failed: {}", self.path_or_unknown(), e);
            }
        }
    }
}
