//! Transfer engine
//!
//! Write-only and read-only transfers are thin layers over one primitive,
//! [`SpiDevice::transfer`]. SPI always clocks both directions at once, so in
//! full duplex the engine fills in the missing side with a freshly allocated
//! zero buffer of matching length. In half duplex (3-wire) nothing is
//! synthesized: each direction gets its own segment, and a two-sided
//! transfer becomes a write segment followed by a read segment in the same
//! message.
//!
//! Every operation blocks until the hardware exchange has finished. The
//! `*_then` variants run a caller closure on the same thread once the
//! operation has succeeded.

use crate::backend::{Segment, SpiBackend};
use crate::device::SpiDevice;
use crate::error::{Error, Result};
use alloc::vec;
use alloc::vec::Vec;

impl<B: SpiBackend> SpiDevice<B> {
    /// Clock out `buf`, discarding whatever is clocked in
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.transfer(Some(buf), None)
    }

    /// Clock in `buf.len()` bytes into `buf`, sending zeros
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.transfer(None, Some(buf))
    }

    /// Exchange `write` for `read`
    ///
    /// When both buffers are given they must have the same length. A missing
    /// side is treated as a zero-filled buffer of the other side's length.
    /// `read` is filled in place.
    pub fn transfer(&mut self, write: Option<&[u8]>, read: Option<&mut [u8]>) -> Result<()> {
        let len = match (&write, &read) {
            (Some(w), Some(r)) if w.len() != r.len() => {
                return Err(Error::BufferSizeMismatch {
                    write_len: w.len(),
                    read_len: r.len(),
                });
            }
            (Some(w), _) => w.len(),
            (None, Some(r)) => r.len(),
            (None, None) => 0,
        };

        let (port, params) = self.port_mut()?;
        if len == 0 {
            return Ok(());
        }

        let half_duplex = params.half_duplex();
        let total = if half_duplex && write.is_some() && read.is_some() {
            len * 2
        } else {
            len
        };
        let max = port.max_transfer_len();
        if total > max {
            return Err(Error::TransferTooLong { len: total, max });
        }

        log::trace!(
            "spilink: {} byte {} transfer (tx={}, rx={})",
            len,
            if half_duplex { "half-duplex" } else { "full-duplex" },
            write.is_some(),
            read.is_some()
        );

        if half_duplex {
            match (write, read) {
                (Some(w), Some(r)) => {
                    port.exchange(&mut [Segment::write_only(w), Segment::read_only(r)], params)
                }
                (Some(w), None) => port.exchange(&mut [Segment::write_only(w)], params),
                (None, Some(r)) => port.exchange(&mut [Segment::read_only(r)], params),
                (None, None) => Ok(()),
            }
        } else {
            match (write, read) {
                (Some(w), Some(r)) => port.exchange(&mut [Segment::duplex(w, r)?], params),
                (Some(w), None) => {
                    let mut discard = vec![0u8; len];
                    port.exchange(&mut [Segment::duplex(w, &mut discard)?], params)
                }
                (None, Some(r)) => {
                    let zeros = vec![0u8; len];
                    port.exchange(&mut [Segment::duplex(&zeros, r)?], params)
                }
                (None, None) => Ok(()),
            }
        }
    }

    /// Clock out `write` and return the bytes clocked in
    pub fn transfer_vec(&mut self, write: &[u8]) -> Result<Vec<u8>> {
        let mut read = vec![0u8; write.len()];
        self.transfer(Some(write), Some(&mut read))?;
        Ok(read)
    }

    /// [`write`](Self::write), then call `done` with the handle and `buf`
    pub fn write_then<T, F>(&mut self, buf: &[u8], done: F) -> Result<T>
    where
        F: FnOnce(&mut Self, &[u8]) -> T,
    {
        self.write(buf)?;
        Ok(done(self, buf))
    }

    /// [`read`](Self::read), then call `done` with the handle and the filled `buf`
    pub fn read_then<T, F>(&mut self, buf: &mut [u8], done: F) -> Result<T>
    where
        F: FnOnce(&mut Self, &mut [u8]) -> T,
    {
        self.read(buf)?;
        Ok(done(self, buf))
    }

    /// [`transfer_vec`](Self::transfer_vec), then call `done` with the handle
    /// and the received bytes
    pub fn transfer_then<T, F>(&mut self, write: &[u8], done: F) -> Result<T>
    where
        F: FnOnce(&mut Self, &[u8]) -> T,
    {
        let read = self.transfer_vec(write)?;
        Ok(done(self, &read))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::{Shared, TestBus};
    use crate::options::SpiOptions;
    use crate::params::{ChipSelect, Mode};
    use alloc::vec;

    fn open_device() -> (SpiDevice<TestBus>, Shared) {
        let (bus, record) = TestBus::new();
        let mut dev = SpiDevice::new(bus);
        dev.open("/dev/spidev1.1").unwrap();
        (dev, record)
    }

    #[test]
    fn test_transfer_requires_open() {
        let (bus, record) = TestBus::new();
        let mut dev = SpiDevice::new(bus);
        let mut buf = [0u8; 3];

        assert_eq!(dev.write(&[1, 2, 3]), Err(Error::NotOpen));
        assert_eq!(dev.read(&mut buf), Err(Error::NotOpen));
        assert_eq!(dev.transfer(Some(&[1, 2, 3]), Some(&mut buf)), Err(Error::NotOpen));
        assert!(record.lock().messages.is_empty());

        dev.open("/dev/spidev1.1").unwrap();
        dev.write(&[1, 2, 3]).unwrap();

        dev.close().unwrap();
        assert_eq!(dev.write(&[1, 2, 3]), Err(Error::NotOpen));
    }

    #[test]
    fn test_scenario_write_pixel() {
        let (bus, record) = TestBus::new();
        let opts = SpiOptions::new()
            .with_mode(Mode::Mode0)
            .with_chip_select(ChipSelect::None);
        let mut dev = SpiDevice::open_with(bus, "/dev/spidev1.1", &opts).unwrap();

        dev.write(&[0xFF, 0x00, 0x00]).unwrap();
        assert!(dev.is_open());

        let rec = record.lock();
        assert_eq!(rec.messages.len(), 1);
        assert_eq!(rec.messages[0], vec![(Some(vec![0xFF, 0x00, 0x00]), Some(3))]);
    }

    #[test]
    fn test_read_sends_zeros() {
        let (mut dev, record) = open_device();
        let mut buf = [0x11u8; 4];
        dev.read(&mut buf).unwrap();

        // The test port answers with the complement of the written bytes
        assert_eq!(buf, [0xFF; 4]);
        assert_eq!(record.lock().messages[0], vec![(Some(vec![0; 4]), Some(4))]);
    }

    #[test]
    fn test_full_duplex_transfer() {
        let (mut dev, record) = open_device();
        let mut rx = [0u8; 3];
        dev.transfer(Some(&[0x0F, 0xF0, 0x55]), Some(&mut rx)).unwrap();
        assert_eq!(rx, [0xF0, 0x0F, 0xAA]);
        assert_eq!(record.lock().messages[0].len(), 1);

        assert_eq!(dev.transfer_vec(&[0x00]).unwrap(), vec![0xFF]);
    }

    #[test]
    fn test_buffer_size_mismatch() {
        let (mut dev, record) = open_device();
        let mut rx = [0u8; 2];
        assert_eq!(
            dev.transfer(Some(&[1, 2, 3]), Some(&mut rx)),
            Err(Error::BufferSizeMismatch {
                write_len: 3,
                read_len: 2
            })
        );
        assert!(record.lock().messages.is_empty());
        assert!(dev.is_open());
    }

    #[test]
    fn test_half_duplex_segments() {
        let (mut dev, record) = open_device();
        dev.set_half_duplex(true).unwrap();

        dev.write(&[1, 2]).unwrap();
        let mut rx = [0u8; 2];
        dev.read(&mut rx).unwrap();
        assert_eq!(rx, [0xA5, 0xA5]);
        dev.transfer(Some(&[3, 4]), Some(&mut rx)).unwrap();

        let rec = record.lock();
        assert_eq!(rec.messages[0], vec![(Some(vec![1, 2]), None)]);
        assert_eq!(rec.messages[1], vec![(None, Some(2))]);
        assert_eq!(
            rec.messages[2],
            vec![(Some(vec![3, 4]), None), (None, Some(2))]
        );
    }

    #[test]
    fn test_write_and_read_are_independent() {
        let (mut dev, record) = open_device();
        let out = [0x12u8, 0x34];
        let mut back = [0u8; 2];
        dev.write(&out).unwrap();
        dev.read(&mut back).unwrap();
        assert_ne!(back, out);
        assert_eq!(record.lock().messages.len(), 2);
    }

    #[test]
    fn test_empty_transfer_is_noop() {
        let (mut dev, record) = open_device();
        dev.write(&[]).unwrap();
        dev.transfer(None, None).unwrap();
        assert!(record.lock().messages.is_empty());
    }

    #[test]
    fn test_transfer_too_long() {
        let (mut dev, record) = open_device();
        record.lock().max_len = Some(4);
        assert_eq!(
            dev.write(&[0; 5]),
            Err(Error::TransferTooLong { len: 5, max: 4 })
        );

        dev.set_half_duplex(true).unwrap();
        let mut rx = [0u8; 3];
        assert_eq!(
            dev.transfer(Some(&[0; 3]), Some(&mut rx)),
            Err(Error::TransferTooLong { len: 6, max: 4 })
        );
    }

    #[test]
    fn test_failed_exchange_keeps_state() {
        let (mut dev, record) = open_device();
        let before = *dev.parameters();
        record.lock().refuse_exchange = true;

        assert_eq!(dev.write(&[1]), Err(Error::Transfer { code: 5 }));
        assert!(dev.is_open());
        assert_eq!(*dev.parameters(), before);

        record.lock().refuse_exchange = false;
        dev.write(&[1]).unwrap();
    }

    #[test]
    fn test_completion_hooks() {
        let (mut dev, _) = open_device();

        let seen = dev
            .write_then(&[0xFF, 0x00, 0x00], |dev, buf| {
                assert!(dev.is_open());
                buf.to_vec()
            })
            .unwrap();
        assert_eq!(seen, vec![0xFF, 0x00, 0x00]);

        let mut rx = [0u8; 1];
        let first = dev.read_then(&mut rx, |_, buf| buf[0]).unwrap();
        assert_eq!(first, 0xFF);

        let echoed = dev.transfer_then(&[0x01], |_, rx| rx.to_vec()).unwrap();
        assert_eq!(echoed, vec![0xFE]);

        dev.close().unwrap();
        let mut called = false;
        assert!(dev.write_then(&[1], |_, _| called = true).is_err());
        assert!(!called);
    }
}
