//! Linux spidev backend implementation
//!
//! This module provides the `Spidev` backend and the `SpidevPort` it opens,
//! implementing the spilink backend traits on top of Linux's spidev ioctls.

use crate::error::{LinuxSpiError, Result};

use spilink_core::{
    Error as CoreError, ModeFlags, Result as CoreResult, Segment, SpiBackend, SpiPort,
    TransferParameters,
};

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

/// Path to kernel spidev buffer size parameter
const BUF_SIZE_SYSFS: &str = "/sys/module/spidev/parameters/bufsiz";

/// Linux spidev ioctl constants
mod ioctl {
    use nix::ioctl_read;
    use nix::ioctl_write_ptr;

    // SPI ioctl magic number
    const SPI_IOC_MAGIC: u8 = b'k';

    // SPI ioctl type numbers
    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_LSB_FIRST: u8 = 2;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    // Generate ioctl functions
    ioctl_read!(spi_ioc_rd_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_read!(
        spi_ioc_rd_lsb_first,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_LSB_FIRST,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_lsb_first,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_LSB_FIRST,
        u8
    );
    ioctl_read!(
        spi_ioc_rd_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_read!(
        spi_ioc_rd_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    // SPI_IOC_MESSAGE(n) = _IOW(SPI_IOC_MAGIC, 0, char[SPI_MSGSIZE(n)])
    // where SPI_MSGSIZE(n) = (n) * sizeof(struct spi_ioc_transfer)

    /// Size of struct spi_ioc_transfer (same on 32- and 64-bit)
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// Calculate ioctl number for SPI_IOC_MESSAGE(n)
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        // _IOC(dir, type, nr, size) = ((dir)<<30)|((size)<<16)|((type)<<8)|(nr)
        // with _IOC_WRITE = 1
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// SPI transfer structure for ioctl
/// This must match the kernel's struct spi_ioc_transfer layout
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,          // __u64 tx_buf
    rx_buf: u64,          // __u64 rx_buf
    len: u32,             // __u32 len
    speed_hz: u32,        // __u32 speed_hz
    delay_usecs: u16,     // __u16 delay_usecs
    bits_per_word: u8,    // __u8 bits_per_word
    cs_change: u8,        // __u8 cs_change
    tx_nbits: u8,         // __u8 tx_nbits
    rx_nbits: u8,         // __u8 rx_nbits
    word_delay_usecs: u8, // __u8 word_delay_usecs
    _pad: u8,             // padding
}

impl SpiIocTransfer {
    fn from_segment(seg: &mut Segment<'_>, params: &TransferParameters) -> Result<Self> {
        let len = seg.len();
        let len = u32::try_from(len).map_err(|_| LinuxSpiError::SegmentTooLong(len))?;
        Ok(Self {
            tx_buf: seg.tx().map_or(0, |w| w.as_ptr() as u64),
            rx_buf: seg.rx_mut().map_or(0, |r| r.as_mut_ptr() as u64),
            len,
            speed_hz: params.max_speed_hz(),
            bits_per_word: params.bits_per_word(),
            ..Default::default()
        })
    }
}

fn io_err(e: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}

fn read_failed(setting: &'static str) -> impl Fn(nix::errno::Errno) -> LinuxSpiError {
    move |e| LinuxSpiError::ReadBackFailed {
        setting,
        source: io_err(e),
    }
}

/// Linux spidev backend
///
/// Opens `/dev/spidevX.Y` character devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct Spidev;

impl Spidev {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

impl SpiBackend for Spidev {
    fn name(&self) -> &'static str {
        "spidev"
    }

    fn open_port(&mut self, path: &str) -> CoreResult<Box<dyn SpiPort>> {
        Ok(Box::new(SpidevPort::open(path)?))
    }
}

/// An open spidev device
pub struct SpidevPort {
    /// File handle for spidev device
    file: File,
    /// Device path, for log messages
    path: String,
    /// Maximum kernel buffer size
    max_kernel_buf_size: usize,
}

impl SpidevPort {
    /// Open a spidev device without touching its settings
    pub fn open(path: &str) -> Result<Self> {
        log::debug!("linux_spi: Opening device {}", path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| LinuxSpiError::OpenFailed {
                path: path.to_string(),
                source: e,
            })?;

        let max_kernel_buf_size = get_max_kernel_buf_size();
        log::debug!(
            "linux_spi: Max kernel buffer size: {} bytes",
            max_kernel_buf_size
        );

        Ok(Self {
            file,
            path: path.to_string(),
            max_kernel_buf_size,
        })
    }

    /// Write every parameter to the kernel
    fn write_parameters(&mut self, params: &TransferParameters) -> Result<()> {
        let fd = self.file.as_raw_fd();

        // Bit order goes through its own ioctl below
        let mode = (params.mode_flags() - ModeFlags::LSB_FIRST).bits();
        unsafe {
            ioctl::spi_ioc_wr_mode(fd, &mode).map_err(|e| LinuxSpiError::SetModeFailed {
                mode,
                source: io_err(e),
            })?;
        }

        let lsb_first = params.bit_order() == spilink_core::BitOrder::LsbFirst;
        let lsb = u8::from(lsb_first);
        unsafe {
            ioctl::spi_ioc_wr_lsb_first(fd, &lsb).map_err(|e| {
                LinuxSpiError::SetBitOrderFailed {
                    lsb_first,
                    source: io_err(e),
                }
            })?;
        }

        let bits = params.bits_per_word();
        unsafe {
            ioctl::spi_ioc_wr_bits_per_word(fd, &bits).map_err(|e| {
                LinuxSpiError::SetBitsPerWordFailed {
                    bits,
                    source: io_err(e),
                }
            })?;
        }

        let speed = params.max_speed_hz();
        unsafe {
            ioctl::spi_ioc_wr_max_speed_hz(fd, &speed).map_err(|e| {
                LinuxSpiError::SetSpeedFailed {
                    speed,
                    source: io_err(e),
                }
            })?;
        }

        log::debug!(
            "linux_spi: {} configured (mode=0x{:02X}, {} bits, {} kHz)",
            self.path,
            mode,
            bits,
            speed / 1000
        );
        Ok(())
    }

    /// Read the settings the kernel currently holds for this device
    pub fn read_back(&self) -> Result<TransferParameters> {
        let fd = self.file.as_raw_fd();

        let mut mode: u8 = 0;
        let mut lsb: u8 = 0;
        let mut bits: u8 = 0;
        let mut speed: u32 = 0;
        unsafe {
            ioctl::spi_ioc_rd_mode(fd, &mut mode).map_err(read_failed("mode"))?;
            ioctl::spi_ioc_rd_lsb_first(fd, &mut lsb).map_err(read_failed("bit order"))?;
            ioctl::spi_ioc_rd_bits_per_word(fd, &mut bits)
                .map_err(read_failed("bits per word"))?;
            ioctl::spi_ioc_rd_max_speed_hz(fd, &mut speed).map_err(read_failed("max speed"))?;
        }

        let mut flags = ModeFlags::from_bits_retain(mode);
        flags.set(ModeFlags::LSB_FIRST, lsb != 0);
        let mut params = TransferParameters::new().with_mode_flags(flags);
        // The kernel reports 0 for the default of 8 bits
        if params.set_bits_per_word(if bits == 0 { 8 } else { bits }).is_err() {
            log::debug!(
                "linux_spi: Kernel reports {} bits per word for {}",
                bits,
                self.path
            );
        }
        if params.set_max_speed_hz(speed).is_err() {
            log::debug!("linux_spi: Kernel reports no max speed for {}", self.path);
        }
        Ok(params)
    }

    /// Perform an SPI message
    ///
    /// Each segment becomes one `spi_ioc_transfer`; chip select stays
    /// asserted between them.
    fn spi_message(
        &mut self,
        segments: &mut [Segment<'_>],
        params: &TransferParameters,
    ) -> Result<()> {
        let count = u8::try_from(segments.len())
            .map_err(|_| LinuxSpiError::TooManySegments(segments.len()))?;

        let transfers = segments
            .iter_mut()
            .map(|seg| SpiIocTransfer::from_segment(seg, params))
            .collect::<Result<Vec<_>>>()?;

        let fd = self.file.as_raw_fd();
        let ioctl_num = ioctl::spi_ioc_message(count);
        let ret = unsafe { libc::ioctl(fd, ioctl_num, transfers.as_ptr()) };

        if ret < 0 {
            return Err(LinuxSpiError::TransferFailed(
                std::io::Error::last_os_error(),
            ));
        }

        Ok(())
    }
}

impl SpiPort for SpidevPort {
    fn apply(&mut self, params: &TransferParameters) -> CoreResult<()> {
        self.write_parameters(params).map_err(CoreError::from)
    }

    fn exchange(
        &mut self,
        segments: &mut [Segment<'_>],
        params: &TransferParameters,
    ) -> CoreResult<()> {
        self.spi_message(segments, params).map_err(CoreError::from)
    }

    fn max_transfer_len(&self) -> usize {
        self.max_kernel_buf_size
    }

    fn close(&mut self) -> CoreResult<()> {
        // The file descriptor is released when the port is dropped
        log::debug!("linux_spi: Closing {}", self.path);
        Ok(())
    }
}

/// Open `path` and read the settings the kernel holds for it
pub fn read_back(path: &str) -> Result<TransferParameters> {
    SpidevPort::open(path)?.read_back()
}

/// Read the maximum kernel buffer size from sysfs, or use page size as fallback
fn get_max_kernel_buf_size() -> usize {
    if let Ok(content) = std::fs::read_to_string(BUF_SIZE_SYSFS) {
        if let Ok(size) = content.trim().parse::<usize>() {
            if size > 0 {
                log::debug!("linux_spi: Using buffer size {} from sysfs", size);
                return size;
            }
        }
        log::warn!("linux_spi: Invalid buffer size in {}", BUF_SIZE_SYSFS);
    } else {
        log::debug!("linux_spi: Cannot read {}, using page size", BUF_SIZE_SYSFS);
    }

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    log::debug!("linux_spi: Using page size {} as buffer size", page_size);
    page_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use spilink_core::{OpenFailure, SpiDevice};

    #[test]
    fn test_transfer_struct_size() {
        assert_eq!(
            std::mem::size_of::<SpiIocTransfer>(),
            ioctl::SPI_IOC_TRANSFER_SIZE
        );
    }

    #[test]
    fn test_message_ioctl_number() {
        // SPI_IOC_MESSAGE(1) on Linux is 0x40206b00
        assert_eq!(ioctl::spi_ioc_message(1), 0x4020_6b00);
        assert_eq!(ioctl::spi_ioc_message(2), 0x4040_6b00);
    }

    #[test]
    fn test_transfer_record_from_segment() {
        let mut params = TransferParameters::new();
        params.set_max_speed_hz(1_000_000).unwrap();
        params.set_bits_per_word(16).unwrap();

        let tx = [1u8, 2, 3, 4];
        let mut seg = Segment::write_only(&tx);
        let rec = SpiIocTransfer::from_segment(&mut seg, &params).unwrap();
        assert_eq!(rec.tx_buf, tx.as_ptr() as u64);
        assert_eq!(rec.rx_buf, 0);
        assert_eq!(rec.len, 4);
        assert_eq!(rec.speed_hz, 1_000_000);
        assert_eq!(rec.bits_per_word, 16);
        assert_eq!(rec.cs_change, 0);
    }

    #[test]
    fn test_transfer_record_lengths_match() {
        let params = TransferParameters::new();
        let tx = [1u8, 2, 3, 4];

        let mut short = [0u8; 1];
        assert!(matches!(
            Segment::duplex(&tx, &mut short),
            Err(CoreError::BufferSizeMismatch {
                write_len: 4,
                read_len: 1
            })
        ));

        let mut rx = [0u8; 4];
        let rx_ptr = rx.as_mut_ptr() as u64;
        let mut seg = Segment::duplex(&tx, &mut rx).unwrap();
        let rec = SpiIocTransfer::from_segment(&mut seg, &params).unwrap();
        assert_eq!(rec.len, 4);
        assert_eq!(rec.rx_buf, rx_ptr);

        let mut only_rx = [0u8; 3];
        let mut seg = Segment::read_only(&mut only_rx);
        let rec = SpiIocTransfer::from_segment(&mut seg, &params).unwrap();
        assert_eq!(rec.tx_buf, 0);
        assert_eq!(rec.len, 3);
    }

    #[test]
    fn test_handle_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SpiDevice<Spidev>>();
        assert_send::<SpidevPort>();
    }

    #[test]
    fn test_open_missing_device() {
        let mut dev = SpiDevice::new(Spidev::new());
        match dev.open("/dev/spidev-does-not-exist") {
            Err(CoreError::DeviceOpen { cause, .. }) => assert_eq!(cause, OpenFailure::NotFound),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("opened a missing device"),
        }
        assert!(!dev.is_open());
    }

    #[test]
    fn test_kernel_buf_size_positive() {
        assert!(get_max_kernel_buf_size() > 0);
    }
}
