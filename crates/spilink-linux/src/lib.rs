//! spilink-linux - Linux spidev backend
//!
//! This crate lets spilink drive SPI peripherals through the Linux
//! `/dev/spidevX.Y` device interface.
//!
//! # Overview
//!
//! The Linux SPI driver exposes SPI controllers through character devices
//! at `/dev/spidevX.Y` where X is the bus number and Y is the chip select.
//!
//! # Example
//!
//! ```no_run
//! use spilink_core::{ChipSelect, Mode, SpiOptions};
//! use spilink_linux::open_spidev;
//!
//! let options = SpiOptions::new()
//!     .with_mode(Mode::Mode0)
//!     .with_chip_select(ChipSelect::None)
//!     .with_max_speed_hz(1_000_000);
//! let mut spi = open_spidev("/dev/spidev1.1", &options)?;
//!
//! // Turn on the red channel of an LED driver
//! spi.write(&[0xFF, 0x00, 0x00])?;
//!
//! // Full-duplex exchange
//! let reply = spi.transfer_vec(&[0x9F, 0x00, 0x00, 0x00])?;
//! println!("{:02X?}", reply);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to `/dev/spidevX.Y` device
//! - May require adding user to `spi` group or using udev rules

pub mod device;
pub mod error;

// Re-exports
pub use device::{read_back, Spidev, SpidevPort};
pub use error::{LinuxSpiError, Result};

use spilink_core::{SpiDevice, SpiOptions};

/// Configure and open a spidev device
pub fn open_spidev(
    path: &str,
    options: &SpiOptions,
) -> spilink_core::Result<SpiDevice<Spidev>> {
    SpiDevice::open_with(Spidev::new(), path, options)
}
