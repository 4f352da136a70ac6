//! spilink-core - Core library for host-side SPI device access
//!
//! This crate holds everything about talking to an SPI peripheral that does
//! not depend on a particular operating system interface:
//!
//! - [`params`] - transfer parameters (mode, chip select, bit order, word
//!   size, clock speed, duplex, loopback) and their validation
//! - [`options`] - configuration sets built from typed builders or
//!   `key=value` pairs
//! - [`backend`] - the traits a device-access backend implements
//! - [`device`] - the device handle and its open/closed lifecycle
//! - [`transfer`] - write, read and full-duplex transfers
//!
//! The crate is `no_std` and needs `alloc`. Enable the `std` feature to get
//! `std::error::Error` on the error type.
//!
//! # Features
//!
//! - `std` - Enable standard library support
//!
//! # Example
//!
//! ```ignore
//! use spilink_core::{ChipSelect, Mode, SpiDevice, SpiOptions};
//!
//! let options = SpiOptions::new()
//!     .with_mode(Mode::Mode0)
//!     .with_chip_select(ChipSelect::None);
//! let mut spi = SpiDevice::open_with(backend, "/dev/spidev1.1", &options)?;
//! spi.write(&[0xFF, 0x00, 0x00])?;
//! spi.close()?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod backend;
pub mod device;
pub mod error;
pub mod options;
pub mod params;
pub mod transfer;

pub use backend::{Segment, SpiBackend, SpiPort};
pub use device::SpiDevice;
pub use error::{Error, OpenFailure, Result, ValidationError};
pub use options::SpiOptions;
pub use params::{BitOrder, ChipSelect, Mode, ModeFlags, TransferParameters};
