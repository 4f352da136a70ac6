//! Error types for Linux spidev operations

use spilink_core::{Error as CoreError, OpenFailure};
use thiserror::Error;

/// Linux spidev specific errors
#[derive(Debug, Error)]
pub enum LinuxSpiError {
    /// Failed to open device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set SPI mode byte
    #[error("Failed to set SPI mode to 0x{mode:02X}: {source}")]
    SetModeFailed {
        mode: u8,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set bit order
    #[error("Failed to set LSB-first to {lsb_first}: {source}")]
    SetBitOrderFailed {
        lsb_first: bool,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set bits per word
    #[error("Failed to set bits per word to {bits}: {source}")]
    SetBitsPerWordFailed {
        bits: u8,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set clock speed
    #[error("Failed to set clock speed to {speed} Hz: {source}")]
    SetSpeedFailed {
        speed: u32,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a setting back from the kernel
    #[error("Failed to read {setting}: {source}")]
    ReadBackFailed {
        setting: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// SPI transfer failed
    #[error("SPI transfer failed: {0}")]
    TransferFailed(#[source] std::io::Error),

    /// Message has more segments than one ioctl can carry
    #[error("Too many segments in one message: {0}")]
    TooManySegments(usize),

    /// Segment longer than the kernel transfer record allows
    #[error("Segment of {0} bytes is too long")]
    SegmentTooLong(usize),
}

impl LinuxSpiError {
    fn os_code(source: &std::io::Error) -> i32 {
        source.raw_os_error().unwrap_or(libc::EIO)
    }
}

impl From<LinuxSpiError> for CoreError {
    fn from(e: LinuxSpiError) -> Self {
        match e {
            LinuxSpiError::OpenFailed { path, source } => {
                let cause = match source.kind() {
                    std::io::ErrorKind::NotFound => OpenFailure::NotFound,
                    std::io::ErrorKind::PermissionDenied => OpenFailure::PermissionDenied,
                    _ if source.raw_os_error() == Some(libc::EBUSY) => OpenFailure::Busy,
                    _ => OpenFailure::Other(LinuxSpiError::os_code(&source)),
                };
                CoreError::DeviceOpen { path, cause }
            }
            LinuxSpiError::SetModeFailed { source, .. } => CoreError::Configure {
                setting: "mode",
                code: LinuxSpiError::os_code(&source),
            },
            LinuxSpiError::SetBitOrderFailed { source, .. } => CoreError::Configure {
                setting: "bit order",
                code: LinuxSpiError::os_code(&source),
            },
            LinuxSpiError::SetBitsPerWordFailed { source, .. } => CoreError::Configure {
                setting: "bits per word",
                code: LinuxSpiError::os_code(&source),
            },
            LinuxSpiError::SetSpeedFailed { source, .. } => CoreError::Configure {
                setting: "max speed",
                code: LinuxSpiError::os_code(&source),
            },
            LinuxSpiError::ReadBackFailed { source, .. }
            | LinuxSpiError::TransferFailed(source) => CoreError::Transfer {
                code: LinuxSpiError::os_code(&source),
            },
            LinuxSpiError::TooManySegments(_) | LinuxSpiError::SegmentTooLong(_) => {
                CoreError::Transfer { code: libc::EMSGSIZE }
            }
        }
    }
}

/// Result type for Linux spidev operations
pub type Result<T> = std::result::Result<T, LinuxSpiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn open_failed(source: io::Error) -> CoreError {
        LinuxSpiError::OpenFailed {
            path: "/dev/spidev9.9".to_string(),
            source,
        }
        .into()
    }

    #[test]
    fn test_open_error_mapping() {
        assert_eq!(
            open_failed(io::Error::from_raw_os_error(libc::ENOENT)),
            CoreError::DeviceOpen {
                path: "/dev/spidev9.9".to_string(),
                cause: OpenFailure::NotFound
            }
        );
        assert!(matches!(
            open_failed(io::Error::from_raw_os_error(libc::EACCES)),
            CoreError::DeviceOpen {
                cause: OpenFailure::PermissionDenied,
                ..
            }
        ));
        assert!(matches!(
            open_failed(io::Error::from_raw_os_error(libc::EBUSY)),
            CoreError::DeviceOpen {
                cause: OpenFailure::Busy,
                ..
            }
        ));
        assert!(matches!(
            open_failed(io::Error::from_raw_os_error(libc::ENXIO)),
            CoreError::DeviceOpen {
                cause: OpenFailure::Other(code),
                ..
            } if code == libc::ENXIO
        ));
    }

    #[test]
    fn test_setting_error_mapping() {
        let err: CoreError = LinuxSpiError::SetBitsPerWordFailed {
            bits: 3,
            source: io::Error::from_raw_os_error(libc::EINVAL),
        }
        .into();
        assert_eq!(
            err,
            CoreError::Configure {
                setting: "bits per word",
                code: libc::EINVAL
            }
        );
    }
}
