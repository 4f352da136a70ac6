//! Backend registration and dispatch
//!
//! This module lists the backends compiled in, parses device strings and
//! opens devices by backend name.

use spilink_core::{SpiBackend, SpiDevice, SpiOptions, ValidationError};
use thiserror::Error;

/// Information about a backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Errors while turning a device string into an open device
#[derive(Debug, Error)]
pub enum DeviceStringError {
    /// No `dev=` option
    #[error("No device path specified. Use <backend>:dev=/dev/spidevX.Y")]
    NoPath,

    /// Option without `=`
    #[error("Malformed option '{0}', expected key=value")]
    Malformed(String),

    /// Backend not compiled in
    #[error("Unknown backend '{0}' [available: {1}]")]
    UnknownBackend(String, String),

    /// Invalid option value
    #[error("Invalid option: {0}")]
    Invalid(#[from] ValidationError),
}

/// A parsed device string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Backend name as given
    pub backend: String,
    /// Device path
    pub path: String,
    /// Settings given inline
    pub options: SpiOptions,
}

/// Get information about all available backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "spidev")]
    backends.push(BackendInfo {
        name: "spidev",
        aliases: &["linux_spi", "linux-spi"],
        description: "Linux spidev interface (dev=/dev/spidevX.Y)",
    });

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory SPI device emulator for testing (dev=/dev/spidev0.0..1.1)",
    });

    backends
}

/// Comma-separated list of backend names
pub fn backend_names_short() -> String {
    available_backends()
        .iter()
        .map(|b| b.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a name or alias to the primary backend name
fn resolve_backend(name: &str) -> Option<&'static str> {
    available_backends()
        .into_iter()
        .find(|b| b.name == name || b.aliases.iter().any(|a| *a == name))
        .map(|b| b.name)
}

/// Parse `backend:dev=/dev/spidevX.Y,key=value,...`
///
/// A bare `backend:/dev/spidevX.Y` is accepted as shorthand for `dev=`.
pub fn parse_device_string(s: &str) -> Result<DeviceSpec, DeviceStringError> {
    let (backend, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut path = None;
    let mut pairs = Vec::new();
    for opt in opts_str.split(',').map(str::trim).filter(|o| !o.is_empty()) {
        match opt.split_once('=') {
            Some(("dev", value)) => path = Some(value.to_string()),
            Some((key, value)) => pairs.push((key.trim(), value.trim())),
            None if opt.starts_with('/') => path = Some(opt.to_string()),
            None => return Err(DeviceStringError::Malformed(opt.to_string())),
        }
    }

    Ok(DeviceSpec {
        backend: backend.trim().to_string(),
        path: path.ok_or(DeviceStringError::NoPath)?,
        options: SpiOptions::from_pairs(&pairs)?,
    })
}

/// Create the backend named in `spec`
pub fn create_backend(spec: &DeviceSpec) -> Result<Box<dyn SpiBackend>, DeviceStringError> {
    let unknown =
        || DeviceStringError::UnknownBackend(spec.backend.clone(), backend_names_short());
    match resolve_backend(&spec.backend) {
        #[cfg(feature = "spidev")]
        Some("spidev") => Ok(Box::new(spilink_linux::Spidev::new())),
        #[cfg(feature = "dummy")]
        Some("dummy") => Ok(Box::new(spilink_dummy::DummyBus::new_default())),
        _ => Err(unknown()),
    }
}

/// Open the device named by `device`, with `defaults` underneath its inline settings
pub fn open_device(
    device: &str,
    defaults: &SpiOptions,
) -> Result<SpiDevice<Box<dyn SpiBackend>>, Box<dyn std::error::Error>> {
    let spec = parse_device_string(device)?;
    let backend = create_backend(&spec)?;
    let options = defaults.merge(&spec.options);
    let dev = SpiDevice::open_with(backend, &spec.path, &options)?;
    Ok(dev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spilink_core::{ChipSelect, Mode};

    #[test]
    fn test_parse_device_string() {
        let spec =
            parse_device_string("spidev:dev=/dev/spidev1.1,mode=0,chipSelect=none").unwrap();
        assert_eq!(spec.backend, "spidev");
        assert_eq!(spec.path, "/dev/spidev1.1");
        assert_eq!(
            spec.options,
            SpiOptions::new()
                .with_mode(Mode::Mode0)
                .with_chip_select(ChipSelect::None)
        );
    }

    #[test]
    fn test_parse_device_string_shorthand() {
        let spec = parse_device_string("dummy:/dev/spidev0.0").unwrap();
        assert_eq!(spec.path, "/dev/spidev0.0");
        assert!(spec.options.is_empty());
    }

    #[test]
    fn test_parse_device_string_errors() {
        assert!(matches!(
            parse_device_string("spidev"),
            Err(DeviceStringError::NoPath)
        ));
        assert!(matches!(
            parse_device_string("spidev:dev=/dev/spidev0.0,fast"),
            Err(DeviceStringError::Malformed(_))
        ));
        match parse_device_string("spidev:dev=/dev/spidev0.0,bitsPerWord=-1") {
            Err(DeviceStringError::Invalid(e)) => assert_eq!(e.message, "illegal bits per word"),
            _ => panic!("expected validation error"),
        }
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_open_dummy() {
        let mut dev = open_device("dummy:dev=/dev/spidev1.1,maxSpeed=1000", &SpiOptions::new())
            .unwrap();
        assert_eq!(dev.max_speed_hz(), 1000);
        assert_eq!(dev.backend().name(), "dummy");
        dev.write(&[0xFF, 0x00, 0x00]).unwrap();
    }

    #[test]
    fn test_unknown_backend() {
        let spec = parse_device_string("ch341a:dev=/dev/spidev0.0").unwrap();
        assert!(matches!(
            create_backend(&spec),
            Err(DeviceStringError::UnknownBackend(..))
        ));
    }
}
