//! Configuration sets
//!
//! [`SpiOptions`] lists every recognized configuration key as its own
//! optional field. A set can be built in code with the `with_*` methods or
//! parsed from `key=value` pairs, and is applied to parameters all at once.

use crate::error::ValidationError;
use crate::params::{self, keys, BitOrder, ChipSelect, Mode, TransferParameters};

/// A set of parameter changes
///
/// Fields left as `None` keep their current value when the set is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpiOptions {
    /// Clock mode
    pub mode: Option<Mode>,
    /// Chip-select behavior
    pub chip_select: Option<ChipSelect>,
    /// Bit order
    pub bit_order: Option<BitOrder>,
    /// Word size in bits
    pub bits_per_word: Option<u8>,
    /// Clock speed in Hz
    pub max_speed_hz: Option<u32>,
    /// Half-duplex operation
    pub half_duplex: Option<bool>,
    /// Internal loopback
    pub loopback: Option<bool>,
}

impl SpiOptions {
    /// Empty set (changes nothing)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the clock mode
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set chip-select behavior
    pub fn with_chip_select(mut self, chip_select: ChipSelect) -> Self {
        self.chip_select = Some(chip_select);
        self
    }

    /// Set the bit order
    pub fn with_bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = Some(bit_order);
        self
    }

    /// Set the word size (checked when applied)
    pub fn with_bits_per_word(mut self, bits: u8) -> Self {
        self.bits_per_word = Some(bits);
        self
    }

    /// Set the clock speed in Hz (checked when applied)
    pub fn with_max_speed_hz(mut self, speed_hz: u32) -> Self {
        self.max_speed_hz = Some(speed_hz);
        self
    }

    /// Enable or disable half-duplex operation
    pub fn with_half_duplex(mut self, half_duplex: bool) -> Self {
        self.half_duplex = Some(half_duplex);
        self
    }

    /// Enable or disable loopback
    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = Some(loopback);
        self
    }

    /// Whether the set changes nothing
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Parse a set from key/value text pairs
    ///
    /// Recognized keys are listed in [`keys::ALL`]. Unknown keys are logged
    /// as warnings and skipped. The first invalid value aborts parsing.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self, ValidationError> {
        let mut opts = Self::default();
        for (key, value) in pairs {
            opts.set_pair(key, value)?;
        }
        Ok(opts)
    }

    /// Parse one key/value pair into this set
    ///
    /// Returns `Ok(false)` if the key is not recognized (after logging a
    /// warning), `Ok(true)` if it was stored.
    pub fn set_pair(&mut self, key: &str, value: &str) -> Result<bool, ValidationError> {
        match key {
            keys::MODE => self.mode = Some(Mode::parse(value)?),
            keys::CHIP_SELECT => self.chip_select = Some(ChipSelect::parse(value)?),
            keys::BIT_ORDER => self.bit_order = Some(BitOrder::parse(value)?),
            keys::BITS_PER_WORD => self.bits_per_word = Some(params::parse_bits_per_word(value)?),
            keys::MAX_SPEED => self.max_speed_hz = Some(params::parse_speed_hz(value)?),
            keys::HALF_DUPLEX => {
                self.half_duplex = Some(params::parse_flag(keys::HALF_DUPLEX, value)?)
            }
            keys::LOOPBACK => self.loopback = Some(params::parse_flag(keys::LOOPBACK, value)?),
            _ => {
                log::warn!("spilink: Unknown option: {}={}", key, value);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Overlay `other` on top of this set; fields set in `other` win
    pub fn merge(mut self, other: &SpiOptions) -> Self {
        self.mode = other.mode.or(self.mode);
        self.chip_select = other.chip_select.or(self.chip_select);
        self.bit_order = other.bit_order.or(self.bit_order);
        self.bits_per_word = other.bits_per_word.or(self.bits_per_word);
        self.max_speed_hz = other.max_speed_hz.or(self.max_speed_hz);
        self.half_duplex = other.half_duplex.or(self.half_duplex);
        self.loopback = other.loopback.or(self.loopback);
        self
    }

    /// Check every field without applying anything
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(bits) = self.bits_per_word {
            params::validate_bits_per_word(bits)?;
        }
        if let Some(speed) = self.max_speed_hz {
            params::validate_speed_hz(speed)?;
        }
        Ok(())
    }

    /// Apply the set to `params`
    ///
    /// All fields are validated first; on error `params` is untouched.
    pub fn apply_to(&self, params: &mut TransferParameters) -> Result<(), ValidationError> {
        self.validate()?;

        let mut next = *params;
        if let Some(mode) = self.mode {
            next.set_mode(mode);
        }
        if let Some(cs) = self.chip_select {
            next.set_chip_select(cs);
        }
        if let Some(order) = self.bit_order {
            next.set_bit_order(order);
        }
        if let Some(bits) = self.bits_per_word {
            next.set_bits_per_word(bits)?;
        }
        if let Some(speed) = self.max_speed_hz {
            next.set_max_speed_hz(speed)?;
        }
        if let Some(half) = self.half_duplex {
            next.set_half_duplex(half);
        }
        if let Some(lb) = self.loopback {
            next.set_loopback(lb);
        }

        *params = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs() {
        let opts = SpiOptions::from_pairs(&[
            ("mode", "MODE_0"),
            ("chipSelect", "none"),
            ("bitOrder", "lsb"),
            ("bitsPerWord", "10"),
            ("maxSpeed", "1000000"),
            ("halfDuplex", "false"),
            ("loopback", "true"),
        ])
        .unwrap();

        assert_eq!(opts.mode, Some(Mode::Mode0));
        assert_eq!(opts.chip_select, Some(ChipSelect::None));
        assert_eq!(opts.bit_order, Some(BitOrder::LsbFirst));
        assert_eq!(opts.bits_per_word, Some(10));
        assert_eq!(opts.max_speed_hz, Some(1_000_000));
        assert_eq!(opts.half_duplex, Some(false));
        assert_eq!(opts.loopback, Some(true));
    }

    #[test]
    fn test_unknown_key_is_skipped() {
        let mut opts = SpiOptions::new();
        assert!(!opts.set_pair("colour", "red").unwrap());
        assert!(opts.is_empty());

        let opts = SpiOptions::from_pairs(&[("colour", "red"), ("mode", "2")]).unwrap();
        assert_eq!(opts, SpiOptions::new().with_mode(Mode::Mode2));
    }

    #[test]
    fn test_invalid_value_names_key() {
        let err = SpiOptions::from_pairs(&[("bitsPerWord", "-1")]).unwrap_err();
        assert_eq!(err.key, "bitsPerWord");
        assert_eq!(err.value, "-1");
        assert_eq!(err.message, "illegal bits per word");
    }

    #[test]
    fn test_apply_is_atomic() {
        let mut params = TransferParameters::new();
        let opts = SpiOptions::new()
            .with_mode(Mode::Mode3)
            .with_bits_per_word(16)
            .with_max_speed_hz(0);

        let err = opts.apply_to(&mut params).unwrap_err();
        assert_eq!(err.message, "speed must be positive");
        assert_eq!(params, TransferParameters::new());

        let opts = opts.with_max_speed_hz(2_000_000);
        opts.apply_to(&mut params).unwrap();
        assert_eq!(params.mode(), Mode::Mode3);
        assert_eq!(params.bits_per_word(), 16);
        assert_eq!(params.max_speed_hz(), 2_000_000);
        // Untouched fields keep their defaults
        assert_eq!(params.chip_select(), ChipSelect::ActiveLow);
    }

    #[test]
    fn test_merge() {
        let file = SpiOptions::new()
            .with_mode(Mode::Mode1)
            .with_max_speed_hz(1_000);
        let cli = SpiOptions::new().with_max_speed_hz(4_000);
        let merged = file.merge(&cli);
        assert_eq!(merged.mode, Some(Mode::Mode1));
        assert_eq!(merged.max_speed_hz, Some(4_000));
    }
}
