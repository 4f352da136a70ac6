//! Transfer parameters and their validation
//!
//! Every parameter of an SPI device lives here as a plain Rust type. Raw
//! values (kernel bit patterns, configuration text) go through the
//! conversion functions in this module, which are the only place that
//! decides whether a value is legal.

use crate::error::ValidationError;
use bitflags::bitflags;
use core::fmt;

/// Default SPI clock speed in Hz (500 kHz)
pub const DEFAULT_SPEED_HZ: u32 = 500_000;

/// Default word size in bits
pub const DEFAULT_BITS_PER_WORD: u8 = 8;

/// Configuration keys, as accepted by [`crate::options::SpiOptions::from_pairs`]
pub mod keys {
    /// Clock mode
    pub const MODE: &str = "mode";
    /// Chip-select polarity
    pub const CHIP_SELECT: &str = "chipSelect";
    /// Bit order
    pub const BIT_ORDER: &str = "bitOrder";
    /// Word size
    pub const BITS_PER_WORD: &str = "bitsPerWord";
    /// Clock speed in Hz
    pub const MAX_SPEED: &str = "maxSpeed";
    /// Half-duplex (3-wire) operation
    pub const HALF_DUPLEX: &str = "halfDuplex";
    /// Internal loopback
    pub const LOOPBACK: &str = "loopback";

    /// All recognized keys
    pub const ALL: &[&str] = &[
        MODE,
        CHIP_SELECT,
        BIT_ORDER,
        BITS_PER_WORD,
        MAX_SPEED,
        HALF_DUPLEX,
        LOOPBACK,
    ];
}

bitflags! {
    /// spidev mode byte, as written with `SPI_IOC_WR_MODE`
    ///
    /// Bit values match `<linux/spi/spidev.h>`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeFlags: u8 {
        /// Clock phase
        const CPHA       = 0x01;
        /// Clock polarity
        const CPOL       = 0x02;
        /// Chip select is active high
        const CS_HIGH    = 0x04;
        /// Least significant bit first
        const LSB_FIRST  = 0x08;
        /// Shared SI/SO line (half duplex)
        const THREE_WIRE = 0x10;
        /// Loopback
        const LOOP       = 0x20;
        /// No chip select line
        const NO_CS      = 0x40;
        /// Slave pulls low to pause
        const READY      = 0x80;
    }
}

/// SPI clock mode (CPOL/CPHA combination)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl Mode {
    /// All four modes, in kernel order
    pub const ALL: [Mode; 4] = [Mode::Mode0, Mode::Mode1, Mode::Mode2, Mode::Mode3];

    /// Kernel bit value (0-3)
    pub const fn bits(self) -> u8 {
        match self {
            Mode::Mode0 => 0,
            Mode::Mode1 => 1,
            Mode::Mode2 => 2,
            Mode::Mode3 => 3,
        }
    }

    /// Convert a kernel bit value (0-3) into a mode
    pub fn from_bits(bits: u8) -> Result<Self, ValidationError> {
        match bits {
            0 => Ok(Mode::Mode0),
            1 => Ok(Mode::Mode1),
            2 => Ok(Mode::Mode2),
            3 => Ok(Mode::Mode3),
            _ => Err(illegal_mode(bits)),
        }
    }

    /// Parse `0`-`3`, `MODE_0`-`MODE_3`, `mode0`-`mode3` or `SPI_MODE_0`-`SPI_MODE_3`
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let t = text.trim();
        let digits = strip_prefix_ignore_case(t, "SPI_MODE_")
            .or_else(|| strip_prefix_ignore_case(t, "MODE_"))
            .or_else(|| strip_prefix_ignore_case(t, "MODE"))
            .unwrap_or(t);
        match digits.parse::<u8>() {
            Ok(bits) => Mode::from_bits(bits).map_err(|_| illegal_mode(text)),
            Err(_) => Err(illegal_mode(text)),
        }
    }

    /// Clock polarity (idle level of SCLK)
    pub const fn cpol(self) -> bool {
        matches!(self, Mode::Mode2 | Mode::Mode3)
    }

    /// Clock phase (sample on the trailing edge)
    pub const fn cpha(self) -> bool {
        matches!(self, Mode::Mode1 | Mode::Mode3)
    }
}

impl TryFrom<u8> for Mode {
    type Error = ValidationError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Mode::from_bits(bits)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MODE_{}", self.bits())
    }
}

fn illegal_mode(value: impl fmt::Display) -> ValidationError {
    ValidationError::new(keys::MODE, value, "illegal mode")
}

/// Chip-select behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChipSelect {
    /// No chip-select line is driven
    None,
    /// Chip select asserted high
    ActiveHigh,
    /// Chip select asserted low (the usual case)
    #[default]
    ActiveLow,
}

impl ChipSelect {
    /// Parse `none`, `high`, `low` and their long forms
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let t = text.trim();
        let matches_any = |names: &[&str]| names.iter().any(|n| t.eq_ignore_ascii_case(n));
        if matches_any(&["none", "no_cs", "spi_no_cs"]) {
            Ok(ChipSelect::None)
        } else if matches_any(&["high", "cs_high", "spi_cs_high", "active_high"]) {
            Ok(ChipSelect::ActiveHigh)
        } else if matches_any(&["low", "cs_low", "active_low"]) {
            Ok(ChipSelect::ActiveLow)
        } else {
            Err(ValidationError::new(
                keys::CHIP_SELECT,
                text,
                "illegal chip selection",
            ))
        }
    }
}

impl fmt::Display for ChipSelect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChipSelect::None => write!(f, "none"),
            ChipSelect::ActiveHigh => write!(f, "high"),
            ChipSelect::ActiveLow => write!(f, "low"),
        }
    }
}

/// Bit order within a word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BitOrder {
    /// Most significant bit first
    #[default]
    MsbFirst,
    /// Least significant bit first
    LsbFirst,
}

impl BitOrder {
    /// Parse `msb`, `lsb` and their long forms
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let t = text.trim();
        if ["msb", "msb_first", "msbfirst"]
            .iter()
            .any(|n| t.eq_ignore_ascii_case(n))
        {
            Ok(BitOrder::MsbFirst)
        } else if ["lsb", "lsb_first", "lsbfirst"]
            .iter()
            .any(|n| t.eq_ignore_ascii_case(n))
        {
            Ok(BitOrder::LsbFirst)
        } else {
            Err(ValidationError::new(
                keys::BIT_ORDER,
                text,
                "illegal bit order",
            ))
        }
    }
}

impl fmt::Display for BitOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitOrder::MsbFirst => write!(f, "msb"),
            BitOrder::LsbFirst => write!(f, "lsb"),
        }
    }
}

/// Check a word size
pub fn validate_bits_per_word(bits: u8) -> Result<u8, ValidationError> {
    if bits > 1 {
        Ok(bits)
    } else {
        Err(illegal_bits_per_word(bits))
    }
}

/// Parse and check a word size given as text
pub fn parse_bits_per_word(text: &str) -> Result<u8, ValidationError> {
    match text.trim().parse::<i64>() {
        Ok(bits) if bits > 1 && bits <= i64::from(u8::MAX) => Ok(bits as u8),
        _ => Err(illegal_bits_per_word(text)),
    }
}

fn illegal_bits_per_word(value: impl fmt::Display) -> ValidationError {
    ValidationError::new(keys::BITS_PER_WORD, value, "illegal bits per word")
}

/// Check a clock speed in Hz
pub fn validate_speed_hz(speed_hz: u32) -> Result<u32, ValidationError> {
    if speed_hz > 0 {
        Ok(speed_hz)
    } else {
        Err(speed_not_positive(speed_hz))
    }
}

/// Parse and check a clock speed in Hz given as text
pub fn parse_speed_hz(text: &str) -> Result<u32, ValidationError> {
    match text.trim().parse::<i64>() {
        Ok(speed) if speed > 0 => u32::try_from(speed).map_err(|_| {
            ValidationError::new(keys::MAX_SPEED, text, "speed out of range")
        }),
        _ => Err(speed_not_positive(text)),
    }
}

fn speed_not_positive(value: impl fmt::Display) -> ValidationError {
    ValidationError::new(keys::MAX_SPEED, value, "speed must be positive")
}

/// Parse a boolean flag given as text
pub fn parse_flag(key: &'static str, text: &str) -> Result<bool, ValidationError> {
    let t = text.trim();
    if ["true", "1", "yes", "on"]
        .iter()
        .any(|n| t.eq_ignore_ascii_case(n))
    {
        Ok(true)
    } else if ["false", "0", "no", "off"]
        .iter()
        .any(|n| t.eq_ignore_ascii_case(n))
    {
        Ok(false)
    } else {
        Err(ValidationError::new(key, text, "expected a boolean"))
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// The complete transfer configuration of a device
///
/// Fields are private so the word size and speed invariants cannot be
/// broken; use the setters, which validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferParameters {
    mode: Mode,
    chip_select: ChipSelect,
    bit_order: BitOrder,
    bits_per_word: u8,
    max_speed_hz: u32,
    half_duplex: bool,
    loopback: bool,
}

impl Default for TransferParameters {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            chip_select: ChipSelect::default(),
            bit_order: BitOrder::default(),
            bits_per_word: DEFAULT_BITS_PER_WORD,
            max_speed_hz: DEFAULT_SPEED_HZ,
            half_duplex: false,
            loopback: false,
        }
    }
}

impl TransferParameters {
    /// Default parameters: mode 0, active-low CS, MSB first, 8 bits, 500 kHz
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Chip-select behavior
    pub fn chip_select(&self) -> ChipSelect {
        self.chip_select
    }

    /// Bit order
    pub fn bit_order(&self) -> BitOrder {
        self.bit_order
    }

    /// Word size in bits
    pub fn bits_per_word(&self) -> u8 {
        self.bits_per_word
    }

    /// Maximum clock speed in Hz
    pub fn max_speed_hz(&self) -> u32 {
        self.max_speed_hz
    }

    /// Whether transfers are half duplex (3-wire)
    pub fn half_duplex(&self) -> bool {
        self.half_duplex
    }

    /// Whether internal loopback is enabled
    pub fn loopback(&self) -> bool {
        self.loopback
    }

    /// Set the clock mode
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Set chip-select behavior
    pub fn set_chip_select(&mut self, chip_select: ChipSelect) {
        self.chip_select = chip_select;
    }

    /// Set bit order
    pub fn set_bit_order(&mut self, bit_order: BitOrder) {
        self.bit_order = bit_order;
    }

    /// Set word size; must be greater than 1
    pub fn set_bits_per_word(&mut self, bits: u8) -> Result<(), ValidationError> {
        self.bits_per_word = validate_bits_per_word(bits)?;
        Ok(())
    }

    /// Set clock speed; must be positive
    pub fn set_max_speed_hz(&mut self, speed_hz: u32) -> Result<(), ValidationError> {
        self.max_speed_hz = validate_speed_hz(speed_hz)?;
        Ok(())
    }

    /// Enable or disable half-duplex operation
    pub fn set_half_duplex(&mut self, half_duplex: bool) {
        self.half_duplex = half_duplex;
    }

    /// Enable or disable loopback
    pub fn set_loopback(&mut self, loopback: bool) {
        self.loopback = loopback;
    }

    /// Compose the spidev mode byte
    pub fn mode_flags(&self) -> ModeFlags {
        let mut flags = ModeFlags::from_bits_truncate(self.mode.bits());
        match self.chip_select {
            ChipSelect::ActiveHigh => flags |= ModeFlags::CS_HIGH,
            ChipSelect::None => flags |= ModeFlags::NO_CS,
            ChipSelect::ActiveLow => {}
        }
        flags.set(ModeFlags::LSB_FIRST, self.bit_order == BitOrder::LsbFirst);
        flags.set(ModeFlags::THREE_WIRE, self.half_duplex);
        flags.set(ModeFlags::LOOP, self.loopback);
        flags
    }

    /// Take mode, chip select, bit order, duplex and loopback from a mode byte
    ///
    /// Word size and speed are kept. If both `CS_HIGH` and `NO_CS` are set,
    /// `NO_CS` wins.
    pub fn with_mode_flags(mut self, flags: ModeFlags) -> Self {
        let cpol_cpha = (flags & (ModeFlags::CPOL | ModeFlags::CPHA)).bits();
        self.mode = Mode::ALL[cpol_cpha as usize];
        self.chip_select = if flags.contains(ModeFlags::NO_CS) {
            ChipSelect::None
        } else if flags.contains(ModeFlags::CS_HIGH) {
            ChipSelect::ActiveHigh
        } else {
            ChipSelect::ActiveLow
        };
        self.bit_order = if flags.contains(ModeFlags::LSB_FIRST) {
            BitOrder::LsbFirst
        } else {
            BitOrder::MsbFirst
        };
        self.half_duplex = flags.contains(ModeFlags::THREE_WIRE);
        self.loopback = flags.contains(ModeFlags::LOOP);
        self
    }
}

impl fmt::Display for TransferParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, cs={}, {} first, {} bits, {} Hz{}{}",
            self.mode,
            self.chip_select,
            self.bit_order,
            self.bits_per_word,
            self.max_speed_hz,
            if self.half_duplex { ", half duplex" } else { "" },
            if self.loopback { ", loopback" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_roundtrip_all() {
        for mode in Mode::ALL {
            assert_eq!(Mode::from_bits(mode.bits()).unwrap(), mode);
        }
        assert_eq!(Mode::from_bits(4).unwrap_err().message, "illegal mode");
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse("0").unwrap(), Mode::Mode0);
        assert_eq!(Mode::parse("MODE_3").unwrap(), Mode::Mode3);
        assert_eq!(Mode::parse("mode1").unwrap(), Mode::Mode1);
        assert_eq!(Mode::parse("SPI_MODE_2").unwrap(), Mode::Mode2);

        let err = Mode::parse("MODE_7").unwrap_err();
        assert_eq!(err.key, "mode");
        assert_eq!(err.value, "MODE_7");
        assert_eq!(err.message, "illegal mode");
        assert!(Mode::parse("fast").is_err());
    }

    #[test]
    fn test_mode_cpol_cpha() {
        assert!(!Mode::Mode0.cpol() && !Mode::Mode0.cpha());
        assert!(!Mode::Mode1.cpol() && Mode::Mode1.cpha());
        assert!(Mode::Mode2.cpol() && !Mode::Mode2.cpha());
        assert!(Mode::Mode3.cpol() && Mode::Mode3.cpha());
    }

    #[test]
    fn test_chip_select_parse() {
        assert_eq!(ChipSelect::parse("none").unwrap(), ChipSelect::None);
        assert_eq!(ChipSelect::parse("HIGH").unwrap(), ChipSelect::ActiveHigh);
        assert_eq!(ChipSelect::parse("cs_low").unwrap(), ChipSelect::ActiveLow);
        assert_eq!(
            ChipSelect::parse("middle").unwrap_err().message,
            "illegal chip selection"
        );
    }

    #[test]
    fn test_bit_order_parse() {
        assert_eq!(BitOrder::parse("lsb").unwrap(), BitOrder::LsbFirst);
        assert_eq!(BitOrder::parse("MSB_FIRST").unwrap(), BitOrder::MsbFirst);
        assert_eq!(
            BitOrder::parse("middle").unwrap_err().message,
            "illegal bit order"
        );
    }

    #[test]
    fn test_bits_per_word() {
        assert!(validate_bits_per_word(0).is_err());
        assert!(validate_bits_per_word(1).is_err());
        for bits in 2..=u8::MAX {
            assert_eq!(validate_bits_per_word(bits).unwrap(), bits);
        }

        let err = parse_bits_per_word("-1").unwrap_err();
        assert_eq!(err.message, "illegal bits per word");
        assert_eq!(err.value, "-1");
        assert!(parse_bits_per_word("256").is_err());
        assert_eq!(parse_bits_per_word("10").unwrap(), 10);
    }

    #[test]
    fn test_speed() {
        assert_eq!(
            validate_speed_hz(0).unwrap_err().message,
            "speed must be positive"
        );
        assert_eq!(validate_speed_hz(1).unwrap(), 1);
        assert_eq!(
            parse_speed_hz("-5").unwrap_err().message,
            "speed must be positive"
        );
        assert_eq!(parse_speed_hz("1000000").unwrap(), 1_000_000);
        assert_eq!(
            parse_speed_hz("5000000000").unwrap_err().message,
            "speed out of range"
        );
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(keys::LOOPBACK, "on").unwrap());
        assert!(!parse_flag(keys::LOOPBACK, "0").unwrap());
        assert_eq!(
            parse_flag(keys::HALF_DUPLEX, "maybe").unwrap_err().key,
            "halfDuplex"
        );
    }

    #[test]
    fn test_mode_flags_composition() {
        let mut p = TransferParameters::new();
        assert_eq!(p.mode_flags(), ModeFlags::empty());

        p.set_mode(Mode::Mode3);
        p.set_chip_select(ChipSelect::ActiveHigh);
        p.set_bit_order(BitOrder::LsbFirst);
        p.set_loopback(true);
        assert_eq!(
            p.mode_flags(),
            ModeFlags::CPOL
                | ModeFlags::CPHA
                | ModeFlags::CS_HIGH
                | ModeFlags::LSB_FIRST
                | ModeFlags::LOOP
        );

        // Switching chip select replaces the other polarity bit
        p.set_chip_select(ChipSelect::None);
        let flags = p.mode_flags();
        assert!(flags.contains(ModeFlags::NO_CS));
        assert!(!flags.contains(ModeFlags::CS_HIGH));

        p.set_half_duplex(true);
        let decoded = TransferParameters::new().with_mode_flags(p.mode_flags());
        assert_eq!(decoded.mode(), Mode::Mode3);
        assert_eq!(decoded.chip_select(), ChipSelect::None);
        assert!(decoded.half_duplex());
        assert!(decoded.loopback());
        assert_eq!(decoded.bit_order(), BitOrder::LsbFirst);
    }

    #[test]
    fn test_invalid_setters_keep_value() {
        let mut p = TransferParameters::new();
        assert!(p.set_bits_per_word(1).is_err());
        assert_eq!(p.bits_per_word(), 8);
        assert!(p.set_max_speed_hz(0).is_err());
        assert_eq!(p.max_speed_hz(), DEFAULT_SPEED_HZ);
    }
}
