//! spilink - Talk to SPI devices from the command line
//!
//! A thin front end over the spilink libraries: open a device through one of
//! the compiled-in backends, configure it from a settings file and the
//! device string, then write, read or exchange bytes.

mod backends;
mod cli;
mod config;

use clap::Parser;
use cli::{Cli, Commands};
use spilink_core::{SpiBackend, SpiDevice, SpiOptions};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let defaults = match cli.config.as_deref() {
        Some(path) => config::load_options(path)?,
        None => SpiOptions::new(),
    };

    let result = match cli.command {
        Commands::ListBackends => {
            list_backends();
            Ok(())
        }
        Commands::Info { device } => {
            let dev = backends::open_device(&device, &defaults)?;
            print_info(&dev);
            Ok(())
        }
        Commands::Write { device, data } => {
            let bytes = parse_hex(&data)?;
            let mut dev = backends::open_device(&device, &defaults)?;
            dev.write_then(&bytes, |_, buf| {
                log::info!("Wrote {} byte(s)", buf.len());
            })
            .and_then(|()| dev.close())
        }
        Commands::Read { device, len } => {
            let mut dev = backends::open_device(&device, &defaults)?;
            let mut buf = vec![0u8; len];
            dev.read_then(&mut buf, |_, buf| println!("{}", format_hex(buf)))
                .and_then(|()| dev.close())
        }
        Commands::Transfer { device, data } => {
            let bytes = parse_hex(&data)?;
            let mut dev = backends::open_device(&device, &defaults)?;
            dev.transfer_then(&bytes, |_, rx| println!("{}", format_hex(rx)))
                .and_then(|()| dev.close())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn list_backends() {
    println!("Available backends:");
    for b in backends::available_backends() {
        if b.aliases.is_empty() {
            println!("  {:<10} {}", b.name, b.description);
        } else {
            println!(
                "  {:<10} {} (aliases: {})",
                b.name,
                b.description,
                b.aliases.join(", ")
            );
        }
    }
}

fn print_info(dev: &SpiDevice<Box<dyn SpiBackend>>) {
    let p = dev.parameters();
    println!("Device:        {}", dev.path().unwrap_or("-"));
    println!("Backend:       {}", dev.backend().name());
    println!("Mode:          {}", p.mode());
    println!("Chip select:   {}", p.chip_select());
    println!("Bit order:     {} first", p.bit_order());
    println!("Bits per word: {}", p.bits_per_word());
    println!("Max speed:     {} Hz", p.max_speed_hz());
    println!("Half duplex:   {}", p.half_duplex());
    println!("Loopback:      {}", p.loopback());

    print_kernel_settings(dev);
}

/// Show the settings the kernel holds for a spidev device
#[cfg(feature = "spidev")]
fn print_kernel_settings(dev: &SpiDevice<Box<dyn SpiBackend>>) {
    if dev.backend().name() != "spidev" {
        return;
    }
    if let Some(path) = dev.path() {
        match spilink_linux::read_back(path) {
            Ok(kernel) => println!("Kernel:        {}", kernel),
            Err(e) => log::warn!("Cannot read kernel settings: {}", e),
        }
    }
}

#[cfg(not(feature = "spidev"))]
fn print_kernel_settings(_dev: &SpiDevice<Box<dyn SpiBackend>>) {}

/// Parse hex bytes such as "ff0000", "ff 00 00" or "0xff,0x00,0x00"
fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    let tokens: Vec<&str> = s
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .filter(|t| !t.is_empty())
        .collect();

    let mut bytes = Vec::new();
    for token in tokens {
        let hex = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if hex.is_empty() || hex.len() % 2 != 0 || !hex.is_ascii() {
            return Err(format!("Invalid hex value: {}", token));
        }
        for i in (0..hex.len()).step_by(2) {
            let byte = u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| format!("Invalid hex value {}: {}", token, e))?;
            bytes.push(byte);
        }
    }
    Ok(bytes)
}

fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
