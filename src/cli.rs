//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Help text for the device argument
const DEVICE_HELP: &str = "Device to use: <backend>:dev=<path>[,key=value...] \
     (keys: mode, chipSelect, bitOrder, bitsPerWord, maxSpeed, halfDuplex, loopback)";

#[derive(Parser)]
#[command(name = "spilink")]
#[command(author, version, about = "Talk to SPI devices through spidev", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// TOML file with an [spi] table of default settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available backends
    ListBackends,

    /// Open a device and show its settings
    Info {
        #[arg(short, long, help = DEVICE_HELP)]
        device: String,
    },

    /// Clock bytes out, ignoring what comes back
    Write {
        #[arg(short, long, help = DEVICE_HELP)]
        device: String,

        /// Bytes to send, in hex (e.g. "ff0000" or "ff 00 00")
        data: String,
    },

    /// Clock bytes in, sending zeros
    Read {
        #[arg(short, long, help = DEVICE_HELP)]
        device: String,

        /// Number of bytes to read
        #[arg(short, long)]
        len: usize,
    },

    /// Full-duplex exchange; prints the bytes clocked in
    Transfer {
        #[arg(short, long, help = DEVICE_HELP)]
        device: String,

        /// Bytes to send, in hex
        data: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_write() {
        let cli = Cli::try_parse_from([
            "spilink",
            "-vv",
            "write",
            "-d",
            "dummy:dev=/dev/spidev1.1,mode=0",
            "ff0000",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Write { device, data } => {
                assert_eq!(device, "dummy:dev=/dev/spidev1.1,mode=0");
                assert_eq!(data, "ff0000");
            }
            _ => panic!("expected write"),
        }
    }
}
