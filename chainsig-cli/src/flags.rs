//! Command-line flags

use clap::Parser;

/// Single-dash spellings accepted for multi-letter flags
const LEGACY_LONG_FLAGS: [&str; 5] = ["-ea", "-ba", "-etx", "-btx", "-to"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Parser)]
#[command(name = "chainsig-cli")]
#[command(about = "Derive addresses from an MPC master key, sign payloads and send transfers")]
#[command(version)]
pub struct Flags {
    /// Derive and print the Ethereum address
    #[arg(long = "ea")]
    pub derive_ethereum_address: bool,

    /// Derive and print the Bitcoin address
    #[arg(long = "ba")]
    pub derive_bitcoin_address: bool,

    /// Sign a random sample payload and print the signature
    #[arg(short = 's')]
    pub sign_sample: bool,

    /// Send an Ethereum transfer from the derived address
    #[arg(long = "etx")]
    pub send_ethereum_tx: bool,

    /// Send a Bitcoin transfer from the derived address
    #[arg(long = "btx")]
    pub send_bitcoin_tx: bool,

    /// Transfer amount in ether or bitcoin
    #[arg(short = 'a', long)]
    pub amount: Option<String>,

    /// Transfer recipient
    #[arg(long = "to")]
    pub to: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Flags {
    /// Parse the process arguments
    pub fn from_args() -> Self {
        Self::parse_from(normalize_args(std::env::args()))
    }
}

/// Rewrite `-ea`, `-ba`, `-etx`, `-btx` and `-to` to their `--` form
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let (flag, value) = match arg.split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (arg.as_str(), None),
            };

            if !LEGACY_LONG_FLAGS.contains(&flag) {
                return arg;
            }

            match value {
                Some(value) => format!("-{}={}", flag, value),
                None => format!("-{}", flag),
            }
        })
        .collect()
}
