use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = crate_name!())]
#[command(version = crate_version!())]
#[command(
    about = "repeater-bridge: transparent L2 Wi-Fi repeater bridge engine",
    long_about = None
)]
pub struct Cli {
    /// Sets the output verbosity level. Available levels: error, warn, info, debug, trace. Example: -v, -vv, -vvv
    #[arg(short, action = clap::ArgAction::Count)]
    verbosity: Option<u8>,

    /// Path to a YAML configuration file (default: platform config dir).
    #[arg(long)]
    pub conf: Option<PathBuf>,

    /// Drive the engine against the in-process reference platform instead
    /// of a real radio/IP-stack backend.
    #[arg(long)]
    pub simulate: bool,
}

impl Cli {
    pub fn verbosity_level(&self) -> Option<String> {
        const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
        LEVELS
            .get(self.verbosity.unwrap_or(0) as usize)
            .map(|s| s.to_string())
    }
}
