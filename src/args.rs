use clap::Parser;
use std::path::PathBuf;

/// Discord music bot with queues, buttons and a request channel
#[derive(Parser)]
#[clap(version, about)]
pub struct Args {
    /// The path to the config file. Environment variables override its values.
    #[clap(short, long, default_value = "config.kdl")]
    pub config: PathBuf,
}
