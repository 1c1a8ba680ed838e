use crate::config::Config;
use env_logger::{Builder, WriteStyle, fmt::TimestampPrecision};
use log::LevelFilter;

/// Dependency noise (gateway heartbeats, voice packets) stays at warn unless
/// `RUST_LOG` says otherwise.
pub fn init(config: &Config) {
    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Warn.min(config.log_level))
        .filter_module(env!("CARGO_CRATE_NAME"), config.log_level);

    if config.is_production() {
        builder
            .write_style(WriteStyle::Never)
            .format_timestamp(Some(TimestampPrecision::Millis));
    } else {
        builder.format_timestamp_secs();
    }

    builder.parse_env("RUST_LOG").init();
}
