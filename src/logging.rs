//! Logger initialization
//!
//! Single stdout dispatch through fern with colored levels and RFC 3339
//! timestamps. The level comes from the config file.

use std::time::SystemTime;

use anyhow::Result;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use fern::Dispatch;
use humantime::format_rfc3339_seconds;
use log::LevelFilter;

pub fn init(level: &str) -> Result<()> {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);

    let colors = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    Dispatch::new()
        .level(level)
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] [{target}] {message}",
                date = format_rfc3339_seconds(SystemTime::now()),
                level = colors.color(record.level()),
                target = record.target(),
                message = message,
            ))
        })
        .chain(std::io::stdout())
        .apply()?;

    Ok(())
}
