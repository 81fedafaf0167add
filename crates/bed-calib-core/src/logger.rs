//! Stderr logging for calibration runs.
//!
//! Records from the `bed_calib*` crates pass at the configured level; records
//! from other crates pass at `warn` or above. Lines look like
//! `[  12.345s  INFO probe::find] message`, with the elapsed time since
//! installation and the module path relative to its `bed_calib` crate.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const OWN_PREFIX: &str = "bed_calib";

/// Ceiling for records from other crates.
const FOREIGN_LEVEL: Level = Level::Warn;

struct RunLogger {
    level: LevelFilter,
    started: Instant,
}

impl RunLogger {
    fn passes(&self, level: Level, target: &str) -> bool {
        if target.starts_with(OWN_PREFIX) {
            level <= self.level
        } else {
            level <= self.level && level <= FOREIGN_LEVEL
        }
    }
}

impl Log for RunLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.passes(metadata.level(), metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// `bed_calib_probe::find` -> `probe::find`, `bed_calib::orchestrator` ->
/// `orchestrator`. Foreign targets are kept whole.
fn short_target(target: &str) -> &str {
    let Some(rest) = target.strip_prefix(OWN_PREFIX) else {
        return target;
    };
    let rest = rest.strip_prefix('_').unwrap_or(rest);
    let rest = rest.strip_prefix("::").unwrap_or(rest);
    if rest.is_empty() {
        OWN_PREFIX
    } else {
        rest
    }
}

fn format_line(elapsed: f64, level: Level, target: &str, args: &std::fmt::Arguments<'_>) -> String {
    format!("[{elapsed:9.3}s {level:>5} {}] {args}", short_target(target))
}

static LOGGER: OnceLock<RunLogger> = OnceLock::new();

/// Install the stderr logger. Later calls keep the first level.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| RunLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// `RUST_LOG` when set, otherwise `info` for the workspace crates and
/// `warn` for the rest.
#[cfg(feature = "tracing")]
fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,bed_calib=info,bed_calib_core=info,bed_calib_probe=info,bed_calib_solver=info")
    })
}

/// Install a `tracing` subscriber; procedure spans are reported when they close.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let builder = fmt()
        .with_env_filter(default_filter())
        .with_span_events(FmtSpan::CLOSE);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
