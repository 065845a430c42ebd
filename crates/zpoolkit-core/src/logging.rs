//! Logger setup for the zpoolkit binaries.
//!
//! Only zpoolkit's own targets follow the configured level; everything else
//! is held at `warn`. Tool invocations log under [`ZPOOL_TARGET`] so they can
//! be filtered on their own (`RUST_LOG=zpoolkit_zfs::zpool=debug`).

use crate::config::{LogCfg, LogFormat};
use env_logger::{Builder, Env};
use log::{LevelFilter, Record};
use serde_json::{json, Value};
use std::env;
use std::io::Write;
use std::sync::OnceLock;

/// Target used for every `zpool` invocation record.
pub const ZPOOL_TARGET: &str = "zpoolkit_zfs::zpool";

const CRATE_TARGETS: &[&str] = &["zpoolkit", "zpoolkit_core", "zpoolkit_zfs"];
const FORMAT_ENV: &str = "ZPOOLKIT_LOG_FORMAT";
const LEVEL_ENV: &str = "ZPOOLKIT_LOG_LEVEL";

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global logger from `cfg`, raised by `verbosity` steps (`-v`).
///
/// The first caller wins. `RUST_LOG` replaces the computed filter entirely;
/// `ZPOOLKIT_LOG_LEVEL` and `ZPOOLKIT_LOG_FORMAT` override the config values.
pub fn init(cfg: &LogCfg, verbosity: u8) {
    let _ = INIT.get_or_init(|| configure(cfg, verbosity));
}

fn configure(cfg: &LogCfg, verbosity: u8) {
    let configured = env::var(LEVEL_ENV).unwrap_or_else(|_| cfg.level.clone());
    let level = raise(
        configured.parse().unwrap_or(LevelFilter::Warn),
        verbosity,
    );
    let format = env::var(FORMAT_ENV)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(cfg.format);

    let env = Env::default().default_filter_or(filter_directives(level));
    let mut builder = Builder::from_env(env);
    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                let ts = buf.timestamp().to_string();
                writeln!(buf, "{}", json_line(&ts, record))
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{} {:<5} {} - {}",
                    buf.timestamp(),
                    record.level().as_str().to_lowercase(),
                    record.target(),
                    record.args()
                )
            });
        }
    }

    if let Err(err) = builder.try_init() {
        eprintln!("failed to initialize logger: {}", err);
    }
}

/// Step `level` up `steps` times, saturating at `trace`.
fn raise(level: LevelFilter, steps: u8) -> LevelFilter {
    LevelFilter::iter()
        .skip_while(|l| *l != level)
        .nth(steps as usize)
        .unwrap_or(LevelFilter::Trace)
}

/// `warn` for dependencies, `level` for our own crates.
fn filter_directives(level: LevelFilter) -> String {
    let mut directives = String::from("warn");
    for target in CRATE_TARGETS {
        directives.push_str(&format!(",{}={}", target, level.as_str().to_lowercase()));
    }
    directives
}

/// JSON payload for one record; `zpool` invocations are tagged so log
/// pipelines can pick them out without parsing the message.
fn json_line(ts: &str, record: &Record) -> Value {
    let mut payload = json!({
        "timestamp": ts,
        "level": record.level().as_str().to_lowercase(),
        "target": record.target(),
        "message": record.args().to_string(),
    });
    if record.target() == ZPOOL_TARGET {
        payload["component"] = json!("zpool");
    }
    payload
}
