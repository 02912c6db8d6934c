//! Tracing setup shared by the halyard binaries.
//!
//! Console output is filtered by `RUST_LOG` (default `info`). Setting
//! `HALYARD_ACCESS_LOG_ROLL=1` additionally writes `http.access` events to a
//! rolling file under `HALYARD_ACCESS_LOG_DIR`.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Target used by the server's access log events.
pub const ACCESS_TARGET: &str = "http.access";

static ACCESS_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
}

impl Rotation {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "minutely" => Rotation::Minutely,
            "hourly" => Rotation::Hourly,
            _ => Rotation::Daily,
        }
    }

    fn appender(self, dir: &Path, prefix: &str) -> RollingFileAppender {
        match self {
            Rotation::Minutely => tracing_appender::rolling::minutely(dir, prefix),
            Rotation::Hourly => tracing_appender::rolling::hourly(dir, prefix),
            Rotation::Daily => tracing_appender::rolling::daily(dir, prefix),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogOptions {
    pub dir: PathBuf,
    pub prefix: String,
    pub rotation: Rotation,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TelemetryOptions {
    /// Directive used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Compact single-line console output.
    pub compact: bool,
    pub access_log: Option<AccessLogOptions>,
}

impl TelemetryOptions {
    /// Reads options through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = |key: &str| {
            lookup(key)
                .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        };
        let access_log = enabled("HALYARD_ACCESS_LOG_ROLL").then(|| AccessLogOptions {
            dir: lookup("HALYARD_ACCESS_LOG_DIR")
                .or_else(|| lookup("HALYARD_LOGS_DIR"))
                .unwrap_or_else(|| "logs".into())
                .into(),
            prefix: lookup("HALYARD_ACCESS_LOG_PREFIX").unwrap_or_else(|| "http-access".into()),
            rotation: lookup("HALYARD_ACCESS_LOG_ROTATION")
                .map(|raw| Rotation::parse(&raw))
                .unwrap_or_default(),
        });
        Self {
            default_filter: lookup("HALYARD_LOG").unwrap_or_else(|| "info".into()),
            compact: enabled("HALYARD_LOG_COMPACT"),
            access_log,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Installs the global subscriber from environment settings. Later calls are
/// no-ops.
pub fn init() {
    init_with(TelemetryOptions::from_env());
}

pub fn init_with(options: TelemetryOptions) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let console: Box<dyn Layer<Registry> + Send + Sync> = if options.compact {
        fmt::layer().compact().boxed()
    } else {
        fmt::layer().boxed()
    };
    let registry = tracing_subscriber::registry().with(console.with_filter(filter));

    let Some(access) = options.access_log else {
        let _ = registry.try_init();
        return;
    };
    let dir_ok = std::fs::create_dir_all(&access.dir).is_ok();
    let writer = access.rotation.appender(&access.dir, &access.prefix);
    let (nb, guard) = tracing_appender::non_blocking(writer);
    let _ = ACCESS_GUARD.set(guard);
    let access_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(nb)
        .with_filter(Targets::new().with_target(ACCESS_TARGET, tracing::Level::INFO));
    if registry.with(access_layer).try_init().is_ok() && !dir_ok {
        tracing::warn!(directory = %access.dir.display(), "failed to create access log directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let opts = TelemetryOptions::from_lookup(lookup(&[]));
        assert_eq!(opts.default_filter, "info");
        assert!(!opts.compact);
        assert!(opts.access_log.is_none());
    }

    #[test]
    fn access_log_settings() {
        let opts = TelemetryOptions::from_lookup(lookup(&[
            ("HALYARD_ACCESS_LOG_ROLL", "1"),
            ("HALYARD_LOGS_DIR", "/var/log/halyard"),
            ("HALYARD_ACCESS_LOG_ROTATION", "Hourly"),
        ]));
        let access = opts.access_log.unwrap();
        assert_eq!(access.dir, PathBuf::from("/var/log/halyard"));
        assert_eq!(access.prefix, "http-access");
        assert_eq!(access.rotation, Rotation::Hourly);
    }

    #[test]
    fn explicit_access_dir_wins() {
        let opts = TelemetryOptions::from_lookup(lookup(&[
            ("HALYARD_ACCESS_LOG_ROLL", "true"),
            ("HALYARD_ACCESS_LOG_DIR", "access"),
            ("HALYARD_LOGS_DIR", "logs-elsewhere"),
            ("HALYARD_ACCESS_LOG_ROTATION", "weekly"),
        ]));
        let access = opts.access_log.unwrap();
        assert_eq!(access.dir, PathBuf::from("access"));
        assert_eq!(access.rotation, Rotation::Daily);
    }

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let opts = TelemetryOptions {
            default_filter: "debug".into(),
            compact: true,
            access_log: Some(AccessLogOptions {
                dir: dir.path().join("access"),
                prefix: "test".into(),
                rotation: Rotation::Minutely,
            }),
        };
        init_with(opts.clone());
        init_with(opts);
        tracing::info!(target: "http.access", path = "/", "request");
        assert!(dir.path().join("access").is_dir());
    }
}
