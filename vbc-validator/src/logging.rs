//! Tracing setup
//!
//! The subscriber is installed before configuration is resolved so that
//! resolution warnings are not lost. Its filter is reloadable; the level
//! from the TOML file is applied once it is known.

use tracing::warn;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Level used until the configuration has been read
pub const DEFAULT_LEVEL: &str = "info";

pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// `RUST_LOG` when set, otherwise both workspace crates at `level`.
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("vbc_validator={level},vbc_common={level}"))
    })
}

/// Build a subscriber writing to `writer`, plus the handle for its filter.
pub fn subscriber<W>(writer: W) -> (impl tracing::Subscriber + Send + Sync + 'static, FilterHandle)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(filter(DEFAULT_LEVEL));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer));
    (subscriber, handle)
}

/// Install the global stdout subscriber.
pub fn init() -> FilterHandle {
    let (subscriber, handle) = subscriber(std::io::stdout);
    subscriber.init();
    handle
}

/// Switch the installed filter to the configured level.
pub fn apply_level(handle: &FilterHandle, level: &str) {
    if let Err(e) = handle.reload(filter(level)) {
        warn!(error = %e, level, "Failed to apply configured log level");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use vbc_common::config::{CliOverrides, ResolvedConfig};

    /// In-memory log sink
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn test_missing_config_warning_reaches_subscriber() {
        let sink = Captured::default();
        let writer = sink.clone();
        let (subscriber, _handle) = subscriber(move || writer.clone());

        let dir = TempDir::new().unwrap();
        let cli = CliOverrides {
            config: Some(dir.path().join("absent.toml")),
            no_ai: true,
            ..Default::default()
        };
        let config = tracing::subscriber::with_default(subscriber, || {
            ResolvedConfig::resolve(&cli).unwrap()
        });

        assert!(config.source.is_none());
        let text = sink.text();
        assert!(text.contains("absent.toml"), "captured: {text}");
        assert!(text.contains("not found, using defaults"), "captured: {text}");
    }

    #[test]
    fn test_configured_level_applies_after_install() {
        let sink = Captured::default();
        let writer = sink.clone();
        let (subscriber, handle) = subscriber(move || writer.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("warning at default level");
            apply_level(&handle, "error");
            tracing::warn!("warning below configured level");
            tracing::error!("error at configured level");
        });

        let text = sink.text();
        assert!(text.contains("warning at default level"));
        assert!(!text.contains("warning below configured level"));
        assert!(text.contains("error at configured level"));
    }
}
