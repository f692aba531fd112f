use start_defender_core::{LogLevel, LoggingSettings};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "start_defender=info,start_defender_core=info,start_defender_sdk=info,tower_http=info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Runtime control over the process log level.
///
/// Handlers apply the `logging/loglevel` setting through this handle after
/// reading the settings; nothing else touches the global filter.
#[derive(Clone, Default)]
pub struct LogControl {
    handle: Option<FilterHandle>,
    current: Arc<Mutex<Option<LogLevel>>>,
}

impl LogControl {
    /// Install the global subscriber and return its control handle.
    /// `RUST_LOG` overrides the default filter until the first settings read.
    pub fn init() -> Self {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
        let (filter, handle) = reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();

        Self {
            handle: Some(handle),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// A control that only remembers the requested level.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Level last applied from settings, if any.
    pub fn current(&self) -> Option<LogLevel> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply the configured level. Re-applying the current level is a no-op;
    /// concurrent callers race harmlessly, last writer wins.
    pub fn apply(&self, settings: &LoggingSettings) {
        let level = settings.loglevel;
        {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            if *current == Some(level) {
                return;
            }
            *current = Some(level);
        }

        let Some(handle) = &self.handle else {
            return;
        };

        if let Err(e) = handle.reload(filter_for(level)) {
            tracing::warn!("Failed to apply loglevel {:?}: {}", level, e);
        } else {
            tracing::debug!(loglevel = ?level, "Applied configured loglevel");
        }
    }
}

fn filter_for(level: LogLevel) -> EnvFilter {
    let l = level.as_directive();
    EnvFilter::new(format!(
        "warn,start_defender={l},start_defender_core={l},start_defender_sdk={l},tower_http={l}"
    ))
}
