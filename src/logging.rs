//! Logger construction.
//!
//! Components receive a [`Dispatch`] when they are built and run each
//! operation under it, so nothing here touches the global default unless the
//! caller asks for it.

use serde::Deserialize;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Build a dispatch that honours `RUST_LOG` and falls back to `level`.
pub fn build_dispatch(level: &str, format: LogFormat) -> Dispatch {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Text => Dispatch::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .finish(),
        ),
        LogFormat::Json => Dispatch::new(
            tracing_subscriber::fmt()
                .json()
                .with_current_span(false)
                .with_env_filter(filter)
                .finish(),
        ),
    }
}

/// The dispatch currently in scope, used when a component is built without
/// an explicit one.
pub fn current_dispatch() -> Dispatch {
    tracing::dispatcher::get_default(|dispatch| dispatch.clone())
}
