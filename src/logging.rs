//! # Structured Logging
//!
//! Environment-aware console logging using the tracing ecosystem.
//!
//! Logs go to stdout. The filter comes from `RUST_LOG` when set, otherwise from the
//! detected environment. Setting `MAILROOM_LOG_FORMAT=json` switches to one JSON
//! object per line for log shippers.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console logging. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = std::env::var("RUST_LOG")
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var("MAILROOM_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(std::io::stdout().is_terminal())
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
            return;
        }

        tracing::info!(
            environment = %environment,
            json_output = json,
            "Console logging initialized"
        );
    });
}

/// Current deployment environment
pub fn get_environment() -> String {
    std::env::var("MAILROOM_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log batch coordinator operations
#[macro_export]
macro_rules! log_batch {
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "BATCH {}", $operation
        );
    };
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "BATCH {}", $operation
        );
    };
}

/// Log hook application
#[macro_export]
macro_rules! log_hook {
    ($level:ident, $operation:expr, hook: $hook:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            hook = %$hook,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "HOOK {} ({})", $operation, $hook
        );
    };
    ($level:ident, $operation:expr, hook: $hook:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            hook = %$hook,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "HOOK {} ({})", $operation, $hook
        );
    };
}

/// Log queue store operations
#[macro_export]
macro_rules! log_queue {
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "QUEUE {}", $operation
        );
    };
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "QUEUE {}", $operation
        );
    };
}
