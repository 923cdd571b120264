use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVE: &str = "info,heartwire_runtime=info";

fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialize a human-readable stdout subscriber.
///
/// `RUST_LOG` wins over `default_directive` when set.
pub fn init_stdout_tracing(default_directive: &str) -> Result<(), anyhow::Error> {
    Registry::default()
        .with(filter(default_directive))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;
    Ok(())
}

/// Initialize a JSON-lines subscriber, one object per event with span fields
/// (for example `channel.id`) attached.
pub fn init_json_tracing(default_directive: &str) -> Result<(), anyhow::Error> {
    Registry::default()
        .with(filter(default_directive))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .try_init()?;
    Ok(())
}
