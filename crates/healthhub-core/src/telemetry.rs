//! Log output for `healthhubd`.
//!
//! Every program run opens a `healthhub.program` span carrying `program` and
//! `correlation_id`; the events inside it are keyed by an `event` field
//! (`program.started`, `effect.dispatched`, `effect.timeout`,
//! `audit.unavailable`, `notification.dropped`, `program.finished`) plus
//! `effect`, `seq`, `outcome` and `actor` where they apply. [`init_tracing`]
//! decides how those reach stdout.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow `level` when `RUST_LOG` is unset.
const HEALTHHUB_TARGETS: [&str; 3] = ["healthhub_core", "healthhub_state", "healthhubd"];

/// Default filter: HealthHub crates at `level`, SurrealDB's internals held
/// to warnings so a verbose run stays readable.
fn default_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        HEALTHHUB_TARGETS
            .iter()
            .map(|target| format!("{target}={level}")),
    );
    EnvFilter::new(directives.join(","))
}

/// Install the global subscriber. Only the first call in a process has any
/// effect.
///
/// With `json`, each line is one object whose top level holds the event's
/// own fields (`event`, `effect`, `seq`, ...) and whose `span` object holds
/// the enclosing `healthhub.program` fields, so a run can be selected by
/// `span.correlation_id`.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
