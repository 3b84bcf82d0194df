//! Tracing subscriber initialization (§4.5 of SPEC_FULL.md).
//!
//! The spec's "Logger" external interface (§6) is realized by the
//! `tracing::Subscriber` abstraction itself, exactly as the teacher never
//! introduces its own `Logger` trait (`boternity-observe/src/tracing_setup.rs`).
//! This is a narrower cut of that module: structured `fmt` logging with an
//! `EnvFilter`, with no OpenTelemetry export wired up -- this core has no
//! use for distributed tracing beyond what the embedding application wants
//! to layer on top.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a process-global structured logging subscriber.
///
/// `filter` is an `EnvFilter` directive string (e.g. `"info"`,
/// `"flowrunner_core=debug,warn"`) used as the default when `RUST_LOG` is
/// unset. Returns an error if a global subscriber is already installed.
pub fn init_tracing(filter: &str) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter.to_string()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    Ok(())
}
