//! Diagnostic tracing for `machine` runs.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Chunk, validation and retry diagnostics on
//!   stderr, selected by `RUST_LOG` or the CLI `-v` flags. Never persisted.
//!
//! - **Transcripts (`io/transcript`)**: Product artifacts written with
//!   `machine run --transcript`. Unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
///
/// `0` keeps warnings only, `1` adds attempt and word progress, `2` and more
/// add per-chunk validation.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,machine_runner=info",
        _ => "warn,machine_runner=debug",
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `verbosity`.
///
/// # Example
/// ```bash
/// RUST_LOG=machine_runner::runner=debug machine run --constraint lipogram --param e
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 1)
                .compact(),
        )
        .init();
}
