pub use tracing;
use tracing::level_filters::LevelFilter;
pub use tracing_subscriber;

/// The target every operator log line is emitted under
pub const TARGET: &str = "operator";

/// A [`trace`] log with the target `"operator"`
///
/// [`trace`]: tracing::trace
#[macro_export]
macro_rules! trace {
    (target: $target:expr, $($tt:tt)*) => {
        $crate::tracing::trace!(target: $target, $($tt)*)
    };
    ($($tt:tt)*) => {
        $crate::tracing::trace!(target: $crate::TARGET, $($tt)*)
    }
}

/// A [`debug`] log with the target `"operator"`
///
/// [`debug`]: tracing::debug
#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($tt:tt)*) => {
        $crate::tracing::debug!(target: $target, $($tt)*)
    };
    ($($tt:tt)*) => {
        $crate::tracing::debug!(target: $crate::TARGET, $($tt)*)
    }
}

/// An [`info`] log with the target `"operator"`
///
/// [`info`]: tracing::info
#[macro_export]
macro_rules! info {
    (target: $target:expr, $($tt:tt)*) => {
        $crate::tracing::info!(target: $target, $($tt)*)
    };
    ($($tt:tt)*) => {
        $crate::tracing::info!(target: $crate::TARGET, $($tt)*)
    }
}

/// A [`warn`] log with the target `"operator"`
///
/// [`warn`]: tracing::warn
#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($tt:tt)*) => {
        $crate::tracing::warn!(target: $target, $($tt)*)
    };
    ($($tt:tt)*) => {
        $crate::tracing::warn!(target: $crate::TARGET, $($tt)*)
    }
}

/// An [`error`] log with the target `"operator"`
///
/// [`error`]: tracing::error
#[macro_export]
macro_rules! error {
    (target: $target:expr, $($tt:tt)*) => {
        $crate::tracing::error!(target: $target, $($tt)*)
    };
    ($($tt:tt)*) => {
        $crate::tracing::error!(target: $crate::TARGET, $($tt)*)
    }
}

/// Maps the number of `-v` flags to the default log level.
#[must_use]
pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Sets up the logging for the operator
///
/// `RUST_LOG` takes precedence over the level derived from `verbosity`.
pub fn setup_log(verbosity: u8, pretty: bool) {
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level_for_verbosity(verbosity).into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
        .with_env_filter(filter);

    // A subscriber may already be installed (tests, embedding binaries)
    let _ = if pretty {
        builder.pretty().finish().try_init()
    } else {
        builder.without_time().finish().try_init()
    };
}
