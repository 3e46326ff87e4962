//! Shared helpers for the command line tools of this workspace: clap styling,
//! verbosity flags and tracing setup.

pub use clap;

/// Re-export of the verbosity flag so that binaries agree on `-v`/`-q`.
pub mod verbose {
    pub use clap_verbosity_flag::{Level, Verbosity};
}

use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Help message colors shared by all binaries.
pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Green.on_default())
        .invalid(AnsiColor::Red.on_default())
}

/// Map the level given by `-v`/`-q` to the tracing level. The library logs
/// a lot on `debug` and `trace`, so everything is shifted by one.
pub fn verbose_level_to_trace(level: Option<verbose::Level>) -> &'static tracing::Level {
    match level {
        Some(verbose::Level::Error) => &tracing::Level::WARN,
        Some(verbose::Level::Warn) => &tracing::Level::INFO,
        Some(verbose::Level::Info) => &tracing::Level::DEBUG,
        Some(verbose::Level::Debug) => &tracing::Level::TRACE,
        Some(verbose::Level::Trace) => &tracing::Level::TRACE,
        None => &tracing::Level::ERROR,
    }
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr in the human readable format, or to `file` as JSON lines
/// if one is given. Calling this twice is harmless: the second subscriber is
/// dropped.
pub fn logging_setup(level: &tracing::Level, file: Option<&std::fs::File>) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(*level)
        .with_target(false);

    match file.and_then(|f| f.try_clone().ok()) {
        Some(file) => {
            let _ = builder
                .json()
                .with_writer(std::sync::Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
