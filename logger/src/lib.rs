//! Shared `tracing` setup.
//!
//! Crates log through the re-exported macros (`logger::info!`, ...) and the
//! binary or test harness calls [`init`] once with the `logging` section of
//! the client config.

use config_loader::{LogFormat, LoggingConfig};
use time::format_description::well_known::Rfc3339;
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{MakeWriter, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod error;

pub use error::LoggerError;
pub use tracing::{Level, debug, error, info, instrument, trace, warn};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps background log writers alive. Dropping it flushes file output.
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct LoggerGuard {
    #[cfg(feature = "file")]
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Install the global subscriber described by `config`.
pub fn init(config: &LoggingConfig) -> Result<LoggerGuard, LoggerError> {
    let (subscriber, guard) = build(config)?;
    subscriber
        .try_init()
        .map_err(|e| LoggerError::AlreadyInitialized {
            message: e.to_string().into(),
        })?;
    Ok(guard)
}

/// Build a subscriber without installing it, e.g. for
/// `tracing::subscriber::with_default` in tests.
pub fn build(
    config: &LoggingConfig,
) -> Result<(impl Subscriber + Send + Sync + 'static, LoggerGuard), LoggerError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| LoggerError::InvalidFilter {
        directive: config.level.clone(),
        message: e.to_string().into(),
    })?;

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    #[allow(unused_mut)]
    let mut guard = LoggerGuard::default();

    #[cfg(feature = "stdout")]
    layers.push(fmt_layer(config.format, config.ansi, std::io::stdout));

    if let Some(file) = &config.file {
        #[cfg(feature = "file")]
        {
            let appender = tracing_appender::rolling::daily(&file.directory, &file.prefix);
            let (writer, worker) = tracing_appender::non_blocking(appender);
            layers.push(fmt_layer(config.format, false, writer));
            guard._file = Some(worker);
        }

        #[cfg(not(feature = "file"))]
        return Err(LoggerError::FileLoggingDisabled {
            directory: file.directory.clone(),
        });
    }

    let subscriber = tracing_subscriber::registry().with(layers).with(filter);
    Ok((subscriber, guard))
}

fn fmt_layer<W>(format: LogFormat, ansi: bool, writer: W) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_timer(UtcTime::new(Rfc3339))
        .with_ansi(ansi)
        .with_target(true)
        .with_writer(writer);

    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}
