//! Tracing setup (§2): pretty output to stderr in development, JSON with
//! optional daily-rotated file output in production.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::domain::models::config::LoggingConfig;

/// Holds the non-blocking writer's flush guard; the caller must keep this
/// alive for the lifetime of the process (dropping it stops the file sink).
pub struct LoggerGuard {
    _file_guard: Option<WorkerGuard>,
}

pub struct LoggerImpl;

impl LoggerImpl {
    pub fn init(config: &LoggingConfig) -> Result<LoggerGuard, tracing_subscriber::util::TryInitError> {
        let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

        let file_layer_and_guard = config.log_dir.as_ref().map(|dir| {
            let appender = tracing_appender::rolling::daily(dir, "orchestrator.log");
            tracing_appender::non_blocking(appender)
        });

        let (file_writer, file_guard) = match file_layer_and_guard {
            Some((writer, guard)) => (Some(writer), Some(guard)),
            None => (None, None),
        };

        let stderr_layer = if config.format == "json" {
            fmt::layer().json().with_writer(std::io::stderr).boxed()
        } else {
            fmt::layer().pretty().with_writer(std::io::stderr).boxed()
        };

        let registry = tracing_subscriber::registry().with(env_filter).with(stderr_layer);

        if let Some(writer) = file_writer {
            registry.with(fmt::layer().json().with_writer(writer)).try_init()?;
        } else {
            registry.try_init()?;
        }

        Ok(LoggerGuard { _file_guard: file_guard })
    }
}

use tracing_subscriber::layer::Layer;
trait BoxedLayerExt<S> {
    fn boxed(self) -> Box<dyn Layer<S> + Send + Sync>;
}
impl<S, L> BoxedLayerExt<S> for L
where
    L: Layer<S> + Send + Sync + 'static,
{
    fn boxed(self) -> Box<dyn Layer<S> + Send + Sync> {
        Box::new(self)
    }
}
