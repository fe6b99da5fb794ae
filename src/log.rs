use std::path::PathBuf;

use anyhow::Result;
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt::Layer, prelude::*, registry, EnvFilter};

/// keep this alive until exit, or buffered log lines are lost
pub struct Guard {
    _stdout: WorkerGuard,
    _logfile: Option<WorkerGuard>,
}

pub fn init_logging(log_dir: Option<PathBuf>) -> Result<Guard> {
    let (stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let stdout_layer = Layer::new().with_writer(stdout).pretty();
    let (logfile_layer, logfile_guard) = match log_dir {
        Some(log_dir) => {
            let appender = tracing_appender::rolling::hourly(log_dir, "extentstore.log");
            let (logfile, guard) = tracing_appender::non_blocking(appender);
            (Some(Layer::new().with_writer(logfile).compact()), Some(guard))
        }
        None => (None, None),
    };
    let global_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    tracing::subscriber::set_global_default(
        registry()
            .with(global_filter)
            .with(logfile_layer)
            .with(stdout_layer),
    )?;
    LogTracer::init()?;
    Ok(Guard {
        _stdout: stdout_guard,
        _logfile: logfile_guard,
    })
}
