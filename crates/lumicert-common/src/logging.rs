//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Tracing bootstrap for the simulator daemon."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Filter directive variable, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "LUMICERT_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static GUARDS: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Console output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

fn env_filter() -> EnvFilter {
    let directive = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .unwrap_or_else(|_| DEFAULT_DIRECTIVE.to_owned());
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("ignoring log directive `{directive}` ({err}); using {DEFAULT_DIRECTIVE}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    })
}

fn console_layer<S>(format: LogFormat, writer: NonBlocking) -> BoxedLayer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer);
    match format {
        LogFormat::StructuredJson => layer.json().with_target(false).boxed(),
        LogFormat::Pretty => layer.with_target(true).boxed(),
    }
}

fn file_layer<S>(directory: &Path, prefix: &str, writer_guards: &mut Vec<WorkerGuard>) -> Result<BoxedLayer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    std::fs::create_dir_all(directory)
        .with_context(|| format!("unable to create log directory {}", directory.display()))?;
    let appender = rolling::daily(directory, format!("{prefix}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    writer_guards.push(guard);
    Ok(fmt::layer()
        .json()
        .with_ansi(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer)
        .boxed())
}

/// Install the global subscriber.
///
/// `LUMICERT_LOG` wins over `RUST_LOG`; `info` applies when neither is set.
/// A daily rolling JSON file is added when `logging.directory` is configured.
/// Later calls leave the first subscriber in place.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let mut guards = Vec::new();
    let (stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);

    let file = match &config.directory {
        Some(directory) => {
            let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
            Some(file_layer(directory, prefix, &mut guards)?)
        }
        None => None,
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(console_layer(config.format, stdout))
        .with(file)
        .try_init()
        .is_ok();
    if installed {
        let _ = GUARDS.set(guards);
        info!(service = %service_name, format = ?config.format, log_dir = ?config.directory, "tracing initialised");
    }
    Ok(())
}
