use crate::build_info;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::Span;
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const SERVICE_NAME: &str = "upload_worker";

/// Output format for runtime logs, selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Unknown values fall back to JSON so collectors never receive mixed formats.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Self::Text,
            _ => Self::Json,
        }
    }

    fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .map(|raw| Self::parse(&raw))
            .unwrap_or(Self::Json)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

/// Common context fields attached to the bootstrap event and the per-command span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingContext {
    pub service: String,
    pub mode: String,
    pub environment: String,
    pub run_id: String,
    pub build_version: String,
    pub build_commit: String,
    pub format: LogFormat,
}

impl LoggingContext {
    fn detect(mode: &str) -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            mode: mode.to_string(),
            environment: std::env::var("APP_ENV")
                .or_else(|_| std::env::var("ENVIRONMENT"))
                .unwrap_or_else(|_| "dev".to_string()),
            run_id: build_run_id(SERVICE_NAME),
            build_version: build_info::VERSION.to_string(),
            build_commit: build_info::short_commit_hash().to_string(),
            format: LogFormat::from_env(),
        }
    }

    /// Span wrapping one command invocation.
    pub fn run_span(&self) -> Span {
        tracing::info_span!(
            "worker_run",
            service = %self.service,
            environment = %self.environment,
            mode = %self.mode,
            run_id = %self.run_id,
            build_version = %self.build_version,
            build_commit = %self.build_commit
        )
    }
}

/// Installs the process-wide subscriber and emits one `logging_initialized` event.
///
/// `log` records are bridged into `tracing`. `RUST_LOG` overrides `default_level`.
pub fn init_logging(mode: &str, default_level: &str) -> LoggingContext {
    let context = LoggingContext::detect(mode);
    install_subscriber(context.format, default_level);

    tracing::info!(
        event = "logging_initialized",
        service = %context.service,
        environment = %context.environment,
        mode = %context.mode,
        run_id = %context.run_id,
        build_version = %context.build_version,
        build_commit = %context.build_commit,
        log_format = context.format.as_str(),
        "initialized logging"
    );

    context
}

fn install_subscriber(format: LogFormat, default_level: &str) {
    let _ = LogTracer::init();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (tests, repeated command calls) keeps the first subscriber.
    let _ = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .flatten_event(true),
            )
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
}

fn build_run_id(service: &str) -> String {
    let epoch_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or_default();
    format!("{service}-{}-{epoch_millis}", std::process::id())
}

/// Renders an error, its full source chain and a backtrace for process-boundary logging.
pub fn format_error_report(err: &(dyn StdError + 'static)) -> String {
    let mut report = format!("error: {err}");

    let causes = std::iter::successors(err.source(), |&source| source.source());
    for (index, cause) in causes.enumerate() {
        let _ = write!(report, "\ncaused by ({}): {cause}", index + 1);
    }

    let _ = write!(report, "\nbacktrace:\n{}", Backtrace::force_capture());
    report
}
