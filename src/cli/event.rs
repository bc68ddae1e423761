use crate::cli::shutdown::stop_on_signal;
use crate::client::{HttpSession, Session, SessionError};
use crate::config::types::{Config, EventType, FetchConfig};
use crate::config::parse::validate_config;
use crate::config::{load_config, ConfigError};
use crate::fetch::orchestrator::FetchError;
use crate::fetch::sink::{self, JsonLinesSink, SharedSink};
use crate::fetch::{
    FetchStats, Mode, PageFetcher, PollController, PollError, PollSettings, RunSummary,
    SystemClock,
};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit code when page 1 is rejected for authentication reasons.
pub const EXIT_AUTH_FAILURE: u8 = 3;

/// Older name for `SIA_FETCH_CONCURRENT`, still honoured.
pub const LEGACY_CONCURRENCY_ENV: &str = "CLIETP_FETCH_CONCURRENT";

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config not found, use --config <path> or run 'sia-events config init'")]
    MissingConfig,

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("{0}")]
    Poll(#[from] PollError),

    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

impl RunError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Poll(PollError::Fetch(FetchError::Unauthorized { .. })) => EXIT_AUTH_FAILURE,
            RunError::Poll(PollError::Fetch(FetchError::Status { status, .. })) => {
                match (status % 256) as u8 {
                    0 => 1,
                    code => code,
                }
            }
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct EventArgs {
    /// Event type to fetch
    #[arg(value_enum, default_value_t = EventType::Threat)]
    pub event_type: EventType,

    /// Window start (epoch seconds). Default: now - limit - span
    #[arg(long, short = 's')]
    pub start: Option<i64>,

    /// Window end (epoch seconds). Default: start + span
    #[arg(long, short = 'e')]
    pub end: Option<i64>,

    /// Output file, default is stdout. Encoding is UTF-8
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Keep polling for new events. --start and --end are ignored
    #[arg(long, short = 'f')]
    pub tail: bool,

    /// Poll frequency in seconds in --tail mode
    #[arg(long)]
    pub poll: Option<u64>,

    /// Collection delay in seconds: never fetch events younger than now minus this
    #[arg(long)]
    pub limit: Option<u64>,

    /// Width of the default ad-hoc window in seconds
    #[arg(long)]
    pub span: Option<u64>,

    /// Number of concurrent API calls
    #[arg(long, env = "SIA_FETCH_CONCURRENT")]
    pub concurrent: Option<usize>,

    /// Records per page
    #[arg(long)]
    pub page_size: Option<u32>,
}

/// Fill `--concurrent` from the legacy environment variable when neither the flag nor
/// `SIA_FETCH_CONCURRENT` set it.
pub fn apply_legacy_concurrency(args: &mut EventArgs, legacy: Option<String>) {
    if args.concurrent.is_some() {
        return;
    }
    if let Some(value) = legacy {
        match value.trim().parse::<usize>() {
            Ok(concurrent) => args.concurrent = Some(concurrent),
            Err(_) => warn!(
                variable = LEGACY_CONCURRENCY_ENV,
                value = %value,
                "Ignoring non-numeric concurrency"
            ),
        }
    }
}

/// Apply the global `--proxy` flag over `api.proxy` and re-check the result.
pub fn apply_proxy_override(config: &mut Config, proxy: Option<String>) -> Result<(), RunError> {
    if let Some(proxy) = proxy {
        config.api.proxy = Some(proxy);
        validate_config(config)?;
    }
    Ok(())
}

/// Merge command-line overrides into the configured fetch defaults.
pub fn resolve_settings(config: &FetchConfig, args: &EventArgs) -> (FetchConfig, PollSettings) {
    let mut fetch = config.clone();
    if let Some(poll) = args.poll {
        fetch.poll_interval = Duration::from_secs(poll.max(1));
    }
    if let Some(limit) = args.limit {
        fetch.collection_delay = Duration::from_secs(limit);
    }
    if let Some(span) = args.span {
        fetch.span_duration = Duration::from_secs(span.max(1));
    }
    if let Some(concurrent) = args.concurrent {
        fetch.concurrency = concurrent;
    }
    if let Some(page_size) = args.page_size {
        fetch.page_size = page_size.max(1);
    }

    let mode = if args.tail {
        if args.start.is_some() || args.end.is_some() {
            warn!("--start and --end are ignored in --tail mode");
        }
        Mode::Tail
    } else {
        Mode::AdHoc {
            start: args.start,
            end: args.end,
        }
    };

    let settings = PollSettings {
        mode,
        collection_delay: fetch.collection_delay,
        span_duration: fetch.span_duration,
        poll_interval: fetch.poll_interval,
        concurrency: fetch.effective_concurrency(),
    };

    (fetch, settings)
}

pub async fn run(
    config_path: Option<PathBuf>,
    proxy: Option<String>,
    mut args: EventArgs,
) -> Result<RunSummary, RunError> {
    let config_path = config_path.ok_or(RunError::MissingConfig)?;
    info!(config_path = %config_path.display(), "Loading configuration");
    let mut config = load_config(&config_path)?;
    apply_proxy_override(&mut config, proxy)?;
    apply_legacy_concurrency(&mut args, std::env::var(LEGACY_CONCURRENCY_ENV).ok());

    let session: Arc<dyn Session> = Arc::new(HttpSession::new(&config.api)?);

    let sink: SharedSink = match &args.output {
        Some(path) => sink::shared(JsonLinesSink::create(path)?),
        None => sink::shared(JsonLinesSink::stdout()),
    };

    let token = CancellationToken::new();
    stop_on_signal(token.clone());

    run_with_session(&config, &args, session, sink, token).await
}

/// Run the event command against an already-built session and sink.
pub async fn run_with_session(
    config: &Config,
    args: &EventArgs,
    session: Arc<dyn Session>,
    sink: SharedSink,
    token: CancellationToken,
) -> Result<RunSummary, RunError> {
    let (fetch, settings) = resolve_settings(&config.fetch, args);

    let fetcher = Arc::new(PageFetcher::new(
        session,
        args.event_type,
        &config.api.account_id,
        fetch.page_size,
        config.api.call_timeout(fetch.poll_interval),
        Arc::new(FetchStats::new()),
        token.clone(),
    ));

    let controller = PollController::new(fetcher, settings, Arc::new(SystemClock), sink, token);
    let summary = controller.run().await?;

    info!(
        cycles = summary.cycles.len(),
        records = summary.stats.events,
        calls = summary.stats.calls,
        failed_calls = summary.stats.failed_calls,
        bytes = summary.stats.bytes,
        "Event retrieval finished"
    );

    Ok(summary)
}
