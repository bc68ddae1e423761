use crate::fetch::orchestrator::{FetchError, PageFetcher, PageTaskResult};
use crate::fetch::pool::{TaskResult, WorkerPool};
use crate::fetch::reassembly::ReassemblyBuffer;
use crate::fetch::sink::SharedSink;
use crate::fetch::stats::StatsSnapshot;
use crate::fetch::window::{Clock, TimeWindow, WindowError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("invalid window: {0}")]
    Window(#[from] WindowError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One window, then stop. Bounds left out are derived from the clock.
    AdHoc { start: Option<i64>, end: Option<i64> },
    /// Advancing windows until stopped.
    Tail,
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub mode: Mode,
    pub collection_delay: Duration,
    pub span_duration: Duration,
    pub poll_interval: Duration,
    pub concurrency: usize,
}

/// What one poll cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub window: TimeWindow,
    pub pages: u32,
    pub failed_pages: usize,
    pub missing_pages: Vec<u32>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub cycles: Vec<CycleReport>,
    pub stats: StatsSnapshot,
}

/// Drives the fetcher over one ad-hoc window or a sequence of tail windows.
pub struct PollController {
    fetcher: Arc<PageFetcher>,
    settings: PollSettings,
    clock: Arc<dyn Clock>,
    sink: SharedSink,
    token: CancellationToken,
    pool: WorkerPool<PageTaskResult>,
}

impl PollController {
    pub fn new(
        fetcher: Arc<PageFetcher>,
        settings: PollSettings,
        clock: Arc<dyn Clock>,
        sink: SharedSink,
        token: CancellationToken,
    ) -> Self {
        let pool = WorkerPool::new(settings.concurrency, token.clone());
        Self {
            fetcher,
            settings,
            clock,
            sink,
            token,
            pool,
        }
    }

    pub async fn run(mut self) -> Result<RunSummary, PollError> {
        info!(
            event_type = %self.fetcher.event_type(),
            mode = ?self.settings.mode,
            concurrency = self.pool.concurrency(),
            "Starting event retrieval"
        );

        let cycles = match self.settings.mode {
            Mode::AdHoc { start, end } => {
                let window = TimeWindow::ad_hoc(
                    self.clock.now_epoch(),
                    self.settings.collection_delay,
                    self.settings.span_duration,
                    start,
                    end,
                )?;
                vec![self.run_cycle(window).await?]
            }
            Mode::Tail => self.run_tail().await?,
        };

        Ok(RunSummary {
            cycles,
            stats: self.fetcher.stats().snapshot(),
        })
    }

    async fn run_tail(&mut self) -> Result<Vec<CycleReport>, PollError> {
        let poll_interval = self.settings.poll_interval;
        let delay = self.settings.collection_delay;

        let mut next = Some(TimeWindow::tail_initial(
            self.clock.now_epoch(),
            poll_interval,
            delay,
        )?);
        let mut last: Option<TimeWindow> = None;
        let mut reports = Vec::new();

        loop {
            if self.token.is_cancelled() {
                break;
            }

            let started = Instant::now();
            if let Some(window) = next {
                match self.run_cycle(window).await {
                    Ok(report) => reports.push(report),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => warn!(window = %window, error = %e, "Cycle failed, continuing"),
                }
                last = Some(window);
            } else {
                debug!("No new seconds eligible yet, skipping cycle");
            }

            if self.token.is_cancelled() {
                break;
            }

            let remaining = poll_interval.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                warn!(
                    poll_interval_secs = poll_interval.as_secs(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Fetch took longer than the poll interval, events may be delayed or missed"
                );
            } else {
                tokio::select! {
                    _ = self.token.cancelled() => {
                        info!("Stop requested during sleep");
                        break;
                    }
                    _ = tokio::time::sleep(remaining) => {}
                }
            }

            next = last.and_then(|window| window.next_tail(self.clock.now_epoch(), delay));
        }

        info!(cycles = reports.len(), "Tail stopped");
        Ok(reports)
    }

    /// Fetch one window to completion: page 1, every scheduled page, final report.
    async fn run_cycle(&mut self, window: TimeWindow) -> Result<CycleReport, FetchError> {
        let stats = Arc::clone(self.fetcher.stats());
        stats.begin_cycle();
        let started = Instant::now();

        let buffer = Arc::new(ReassemblyBuffer::new(self.sink.clone()));
        let discovered = self
            .fetcher
            .fetch_window(window, &mut self.pool, buffer.clone())
            .await;

        // Anything already scheduled runs to completion, even after an error.
        let outcomes = self.pool.wait_all().await;

        let mut failed_pages = 0;
        let mut sink_error = None;
        for outcome in outcomes {
            match outcome {
                TaskResult::Done(Ok(_)) => {}
                TaskResult::Done(Err(FetchError::Sink(e))) => sink_error = Some(e),
                TaskResult::Done(Err(_)) | TaskResult::Skipped | TaskResult::Panicked(_) => {
                    failed_pages += 1
                }
            }
        }
        if let Some(e) = sink_error {
            return Err(FetchError::Sink(e));
        }

        let pages = discovered?;

        let leftover = buffer.leftover();
        if !leftover.is_empty() {
            warn!(
                window = %window,
                missing_pages = ?leftover.missing_pages,
                stranded_pages = leftover.stranded_pages,
                stranded_records = leftover.stranded_records,
                "Window incomplete, records after the first missing page were not written"
            );
        }

        let elapsed = started.elapsed();
        let snapshot = stats.snapshot();
        info!(
            window = %window,
            pages = pages,
            records = snapshot.cycle_events,
            calls = snapshot.cycle_calls,
            network_ms = snapshot.cycle_network_time.as_millis() as u64,
            elapsed_ms = elapsed.as_millis() as u64,
            total_records = snapshot.events,
            total_calls = snapshot.calls,
            total_failed_calls = snapshot.failed_calls,
            total_bytes = snapshot.bytes,
            "Cycle complete"
        );

        Ok(CycleReport {
            window,
            pages,
            failed_pages,
            missing_pages: leftover.missing_pages,
            elapsed,
        })
    }
}
