use crate::client::session::{ApiRequest, Session, SessionError};
use crate::config::types::EventType;
use crate::fetch::pool::WorkerPool;
use crate::fetch::reassembly::{Page, ReassemblyBuffer};
use crate::fetch::stats::{CallOutcome, FetchStats};
use crate::fetch::window::TimeWindow;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("authentication failed with status {status}: {body}")]
    Unauthorized { status: u16, body: String },

    #[error("page {page} returned status {status}: {body}")]
    Status { page: u32, status: u16, body: String },

    #[error("page {page}: {source}")]
    Session {
        page: u32,
        #[source]
        source: SessionError,
    },

    #[error("failed to write output: {0}")]
    Sink(#[from] io::Error),
}

impl FetchError {
    /// Errors that end the whole run rather than one page or one cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Unauthorized { .. } | FetchError::Sink(_))
    }
}

/// Statuses that mean the credentials themselves are rejected.
pub fn is_auth_failure(status: u16) -> bool {
    status == 401 || status == 403
}

pub fn total_pages(total_records: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    u32::try_from(total_records.div_ceil(page_size)).unwrap_or(u32::MAX)
}

#[derive(Debug, Deserialize)]
struct ReportPage {
    #[serde(rename = "dataRows")]
    data_rows: Vec<Value>,
    #[serde(rename = "pageInfo", default)]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "totalRecords")]
    total_records: u64,
}

/// A successfully retrieved page and, when reported, the window's total record count.
#[derive(Debug)]
pub struct FetchedPage {
    pub page: Page,
    pub total_records: Option<u64>,
}

/// Result of a page task run on the worker pool.
pub type PageTaskResult = Result<u32, FetchError>;

/// Issues page calls for one event type and fans out the pages of a window.
pub struct PageFetcher {
    session: Arc<dyn Session>,
    event_type: EventType,
    path: String,
    page_size: u32,
    timeout: Duration,
    stats: Arc<FetchStats>,
    token: CancellationToken,
}

impl PageFetcher {
    pub fn new(
        session: Arc<dyn Session>,
        event_type: EventType,
        account_id: &str,
        page_size: u32,
        timeout: Duration,
        stats: Arc<FetchStats>,
        token: CancellationToken,
    ) -> Self {
        Self {
            session,
            event_type,
            path: event_type.report_path(account_id),
            page_size: page_size.max(1),
            timeout,
            stats,
            token,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn stats(&self) -> &Arc<FetchStats> {
        &self.stats
    }

    fn request(&self, window: TimeWindow, page: u32) -> ApiRequest {
        ApiRequest::post(self.path.clone(), self.timeout)
            .query("pageNumber", page)
            .query("pageSize", self.page_size)
            .json(json!({
                "startTimeSec": window.start,
                "endTimeSec": window.end,
                "orderBy": "ASC",
                "filters": {},
            }))
    }

    /// Fetch one page. Every call is counted exactly once, success or failure.
    pub async fn fetch(&self, window: TimeWindow, page: u32) -> Result<FetchedPage, FetchError> {
        let started = Instant::now();
        let result = self.session.execute(self.request(window, page)).await;
        self.stats.record_network_time(started.elapsed());

        let response = match result {
            Ok(response) => response,
            Err(source) => {
                self.stats.record_api_call(CallOutcome::Failure);
                warn!(
                    event_type = %self.event_type,
                    page = page,
                    error = %source,
                    "Page fetch failed"
                );
                return Err(FetchError::Session { page, source });
            }
        };

        self.stats.record_bytes(response.body.len() as u64);

        if !response.is_success() {
            self.stats.record_api_call(CallOutcome::Failure);
            error!(
                event_type = %self.event_type,
                page = page,
                status = response.status,
                body = %response.body,
                "API call returned an error status"
            );
            if page == 1 && is_auth_failure(response.status) {
                return Err(FetchError::Unauthorized {
                    status: response.status,
                    body: response.body,
                });
            }
            return Err(FetchError::Status {
                page,
                status: response.status,
                body: response.body,
            });
        }

        self.stats.record_api_call(CallOutcome::Success);

        let fetched = match serde_json::from_str::<ReportPage>(&response.body) {
            Ok(report) => FetchedPage {
                page: Page::new(page, report.data_rows),
                total_records: report.page_info.map(|info| info.total_records),
            },
            Err(e) => {
                warn!(
                    event_type = %self.event_type,
                    page = page,
                    error = %e,
                    "Malformed response body, treating page as empty"
                );
                FetchedPage {
                    page: Page::new(page, Vec::new()),
                    total_records: None,
                }
            }
        };

        self.stats.record_event(fetched.page.records.len() as u64);
        debug!(
            event_type = %self.event_type,
            page = page,
            records = fetched.page.records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched page"
        );

        Ok(fetched)
    }

    /// Fetch page 1 inline, then queue pages `2..=total_pages` on the pool.
    ///
    /// Returns the page count discovered for this window. Pages are appended to
    /// `buffer` as they complete; the caller waits on the pool for the rest.
    pub async fn fetch_window(
        self: &Arc<Self>,
        window: TimeWindow,
        pool: &mut WorkerPool<PageTaskResult>,
        buffer: Arc<ReassemblyBuffer>,
    ) -> Result<u32, FetchError> {
        if self.token.is_cancelled() {
            return Ok(0);
        }

        let first = self.fetch(window, 1).await?;
        let pages = first
            .total_records
            .map(|total| total_pages(total, self.page_size))
            .unwrap_or(1)
            .max(1);

        buffer.expect_pages(pages);
        buffer.append(first.page)?;

        debug!(
            event_type = %self.event_type,
            window = %window,
            pages = pages,
            total_records = first.total_records,
            "Discovered page count"
        );

        for page in 2..=pages {
            if self.token.is_cancelled() {
                warn!(
                    next_page = page,
                    pages = pages,
                    "Stop requested, not scheduling remaining pages"
                );
                break;
            }

            let fetcher = Arc::clone(self);
            let buffer = Arc::clone(&buffer);
            pool.submit(async move { fetcher.fetch_into(window, page, &buffer).await });
        }

        Ok(pages)
    }

    async fn fetch_into(
        &self,
        window: TimeWindow,
        page: u32,
        buffer: &ReassemblyBuffer,
    ) -> PageTaskResult {
        let fetched = self.fetch(window, page).await?;
        if let Err(e) = buffer.append(fetched.page) {
            error!(page = page, error = %e, "Writing output failed, stopping");
            self.token.cancel();
            return Err(FetchError::Sink(e));
        }
        Ok(page)
    }
}
