#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use sia_events::client::{ApiRequest, ApiResponse, Session, SessionError};
use sia_events::config::EventType;
use sia_events::fetch::sink::{self, RecordSink, SharedSink};
use sia_events::fetch::{
    Clock, FetchStats, Mode, PageFetcher, PollController, PollSettings,
};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const NOW: i64 = 1_700_000_000;

/// How the scripted server answers one page.
#[derive(Clone)]
pub enum Reply {
    Rows { count: usize, delay: Duration },
    Status(u16),
    Timeout,
    Malformed,
}

impl Reply {
    pub fn rows(count: usize) -> Self {
        Reply::Rows {
            count,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(count: usize, millis: u64) -> Self {
        Reply::Rows {
            count,
            delay: Duration::from_millis(millis),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub page: u32,
    pub start: i64,
    pub end: i64,
}

type PageOneHook = Box<dyn Fn(usize) + Send + Sync>;

/// In-process report API: fixed replies per page number and a total record count.
pub struct ScriptedSession {
    replies: HashMap<u32, Reply>,
    total_records: u64,
    calls: Mutex<Vec<Call>>,
    on_page_one: Option<PageOneHook>,
}

impl ScriptedSession {
    pub fn new(total_records: u64, replies: Vec<(u32, Reply)>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            total_records,
            calls: Mutex::new(Vec::new()),
            on_page_one: None,
        }
    }

    /// Run `hook` with the 1-based count of page-1 calls seen so far.
    pub fn on_page_one(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_page_one = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn page_one_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.page == 1).collect()
    }
}

fn query_u32(request: &ApiRequest, key: &str) -> u32 {
    request
        .query
        .iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse().ok())
        .unwrap()
}

#[async_trait]
impl Session for ScriptedSession {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let page = query_u32(&request, "pageNumber");
        let body = request.body.clone().unwrap();
        let call = Call {
            page,
            start: body["startTimeSec"].as_i64().unwrap(),
            end: body["endTimeSec"].as_i64().unwrap(),
        };

        let page_one_count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.iter().filter(|c| c.page == 1).count()
        };
        if page == 1 {
            if let Some(hook) = &self.on_page_one {
                hook(page_one_count);
            }
        }

        let reply = self.replies.get(&page).cloned().unwrap_or(Reply::rows(0));
        let (status, body) = match reply {
            Reply::Rows { count, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let rows: Vec<Value> = (0..count)
                    .map(|i| json!({"id": format!("p{}-{}", page, i), "page": page}))
                    .collect();
                let body = json!({
                    "dataRows": rows,
                    "pageInfo": {"totalRecords": self.total_records},
                });
                (200, body.to_string())
            }
            Reply::Status(status) => (status, format!("{{\"detail\": \"status {}\"}}", status)),
            Reply::Timeout => return Err(SessionError::Timeout(request.timeout)),
            Reply::Malformed => (200, "<html>gateway</html>".to_string()),
        };

        Ok(ApiResponse {
            status,
            headers: Vec::new(),
            body,
        })
    }
}

/// Sink that keeps every written record in memory.
#[derive(Clone, Default)]
pub struct CaptureSink {
    records: Arc<Mutex<Vec<Value>>>,
}

impl CaptureSink {
    pub fn ids(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect()
    }

    pub fn shared(&self) -> SharedSink {
        sink::shared(self.clone())
    }
}

impl RecordSink for CaptureSink {
    fn write_page(&mut self, records: &[Value]) -> io::Result<()> {
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(())
    }
}

/// Clock that moves forward a fixed step on every reading after the first.
pub struct SteppingClock {
    next: AtomicI64,
    step: i64,
}

impl SteppingClock {
    pub fn new(start: i64, step: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now_epoch(&self) -> i64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}

/// Expected ids for `pages`, each holding `per_page` rows.
pub fn expected_ids(pages: &[u32], per_page: usize) -> Vec<String> {
    pages
        .iter()
        .flat_map(|p| (0..per_page).map(move |i| format!("p{}-{}", p, i)))
        .collect()
}

pub struct Harness {
    pub session: Arc<ScriptedSession>,
    pub sink: CaptureSink,
    pub stats: Arc<FetchStats>,
    pub token: CancellationToken,
}

impl Harness {
    pub fn new(session: ScriptedSession) -> Self {
        Self {
            session: Arc::new(session),
            sink: CaptureSink::default(),
            stats: Arc::new(FetchStats::new()),
            token: CancellationToken::new(),
        }
    }

    pub fn fetcher(&self, page_size: u32) -> Arc<PageFetcher> {
        Arc::new(PageFetcher::new(
            self.session.clone(),
            EventType::Threat,
            "4411",
            page_size,
            Duration::from_secs(5),
            self.stats.clone(),
            self.token.clone(),
        ))
    }

    pub fn controller(
        &self,
        page_size: u32,
        mode: Mode,
        poll_interval: Duration,
        concurrency: usize,
        clock: Arc<dyn Clock>,
    ) -> PollController {
        let settings = PollSettings {
            mode,
            collection_delay: Duration::from_secs(180),
            span_duration: Duration::from_secs(600),
            poll_interval,
            concurrency,
        };
        PollController::new(
            self.fetcher(page_size),
            settings,
            clock,
            self.sink.shared(),
            self.token.clone(),
        )
    }
}

pub fn ad_hoc() -> Mode {
    Mode::AdHoc {
        start: None,
        end: None,
    }
}
