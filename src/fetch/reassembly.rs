use crate::fetch::sink::SharedSink;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::sync::{Mutex, PoisonError};

/// One page of a window's result set. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: u32,
    pub records: Vec<Value>,
}

impl Page {
    pub fn new(number: u32, records: Vec<Value>) -> Self {
        Self { number, records }
    }
}

/// Pages waiting for their predecessors, plus the highest page already written.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReassemblyState {
    pub pending: BTreeMap<u32, Page>,
    pub last_flushed: u32,
}

impl ReassemblyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a page. Returns false when the page was already flushed or is already pending.
    pub fn insert(&mut self, page: Page) -> bool {
        if page.number <= self.last_flushed || self.pending.contains_key(&page.number) {
            return false;
        }
        self.pending.insert(page.number, page);
        true
    }

    /// Split off the gap-free run starting at `last_flushed + 1`.
    ///
    /// Returns the run in page order together with the remaining state.
    pub fn drain(mut self) -> (Vec<Page>, ReassemblyState) {
        let mut ready = Vec::new();
        while let Some(page) = self.pending.remove(&(self.last_flushed + 1)) {
            self.last_flushed = page.number;
            ready.push(page);
        }
        (ready, self)
    }

    /// First page number the buffer is still waiting for.
    pub fn next_expected(&self) -> u32 {
        self.last_flushed + 1
    }
}

/// What a window left behind when its cycle ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leftover {
    /// Pages that never arrived, up to the expected total.
    pub missing_pages: Vec<u32>,
    /// Pages that arrived but sit behind a missing page.
    pub stranded_pages: usize,
    pub stranded_records: usize,
}

impl Leftover {
    pub fn is_empty(&self) -> bool {
        self.missing_pages.is_empty() && self.stranded_pages == 0
    }
}

/// Per-window reorder buffer in front of the output sink.
///
/// Pages may be appended from any task in any order; records reach the sink in
/// page order, each page exactly once. Appending and flushing happen under a
/// single lock that is never held across a network call.
pub struct ReassemblyBuffer {
    inner: Mutex<Inner>,
    sink: SharedSink,
}

struct Inner {
    state: ReassemblyState,
    total_pages: u32,
}

impl ReassemblyBuffer {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ReassemblyState::new(),
                total_pages: 0,
            }),
            sink,
        }
    }

    /// Record how many pages this window is expected to have.
    pub fn expect_pages(&self, total_pages: u32) {
        self.lock().total_pages = total_pages;
    }

    /// Store a page and flush whatever became contiguous.
    ///
    /// Returns the number of records written to the sink by this call.
    pub fn append(&self, page: Page) -> io::Result<usize> {
        let mut inner = self.lock();

        let number = page.number;
        if !inner.state.insert(page) {
            tracing::warn!(page = number, "Ignoring duplicate page");
            return Ok(0);
        }

        let (ready, state) = std::mem::take(&mut inner.state).drain();
        inner.state = state;

        if ready.is_empty() {
            tracing::trace!(
                page = number,
                waiting_for = inner.state.next_expected(),
                "Page buffered behind gap"
            );
            return Ok(0);
        }

        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let mut written = 0;
        for page in &ready {
            sink.write_page(&page.records)?;
            written += page.records.len();
            tracing::trace!(page = page.number, records = page.records.len(), "Flushed page");
        }

        Ok(written)
    }

    pub fn last_flushed(&self) -> u32 {
        self.lock().state.last_flushed
    }

    /// Pages still missing or stranded once no more appends will arrive.
    pub fn leftover(&self) -> Leftover {
        let inner = self.lock();
        let state = &inner.state;

        let missing_pages = (state.next_expected()..=inner.total_pages)
            .filter(|n| !state.pending.contains_key(n))
            .collect();

        Leftover {
            missing_pages,
            stranded_pages: state.pending.len(),
            stranded_records: state.pending.values().map(|p| p.records.len()).sum(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
