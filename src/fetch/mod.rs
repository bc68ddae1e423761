pub mod controller;
pub mod orchestrator;
pub mod pool;
pub mod reassembly;
pub mod sink;
pub mod stats;
pub mod window;

pub use controller::{CycleReport, Mode, PollController, PollError, PollSettings, RunSummary};
pub use orchestrator::{FetchError, PageFetcher};
pub use pool::{TaskResult, WorkerPool};
pub use reassembly::{Page, ReassemblyBuffer, ReassemblyState};
pub use sink::{JsonLinesSink, RecordSink, SharedSink};
pub use stats::{CallOutcome, FetchStats, StatsSnapshot};
pub use window::{Clock, SystemClock, TimeWindow, WindowError};
