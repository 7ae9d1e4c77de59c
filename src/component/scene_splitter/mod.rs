//! 場景切割元件
//!
//! 偵測影片中的場景變換點，依最短長度規劃切點，再將每一段輸出成獨立檔案；
//! 多個檔案以固定數量的 worker 平行處理。

pub mod boundary_detector;
mod deadline;
pub mod events;
pub mod job;
mod main;
pub mod orchestrator;
pub mod preflight;
pub mod report;
pub mod runner;
pub mod segment_planner;
pub mod splitter;

pub use boundary_detector::Boundary;
pub use deadline::Deadline;
pub use events::{EventSink, ProgressEvent};
pub use job::{Job, JobContext, JobOutcome, JobSpec, JobStatus, JobSummary, JobTiming};
pub use main::{SceneSplitter, SplitMode};
pub use orchestrator::{BatchOrchestrator, job_specs};
pub use report::{BatchCounts, BatchResult, write_report};
pub use segment_planner::{Segment, plan};
pub use splitter::{OutputFile, SegmentResult};
