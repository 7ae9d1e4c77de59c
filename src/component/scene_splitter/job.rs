//! 單一輸入檔的完整流程：偵測 → 規劃 → 切割

use super::boundary_detector;
use super::deadline::Deadline;
use super::events::{EventSink, ProgressEvent};
use super::preflight;
use super::segment_planner::{self, Segment};
use super::splitter::{self, SegmentResult, SplitRequest};
use crate::config::Settings;
use crate::error::{ErrorKind, Result, SplitError};
use crate::tools::{MediaEngine, MediaInfo, SpaceProbe};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Detecting,
    Planning,
    Splitting,
    Succeeded,
    Failed,
}

impl JobStatus {
    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Detecting => 1,
            Self::Planning => 2,
            Self::Splitting => 3,
            Self::Succeeded => 4,
            Self::Failed => 5,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// 只能往下一個階段前進，或從任何非終止狀態進入 `Failed`
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            Self::Succeeded => matches!(self, Self::Splitting),
            _ => next.rank() == self.rank() + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobTiming {
    pub detect_ms: u64,
    pub plan_ms: u64,
    pub split_ms: u64,
}

/// 佇列中的工作描述
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// 提交順序
    pub id: usize,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub input_size: u64,
}

/// 執行工作時需要的外部能力
#[derive(Clone, Copy)]
pub struct JobContext<'a> {
    pub engine: &'a dyn MediaEngine,
    pub space: &'a dyn SpaceProbe,
    pub events: &'a EventSink,
    pub shutdown: &'a AtomicBool,
}

impl JobContext<'_> {
    fn is_cancelled(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// 批次報告中的工作結果分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    /// 成功，但有片段失敗
    PartiallySucceeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub result: SegmentResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub id: usize,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub status: JobStatus,
    pub outcome: JobOutcome,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub media: Option<MediaInfo>,
    pub boundaries_found: usize,
    pub planned_segments: usize,
    pub produced_segments: usize,
    /// 規劃結果少於兩個場景
    pub single_scene: bool,
    /// `copy` 模式：實際切點對齊最近的關鍵影格，可能與 `start`/`end` 有落差
    pub keyframe_snapped: bool,
    pub segments: Vec<SegmentSummary>,
    pub timing: JobTiming,
}

impl JobSummary {
    /// 取消時尚未開始的工作
    #[must_use]
    pub fn not_started(spec: &JobSpec) -> Self {
        Self {
            id: spec.id,
            input_path: spec.input_path.clone(),
            output_dir: spec.output_dir.clone(),
            status: JobStatus::Pending,
            outcome: JobOutcome::Cancelled,
            error_kind: Some(ErrorKind::Cancelled),
            error: Some(SplitError::Cancelled.to_string()),
            media: None,
            boundaries_found: 0,
            planned_segments: 0,
            produced_segments: 0,
            single_scene: false,
            keyframe_snapped: false,
            segments: Vec::new(),
            timing: JobTiming::default(),
        }
    }

    #[must_use]
    pub fn failed_segments(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| !s.result.is_success())
            .count()
    }
}

pub struct Job {
    spec: JobSpec,
    settings: Arc<Settings>,
    status: JobStatus,
    error: Option<SplitError>,
    media: Option<MediaInfo>,
    boundaries_found: usize,
    segments: Vec<Segment>,
    per_segment_results: BTreeMap<usize, SegmentResult>,
    timing: JobTiming,
}

impl Job {
    #[must_use]
    pub const fn new(spec: JobSpec, settings: Arc<Settings>) -> Self {
        Self {
            spec,
            settings,
            status: JobStatus::Pending,
            error: None,
            media: None,
            boundaries_found: 0,
            segments: Vec::new(),
            per_segment_results: BTreeMap::new(),
            timing: JobTiming {
                detect_ms: 0,
                plan_ms: 0,
                split_ms: 0,
            },
        }
    }

    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    #[must_use]
    pub const fn spec(&self) -> &JobSpec {
        &self.spec
    }

    /// 執行整個流程直到終止狀態；工作失敗不會往外傳遞
    pub fn run(mut self, ctx: &JobContext<'_>) -> JobSummary {
        ctx.events.emit(ProgressEvent::JobStarted {
            job_id: self.spec.id,
            input_path: self.spec.input_path.clone(),
        });
        info!("開始處理: {}", self.spec.input_path.display());

        if let Err(e) = self.execute(ctx) {
            self.fail(e, ctx);
        }

        let summary = self.summary();
        ctx.events.emit(ProgressEvent::JobCompleted {
            job_id: summary.id,
            status: summary.status,
            produced: summary.produced_segments,
            planned: summary.planned_segments,
        });
        summary
    }

    fn execute(&mut self, ctx: &JobContext<'_>) -> Result<()> {
        let required = preflight::required_bytes(&[self.spec.input_size]);
        preflight::check(required, &self.spec.output_dir, ctx.space)?;

        let deadline = Deadline::start(self.settings.job_timeout());
        let input = self.spec.input_path.clone();

        self.advance(JobStatus::Detecting, ctx);
        let started = Instant::now();
        let media = boundary_detector::probe(ctx.engine, &input, deadline)?;
        let boundaries = boundary_detector::detect(
            ctx.engine,
            &input,
            self.settings.threshold(),
            self.settings.detection_method(),
            deadline,
        )?;
        self.timing.detect_ms = elapsed_ms(started);
        self.boundaries_found = boundaries.len();
        let total_duration = media.duration_seconds;
        self.media = Some(media);

        if ctx.is_cancelled() {
            return Err(SplitError::Cancelled);
        }

        self.advance(JobStatus::Planning, ctx);
        let started = Instant::now();
        self.segments = segment_planner::plan(
            &boundaries,
            total_duration,
            f64::from(self.settings.min_duration()),
        );
        self.timing.plan_ms = elapsed_ms(started);

        if segment_planner::is_single_scene(&self.segments) {
            info!(
                "少於 2 個場景，輸出整段影片: {}",
                self.spec.input_path.display()
            );
        } else {
            debug!(
                "規劃 {} 個片段（{} 個候選切點）: {}",
                self.segments.len(),
                self.boundaries_found,
                self.spec.input_path.display()
            );
        }

        if ctx.is_cancelled() {
            return Err(SplitError::Cancelled);
        }

        self.advance(JobStatus::Splitting, ctx);
        let started = Instant::now();
        let planned = self.segments.len();
        let job_id = self.spec.id;
        let request = SplitRequest {
            input: &input,
            segments: &self.segments,
            codec: self.settings.codec(),
            output_format: self.settings.output_format(),
            output_dir: &self.spec.output_dir,
            prefix: self.settings.scene_prefix(),
        };
        let report = splitter::split(ctx.engine, &request, deadline, ctx.shutdown, |segment, result| {
            ctx.events.emit(ProgressEvent::SegmentFinished {
                job_id,
                index: segment.index,
                planned,
                success: result.is_success(),
            });
        })?;
        self.timing.split_ms = elapsed_ms(started);

        let produced = report.produced();
        let cancelled = report.cancelled;
        let aborted = report.aborted;
        self.per_segment_results = report.results;

        if let Some(err) = aborted {
            return Err(err);
        }
        if produced == 0 {
            return Err(if cancelled {
                SplitError::Cancelled
            } else {
                SplitError::JobFailed {
                    planned,
                    failed: planned,
                }
            });
        }

        if produced < planned {
            warn!(
                "部分片段失敗 ({produced}/{planned}): {}",
                self.spec.input_path.display()
            );
        }
        self.advance(JobStatus::Succeeded, ctx);
        info!(
            "完成: {} ({produced}/{planned} 個片段)",
            self.spec.input_path.display()
        );
        Ok(())
    }

    fn advance(&mut self, next: JobStatus, ctx: &JobContext<'_>) {
        if !self.status.can_advance_to(next) {
            error!(
                "忽略不合法的狀態轉換 {:?} -> {next:?}: {}",
                self.status,
                self.spec.input_path.display()
            );
            return;
        }
        self.status = next;
        ctx.events.emit(ProgressEvent::JobStageChanged {
            job_id: self.spec.id,
            status: next,
        });
    }

    fn fail(&mut self, err: SplitError, ctx: &JobContext<'_>) {
        if err == SplitError::Cancelled {
            info!("已取消: {}", self.spec.input_path.display());
        } else {
            error!("處理失敗 {}: {err}", self.spec.input_path.display());
        }
        self.error = Some(err);
        self.advance(JobStatus::Failed, ctx);
    }

    fn summary(&self) -> JobSummary {
        let produced_segments = self
            .per_segment_results
            .values()
            .filter(|r| r.is_success())
            .count();
        let failed_segments = self.per_segment_results.len() - produced_segments;

        let outcome = match (self.status, &self.error) {
            (JobStatus::Failed, Some(SplitError::Cancelled)) => JobOutcome::Cancelled,
            (JobStatus::Succeeded, _) if failed_segments > 0 => JobOutcome::PartiallySucceeded,
            (JobStatus::Succeeded, _) => JobOutcome::Succeeded,
            _ => JobOutcome::Failed,
        };

        let segments = self
            .segments
            .iter()
            .filter_map(|segment| {
                self.per_segment_results
                    .get(&segment.index)
                    .map(|result| SegmentSummary {
                        index: segment.index,
                        start: segment.start,
                        end: segment.end,
                        result: result.clone(),
                    })
            })
            .collect();

        JobSummary {
            id: self.spec.id,
            input_path: self.spec.input_path.clone(),
            output_dir: self.spec.output_dir.clone(),
            status: self.status,
            outcome,
            error_kind: self.error.as_ref().map(SplitError::kind),
            error: self.error.as_ref().map(ToString::to_string),
            media: self.media.clone(),
            boundaries_found: self.boundaries_found,
            planned_segments: self.segments.len(),
            produced_segments,
            single_scene: !self.segments.is_empty()
                && segment_planner::is_single_scene(&self.segments),
            keyframe_snapped: !self.settings.codec().is_frame_accurate(),
            segments,
            timing: self.timing,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Codec;
    use crate::tools::{EngineError, EngineOutput, Invocation, Tool};
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const PROBE_JSON: &str = r#"{"format":{"duration":"30.0"},"streams":[{"codec_type":"video","width":640,"height":360,"r_frame_rate":"25/1"}]}"#;

    /// 偵測回傳固定切點，切割依 `fail_segments` 決定成敗
    struct FakeEngine {
        detect_lines: Vec<String>,
        fail_segments: Vec<usize>,
        probe_ok: bool,
        split_calls: Mutex<usize>,
    }

    impl FakeEngine {
        fn new(boundaries: &[(f64, f64)]) -> Self {
            let detect_lines = boundaries
                .iter()
                .flat_map(|(t, s)| {
                    [
                        format!("frame:1 pts:1 pts_time:{t}"),
                        format!("lavfi.scene_score={s}"),
                    ]
                })
                .collect();
            Self {
                detect_lines,
                fail_segments: Vec::new(),
                probe_ok: true,
                split_calls: Mutex::new(0),
            }
        }
    }

    impl MediaEngine for FakeEngine {
        fn invoke(&self, invocation: &Invocation) -> std::result::Result<EngineOutput, EngineError> {
            let ok = |stdout_lines: Vec<String>| EngineOutput {
                exit_code: Some(0),
                stdout_lines,
                stderr: String::new(),
            };
            match invocation.tool {
                Tool::Ffprobe if self.probe_ok => Ok(ok(vec![PROBE_JSON.to_string()])),
                Tool::Ffprobe => Ok(EngineOutput {
                    exit_code: Some(1),
                    stdout_lines: Vec::new(),
                    stderr: "Invalid data found when processing input".into(),
                }),
                Tool::Ffmpeg if invocation.args.contains(&"null".to_string()) => {
                    Ok(ok(self.detect_lines.clone()))
                }
                Tool::Ffmpeg => {
                    let mut calls = self.split_calls.lock().unwrap();
                    let index = *calls;
                    *calls += 1;
                    if self.fail_segments.contains(&index) {
                        return Ok(EngineOutput {
                            exit_code: Some(1),
                            ..EngineOutput::default()
                        });
                    }
                    fs::write(invocation.args.last().unwrap(), b"data").unwrap();
                    Ok(ok(Vec::new()))
                }
            }
        }
    }

    struct Space(u64);

    impl SpaceProbe for Space {
        fn available_bytes(&self, _dir: &Path) -> anyhow::Result<u64> {
            Ok(self.0)
        }
    }

    fn run_job(engine: &FakeEngine, space: u64, output_dir: &Path) -> JobSummary {
        run_job_with_codec(engine, space, output_dir, Codec::Copy)
    }

    fn run_job_with_codec(
        engine: &FakeEngine,
        space: u64,
        output_dir: &Path,
        codec: Codec,
    ) -> JobSummary {
        let spec = JobSpec {
            id: 0,
            input_path: PathBuf::from("/videos/a.mp4"),
            output_dir: output_dir.to_path_buf(),
            input_size: 1000,
        };
        let settings = Arc::new(
            Settings::builder()
                .min_duration(5)
                .codec(codec)
                .build()
                .unwrap(),
        );
        let events = EventSink::disabled();
        let shutdown = AtomicBool::new(false);
        let ctx = JobContext {
            engine,
            space: &Space(space),
            events: &events,
            shutdown: &shutdown,
        };
        Job::new(spec, settings).run(&ctx)
    }

    #[test]
    fn test_status_transitions_only_move_forward() {
        use JobStatus::*;
        assert!(Pending.can_advance_to(Detecting));
        assert!(Pending.can_advance_to(Failed));
        assert!(Detecting.can_advance_to(Planning));
        assert!(Planning.can_advance_to(Splitting));
        assert!(Splitting.can_advance_to(Succeeded));
        assert!(Splitting.can_advance_to(Failed));

        assert!(!Pending.can_advance_to(Splitting));
        assert!(!Detecting.can_advance_to(Succeeded));
        assert!(!Planning.can_advance_to(Detecting));
        assert!(!Succeeded.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Pending));
    }

    #[test]
    fn test_successful_job() {
        let temp_dir = TempDir::new().unwrap();
        let engine = FakeEngine::new(&[(10.0, 0.8), (12.0, 0.9), (20.0, 0.2)]);
        let summary = run_job(&engine, u64::MAX, temp_dir.path());

        assert_eq!(summary.status, JobStatus::Succeeded);
        assert_eq!(summary.outcome, JobOutcome::Succeeded);
        assert_eq!(summary.boundaries_found, 2);
        assert_eq!(summary.planned_segments, 2);
        assert_eq!(summary.produced_segments, 2);
        assert!(!summary.single_scene);
        assert!(temp_dir.path().join("scene_001.mp4").exists());
        assert!(temp_dir.path().join("scene_002.mp4").exists());
    }

    #[test]
    fn test_copy_codec_reports_keyframe_snapping() {
        let temp_dir = TempDir::new().unwrap();
        let engine = FakeEngine::new(&[(10.0, 0.8)]);

        let copy = run_job_with_codec(&engine, u64::MAX, &temp_dir.path().join("copy"), Codec::Copy);
        assert_eq!(copy.status, JobStatus::Succeeded);
        assert!(copy.keyframe_snapped);

        let h264 = run_job_with_codec(&engine, u64::MAX, &temp_dir.path().join("h264"), Codec::H264);
        assert_eq!(h264.status, JobStatus::Succeeded);
        assert!(!h264.keyframe_snapped);

        let json = serde_json::to_value(&copy).unwrap();
        assert_eq!(json["keyframe_snapped"], true);
    }

    #[test]
    fn test_partial_success_is_succeeded() {
        let temp_dir = TempDir::new().unwrap();
        let mut engine = FakeEngine::new(&[(10.0, 0.8), (20.0, 0.8)]);
        engine.fail_segments = vec![1];
        let summary = run_job(&engine, u64::MAX, temp_dir.path());

        assert_eq!(summary.status, JobStatus::Succeeded);
        assert_eq!(summary.outcome, JobOutcome::PartiallySucceeded);
        assert_eq!(summary.produced_segments, 2);
        assert_eq!(summary.failed_segments(), 1);
        assert!(summary.error.is_none());
    }

    #[test]
    fn test_zero_segments_is_failed() {
        let temp_dir = TempDir::new().unwrap();
        let mut engine = FakeEngine::new(&[]);
        engine.fail_segments = vec![0];
        let summary = run_job(&engine, u64::MAX, temp_dir.path());

        assert_eq!(summary.status, JobStatus::Failed);
        assert_eq!(summary.error_kind, Some(ErrorKind::JobFailed));
        assert!(summary.single_scene);
    }

    #[test]
    fn test_unsupported_input_fails_before_detection() {
        let temp_dir = TempDir::new().unwrap();
        let mut engine = FakeEngine::new(&[(10.0, 0.8)]);
        engine.probe_ok = false;
        let summary = run_job(&engine, u64::MAX, temp_dir.path());

        assert_eq!(summary.status, JobStatus::Failed);
        assert_eq!(summary.error_kind, Some(ErrorKind::UnsupportedInput));
        assert_eq!(*engine.split_calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_recheck_failure_moves_pending_to_failed() {
        let temp_dir = TempDir::new().unwrap();
        let engine = FakeEngine::new(&[]);
        let summary = run_job(&engine, 10, temp_dir.path());

        assert_eq!(summary.status, JobStatus::Failed);
        assert_eq!(summary.error_kind, Some(ErrorKind::InsufficientSpace));
        assert!(summary.media.is_none());
    }
}
