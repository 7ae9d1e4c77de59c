//! 依切點清單實際切割影片
//!
//! 每個片段先寫入輸出目錄下的私有暫存目錄，引擎成功結束且檔案非空時
//! 才移入輸出目錄，因此失敗或中斷的片段不會在輸出目錄留下殘檔。

use super::deadline::{Deadline, timeout_from_engine};
use super::segment_planner::Segment;
use crate::config::{Codec, OutputFormat};
use crate::error::{ErrorKind, Result, SplitError};
use crate::tools::{Invocation, MediaEngine, Tool, ensure_directory_exists};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub const SCRATCH_DIR_PREFIX: &str = ".scene_split_tmp_";

pub const CANCELLED_REASON: &str = "cancelled";
pub const TIMEOUT_REASON: &str = "timeout";

const H264_CRF: &str = "18";
const H265_CRF: &str = "20";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputFile {
    pub path: PathBuf,
    /// 輸出檔名中的序號，從 1 開始連續
    pub scene_number: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SegmentResult {
    Output(OutputFile),
    Failed { kind: ErrorKind, reason: String },
}

impl SegmentResult {
    fn failed(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            reason: reason.into(),
        }
    }

    /// 單一片段失敗，報告中保留錯誤種類
    fn from_error(err: SplitError) -> Self {
        match err {
            SplitError::SplitSegmentFailed { reason, .. } => {
                Self::failed(ErrorKind::SplitSegmentFailed, reason)
            }
            other => Self::failed(other.kind(), other.to_string()),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Output(_))
    }

    #[must_use]
    pub fn output_path(&self) -> Option<&Path> {
        match self {
            Self::Output(file) => Some(&file.path),
            Self::Failed { .. } => None,
        }
    }
}

/// 單一輸入的切割參數
#[derive(Debug, Clone, Copy)]
pub struct SplitRequest<'a> {
    pub input: &'a Path,
    pub segments: &'a [Segment],
    pub codec: Codec,
    pub output_format: OutputFormat,
    pub output_dir: &'a Path,
    pub prefix: &'a str,
}

/// 切割結果；`aborted` 為逾時等中止整個切割的錯誤
#[derive(Debug, Default)]
pub struct SplitReport {
    pub results: BTreeMap<usize, SegmentResult>,
    pub aborted: Option<SplitError>,
    pub cancelled: bool,
}

impl SplitReport {
    #[must_use]
    pub fn produced(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }
}

/// `{prefix}_{NNN}.{ext}`
#[must_use]
pub fn output_file_name(prefix: &str, scene_number: usize, format: OutputFormat) -> String {
    format!("{prefix}_{scene_number:03}.{}", format.extension())
}

/// 輸出目錄中已存在、符合 `{prefix}_{NNN}.{ext}` 的檔案
///
/// 重新切割時編號從 001 開始，舊檔案會被覆蓋或殘留
#[must_use]
pub fn existing_outputs(output_dir: &Path, prefix: &str, format: OutputFormat) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(output_dir) else {
        return Vec::new();
    };
    let head = format!("{prefix}_");
    let tail = format!(".{}", format.extension());

    let mut found: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.strip_prefix(&head)
                .and_then(|rest| rest.strip_suffix(&tail))
                .is_some_and(|number| {
                    number.len() >= 3 && number.bytes().all(|b| b.is_ascii_digit())
                })
        })
        .map(|entry| entry.path())
        .collect();
    found.sort();
    found
}

/// 一個片段的引擎參數
///
/// `-ss` 放在 `-i` 之前做輸入端快速定位；`copy` 模式下切點會落在最近的關鍵影格。
/// 最後一段不帶 `-t`，一路讀到串流結尾。
#[must_use]
pub fn split_args(
    input: &Path,
    segment: &Segment,
    codec: Codec,
    format: OutputFormat,
    destination: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-ss".into(),
        format!("{:.3}", segment.start),
        "-i".into(),
        input.to_string_lossy().into_owned(),
    ];

    if !segment.is_final() {
        args.extend(["-t".into(), format!("{:.3}", segment.duration())]);
    }

    args.extend(["-map".into(), "0:v:0".into(), "-map".into(), "0:a?".into()]);

    match codec {
        Codec::Copy => args.extend([
            "-c".into(),
            "copy".into(),
            "-avoid_negative_ts".into(),
            "make_zero".into(),
        ]),
        Codec::H264 => args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "medium".into(),
            "-crf".into(),
            H264_CRF.into(),
            "-c:a".into(),
            "aac".into(),
        ]),
        Codec::H265 => {
            args.extend([
                "-c:v".into(),
                "libx265".into(),
                "-preset".into(),
                "medium".into(),
                "-crf".into(),
                H265_CRF.into(),
            ]);
            if matches!(format, OutputFormat::Mp4 | OutputFormat::Mov) {
                args.extend(["-tag:v".into(), "hvc1".into()]);
            }
            args.extend(["-c:a".into(), "aac".into()]);
        }
    }

    if matches!(format, OutputFormat::Mp4 | OutputFormat::Mov) {
        args.extend(["-movflags".into(), "+faststart".into()]);
    }

    args.extend([
        "-f".into(),
        format.muxer().into(),
        destination.to_string_lossy().into_owned(),
    ]);

    args
}

/// 離開作用域時一定刪除的暫存目錄
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(output_dir: &Path) -> Result<Self> {
        let path = output_dir.join(format!("{SCRATCH_DIR_PREFIX}{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!("無法刪除暫存目錄 {}: {e}", self.path.display());
        }
    }
}

/// 依序切割所有片段
///
/// 單一片段失敗只記錄並繼續；每個片段開始前檢查取消旗標，
/// 尚未嘗試的片段記為 `cancelled`。逾時則中止整個切割。
pub fn split(
    engine: &dyn MediaEngine,
    request: &SplitRequest<'_>,
    deadline: Option<Deadline>,
    shutdown: &AtomicBool,
    mut on_segment: impl FnMut(&Segment, &SegmentResult),
) -> Result<SplitReport> {
    ensure_directory_exists(request.output_dir)
        .map_err(|e| SplitError::Io(format!("{e:#}")))?;
    let stale = existing_outputs(request.output_dir, request.prefix, request.output_format);
    if !stale.is_empty() {
        warn!(
            "輸出目錄已有 {} 個舊的場景檔案，同名檔案將被覆蓋: {}",
            stale.len(),
            request.output_dir.display()
        );
    }
    let scratch = ScratchDir::create(request.output_dir)?;

    let mut report = SplitReport::default();
    let mut next_number = 1;

    for (position, segment) in request.segments.iter().enumerate() {
        if shutdown.load(Ordering::SeqCst) {
            info!("收到取消信號，停止切割: {}", request.input.display());
            report.cancelled = true;
            mark_remaining(
                &mut report,
                &request.segments[position..],
                ErrorKind::Cancelled,
                CANCELLED_REASON,
            );
            break;
        }

        if let Some(deadline) = deadline.filter(|d| d.is_exceeded()) {
            report.aborted = Some(deadline.timeout_error());
            mark_remaining(
                &mut report,
                &request.segments[position..],
                ErrorKind::Timeout,
                TIMEOUT_REASON,
            );
            break;
        }

        let result = match split_segment(engine, request, segment, &scratch.path, next_number, deadline)
        {
            Ok(result) => result,
            Err(timeout) => {
                report.aborted = Some(timeout);
                mark_remaining(
                    &mut report,
                    &request.segments[position..],
                    ErrorKind::Timeout,
                    TIMEOUT_REASON,
                );
                break;
            }
        };

        if result.is_success() {
            next_number += 1;
        }
        on_segment(segment, &result);
        report.results.insert(segment.index, result);
    }

    drop(scratch);
    Ok(report)
}

fn mark_remaining(report: &mut SplitReport, remaining: &[Segment], kind: ErrorKind, reason: &str) {
    for segment in remaining {
        report
            .results
            .insert(segment.index, SegmentResult::failed(kind, reason));
    }
}

fn segment_failed(segment: &Segment, reason: impl Into<String>) -> SegmentResult {
    SegmentResult::from_error(SplitError::SplitSegmentFailed {
        index: segment.index,
        reason: reason.into(),
    })
}

/// 切割一個片段；只有逾時會回傳 `Err`
fn split_segment(
    engine: &dyn MediaEngine,
    request: &SplitRequest<'_>,
    segment: &Segment,
    scratch_dir: &Path,
    scene_number: usize,
    deadline: Option<Deadline>,
) -> Result<SegmentResult> {
    let scratch_file = scratch_dir.join(format!(
        "segment_{:03}.{}",
        segment.index,
        request.output_format.extension()
    ));
    let args = split_args(
        request.input,
        segment,
        request.codec,
        request.output_format,
        &scratch_file,
    );
    let invocation =
        Invocation::new(Tool::Ffmpeg, args).with_deadline(deadline.map(Deadline::instant));

    let output = match engine.invoke(&invocation) {
        Ok(output) => output,
        Err(e) => {
            if let Some(timeout) = timeout_from_engine(&e, deadline) {
                return Err(timeout);
            }
            warn!("片段 {} 無法執行: {e}", segment.index);
            return Ok(segment_failed(segment, e.to_string()));
        }
    };

    if !output.success() {
        let tail = output.stderr_tail(3);
        let reason = if tail.is_empty() {
            format!("engine exited with {:?}", output.exit_code)
        } else {
            tail
        };
        warn!("片段 {} 切割失敗: {reason}", segment.index);
        return Ok(segment_failed(segment, reason));
    }

    let produced = fs::metadata(&scratch_file).map(|m| m.len()).unwrap_or(0);
    if produced == 0 {
        warn!("片段 {} 沒有產生輸出檔案", segment.index);
        return Ok(segment_failed(segment, "engine produced no output"));
    }

    let destination = request.output_dir.join(output_file_name(
        request.prefix,
        scene_number,
        request.output_format,
    ));
    if let Err(e) = fs::rename(&scratch_file, &destination) {
        warn!("無法移動片段 {} 到輸出目錄: {e}", segment.index);
        return Ok(segment_failed(segment, format!("move failed: {e}")));
    }

    debug!(
        "片段 {} [{:.3}, {:.3}) -> {}",
        segment.index,
        segment.start,
        segment.end,
        destination.display()
    );

    Ok(SegmentResult::Output(OutputFile {
        path: destination,
        scene_number,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EngineError, EngineOutput};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// 依呼叫順序回傳結果；成功時在最後一個參數的位置寫入檔案
    struct ScriptedEngine {
        script: Mutex<Vec<bool>>,
        calls: Mutex<usize>,
    }

    impl ScriptedEngine {
        fn new(script: Vec<bool>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }
    }

    impl MediaEngine for ScriptedEngine {
        fn invoke(&self, invocation: &Invocation) -> std::result::Result<EngineOutput, EngineError> {
            let mut calls = self.calls.lock().unwrap();
            let ok = self.script.lock().unwrap().get(*calls).copied().unwrap_or(true);
            *calls += 1;
            let destination = invocation.args.last().unwrap();
            fs::write(destination, b"fake segment").unwrap();
            Ok(EngineOutput {
                exit_code: Some(if ok { 0 } else { 1 }),
                stdout_lines: Vec::new(),
                stderr: if ok { String::new() } else { "boom".into() },
            })
        }
    }

    fn segments(spans: &[(f64, f64)]) -> Vec<Segment> {
        let last = spans.len() - 1;
        spans
            .iter()
            .enumerate()
            .map(|(index, &(start, end))| Segment {
                index,
                start,
                end,
                source_boundary: (index != last).then(|| super::super::boundary_detector::Boundary {
                    timestamp: end,
                    score: 0.9,
                }),
            })
            .collect()
    }

    fn request<'a>(segments: &'a [Segment], output_dir: &'a Path) -> SplitRequest<'a> {
        SplitRequest {
            input: Path::new("/videos/input.mp4"),
            segments,
            codec: Codec::Copy,
            output_format: OutputFormat::Mp4,
            output_dir,
            prefix: "scene",
        }
    }

    fn dir_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("scene", 1, OutputFormat::Mp4), "scene_001.mp4");
        assert_eq!(output_file_name("clip_a", 42, OutputFormat::Mkv), "clip_a_042.mkv");
        assert_eq!(output_file_name("s", 1000, OutputFormat::Mov), "s_1000.mov");
    }

    #[test]
    fn test_split_args_final_segment_has_no_duration() {
        let plan = segments(&[(0.0, 10.0), (10.0, 25.5)]);
        let dest = Path::new("/tmp/out.mp4");

        let first = split_args(Path::new("in.mp4"), &plan[0], Codec::Copy, OutputFormat::Mp4, dest);
        let t = first.iter().position(|a| a == "-t").unwrap();
        assert_eq!(first[t + 1], "10.000");

        let last = split_args(Path::new("in.mp4"), &plan[1], Codec::Copy, OutputFormat::Mp4, dest);
        assert!(!last.contains(&"-t".to_string()));
        let ss = last.iter().position(|a| a == "-ss").unwrap();
        let i = last.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i);
        assert_eq!(last[ss + 1], "10.000");
        assert_eq!(last.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn test_split_args_codecs() {
        let plan = segments(&[(0.0, 5.0)]);
        let dest = Path::new("out");

        let h264 = split_args(Path::new("in"), &plan[0], Codec::H264, OutputFormat::Mkv, dest);
        assert!(h264.windows(2).any(|w| w[0] == "-crf" && w[1] == "18"));
        assert!(h264.windows(2).any(|w| w[0] == "-f" && w[1] == "matroska"));

        let h265 = split_args(Path::new("in"), &plan[0], Codec::H265, OutputFormat::Mov, dest);
        assert!(h265.windows(2).any(|w| w[0] == "-crf" && w[1] == "20"));
        assert!(h265.windows(2).any(|w| w[0] == "-tag:v" && w[1] == "hvc1"));

        let h265_mkv = split_args(Path::new("in"), &plan[0], Codec::H265, OutputFormat::Mkv, dest);
        assert!(!h265_mkv.contains(&"hvc1".to_string()));

        let copy = split_args(Path::new("in"), &plan[0], Codec::Copy, OutputFormat::Mp4, dest);
        assert!(copy.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
    }

    #[test]
    fn test_partial_failure_keeps_numbering_contiguous() {
        let temp_dir = TempDir::new().unwrap();
        let plan = segments(&[(0.0, 5.0), (5.0, 10.0), (10.0, 15.0)]);
        let engine = ScriptedEngine::new(vec![true, false, true]);
        let shutdown = AtomicBool::new(false);

        let mut finished = Vec::new();
        let report = split(&engine, &request(&plan, temp_dir.path()), None, &shutdown, |s, r| {
            finished.push((s.index, r.is_success()));
        })
        .unwrap();

        assert_eq!(report.produced(), 2);
        assert!(!report.cancelled);
        assert!(report.aborted.is_none());
        assert_eq!(
            report.results[&1],
            SegmentResult::Failed {
                kind: ErrorKind::SplitSegmentFailed,
                reason: "boom".into()
            }
        );
        assert_eq!(finished, vec![(0, true), (1, false), (2, true)]);
        assert_eq!(dir_names(temp_dir.path()), vec!["scene_001.mp4", "scene_002.mp4"]);
    }

    #[test]
    fn test_existing_outputs_from_previous_run() {
        let temp_dir = TempDir::new().unwrap();
        for name in [
            "scene_001.mp4",
            "scene_007.mp4",
            "scene_01.mp4",
            "scene_abc.mp4",
            "scene_002.mkv",
            "other_001.mp4",
        ] {
            fs::write(temp_dir.path().join(name), b"old").unwrap();
        }

        let found = existing_outputs(temp_dir.path(), "scene", OutputFormat::Mp4);
        assert_eq!(
            found,
            vec![
                temp_dir.path().join("scene_001.mp4"),
                temp_dir.path().join("scene_007.mp4"),
            ]
        );
        let missing = temp_dir.path().join("missing");
        assert!(existing_outputs(&missing, "scene", OutputFormat::Mp4).is_empty());
    }

    #[test]
    fn test_cancellation_marks_remaining_segments() {
        let temp_dir = TempDir::new().unwrap();
        let plan = segments(&[(0.0, 5.0), (5.0, 10.0), (10.0, 15.0)]);
        let engine = ScriptedEngine::new(vec![]);
        let shutdown = AtomicBool::new(false);

        let report = split(&engine, &request(&plan, temp_dir.path()), None, &shutdown, |_, _| {
            shutdown.store(true, Ordering::SeqCst);
        })
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.produced(), 1);
        assert_eq!(
            report.results[&2],
            SegmentResult::Failed {
                kind: ErrorKind::Cancelled,
                reason: CANCELLED_REASON.to_string()
            }
        );
        assert_eq!(dir_names(temp_dir.path()), vec!["scene_001.mp4"]);
    }

    #[test]
    fn test_empty_output_is_a_failure_and_scratch_is_removed() {
        struct SilentEngine;
        impl MediaEngine for SilentEngine {
            fn invoke(&self, _: &Invocation) -> std::result::Result<EngineOutput, EngineError> {
                Ok(EngineOutput {
                    exit_code: Some(0),
                    ..EngineOutput::default()
                })
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let plan = segments(&[(0.0, 5.0)]);
        let shutdown = AtomicBool::new(false);
        let report =
            split(&SilentEngine, &request(&plan, temp_dir.path()), None, &shutdown, |_, _| {}).unwrap();

        assert_eq!(report.produced(), 0);
        assert!(dir_names(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_engine_deadline_aborts_with_timeout() {
        struct SlowEngine;
        impl MediaEngine for SlowEngine {
            fn invoke(&self, _: &Invocation) -> std::result::Result<EngineOutput, EngineError> {
                Err(EngineError::DeadlineExceeded {
                    program: "ffmpeg".into(),
                })
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let plan = segments(&[(0.0, 5.0), (5.0, 8.0)]);
        let shutdown = AtomicBool::new(false);
        let deadline = Deadline::start(Some(std::time::Duration::from_secs(60)));
        let report =
            split(&SlowEngine, &request(&plan, temp_dir.path()), deadline, &shutdown, |_, _| {})
                .unwrap();

        assert_eq!(report.aborted, Some(SplitError::Timeout { seconds: 60 }));
        assert_eq!(report.results.len(), 2);
        assert!(dir_names(temp_dir.path()).is_empty());
    }
}
