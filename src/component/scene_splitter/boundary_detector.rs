use super::deadline::{Deadline, timeout_from_engine};
use crate::config::DetectionMethod;
use crate::error::{Result, SplitError};
use crate::tools::{EngineError, Invocation, MediaEngine, MediaInfo, Tool, probe_media};
use log::debug;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;

/// 場景變換點
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Boundary {
    pub timestamp: f64,
    /// 正規化到 0..1 的變化分數
    pub score: f64,
}

/// 分析前先縮小畫面以加速
pub const ANALYZE_SCALE_WIDTH: u32 = 320;

/// 相鄰切點小於此間隔（秒）視為同一個
const DEDUP_WINDOW: f64 = 0.001;

/// 各偵測方式在 `metadata=print` 中輸出的鍵與數值範圍
struct Metric {
    key: &'static str,
    scale: f64,
}

const fn metric(method: DetectionMethod) -> Metric {
    match method {
        DetectionMethod::Content => Metric {
            key: "lavfi.scene_score",
            scale: 1.0,
        },
        DetectionMethod::Luminance => Metric {
            key: "lavfi.signalstats.YDIF",
            scale: 255.0,
        },
    }
}

/// 建立場景分析用的濾鏡
///
/// 引擎端先以門檻預先篩選，減少輸出量；最後仍由 [`detect`] 再次套用門檻。
#[must_use]
pub fn detection_filter(threshold: f64, method: DetectionMethod) -> String {
    let metric = metric(method);
    let prefilter = format!("scale={ANALYZE_SCALE_WIDTH}:-2,format=yuv420p");

    match method {
        DetectionMethod::Content => format!(
            "{prefilter},select='gt(scene,{threshold})',metadata=print:key={}:file=-",
            metric.key
        ),
        DetectionMethod::Luminance => format!(
            "{prefilter},signalstats,metadata=select:key={key}:value={value}:function=greater,metadata=print:key={key}:file=-",
            key = metric.key,
            value = threshold * metric.scale
        ),
    }
}

#[must_use]
pub fn detection_args(input: &Path, threshold: f64, method: DetectionMethod) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-nostats".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-an".into(),
        "-sn".into(),
        "-dn".into(),
        "-vf".into(),
        detection_filter(threshold, method),
        "-f".into(),
        "null".into(),
        "-".into(),
    ]
}

/// 確認輸入能以媒體串流開啟，並取得總長度
///
/// 在偵測之前執行，壞掉的檔案可以立即失敗
pub fn probe(
    engine: &dyn MediaEngine,
    input: &Path,
    deadline: Option<Deadline>,
) -> Result<MediaInfo> {
    probe_media(engine, input, deadline.map(Deadline::instant)).map_err(|e| {
        if let Some(timeout) = e
            .downcast_ref::<EngineError>()
            .and_then(|engine_err| timeout_from_engine(engine_err, deadline))
        {
            return timeout;
        }
        SplitError::UnsupportedInput {
            path: input.display().to_string(),
            reason: format!("{e:#}"),
        }
    })
}

/// 偵測場景變換點，只保留分數大於 `threshold` 者，依時間嚴格遞增
pub fn detect(
    engine: &dyn MediaEngine,
    input: &Path,
    threshold: f64,
    method: DetectionMethod,
    deadline: Option<Deadline>,
) -> Result<Vec<Boundary>> {
    let invocation = Invocation::new(Tool::Ffmpeg, detection_args(input, threshold, method))
        .with_deadline(deadline.map(Deadline::instant));

    let output = engine.invoke(&invocation).map_err(|e| {
        timeout_from_engine(&e, deadline).unwrap_or_else(|| SplitError::DetectionFailed(e.to_string()))
    })?;

    if !output.success() {
        return Err(SplitError::DetectionFailed(format!(
            "engine exited with {}: {}",
            output
                .exit_code
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            output.stderr_tail(3)
        )));
    }

    let raw = parse_metadata_output(&output.stdout_lines, method)?;
    let boundaries = reconcile(raw, threshold);

    debug!(
        "偵測到 {} 個場景變換點 ({method}, threshold={threshold}): {}",
        boundaries.len(),
        input.display()
    );

    Ok(boundaries)
}

fn pts_time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"pts_time:(\S+)").expect("valid pts_time regex"))
}

fn value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z0-9_.]+)=(\S+)$").expect("valid metadata regex"))
}

/// 解析 `metadata=print` 輸出
///
/// 格式：
/// ```text
/// frame:42   pts:43008   pts_time:1.792
/// lavfi.scene_score=0.512
/// ```
fn parse_metadata_output(lines: &[String], method: DetectionMethod) -> Result<Vec<Boundary>> {
    let metric = metric(method);
    let mut boundaries = Vec::new();
    // None：尚未看到 frame 行；Some(None)：該 frame 沒有時間戳 (NOPTS)
    let mut current: Option<Option<f64>> = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = pts_time_regex().captures(line) {
            let raw = &caps[1];
            current = if raw.eq_ignore_ascii_case("NOPTS") {
                Some(None)
            } else {
                let timestamp = raw.parse::<f64>().map_err(|_| {
                    SplitError::DetectionFailed(format!("unparseable timestamp `{raw}`"))
                })?;
                Some(Some(timestamp))
            };
            continue;
        }

        let Some(caps) = value_regex().captures(line) else {
            debug!("略過無法辨識的輸出: {line}");
            continue;
        };
        if &caps[1] != metric.key {
            continue;
        }

        let raw_score = &caps[2];
        let score = raw_score
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite())
            .ok_or_else(|| SplitError::DetectionFailed(format!("unparseable score `{raw_score}`")))?;

        match current {
            None => {
                return Err(SplitError::DetectionFailed(format!(
                    "score `{line}` appears before any frame timestamp"
                )));
            }
            Some(None) => {}
            Some(Some(timestamp)) => boundaries.push(Boundary {
                timestamp,
                score: score / metric.scale,
            }),
        }
    }

    Ok(boundaries)
}

/// 門檻過濾、排序並去除重複時間點
fn reconcile(mut raw: Vec<Boundary>, threshold: f64) -> Vec<Boundary> {
    raw.retain(|b| b.score > threshold && b.timestamp >= 0.0);
    raw.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    raw.dedup_by(|later, earlier| later.timestamp - earlier.timestamp < DEDUP_WINDOW);
    raw
}
