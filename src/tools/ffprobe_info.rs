use crate::tools::engine::{Invocation, MediaEngine, Tool};
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

#[derive(Deserialize)]
struct FfprobeOutput {
    format: Option<FormatInfo>,
    streams: Option<Vec<StreamInfo>>,
}

#[derive(Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[must_use]
pub fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-print_format".into(),
        "json".into(),
        "-show_format".into(),
        "-show_streams".into(),
        path.to_string_lossy().into_owned(),
    ]
}

/// 使用 ffprobe 取得影片資訊
///
/// 也作為「能否以媒體串流開啟」的檢查：失敗代表輸入不受支援
pub fn probe_media(
    engine: &dyn MediaEngine,
    path: &Path,
    deadline: Option<Instant>,
) -> Result<MediaInfo> {
    let output = engine
        .invoke(&Invocation::new(Tool::Ffprobe, probe_args(path)).with_deadline(deadline))
        .with_context(|| format!("無法執行 ffprobe: {}", path.display()))?;

    if !output.success() {
        bail!("ffprobe 執行失敗: {}", output.stderr_tail(3));
    }

    parse_probe_json(&output.stdout_lines.join("\n"))
        .with_context(|| format!("無法解析 ffprobe 輸出: {}", path.display()))
}

fn parse_probe_json(json: &str) -> Result<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_str(json)?;

    // 找到視訊串流
    let video_stream = probe
        .streams
        .as_ref()
        .and_then(|streams| {
            streams
                .iter()
                .find(|s| s.codec_type.as_deref() == Some("video"))
        })
        .ok_or_else(|| anyhow!("找不到視訊串流"))?;

    let width = video_stream
        .width
        .ok_or_else(|| anyhow!("無法取得影片寬度"))?;
    let height = video_stream
        .height
        .ok_or_else(|| anyhow!("無法取得影片高度"))?;

    // 影片長度：優先從 format，其次從 stream
    let duration_seconds = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .or(video_stream.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| anyhow!("無法取得影片長度"))?;

    let frame_rate = video_stream
        .r_frame_rate
        .as_ref()
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(30.0);

    Ok(MediaInfo {
        duration_seconds,
        width,
        height,
        frame_rate,
    })
}

/// 解析幀率字串（例如 "30/1" 或 "30000/1001"）
fn parse_frame_rate(rate: &str) -> Option<f64> {
    if let Some((num_str, den_str)) = rate.split_once('/') {
        let num: f64 = num_str.parse().ok()?;
        let den: f64 = den_str.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"codec_type": "audio", "r_frame_rate": "0/0"},
            {"codec_type": "video", "width": 1920, "height": 1080,
             "r_frame_rate": "30000/1001", "duration": "12.5"}
        ],
        "format": {"duration": "12.533"}
    }"#;

    #[test]
    fn test_parse_probe_json() {
        let info = parse_probe_json(SAMPLE).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!((info.duration_seconds - 12.533).abs() < 1e-9);
        assert!((info.frame_rate - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_json_without_video_stream() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        assert!(parse_probe_json(json).is_err());
    }

    #[test]
    fn test_parse_probe_json_zero_duration() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 2, "height": 2}],
                       "format": {"duration": "0.000"}}"#;
        assert!(parse_probe_json(json).is_err());
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("30/0").is_none());
        assert!(parse_frame_rate("invalid").is_none());
    }
}
