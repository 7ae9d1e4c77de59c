//! 場景切點規劃
//!
//! 將偵測到的場景變換點轉換為連續、不重疊且符合最短長度的片段清單。
//! 純函式，不做任何 I/O。

use super::boundary_detector::Boundary;
use serde::Serialize;

/// 浮點時間比較的容許誤差（秒）
pub const TIMESTAMP_EPSILON: f64 = 0.001;

/// 規劃後的片段，`[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub index: usize,
    pub start: f64,
    /// 最後一段等於影片總長（讀到串流結尾）
    pub end: f64,
    /// 產生此切點的場景變換點；最後一段為 `None`
    pub source_boundary: Option<Boundary>,
}

impl Segment {
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// 最後一段沒有來源切點，一路讀到串流結尾
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.source_boundary.is_none()
    }
}

/// 規劃片段
///
/// 依時間順序走訪切點，只有距離上一個切點至少 `min_duration` 時才切；
/// 太近的切點直接捨棄。尾段永遠保留，即使短於 `min_duration`。
#[must_use]
pub fn plan(boundaries: &[Boundary], total_duration: f64, min_duration: f64) -> Vec<Segment> {
    let total_duration = total_duration.max(0.0);

    let mut ordered: Vec<&Boundary> = boundaries
        .iter()
        .filter(|b| b.timestamp.is_finite() && b.timestamp < total_duration - TIMESTAMP_EPSILON)
        .collect();
    ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut segments = Vec::with_capacity(ordered.len() + 1);
    let mut cursor = 0.0;

    for boundary in ordered {
        if boundary.timestamp - cursor + TIMESTAMP_EPSILON < min_duration {
            continue;
        }

        segments.push(Segment {
            index: segments.len(),
            start: cursor,
            end: boundary.timestamp,
            source_boundary: Some(boundary.clone()),
        });
        cursor = boundary.timestamp;
    }

    segments.push(Segment {
        index: segments.len(),
        start: cursor,
        end: total_duration,
        source_boundary: None,
    });

    segments
}

/// 規劃結果是否少於兩個場景（整段視為單一場景）
#[must_use]
pub fn is_single_scene(segments: &[Segment]) -> bool {
    segments.len() < 2
}
