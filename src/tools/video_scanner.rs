use crate::tools::engine::MediaEngine;
use crate::tools::ffprobe_info::probe_media;
use anyhow::{Context, Result};
use log::{debug, info};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 資料夾模式下視為候選的副檔名
pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "mkv", "avi", "wmv"];

#[derive(Debug, Clone)]
pub struct VideoFileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub duration_seconds: f64,
}

/// 資料夾掃描結果
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub files: Vec<VideoFileInfo>,
    /// 副檔名符合但無法以媒體串流開啟的檔案
    pub skipped: Vec<PathBuf>,
}

#[must_use]
pub fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        })
}

/// 取得單一影片的大小與長度；無法開啟時回傳錯誤
pub fn describe_video_file(engine: &dyn MediaEngine, path: &Path) -> Result<VideoFileInfo> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("無法讀取檔案資訊: {}", path.display()))?;
    let info = probe_media(engine, path, None)?;

    Ok(VideoFileInfo {
        path: path.to_path_buf(),
        size: metadata.len(),
        duration_seconds: info.duration_seconds,
    })
}

/// 掃描資料夾（不遞迴）中的影片檔
///
/// 無法開啟的檔案不視為錯誤，只計入 `skipped`。結果依檔名排序。
pub fn scan_video_files(engine: &dyn MediaEngine, directory: &Path) -> Result<DiscoveryResult> {
    let mut candidates: Vec<PathBuf> = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_video_extension(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();

    candidates.sort();

    let probed: Vec<(PathBuf, Option<VideoFileInfo>)> = candidates
        .into_par_iter()
        .map(|path| {
            let info = describe_video_file(engine, &path)
                .map_err(|e| debug!("略過無法開啟的檔案 {}: {e:#}", path.display()))
                .ok();
            (path, info)
        })
        .collect();

    let mut result = DiscoveryResult::default();
    for (path, info) in probed {
        match info {
            Some(info) => result.files.push(info),
            None => result.skipped.push(path),
        }
    }

    info!(
        "掃描 {}: {} 個影片，略過 {} 個",
        directory.display(),
        result.files.len(),
        result.skipped.len()
    );

    Ok(result)
}
