use super::job::{JobOutcome, JobSummary};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 互動模式固定寫入輸出根目錄的報告檔名
pub const REPORT_FILE_NAME: &str = "scene_split_report.json";

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_JOB_FAILED: i32 = 1;
/// 任何工作開始前即中止（設定錯誤、空間不足、路徑錯誤）
pub const EXIT_ABORTED: i32 = 2;
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    /// 含部分成功
    pub succeeded: usize,
    pub partially_succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchCounts {
    pub fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Succeeded => self.succeeded += 1,
            JobOutcome::PartiallySucceeded => {
                self.succeeded += 1;
                self.partially_succeeded += 1;
            }
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub counts: BatchCounts,
    #[serde(serialize_with = "serialize_elapsed")]
    pub elapsed: Duration,
    /// 依提交順序
    pub jobs: Vec<JobSummary>,
    /// 探測失敗而排除的候選檔
    pub skipped_inputs: Vec<PathBuf>,
    pub events_dropped: u64,
    /// 執行期間收到取消信號
    pub cancelled: bool,
}

fn serialize_elapsed<S: serde::Serializer>(
    elapsed: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(elapsed.as_secs_f64())
}

impl BatchResult {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            counts: BatchCounts::default(),
            elapsed: Duration::ZERO,
            jobs: Vec::new(),
            skipped_inputs: Vec::new(),
            events_dropped: 0,
            cancelled: false,
        }
    }

    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.cancelled {
            EXIT_CANCELLED
        } else if self.counts.failed > 0 {
            EXIT_JOB_FAILED
        } else {
            EXIT_SUCCESS
        }
    }

    /// 各工作的成功片段總數
    #[must_use]
    pub fn produced_segments(&self) -> usize {
        self.jobs.iter().map(|j| j.produced_segments).sum()
    }

    #[must_use]
    pub fn planned_segments(&self) -> usize {
        self.jobs.iter().map(|j| j.planned_segments).sum()
    }
}

/// 將批次結果寫成 JSON 報告
pub fn write_report(result: &BatchResult, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("無法序列化批次報告")?;
    fs::write(path, json).with_context(|| format!("無法寫入報告: {}", path.display()))?;
    Ok(())
}
