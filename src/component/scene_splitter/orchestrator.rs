//! 批次排程
//!
//! 固定大小的 rayon 執行緒池，每個 worker 從共用的 FIFO 佇列依序取出工作並執行到結束。
//! 結果只經由 `BatchAccumulator` 彙整；取消時尚未開始的工作回報為 `Cancelled`。

use super::events::EventSink;
use super::job::{Job, JobContext, JobOutcome, JobSpec, JobSummary};
use super::preflight;
use super::report::{BatchCounts, BatchResult};
use crate::config::Settings;
use crate::error::{Result, SplitError};
use crate::tools::{MediaEngine, SpaceProbe};
use log::{info, warn};
use rayon::ThreadPoolBuilder;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// 依提交順序建立工作
///
/// 資料夾模式下每個輸入寫到 `output_root/<檔名>/`，不同輸入的輸出不會互相覆蓋
#[must_use]
pub fn job_specs(inputs: &[(PathBuf, u64)], output_root: &Path, per_input_dir: bool) -> Vec<JobSpec> {
    let mut used = HashSet::new();

    inputs
        .iter()
        .enumerate()
        .map(|(id, (path, size))| {
            let output_dir = if per_input_dir {
                output_root.join(unique_dir_name(path, &mut used))
            } else {
                output_root.to_path_buf()
            };
            JobSpec {
                id,
                input_path: path.clone(),
                output_dir,
                input_size: *size,
            }
        })
        .collect()
}

/// 同名不同副檔名時加上副檔名區分，例如 `clip` 與 `clip_mkv`
///
/// 以小寫比較，不分大小寫的檔案系統上 `Clip` 與 `clip` 也不會共用目錄
fn unique_dir_name(path: &Path, used: &mut HashSet<String>) -> String {
    let stem = path
        .file_stem()
        .map_or_else(|| "input".to_string(), |s| s.to_string_lossy().into_owned());
    if used.insert(stem.to_lowercase()) {
        return stem;
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let mut candidate = format!("{stem}_{ext}");
    let mut n = 2;
    while !used.insert(candidate.to_lowercase()) {
        candidate = format!("{stem}_{ext}_{n}");
        n += 1;
    }
    candidate
}

/// 多個 worker 共用的彙整器；worker 不直接修改 `BatchResult`
struct BatchAccumulator {
    counts: BatchCounts,
    summaries: Vec<Option<JobSummary>>,
}

impl BatchAccumulator {
    fn new(total: usize) -> Self {
        Self {
            counts: BatchCounts::default(),
            summaries: vec![None; total],
        }
    }

    fn record(&mut self, slot: usize, summary: JobSummary) {
        self.counts.record(summary.outcome);
        self.summaries[slot] = Some(summary);
    }
}

pub struct BatchOrchestrator {
    engine: Arc<dyn MediaEngine>,
    space: Arc<dyn SpaceProbe>,
    shutdown: Arc<AtomicBool>,
    events: EventSink,
}

impl BatchOrchestrator {
    #[must_use]
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        space: Arc<dyn SpaceProbe>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            engine,
            space,
            shutdown,
            events: EventSink::disabled(),
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// 執行整個批次
    ///
    /// 只有批次空間檢查失敗會在任何工作開始前回傳錯誤；工作失敗只反映在結果中
    pub fn run(&self, jobs: Vec<JobSpec>, settings: Arc<Settings>) -> Result<BatchResult> {
        let started = Instant::now();
        if jobs.is_empty() {
            return Ok(BatchResult::empty());
        }

        self.batch_preflight(&jobs)?;

        let total = jobs.len();
        let workers = settings.max_workers().min(total).max(1);
        info!("開始批次處理 {total} 個檔案，{workers} 個 worker");
        if !settings.codec().is_frame_accurate() {
            info!("codec=copy：切點會對齊最近的關鍵影格，不保證精確到影格");
        }

        let specs: Vec<JobSpec> = jobs.clone();
        let queue: Mutex<VecDeque<(usize, JobSpec)>> =
            Mutex::new(jobs.into_iter().enumerate().collect());
        let accumulator = Mutex::new(BatchAccumulator::new(total));

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("scene-worker-{i}"))
            .build()
            .map_err(|e| SplitError::Io(format!("無法建立執行緒池: {e}")))?;

        pool.scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|_| self.worker_loop(&queue, &accumulator, &settings));
            }
        });

        let accumulator = accumulator
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut counts = accumulator.counts;
        let jobs: Vec<JobSummary> = accumulator
            .summaries
            .into_iter()
            .zip(&specs)
            .map(|(summary, spec)| {
                summary.unwrap_or_else(|| {
                    counts.record(JobOutcome::Cancelled);
                    JobSummary::not_started(spec)
                })
            })
            .collect();

        let cancelled = self.shutdown.load(Ordering::SeqCst);
        if cancelled {
            warn!("批次已取消，{} 個工作未開始", counts.cancelled);
        }

        let result = BatchResult {
            counts,
            elapsed: started.elapsed(),
            jobs,
            skipped_inputs: Vec::new(),
            events_dropped: self.events.dropped(),
            cancelled,
        };

        info!(
            "批次完成 - 成功: {}, 部分成功: {}, 失敗: {}, 取消: {}",
            result.counts.succeeded,
            result.counts.partially_succeeded,
            result.counts.failed,
            result.counts.cancelled
        );

        Ok(result)
    }

    /// 所需空間以最大的輸入計算，對每個輸出位置檢查一次
    fn batch_preflight(&self, jobs: &[JobSpec]) -> Result<()> {
        let sizes: Vec<u64> = jobs.iter().map(|j| j.input_size).collect();
        let required = preflight::required_bytes(&sizes);
        let roots: BTreeSet<PathBuf> = jobs.iter().map(|j| j.output_dir.clone()).collect();

        for root in roots {
            preflight::check(required, &root, self.space.as_ref())?;
        }
        Ok(())
    }

    fn worker_loop(
        &self,
        queue: &Mutex<VecDeque<(usize, JobSpec)>>,
        accumulator: &Mutex<BatchAccumulator>,
        settings: &Arc<Settings>,
    ) {
        let ctx = JobContext {
            engine: self.engine.as_ref(),
            space: self.space.as_ref(),
            events: &self.events,
            shutdown: &self.shutdown,
        };

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let next = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some((slot, spec)) = next else {
                break;
            };

            let summary = Job::new(spec, Arc::clone(settings)).run(&ctx);

            accumulator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(slot, summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, size: u64) -> (PathBuf, u64) {
        (PathBuf::from(path), size)
    }

    #[test]
    fn test_job_specs_single_file_uses_output_root() {
        let specs = job_specs(&[file("/in/a.mp4", 5)], Path::new("/out"), false);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].output_dir, PathBuf::from("/out"));
        assert_eq!(specs[0].input_size, 5);
    }

    #[test]
    fn test_job_specs_per_input_dirs_never_collide() {
        let files = [
            file("/in/clip.mp4", 1),
            file("/in/clip.mkv", 2),
            file("/in/other.mov", 3),
            file("/in/clip.MKV", 4),
        ];
        let specs = job_specs(&files, Path::new("/out"), true);
        let dirs: Vec<PathBuf> = specs.iter().map(|s| s.output_dir.clone()).collect();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/out/clip"),
                PathBuf::from("/out/clip_mkv"),
                PathBuf::from("/out/other"),
                PathBuf::from("/out/clip_mkv_2"),
            ]
        );
        let ids: Vec<usize> = specs.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_job_specs_stems_differing_only_in_case() {
        let files = [
            file("/in/Clip.mp4", 1),
            file("/in/clip.mov", 2),
            file("/in/CLIP.MOV", 3),
        ];
        let specs = job_specs(&files, Path::new("/out"), true);
        let dirs: Vec<PathBuf> = specs.iter().map(|s| s.output_dir.clone()).collect();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/out/Clip"),
                PathBuf::from("/out/clip_mov"),
                PathBuf::from("/out/CLIP_mov_2"),
            ]
        );
    }
}
