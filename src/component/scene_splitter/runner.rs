//! 選單與命令列共用的執行流程：整理輸入、顯示進度、輸出摘要

use super::events::{DEFAULT_EVENT_CAPACITY, EventSink, ProgressEvent};
use super::job::{JobOutcome, JobSpec, JobStatus};
use super::orchestrator::{BatchOrchestrator, job_specs};
use super::report::BatchResult;
use crate::config::Settings;
use crate::error::Result as SplitResult;
use crate::tools::{
    CpuMonitor, DiscoveryResult, MediaEngine, SpaceProbe, validate_file_exists,
};
use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rust_i18n::t;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

/// 已整理好的工作清單
#[derive(Debug, Default)]
pub struct PreparedRun {
    pub specs: Vec<JobSpec>,
    pub skipped: Vec<PathBuf>,
}

/// 單一檔案：輸出直接寫到 `output_root`
///
/// 不在這裡探測，無法開啟的檔案由工作本身回報 `UnsupportedInput`
pub fn prepare_file(path: &Path, output_root: &Path) -> Result<PreparedRun> {
    validate_file_exists(path)?;
    let size = fs::metadata(path)
        .with_context(|| format!("無法讀取檔案資訊: {}", path.display()))?
        .len();

    Ok(PreparedRun {
        specs: job_specs(&[(path.to_path_buf(), size)], output_root, false),
        skipped: Vec::new(),
    })
}

/// 資料夾：每個輸入寫到 `output_root/<檔名>/`
#[must_use]
pub fn prepare_folder(discovery: DiscoveryResult, output_root: &Path) -> PreparedRun {
    let inputs: Vec<(PathBuf, u64)> = discovery
        .files
        .into_iter()
        .map(|file| (file.path, file.size))
        .collect();

    PreparedRun {
        specs: job_specs(&inputs, output_root, true),
        skipped: discovery.skipped,
    }
}

/// 未指定輸出位置時的預設值
#[must_use]
pub fn default_output_root(input: &Path) -> PathBuf {
    if input.is_dir() {
        return input.join("scenes");
    }
    let stem = input
        .file_stem()
        .map_or_else(|| "video".to_string(), |s| s.to_string_lossy().into_owned());
    input
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{stem}_scenes"))
}

/// 執行批次；`show_progress` 時以進度條顯示事件
pub fn execute(
    engine: Arc<dyn MediaEngine>,
    space: Arc<dyn SpaceProbe>,
    shutdown: Arc<AtomicBool>,
    prepared: PreparedRun,
    settings: Arc<Settings>,
    show_progress: bool,
) -> SplitResult<BatchResult> {
    let total = prepared.specs.len();
    let (events, display) = if show_progress {
        let (events, receiver) = EventSink::channel(DEFAULT_EVENT_CAPACITY);
        (events, Some(spawn_progress_display(receiver, total)))
    } else {
        (EventSink::disabled(), None)
    };

    let orchestrator =
        BatchOrchestrator::new(engine, space, shutdown).with_events(events);
    let result = orchestrator.run(prepared.specs, settings);

    // 送出端全部釋放後進度執行緒才會結束
    drop(orchestrator);
    if let Some(handle) = display {
        let _ = handle.join();
    }

    let mut result = result?;
    result.skipped_inputs = prepared.skipped;
    Ok(result)
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("#>-"))
}

fn spawn_progress_display(receiver: Receiver<ProgressEvent>, total: usize) -> JoinHandle<()> {
    thread::spawn(move || {
        let progress_bar = ProgressBar::new(total as u64);
        progress_bar.set_style(progress_style());

        let mut cpu_monitor = CpuMonitor::new();
        let mut names: HashMap<usize, String> = HashMap::new();

        for event in receiver {
            let message = match event {
                ProgressEvent::JobStarted { job_id, input_path } => {
                    let name = input_path
                        .file_name()
                        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
                    let message = format!("{name}: {}", t!("progress.started"));
                    names.insert(job_id, name);
                    message
                }
                ProgressEvent::JobStageChanged { job_id, status } => {
                    format!("{}: {}", job_name(&names, job_id), stage_label(status))
                }
                ProgressEvent::SegmentFinished {
                    job_id,
                    index,
                    planned,
                    success,
                } => {
                    let mark = if success { "✓" } else { "✗" };
                    format!(
                        "{}: {mark} {}/{planned}",
                        job_name(&names, job_id),
                        index + 1
                    )
                }
                ProgressEvent::JobCompleted {
                    job_id,
                    status,
                    produced,
                    planned,
                } => {
                    progress_bar.inc(1);
                    format!(
                        "{}: {} ({produced}/{planned})",
                        job_name(&names, job_id),
                        stage_label(status)
                    )
                }
            };

            progress_bar.set_message(format!(
                "{message} | CPU {:.0}%",
                cpu_monitor.current_usage()
            ));
        }

        progress_bar.finish_and_clear();
    })
}

fn job_name(names: &HashMap<usize, String>, job_id: usize) -> &str {
    names.get(&job_id).map_or("?", String::as_str)
}

fn stage_label(status: JobStatus) -> String {
    match status {
        JobStatus::Pending => t!("progress.pending"),
        JobStatus::Detecting => t!("progress.detecting"),
        JobStatus::Planning => t!("progress.planning"),
        JobStatus::Splitting => t!("progress.splitting"),
        JobStatus::Succeeded => t!("progress.succeeded"),
        JobStatus::Failed => t!("progress.failed"),
    }
    .to_string()
}

/// 彩色摘要
pub fn print_summary(result: &BatchResult) {
    println!();
    println!("{}", style(t!("summary.title")).cyan().bold());

    for job in &result.jobs {
        let name = job
            .input_path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        let mark = match job.outcome {
            JobOutcome::Succeeded => style("✓").green(),
            JobOutcome::PartiallySucceeded => style("◐").yellow(),
            JobOutcome::Failed => style("✗").red(),
            JobOutcome::Cancelled => style("⤳").dim(),
        };
        println!(
            "  {mark} {name} ({}/{}) -> {}",
            job.produced_segments,
            job.planned_segments,
            job.output_dir.display()
        );
        if job.single_scene {
            println!("      {}", style(t!("summary.single_scene")).dim());
        }
        if let Some(error) = &job.error {
            println!("      {}", style(error).red());
        }
    }

    let counts = &result.counts;
    println!();
    println!(
        "  {} {}",
        t!("summary.succeeded"),
        style(counts.succeeded).green()
    );
    if counts.partially_succeeded > 0 {
        println!(
            "  {} {}",
            t!("summary.partial"),
            style(counts.partially_succeeded).yellow()
        );
    }
    if counts.failed > 0 {
        println!("  {} {}", t!("summary.failed"), style(counts.failed).red());
    }
    if counts.cancelled > 0 {
        println!(
            "  {} {}",
            t!("summary.cancelled"),
            style(counts.cancelled).dim()
        );
    }
    if !result.skipped_inputs.is_empty() {
        println!(
            "  {} {}",
            t!("summary.skipped"),
            style(result.skipped_inputs.len()).dim()
        );
    }
    println!(
        "  {} {}/{}",
        t!("summary.segments"),
        result.produced_segments(),
        result.planned_segments()
    );
    println!(
        "  {} {:.1}s",
        t!("summary.elapsed"),
        result.elapsed.as_secs_f64()
    );
    if result
        .jobs
        .iter()
        .any(|job| job.keyframe_snapped && job.produced_segments > 0)
    {
        println!("  {}", style(t!("summary.keyframe_snapped")).dim());
    }
}
