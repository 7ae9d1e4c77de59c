//! 非互動的命令列介面
//!
//! 不帶參數時啟動選單；`split` 子命令直接執行並以結束碼回報結果。

use crate::component::scene_splitter::report::{EXIT_ABORTED, write_report};
use crate::component::scene_splitter::runner::{
    default_output_root, execute, prepare_file, prepare_folder, print_summary,
};
use crate::config::types::{
    KEY_CODEC, KEY_DETECTION_METHOD, KEY_JOB_TIMEOUT_SECS, KEY_MAX_WORKERS, KEY_MIN_DURATION,
    KEY_OUTPUT_FORMAT, KEY_SCENE_PREFIX, KEY_THRESHOLD,
};
use crate::config::{Config, RawSettings, Settings};
use crate::tools::{
    MediaEngine, ProcessEngine, SpaceProbe, SystemSpaceProbe, scan_video_files,
};
use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use console::style;
use log::error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

#[derive(Parser, Debug)]
#[command(
    name = "scene_splitter",
    version,
    about = "Split videos into scene files at detected content changes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split a video file, or every video in a folder, into scenes
    Split(SplitArgs),
}

#[derive(Parser, Debug, Default)]
pub struct SplitArgs {
    /// Input video file or folder
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output root (defaults to `<folder>/scenes` or `<name>_scenes`)
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Scene change threshold, 0.0 to 1.0 in steps of 0.1
    #[arg(long, value_name = "F")]
    pub threshold: Option<String>,

    /// Minimum scene length in seconds (1-300)
    #[arg(long = "min-duration", value_name = "SECS")]
    pub min_duration: Option<String>,

    /// Detection method: content or luminance
    #[arg(long, value_name = "METHOD")]
    pub method: Option<String>,

    /// Output container: mp4, mov or mkv
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Codec: copy, h264 or h265
    #[arg(long, value_name = "CODEC")]
    pub codec: Option<String>,

    /// Output file name prefix
    #[arg(long, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Number of files processed in parallel
    #[arg(long, value_name = "N")]
    pub workers: Option<String>,

    /// Per-file timeout in seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<String>,

    /// Write a JSON report to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

impl SplitArgs {
    /// 命令列指定的值，優先於環境變數與設定檔
    #[must_use]
    pub fn overrides(&self) -> RawSettings {
        [
            (KEY_THRESHOLD, &self.threshold),
            (KEY_MIN_DURATION, &self.min_duration),
            (KEY_DETECTION_METHOD, &self.method),
            (KEY_OUTPUT_FORMAT, &self.format),
            (KEY_CODEC, &self.codec),
            (KEY_SCENE_PREFIX, &self.prefix),
            (KEY_MAX_WORKERS, &self.workers),
            (KEY_JOB_TIMEOUT_SECS, &self.timeout),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
        .collect()
    }
}

/// 執行 `split` 子命令並回傳結束碼
pub fn run_split(args: &SplitArgs, config: &Config, shutdown: Arc<AtomicBool>) -> i32 {
    match try_run_split(args, config, shutdown) {
        Ok(code) => code,
        Err(e) => {
            error!("執行中止: {e:#}");
            eprintln!("{} {e:#}", style("error:").red().bold());
            EXIT_ABORTED
        }
    }
}

fn try_run_split(args: &SplitArgs, config: &Config, shutdown: Arc<AtomicBool>) -> Result<i32> {
    let settings = Arc::new(config.resolve(&args.overrides())?);

    if !args.input.exists() {
        bail!("input does not exist: {}", args.input.display());
    }

    let process_engine = ProcessEngine::default();
    if !process_engine.is_available() {
        bail!("ffmpeg was not found on PATH");
    }
    run_with_engine(
        args,
        settings,
        Arc::new(process_engine),
        Arc::new(SystemSpaceProbe),
        shutdown,
    )
}

fn run_with_engine(
    args: &SplitArgs,
    settings: Arc<Settings>,
    engine: Arc<dyn MediaEngine>,
    space: Arc<dyn SpaceProbe>,
    shutdown: Arc<AtomicBool>,
) -> Result<i32> {
    let output_root = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_root(&args.input));

    let prepared = if args.input.is_dir() {
        prepare_folder(scan_video_files(engine.as_ref(), &args.input)?, &output_root)
    } else {
        prepare_file(&args.input, &output_root)?
    };

    let result = execute(engine, space, shutdown, prepared, settings, !args.quiet)?;

    if !args.quiet {
        print_summary(&result);
    }
    let code = result.exit_code();
    if let Some(report) = &args.report {
        // 批次已執行完畢，報告寫入失敗不改變結束碼
        if let Err(e) = write_report(&result, report) {
            error!("無法寫入報告 {}: {e:#}", report.display());
            eprintln!("{} {e:#}", style("error:").red().bold());
        }
    }

    Ok(code)
}
