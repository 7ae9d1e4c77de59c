use super::report::{REPORT_FILE_NAME, write_report};
use super::runner::{
    PreparedRun, default_output_root, execute, prepare_file, prepare_folder, print_summary,
};
use crate::config::{Config, RawSettings};
use crate::tools::{
    DiscoveryResult, MediaEngine, ProcessEngine, SystemSpaceProbe, ensure_directory_exists,
    scan_video_files,
    validate_directory_exists,
};
use anyhow::{Result, bail};
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, MultiSelect};
use log::{error, info};
use rust_i18n::t;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// 互動模式的輸入選擇方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    SingleFile,
    SelectFromFolder,
    WholeFolder,
}

/// 場景切割（互動模式）
///
/// 流程：
/// A. 選擇輸入與輸出位置
/// B. 掃描並探測影片
/// C. 批次偵測、規劃、切割
/// D. 顯示摘要並寫入 JSON 報告
pub struct SceneSplitter {
    config: Config,
    shutdown_signal: Arc<AtomicBool>,
}

impl SceneSplitter {
    pub const fn new(config: Config, shutdown_signal: Arc<AtomicBool>) -> Self {
        Self {
            config,
            shutdown_signal,
        }
    }

    pub fn run(&self, mode: SplitMode) -> Result<()> {
        println!("{}", style(t!("splitter.title")).cyan().bold());

        let settings = Arc::new(self.config.resolve(&RawSettings::new())?);

        let process_engine = ProcessEngine::default();
        if !process_engine.is_available() {
            bail!("{}", t!("splitter.ffmpeg_missing"));
        }
        let engine: Arc<dyn MediaEngine> = Arc::new(process_engine);

        let Some(input) = self.prompt_path(&t!("splitter.prompt_input"), None)? else {
            return Ok(());
        };

        let default_output = default_output_root(&input);
        let Some(output_root) =
            self.prompt_path(&t!("splitter.prompt_output"), Some(&default_output))?
        else {
            return Ok(());
        };

        let prepared = match mode {
            SplitMode::SingleFile => prepare_file(&input, &output_root)?,
            SplitMode::WholeFolder => {
                let discovery = self.discover(engine.as_ref(), &input)?;
                prepare_folder(discovery, &output_root)
            }
            SplitMode::SelectFromFolder => {
                let discovery = self.discover(engine.as_ref(), &input)?;
                let Some(discovery) = self.select_files(discovery)? else {
                    return Ok(());
                };
                prepare_folder(discovery, &output_root)
            }
        };

        if prepared.specs.is_empty() {
            println!("{}", style(t!("splitter.no_files")).yellow());
            return Ok(());
        }

        self.print_plan(&prepared);

        let result = match execute(
            engine,
            Arc::new(SystemSpaceProbe),
            Arc::clone(&self.shutdown_signal),
            prepared,
            settings,
            true,
        ) {
            Ok(result) => result,
            Err(e) => {
                error!("批次中止: {e}");
                bail!(e);
            }
        };

        print_summary(&result);

        ensure_directory_exists(&output_root)?;
        let report_path = output_root.join(REPORT_FILE_NAME);
        write_report(&result, &report_path)?;
        println!(
            "\n{} {}",
            style(t!("splitter.report_written")).dim(),
            report_path.display()
        );
        info!("場景切割完成，報告: {}", report_path.display());

        Ok(())
    }

    /// ESC 或空白輸入回傳 `None`
    fn prompt_path(&self, prompt: &str, default: Option<&Path>) -> Result<Option<PathBuf>> {
        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme).with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.display().to_string());
        }
        let raw = input.allow_empty(true).interact_text()?;
        let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(trimmed)))
    }

    fn discover(&self, engine: &dyn MediaEngine, directory: &Path) -> Result<DiscoveryResult> {
        validate_directory_exists(directory)?;
        println!("{}", style(t!("splitter.scanning")).dim());
        let discovery = scan_video_files(engine, directory)?;
        if !discovery.skipped.is_empty() {
            println!(
                "{}",
                style(t!("splitter.skipped", count = discovery.skipped.len())).yellow()
            );
        }
        Ok(discovery)
    }

    fn select_files(&self, mut discovery: DiscoveryResult) -> Result<Option<DiscoveryResult>> {
        if discovery.files.is_empty() {
            return Ok(Some(discovery));
        }

        let items: Vec<String> = discovery
            .files
            .iter()
            .map(|f| {
                format!(
                    "{} ({:.2} MB, {:.1}s)",
                    f.path.file_name().unwrap_or_default().to_string_lossy(),
                    f.size as f64 / 1024.0 / 1024.0,
                    f.duration_seconds
                )
            })
            .collect();

        let Some(chosen) = MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("splitter.prompt_select"))
            .items(&items)
            .interact_opt()?
        else {
            return Ok(None);
        };

        let mut index = 0;
        discovery.files.retain(|_| {
            let keep = chosen.contains(&index);
            index += 1;
            keep
        });
        Ok(Some(discovery))
    }

    fn print_plan(&self, prepared: &PreparedRun) {
        println!(
            "{}",
            style(t!("splitter.found", count = prepared.specs.len())).green()
        );
        for spec in &prepared.specs {
            println!(
                "  {}. {} ({:.2} MB) -> {}",
                spec.id + 1,
                spec.input_path.file_name().unwrap_or_default().to_string_lossy(),
                spec.input_size as f64 / 1024.0 / 1024.0,
                spec.output_dir.display()
            );
        }
        println!();
    }
}
