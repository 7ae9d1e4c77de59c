use crate::component::{SceneSplitter, SplitMode};
use crate::config::Config;
use crate::pause;
use anyhow::Result;
use console::{Term, style};
use rust_i18n::t;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub fn run_scene_splitter(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &Config,
    mode: SplitMode,
) -> Result<()> {
    // 上一次執行的取消不影響這一次
    shutdown_signal.store(false, Ordering::SeqCst);

    let splitter = SceneSplitter::new(config.clone(), Arc::clone(shutdown_signal));

    if let Err(e) = splitter.run(mode) {
        eprintln!("{} {:#}", style(t!("common.error_prefix")).red().bold(), e);
    }

    pause(term)?;
    Ok(())
}
