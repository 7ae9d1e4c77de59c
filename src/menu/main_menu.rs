use crate::component::SplitMode;
use crate::config::Config;
use crate::menu::handlers::run_scene_splitter;
use crate::menu::settings_menu::{show_language_menu, show_settings_menu, show_settings_preview};
use anyhow::Result;
use console::{Term, style};
use dialoguer::Select;
use dialoguer::theme::ColorfulTheme;
use rust_i18n::t;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// 顯示主選單；回傳 `false` 代表離開程式
pub fn show_main_menu(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &mut Config,
) -> Result<bool> {
    term.clear_screen()?;

    println!("{}", style(t!("main_menu.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let options = vec![
        t!("main_menu.opt_single"),
        t!("main_menu.opt_select"),
        t!("main_menu.opt_folder"),
        t!("main_menu.opt_settings"),
        t!("main_menu.opt_preview"),
        t!("main_menu.opt_language"),
        t!("main_menu.exit"),
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("main_menu.prompt"))
        .items(&options)
        .default(0)
        .interact_on_opt(term)?;

    match selection {
        Some(0) => run_scene_splitter(term, shutdown_signal, config, SplitMode::SingleFile)?,
        Some(1) => run_scene_splitter(term, shutdown_signal, config, SplitMode::SelectFromFolder)?,
        Some(2) => run_scene_splitter(term, shutdown_signal, config, SplitMode::WholeFolder)?,
        Some(3) => show_settings_menu(term, config)?,
        Some(4) => show_settings_preview(term, config)?,
        Some(5) => show_language_menu(term, config)?,
        // ESC 或離開
        _ => return Ok(false),
    }

    Ok(true)
}
