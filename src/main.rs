use anyhow::Result;
use clap::Parser;
use console::{Term, style};
use log::{info, warn};
use rust_i18n::t;
use scene_splitter::cli::{Cli, Commands, run_split};
use scene_splitter::config::Config;
use scene_splitter::init;
use scene_splitter::menu::show_main_menu;
use scene_splitter::signal::setup_shutdown_signal;
use std::process::ExitCode;

#[macro_use]
extern crate rust_i18n;

i18n!("locales", fallback = "en-US");

fn main() -> Result<ExitCode> {
    init::init();
    let cli = Cli::parse();
    let shutdown_signal = setup_shutdown_signal()?;

    let mut config = Config::new()?;
    let language = config.language();
    rust_i18n::set_locale(language.as_str());

    if let Some(Commands::Split(args)) = cli.command {
        let code = run_split(&args, &config, shutdown_signal);
        info!("結束碼: {code}");
        return Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)));
    }

    let term = Term::stdout();
    loop {
        match show_main_menu(&term, &shutdown_signal, &mut config) {
            Ok(true) => {}
            Ok(false) => {
                term.clear_screen()?;
                println!("\n{}", style(t!("main_menu.goodbye")).green().bold());
                info!("程式正常結束");
                break;
            }
            Err(e) => {
                warn!("程式錯誤: {e}");
                eprintln!("{} {}", style(t!("common.error_prefix")).red().bold(), e);
                break;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
