use crate::config::save::update_setting;
use crate::config::types::{
    KEY_CODEC, KEY_DETECTION_METHOD, KEY_JOB_TIMEOUT_SECS, KEY_LANGUAGE, KEY_MAX_WORKERS,
    KEY_MIN_DURATION, KEY_OUTPUT_FORMAT, KEY_SCENE_PREFIX, KEY_THRESHOLD, MIN_DURATION_RANGE,
};
use crate::config::{Codec, Config, DetectionMethod, Language, OutputFormat, RawSettings};
use crate::pause;
use anyhow::Result;
use console::{Term, style};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use rust_i18n::t;
use std::time::Duration;

/// 可在選單中編輯的欄位（語言另有選單）
const EDITABLE_KEYS: [&str; 8] = [
    KEY_THRESHOLD,
    KEY_MIN_DURATION,
    KEY_DETECTION_METHOD,
    KEY_OUTPUT_FORMAT,
    KEY_CODEC,
    KEY_SCENE_PREFIX,
    KEY_MAX_WORKERS,
    KEY_JOB_TIMEOUT_SECS,
];

/// 目前生效的設定值；設定不合法時顯示原始值
fn current_values(config: &Config) -> RawSettings {
    match config.resolve(&RawSettings::new()) {
        Ok(settings) => settings.to_raw(),
        Err(_) => {
            let mut raw = config.persisted.clone();
            raw.extend(config.environment.clone());
            raw
        }
    }
}

/// 設定選單：逐項編輯、驗證並儲存
pub fn show_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    loop {
        term.clear_screen()?;

        println!("{}", style(t!("settings.title")).cyan().bold());
        println!("{}", style(t!("common.esc_hint")).dim());

        let values = current_values(config);
        let mut options: Vec<String> = EDITABLE_KEYS
            .iter()
            .map(|key| {
                format!(
                    "{:<18} {}",
                    key,
                    values.get(*key).map_or("", String::as_str)
                )
            })
            .collect();
        options.push(t!("settings.back").to_string());

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("settings.prompt"))
            .items(&options)
            .default(0)
            .interact_on_opt(term)?;

        let Some(index) = selection.filter(|&i| i < EDITABLE_KEYS.len()) else {
            break;
        };

        let key = EDITABLE_KEYS[index];
        let current = values.get(key).cloned().unwrap_or_default();
        let Some(value) = prompt_value(term, key, &current)? else {
            continue;
        };

        if value == current {
            continue;
        }

        match update_setting(config, key, &value) {
            Ok(()) => {
                println!("\n{} {key}={value}", style(t!("settings.saved")).green());
            }
            Err(e) => {
                println!(
                    "\n{} {e:#}",
                    style(t!("settings.invalid")).red().bold()
                );
            }
        }
        std::thread::sleep(Duration::from_secs(1));
    }

    Ok(())
}

/// 依欄位型別選擇輸入方式；ESC 回傳 `None`
fn prompt_value(term: &Term, key: &str, current: &str) -> Result<Option<String>> {
    let choices: Option<Vec<String>> = match key {
        KEY_THRESHOLD => Some((0..=10).map(|i| format!("{:.1}", f64::from(i) / 10.0)).collect()),
        KEY_DETECTION_METHOD => Some(DetectionMethod::ALL.iter().map(ToString::to_string).collect()),
        KEY_OUTPUT_FORMAT => Some(OutputFormat::ALL.iter().map(ToString::to_string).collect()),
        KEY_CODEC => Some(Codec::ALL.iter().map(ToString::to_string).collect()),
        _ => None,
    };

    if let Some(choices) = choices {
        let default_index = choices.iter().position(|c| c == current).unwrap_or(0);
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(key)
            .items(&choices)
            .default(default_index)
            .interact_on_opt(term)?;
        return Ok(selection.map(|i| choices[i].clone()));
    }

    let hint = match key {
        KEY_MIN_DURATION => format!(
            "{key} ({}-{})",
            MIN_DURATION_RANGE.0, MIN_DURATION_RANGE.1
        ),
        KEY_SCENE_PREFIX => format!("{key} [A-Za-z0-9_]"),
        KEY_JOB_TIMEOUT_SECS => format!("{key} ({})", t!("settings.timeout_hint")),
        _ => key.to_string(),
    };

    let value: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(hint)
        .default(current.to_string())
        .interact_text_on(term)?;
    Ok(Some(value.trim().to_string()))
}

/// 顯示目前生效的設定
pub fn show_settings_preview(term: &Term, config: &Config) -> Result<()> {
    term.clear_screen()?;
    println!("{}", style(t!("preview.title")).cyan().bold());
    println!(
        "{} {}\n",
        style(t!("preview.file")).dim(),
        config.settings_path.display()
    );

    match config.resolve(&RawSettings::new()) {
        Ok(settings) => {
            for (key, value) in settings.to_raw() {
                let source = if config.environment.contains_key(&key) {
                    t!("preview.source_env")
                } else if config.persisted.contains_key(&key) {
                    t!("preview.source_file")
                } else {
                    t!("preview.source_default")
                };
                println!("  {key:<18} {value:<10} {}", style(source).dim());
            }
        }
        Err(e) => {
            println!("{} {e}", style(t!("settings.invalid")).red().bold());
        }
    }

    pause(term)
}

/// 語言選單
pub fn show_language_menu(term: &Term, config: &mut Config) -> Result<()> {
    term.clear_screen()?;

    println!("{}", style(t!("settings.language.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let items: Vec<String> = Language::ALL.iter().map(ToString::to_string).collect();
    let current = config.language();
    let default_index = Language::ALL
        .iter()
        .position(|&l| l == current)
        .unwrap_or(0);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("settings.language.prompt"))
        .items(&items)
        .default(default_index)
        .interact_on_opt(term)?;

    let Some(selection) = selection else {
        return Ok(());
    };

    let selected = Language::ALL[selection];
    if selected != current {
        update_setting(config, KEY_LANGUAGE, selected.as_str())?;
        rust_i18n::set_locale(selected.as_str());
        println!("\n{} {selected}", style(t!("settings.saved")).green());
        std::thread::sleep(Duration::from_secs(1));
    }

    Ok(())
}
