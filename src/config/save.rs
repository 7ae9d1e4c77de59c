use crate::config::load::resolve_layers;
use crate::config::types::{Config, RawSettings};
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub fn save_settings(path: &Path, settings: &RawSettings) -> Result<()> {
    let mut content = String::from("# scene_splitter settings (key=value)\n");
    for (key, value) in settings {
        let _ = writeln!(content, "{key}={value}");
    }

    fs::write(path, content)
        .with_context(|| format!("Failed to write settings to {}", path.display()))?;

    Ok(())
}

/// 更新單一設定值
///
/// 先以新值合併驗證，通過後才寫入設定檔
pub fn update_setting(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let mut candidate = config.persisted.clone();
    candidate.insert(key.to_string(), value.trim().to_string());

    resolve_layers(&[&candidate, &config.environment])?;

    config.persisted = candidate;
    save_settings(&config.settings_path, &config.persisted)
}
