use crate::config::types::{Config, Language, RawSettings, SETTING_KEYS, Settings};
use crate::error::Result;
use anyhow::Context;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// 設定檔名稱（放在程式執行的當前目錄）
pub const SETTINGS_FILE_NAME: &str = "scene_splitter.cfg";

/// 環境變數前綴，例如 `SCENE_SPLITTER_THRESHOLD`
pub const ENV_PREFIX: &str = "SCENE_SPLITTER_";

impl Config {
    pub fn new() -> anyhow::Result<Self> {
        Self::load_from(PathBuf::from(SETTINGS_FILE_NAME), std::env::vars())
    }

    pub fn load_from(
        settings_path: PathBuf,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> anyhow::Result<Self> {
        let persisted = load_settings_file(&settings_path)?;
        let environment = environment_overrides(vars);

        Ok(Self {
            settings_path,
            persisted,
            environment,
        })
    }

    /// 合併所有來源並驗證
    ///
    /// 優先順序：呼叫端參數 > 環境變數 > 設定檔 > 內建預設值
    pub fn resolve(&self, overrides: &RawSettings) -> Result<Settings> {
        resolve_layers(&[&self.persisted, &self.environment, overrides])
    }

    /// 介面語言；設定不合法時退回預設值，不阻擋選單
    #[must_use]
    pub fn language(&self) -> Language {
        self.resolve(&RawSettings::new())
            .map(|s| s.language())
            .unwrap_or_default()
    }
}

/// 依序套用各層設定（後面的覆蓋前面的），最後一次驗證
pub fn resolve_layers(layers: &[&RawSettings]) -> Result<Settings> {
    let mut merged = RawSettings::new();
    for layer in layers {
        for (key, value) in *layer {
            merged.insert(key.clone(), value.clone());
        }
    }

    let mut builder = Settings::builder();
    for (key, value) in &merged {
        builder = builder.apply(key, value)?;
    }
    builder.build()
}

pub fn load_settings_file(path: &Path) -> anyhow::Result<RawSettings> {
    if !path.exists() {
        debug!("設定檔不存在，使用預設值: {}", path.display());
        return Ok(RawSettings::new());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;

    Ok(parse_settings_text(&content))
}

/// 解析 key=value 設定內容
///
/// `#` 開頭為註解；格式錯誤或未知的鍵只記錄警告並略過
#[must_use]
pub fn parse_settings_text(content: &str) -> RawSettings {
    let mut raw = RawSettings::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!("設定檔第 {} 行格式錯誤，已略過: {line}", line_no + 1);
            continue;
        };

        let key = key.trim().to_lowercase();
        if !SETTING_KEYS.contains(&key.as_str()) {
            warn!("未知的設定鍵 `{key}`，已略過");
            continue;
        }

        raw.insert(key, value.trim().to_string());
    }

    raw
}

/// 從環境變數中挑出 `SCENE_SPLITTER_*` 設定
pub fn environment_overrides(vars: impl IntoIterator<Item = (String, String)>) -> RawSettings {
    vars.into_iter()
        .filter_map(|(name, value)| {
            let key = name.strip_prefix(ENV_PREFIX)?.to_lowercase();
            SETTING_KEYS
                .contains(&key.as_str())
                .then(|| (key, value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{Codec, KEY_CODEC, KEY_MIN_DURATION, KEY_THRESHOLD};
    use tempfile::TempDir;

    fn raw(pairs: &[(&str, &str)]) -> RawSettings {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_parse_settings_text() {
        let content = "\
# scene splitter settings
threshold = 0.5
min_duration=10

not a setting line
colour=blue
CODEC=h264
";
        let parsed = parse_settings_text(content);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["threshold"], "0.5");
        assert_eq!(parsed["min_duration"], "10");
        assert_eq!(parsed["codec"], "h264");
    }

    #[test]
    fn test_environment_overrides_filters_prefix() {
        let vars = vec![
            ("SCENE_SPLITTER_CODEC".to_string(), "h265".to_string()),
            ("SCENE_SPLITTER_UNKNOWN".to_string(), "x".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ];
        let env = environment_overrides(vars);
        assert_eq!(env.len(), 1);
        assert_eq!(env["codec"], "h265");
    }

    #[test]
    fn test_precedence_order() {
        let persisted = raw(&[(KEY_THRESHOLD, "0.4"), (KEY_CODEC, "h264"), (KEY_MIN_DURATION, "7")]);
        let env = raw(&[(KEY_CODEC, "h265"), (KEY_THRESHOLD, "0.6")]);
        let call_site = raw(&[(KEY_THRESHOLD, "0.9")]);

        let settings = resolve_layers(&[&persisted, &env, &call_site]).unwrap();
        assert_eq!(settings.threshold(), 0.9);
        assert_eq!(settings.codec(), Codec::H265);
        assert_eq!(settings.min_duration(), 7);
        // 未指定的欄位使用預設值
        assert_eq!(settings.scene_prefix(), "scene");
    }

    #[test]
    fn test_invalid_layer_is_validation_error() {
        let persisted = raw(&[(KEY_MIN_DURATION, "0")]);
        let err = resolve_layers(&[&persisted]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_override_can_fix_invalid_persisted_value() {
        let persisted = raw(&[(KEY_MIN_DURATION, "900")]);
        let call_site = raw(&[(KEY_MIN_DURATION, "30")]);
        let settings = resolve_layers(&[&persisted, &call_site]).unwrap();
        assert_eq!(settings.min_duration(), 30);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(temp_dir.path().join("missing.cfg"), Vec::new()).unwrap();
        assert!(config.persisted.is_empty());
        assert!(config.resolve(&RawSettings::new()).is_ok());
    }
}
