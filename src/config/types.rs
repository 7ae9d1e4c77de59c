use crate::error::{Result, SplitError};
use crate::tools::default_worker_count;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// 原始設定值（key=value），尚未驗證
pub type RawSettings = BTreeMap<String, String>;

pub const KEY_THRESHOLD: &str = "threshold";
pub const KEY_MIN_DURATION: &str = "min_duration";
pub const KEY_DETECTION_METHOD: &str = "detection_method";
pub const KEY_OUTPUT_FORMAT: &str = "output_format";
pub const KEY_CODEC: &str = "codec";
pub const KEY_SCENE_PREFIX: &str = "scene_prefix";
pub const KEY_MAX_WORKERS: &str = "max_workers";
pub const KEY_JOB_TIMEOUT_SECS: &str = "job_timeout_secs";
pub const KEY_LANGUAGE: &str = "language";

/// 所有可持久化的設定鍵，依選單顯示順序排列
pub const SETTING_KEYS: [&str; 9] = [
    KEY_THRESHOLD,
    KEY_MIN_DURATION,
    KEY_DETECTION_METHOD,
    KEY_OUTPUT_FORMAT,
    KEY_CODEC,
    KEY_SCENE_PREFIX,
    KEY_MAX_WORKERS,
    KEY_JOB_TIMEOUT_SECS,
    KEY_LANGUAGE,
];

pub const MIN_DURATION_RANGE: (u32, u32) = (1, 300);
pub const DEFAULT_THRESHOLD: f64 = 0.3;
pub const DEFAULT_MIN_DURATION: u32 = 2;
pub const DEFAULT_SCENE_PREFIX: &str = "scene";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// 感知差異（畫面內容變化）
    Content,
    /// 亮度差異
    Luminance,
}

impl DetectionMethod {
    pub const ALL: [Self; 2] = [Self::Content, Self::Luminance];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Luminance => "luminance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Mov,
    Mkv,
}

impl OutputFormat {
    pub const ALL: [Self; 3] = [Self::Mp4, Self::Mov, Self::Mkv];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        self.as_str()
    }

    /// ffmpeg 的 muxer 名稱
    #[must_use]
    pub const fn muxer(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Mkv => "matroska",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// 直接複製串流，切點會對齊關鍵幀
    Copy,
    H264,
    H265,
}

impl Codec {
    pub const ALL: [Self; 3] = [Self::Copy, Self::H264, Self::H265];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::H264 => "h264",
            Self::H265 => "h265",
        }
    }

    #[must_use]
    pub const fn is_frame_accurate(self) -> bool {
        !matches!(self, Self::Copy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "zh-TW")]
    ZhTw,
}

impl Language {
    pub const ALL: [Self; 2] = [Self::EnUs, Self::ZhTw];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::ZhTw => "zh-TW",
        }
    }
}

macro_rules! impl_setting_enum {
    ($ty:ty, $key:expr) => {
        impl FromStr for $ty {
            type Err = SplitError;

            fn from_str(raw: &str) -> Result<Self> {
                let raw = raw.trim();
                Self::ALL
                    .into_iter()
                    .find(|v| v.as_str().eq_ignore_ascii_case(raw))
                    .ok_or_else(|| {
                        let allowed: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
                        SplitError::validation(
                            $key,
                            format!("`{raw}` is not one of {}", allowed.join(", ")),
                        )
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_setting_enum!(DetectionMethod, KEY_DETECTION_METHOD);
impl_setting_enum!(OutputFormat, KEY_OUTPUT_FORMAT);
impl_setting_enum!(Codec, KEY_CODEC);
impl_setting_enum!(Language, KEY_LANGUAGE);

/// 已驗證的設定
///
/// 只能透過 [`SettingsBuilder::build`] 建立，因此存在的 `Settings` 一定合法。
/// 工作開始後以 `Arc<Settings>` 唯讀共享。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    threshold: f64,
    min_duration: u32,
    detection_method: DetectionMethod,
    output_format: OutputFormat,
    codec: Codec,
    scene_prefix: String,
    max_workers: usize,
    #[serde(rename = "job_timeout_secs", serialize_with = "serialize_timeout")]
    job_timeout: Option<Duration>,
    language: Language,
}

impl Settings {
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    #[must_use]
    pub const fn min_duration(&self) -> u32 {
        self.min_duration
    }

    #[must_use]
    pub const fn detection_method(&self) -> DetectionMethod {
        self.detection_method
    }

    #[must_use]
    pub const fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    #[must_use]
    pub const fn codec(&self) -> Codec {
        self.codec
    }

    #[must_use]
    pub fn scene_prefix(&self) -> &str {
        &self.scene_prefix
    }

    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    #[must_use]
    pub const fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout
    }

    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    /// 轉回 key=value 形式（用於儲存與顯示）
    #[must_use]
    pub fn to_raw(&self) -> RawSettings {
        let mut raw = RawSettings::new();
        raw.insert(KEY_THRESHOLD.into(), format!("{:.1}", self.threshold));
        raw.insert(KEY_MIN_DURATION.into(), self.min_duration.to_string());
        raw.insert(KEY_DETECTION_METHOD.into(), self.detection_method.to_string());
        raw.insert(KEY_OUTPUT_FORMAT.into(), self.output_format.to_string());
        raw.insert(KEY_CODEC.into(), self.codec.to_string());
        raw.insert(KEY_SCENE_PREFIX.into(), self.scene_prefix.clone());
        raw.insert(KEY_MAX_WORKERS.into(), self.max_workers.to_string());
        raw.insert(
            KEY_JOB_TIMEOUT_SECS.into(),
            self.job_timeout.map_or(0, |d| d.as_secs()).to_string(),
        );
        raw.insert(KEY_LANGUAGE.into(), self.language.to_string());
        raw
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_duration: DEFAULT_MIN_DURATION,
            detection_method: DetectionMethod::Content,
            output_format: OutputFormat::Mp4,
            codec: Codec::Copy,
            scene_prefix: DEFAULT_SCENE_PREFIX.to_string(),
            max_workers: default_worker_count(),
            job_timeout: None,
            language: Language::EnUs,
        }
    }
}

/// 設定建構器：先收集值，`build` 時一次驗證全部欄位
#[derive(Debug, Clone)]
pub struct SettingsBuilder {
    inner: Settings,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self {
            inner: Settings::default(),
        }
    }
}

impl SettingsBuilder {
    #[must_use]
    pub const fn threshold(mut self, threshold: f64) -> Self {
        self.inner.threshold = threshold;
        self
    }

    #[must_use]
    pub const fn min_duration(mut self, seconds: u32) -> Self {
        self.inner.min_duration = seconds;
        self
    }

    #[must_use]
    pub const fn detection_method(mut self, method: DetectionMethod) -> Self {
        self.inner.detection_method = method;
        self
    }

    #[must_use]
    pub const fn output_format(mut self, format: OutputFormat) -> Self {
        self.inner.output_format = format;
        self
    }

    #[must_use]
    pub const fn codec(mut self, codec: Codec) -> Self {
        self.inner.codec = codec;
        self
    }

    #[must_use]
    pub fn scene_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.inner.scene_prefix = prefix.into();
        self
    }

    #[must_use]
    pub const fn max_workers(mut self, workers: usize) -> Self {
        self.inner.max_workers = workers;
        self
    }

    #[must_use]
    pub const fn job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inner.job_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn language(mut self, language: Language) -> Self {
        self.inner.language = language;
        self
    }

    /// 以字串形式套用單一設定鍵
    pub fn apply(self, key: &str, raw: &str) -> Result<Self> {
        let value = raw.trim();
        let builder = match key {
            KEY_THRESHOLD => self.threshold(parse_number(key, value)?),
            KEY_MIN_DURATION => self.min_duration(parse_number(key, value)?),
            KEY_DETECTION_METHOD => self.detection_method(value.parse()?),
            KEY_OUTPUT_FORMAT => self.output_format(value.parse()?),
            KEY_CODEC => self.codec(value.parse()?),
            KEY_SCENE_PREFIX => self.scene_prefix(value),
            KEY_MAX_WORKERS => self.max_workers(parse_number(key, value)?),
            KEY_JOB_TIMEOUT_SECS => {
                let secs: u64 = parse_number(key, value)?;
                self.job_timeout((secs > 0).then(|| Duration::from_secs(secs)))
            }
            KEY_LANGUAGE => self.language(value.parse()?),
            other => return Err(SplitError::validation(other, "unknown setting")),
        };
        Ok(builder)
    }

    pub fn build(self) -> Result<Settings> {
        let s = self.inner;

        if !(0.0..=1.0).contains(&s.threshold) || !is_tenth_step(s.threshold) {
            return Err(SplitError::validation(
                KEY_THRESHOLD,
                format!(
                    "{} must be within 0.0..=1.0 in steps of 0.1",
                    s.threshold
                ),
            ));
        }

        let (min, max) = MIN_DURATION_RANGE;
        if !(min..=max).contains(&s.min_duration) {
            return Err(SplitError::validation(
                KEY_MIN_DURATION,
                format!("{} must be within {min}..={max} seconds", s.min_duration),
            ));
        }

        if !scene_prefix_regex().is_match(&s.scene_prefix) {
            return Err(SplitError::validation(
                KEY_SCENE_PREFIX,
                format!("`{}` must match [A-Za-z0-9_]+", s.scene_prefix),
            ));
        }

        if s.max_workers == 0 {
            return Err(SplitError::validation(KEY_MAX_WORKERS, "must be at least 1"));
        }

        Ok(Settings {
            // 消除 0.30000000000000004 之類的誤差
            threshold: (s.threshold * 10.0).round() / 10.0,
            ..s
        })
    }
}

fn serialize_timeout<S: serde::Serializer>(
    timeout: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(timeout.map_or(0, |d| d.as_secs()))
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| SplitError::validation(key, format!("`{raw}` is not a valid number")))
}

fn is_tenth_step(value: f64) -> bool {
    let scaled = value * 10.0;
    (scaled - scaled.round()).abs() < 1e-6
}

fn scene_prefix_regex() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid prefix regex"))
}

/// 應用程式設定：各來源的原始值，使用時才合併與驗證
#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: PathBuf,
    /// 設定檔中的值
    pub persisted: RawSettings,
    /// `SCENE_SPLITTER_*` 環境變數
    pub environment: RawSettings,
}
