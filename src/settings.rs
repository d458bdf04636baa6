//! 配置管理模块
//!
//! 分两层：`Settings` 是用户可随时修改并持久化的运行期设置，
//! `PipelineConfig` 是构建管线时确定的静态配置（TOML 文件 + 环境变量覆盖）。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TranslationError, TranslationResult};

/// 默认替换比例（百分比）
pub const DEFAULT_REPLACEMENT_PERCENTAGE: u8 = 10;
/// 默认目标语言
pub const DEFAULT_TARGET_LANGUAGE: &str = "fr";
/// 缓存条目默认存活时间（1 天）
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
/// 默认缓存写回间隔（每 N 次变更落盘一次）
pub const DEFAULT_CACHE_PERSIST_EVERY: usize = 10;
/// 默认速率限制：窗口内最大请求数
pub const DEFAULT_MAX_REQUESTS: usize = 2;
/// 默认速率限制窗口（毫秒）
pub const DEFAULT_WINDOW_MS: u64 = 2000;
/// 单块最大词数
pub const DEFAULT_CHUNK_SIZE: usize = 50;
/// 网络请求超时（秒）
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// 词汇难度级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// 中间服务器接口使用的级别字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

/// 用户设置
///
/// 与其余学习数据一起持久化，`update` 支持部分字段更新。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// 是否启用词汇替换
    pub enabled: bool,
    /// 目标语言代码
    pub target_language: String,
    /// 词汇难度
    pub difficulty: Difficulty,
    /// 页面词汇替换比例（0-100）
    pub replacement_percentage: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            target_language: DEFAULT_TARGET_LANGUAGE.to_string(),
            difficulty: Difficulty::default(),
            replacement_percentage: DEFAULT_REPLACEMENT_PERCENTAGE,
        }
    }
}

impl Settings {
    /// 应用部分更新
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(target_language) = update.target_language {
            self.target_language = target_language;
        }
        if let Some(difficulty) = update.difficulty {
            self.difficulty = difficulty;
        }
        if let Some(percentage) = update.replacement_percentage {
            self.replacement_percentage = percentage;
        }
    }

    /// 验证设置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.target_language.trim().is_empty() {
            return Err(TranslationError::Config("目标语言不能为空".to_string()));
        }
        if self.replacement_percentage > 100 {
            return Err(TranslationError::Config(
                "替换比例必须在 0-100 之间".to_string(),
            ));
        }
        Ok(())
    }
}

/// 设置的部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub target_language: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub replacement_percentage: Option<u8>,
}

/// 翻译提供者模式
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ProviderMode {
    /// 直连 DeepL，逐词请求
    Deepl { api_key: Option<String> },
    /// 经中间服务器批量请求
    Server { base_url: String },
}

impl Default for ProviderMode {
    fn default() -> Self {
        ProviderMode::Deepl { api_key: None }
    }
}

/// 管线静态配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 提供者选择
    pub provider: ProviderMode,
    /// 速率限制：窗口内最大请求数
    pub max_requests: usize,
    /// 速率限制窗口（毫秒）
    pub window_ms: u64,
    /// 单块最大词数
    pub chunk_size: usize,
    /// 网络请求超时（秒）
    pub request_timeout_secs: u64,
    /// 缓存条目存活时间（秒）
    pub cache_ttl_secs: u64,
    /// 缓存每 N 次变更写回一次
    pub cache_persist_every: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: ProviderMode::default(),
            max_requests: DEFAULT_MAX_REQUESTS,
            window_ms: DEFAULT_WINDOW_MS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_persist_every: DEFAULT_CACHE_PERSIST_EVERY,
        }
    }
}

impl PipelineConfig {
    /// 从 TOML 文件加载配置，随后应用环境变量覆盖
    pub fn from_file<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| TranslationError::Config(format!("读取配置文件失败: {}", e)))?;
        let mut config: PipelineConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("LEXILEARN_DEEPL_API_KEY") {
            if !key.is_empty() {
                self.provider = ProviderMode::Deepl { api_key: Some(key) };
            }
        }
        if let Ok(url) = std::env::var("LEXILEARN_SERVER_URL") {
            if !url.is_empty() {
                self.provider = ProviderMode::Server { base_url: url };
            }
        }
    }

    /// 验证配置
    ///
    /// 速率预算为 0 属于配置错误，必须在构建时失败，
    /// 否则限速器的等待将无界。
    pub fn validate(&self) -> TranslationResult<()> {
        if self.max_requests == 0 {
            return Err(TranslationError::Config("速率预算不能为0".to_string()));
        }
        if self.window_ms == 0 {
            return Err(TranslationError::Config("速率窗口不能为0".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(TranslationError::Config("块大小不能为0".to_string()));
        }
        if self.cache_persist_every == 0 {
            return Err(TranslationError::Config("缓存写回间隔不能为0".to_string()));
        }
        Ok(())
    }

    /// 速率限制窗口
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// 网络请求超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 缓存条目存活时间
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
