//! 翻译提供者模块
//!
//! 对外只有一个能力接口 `TranslationProvider::translate_batch`，
//! 两个实现：直连 DeepL 的逐词客户端与经中间服务器的批量客户端，
//! 在构建管线时按配置二选一。整批失败降级为空结果，绝不让网络
//! 错误越过协调器边界。

pub mod deepl;
pub mod server;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;

use crate::error::TranslationResult;
use crate::limiter::RateLimiter;
use crate::settings::{Difficulty, PipelineConfig, ProviderMode};
use crate::storage::Storage;

pub use deepl::DeepLClient;
pub use server::ServerClient;

/// 用户纠错反馈类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Incorrect,
    Custom,
}

/// 用户纠错反馈
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRecord {
    pub original_word: String,
    pub translated_word: String,
    pub target_language: String,
    pub feedback_type: FeedbackType,
    pub custom_translation: Option<String>,
}

/// 翻译提供者能力接口
///
/// 返回原词到译文的部分映射：缺失的词表示"无可用翻译"，不是错误。
pub trait TranslationProvider: Send + Sync {
    /// 翻译一批词
    fn translate_batch<'a>(
        &'a self,
        words: &'a [String],
        source_lang: &'a str,
        target_lang: &'a str,
        difficulty: Difficulty,
    ) -> BoxFuture<'a, HashMap<String, String>>;

    /// 上报用户纠错反馈，尽力而为
    ///
    /// 默认实现表示该提供者不支持反馈通道。
    fn submit_feedback<'a>(&'a self, _feedback: FeedbackRecord) -> BoxFuture<'a, bool> {
        Box::pin(async { false })
    }

    /// 提供者名称（日志用）
    fn name(&self) -> &'static str;
}

/// 译文是否有实际价值
///
/// 与原词相同（忽略大小写与空白）的译文视为"未有效翻译"，
/// 下游直接丢弃。这是业务规则而非错误。
pub fn usefully_translated(original: &str, translation: &str) -> bool {
    let translation = translation.trim();
    !translation.is_empty() && !translation.eq_ignore_ascii_case(original.trim())
}

/// 按配置构建提供者
pub fn build_provider(
    config: &PipelineConfig,
    limiter: Arc<RateLimiter>,
    storage: Arc<Storage>,
) -> TranslationResult<Arc<dyn TranslationProvider>> {
    match &config.provider {
        ProviderMode::Deepl { api_key } => Ok(Arc::new(DeepLClient::new(
            api_key.clone(),
            limiter,
            config.request_timeout(),
        )?)),
        ProviderMode::Server { base_url } => Ok(Arc::new(ServerClient::new(
            base_url.clone(),
            storage,
            limiter,
            config.request_timeout(),
        )?)),
    }
}
