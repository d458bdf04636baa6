//! DeepL 直连客户端
//!
//! 逐词请求翻译接口，请求前先过共享速率限制器；同一块内的词并发
//! 派发，由速率窗口负责节流。失败过的词在本会话内直接跳过，避免
//! 反复用注定失败的请求轰炸按量计费的接口。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use serde::Deserialize;

use crate::cache::normalize_word;
use crate::error::{TranslationError, TranslationResult};
use crate::limiter::RateLimiter;
use crate::settings::Difficulty;

use super::TranslationProvider;

/// 免费版接口地址（密钥以 `:fx` 结尾）
const FREE_BASE_URL: &str = "https://api-free.deepl.com/v2";
/// 付费版接口地址
const PAID_BASE_URL: &str = "https://api.deepl.com/v2";

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
    #[serde(default)]
    #[allow(dead_code)]
    detected_source_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeepLLanguage {
    language: String,
    name: String,
}

/// 支持的语言
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    pub code: String,
    pub name: String,
}

/// DeepL 直连客户端
pub struct DeepLClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
    /// 本会话内已失败的词（规范化词形）
    failed: Mutex<HashSet<String>>,
    /// 缺失密钥只在日志中报告一次
    missing_key_reported: AtomicBool,
}

impl DeepLClient {
    /// 创建客户端
    pub fn new(
        api_key: Option<String>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> TranslationResult<Self> {
        let base_url = match &api_key {
            Some(key) if !key.ends_with(":fx") => PAID_BASE_URL.to_string(),
            _ => FREE_BASE_URL.to_string(),
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranslationError::Config(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url,
            limiter,
            failed: Mutex::new(HashSet::new()),
            missing_key_reported: AtomicBool::new(false),
        })
    }

    /// 本会话内已失败的词数（诊断用）
    pub fn failed_count(&self) -> usize {
        self.failed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn mark_failed(&self, word: &str) {
        self.failed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(normalize_word(word));
    }

    fn is_failed(&self, word: &str) -> bool {
        self.failed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&normalize_word(word))
    }

    /// 翻译单个词
    async fn translate_word(
        &self,
        word: &str,
        source_lang: &str,
        target_lang: &str,
        api_key: &str,
    ) -> TranslationResult<String> {
        self.limiter.acquire().await;

        let mut form: Vec<(&str, String)> = vec![
            ("text", word.to_string()),
            ("target_lang", target_lang.to_uppercase()),
            ("auth_key", api_key.to_string()),
        ];
        if source_lang != "auto" {
            form.push(("source_lang", source_lang.to_uppercase()));
        }

        let response = self
            .http
            .post(format!("{}/translate", self.base_url))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(TranslationError::RateLimited(format!(
                    "DeepL 拒绝请求: {}",
                    status
                )));
            }
            return Err(TranslationError::Provider(format!(
                "DeepL 请求失败: {}",
                status
            )));
        }

        let body: DeepLResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::Parse(format!("DeepL 响应解析失败: {}", e)))?;

        body.translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| TranslationError::Provider("响应缺少翻译结果".to_string()))
    }

    /// 查询支持的语言列表，任何失败都回退到内置默认表
    pub async fn supported_languages(&self) -> Vec<Language> {
        let Some(api_key) = &self.api_key else {
            return default_languages();
        };

        let url = format!("{}/languages?auth_key={}", self.base_url, api_key);
        let response = match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!("语言列表查询失败: {}", response.status());
                return default_languages();
            }
            Err(e) => {
                tracing::debug!("语言列表查询失败: {}", e);
                return default_languages();
            }
        };

        match response.json::<Vec<DeepLLanguage>>().await {
            Ok(languages) => languages
                .into_iter()
                .map(|l| Language {
                    code: l.language.to_lowercase(),
                    name: l.name,
                })
                .collect(),
            Err(e) => {
                tracing::debug!("语言列表解析失败: {}", e);
                default_languages()
            }
        }
    }
}

impl TranslationProvider for DeepLClient {
    fn translate_batch<'a>(
        &'a self,
        words: &'a [String],
        source_lang: &'a str,
        target_lang: &'a str,
        _difficulty: Difficulty,
    ) -> BoxFuture<'a, HashMap<String, String>> {
        Box::pin(async move {
            let candidates: Vec<&String> = words
                .iter()
                .filter(|w| !w.trim().is_empty() && !self.is_failed(w))
                .collect();

            if candidates.is_empty() {
                return HashMap::new();
            }

            let Some(api_key) = self.api_key.clone() else {
                // 配置错误只向日志面报告一次，请求本身降级为空结果
                if !self.missing_key_reported.swap(true, Ordering::Relaxed) {
                    tracing::error!("DeepL API 密钥未配置，翻译请求将被跳过");
                }
                for word in &candidates {
                    self.mark_failed(word);
                }
                return HashMap::new();
            };

            let tasks = candidates.iter().map(|word| {
                let api_key = &api_key;
                async move {
                    let result = self
                        .translate_word(word, source_lang, target_lang, api_key)
                        .await;
                    (word.as_str(), result)
                }
            });

            let mut translations = HashMap::new();
            for (word, result) in join_all(tasks).await {
                match result {
                    Ok(translation) => {
                        translations.insert(word.to_string(), translation);
                    }
                    Err(e) => {
                        // 逐词失败按设计对用户不可见
                        tracing::debug!("词 '{}' 翻译失败: {}", word, e);
                        self.mark_failed(word);
                    }
                }
            }

            translations
        })
    }

    fn name(&self) -> &'static str {
        "deepl"
    }
}

/// 内置默认语言表
fn default_languages() -> Vec<Language> {
    [
        ("en", "English"),
        ("es", "Spanish"),
        ("fr", "French"),
        ("de", "German"),
        ("it", "Italian"),
        ("pt", "Portuguese"),
        ("ru", "Russian"),
        ("ja", "Japanese"),
        ("ko", "Korean"),
        ("zh", "Chinese"),
        ("nl", "Dutch"),
        ("pl", "Polish"),
    ]
    .into_iter()
    .map(|(code, name)| Language {
        code: code.to_string(),
        name: name.to_string(),
    })
    .collect()
}
