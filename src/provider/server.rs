//! 中间服务器批量客户端
//!
//! 以安装身份标识调用中间服务器：身份在首次使用前本地生成并持久化，
//! 注册是幂等的——成功一次后不再发起；失败则在下一批翻译前惰性重试，
//! 绝不阻塞启动。响应中缺失的词表示"无可用翻译"，不是错误。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{TranslationError, TranslationResult};
use crate::limiter::RateLimiter;
use crate::settings::Difficulty;
use crate::storage::{InstallationIdentity, Storage};

use super::{FeedbackRecord, TranslationProvider};

/// 单次请求的最大词数
const SERVER_BATCH_SIZE: usize = 50;

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    extension_guid: &'a str,
    extension_version: &'a str,
    client_info: ClientInfo,
}

#[derive(Debug, Serialize)]
struct ClientInfo {
    user_agent: String,
    platform: &'static str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    user_id: String,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    words: &'a [String],
    source_language: &'a str,
    target_language: &'a str,
    difficulty_level: &'a str,
    user_uuid: &'a str,
}

#[derive(Debug, Deserialize)]
struct ServerTranslation {
    original_word: String,
    translated_word: String,
}

#[derive(Debug, Serialize)]
struct FeedbackRequest<'a> {
    user_uuid: &'a str,
    original_word: &'a str,
    translated_word: &'a str,
    source_language: &'a str,
    target_language: &'a str,
    feedback_type: super::FeedbackType,
    custom_translation: Option<&'a str>,
}

/// 中间服务器客户端
pub struct ServerClient {
    http: reqwest::Client,
    base_url: String,
    storage: Arc<Storage>,
    limiter: Arc<RateLimiter>,
}

impl ServerClient {
    /// 创建客户端
    pub fn new(
        base_url: String,
        storage: Arc<Storage>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> TranslationResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranslationError::Config(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            storage,
            limiter,
        })
    }

    /// 取出安装身份，首次调用时生成并持久化
    pub fn identity(&self) -> InstallationIdentity {
        if let Some(identity) = self.storage.read(|state| state.identity.clone()) {
            return identity;
        }
        self.storage.update(|state| {
            state
                .identity
                .get_or_insert_with(|| {
                    let identity = InstallationIdentity::generate();
                    tracing::info!("生成新安装身份: {}", identity.id);
                    identity
                })
                .clone()
        })
    }

    /// 确保已向服务器注册，返回注册后的用户标识
    ///
    /// 已注册则直接返回；未注册则尝试一次，失败留待下一批重试。
    async fn ensure_registered(&self) -> Option<String> {
        let identity = self.identity();
        if identity.registered {
            return identity.user_id;
        }

        let request = RegisterRequest {
            extension_guid: &identity.id,
            extension_version: env!("CARGO_PKG_VERSION"),
            client_info: ClientInfo {
                user_agent: format!("lexilearn/{}", env!("CARGO_PKG_VERSION")),
                platform: std::env::consts::OS,
            },
        };

        let response = self
            .http
            .post(format!("{}/api/extension/register", self.base_url))
            .json(&request)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<RegisterResponse>().await {
                    Ok(body) => {
                        tracing::info!("安装身份注册成功");
                        self.storage.update(|state| {
                            state.identity = Some(InstallationIdentity {
                                id: identity.id.clone(),
                                registered: true,
                                user_id: Some(body.user_id.clone()),
                            });
                        });
                        Some(body.user_id)
                    }
                    Err(e) => {
                        tracing::warn!("注册响应解析失败: {}", e);
                        None
                    }
                }
            }
            Ok(response) => {
                tracing::warn!("安装身份注册失败: {}", response.status());
                None
            }
            Err(e) => {
                tracing::warn!("安装身份注册失败: {}", e);
                None
            }
        }
    }

    async fn translate_chunk(
        &self,
        words: &[String],
        source_lang: &str,
        target_lang: &str,
        difficulty: Difficulty,
        user_id: &str,
    ) -> TranslationResult<Vec<ServerTranslation>> {
        self.limiter.acquire().await;

        let request = TranslateRequest {
            words,
            source_language: source_lang,
            target_language: target_lang,
            difficulty_level: difficulty.as_str(),
            user_uuid: user_id,
        };

        let response = self
            .http
            .post(format!("{}/api/extension/translate", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslationError::Provider(format!(
                "翻译请求失败: {}",
                status
            )));
        }

        response
            .json::<Vec<ServerTranslation>>()
            .await
            .map_err(|e| TranslationError::Parse(format!("翻译响应解析失败: {}", e)))
    }
}

impl TranslationProvider for ServerClient {
    fn translate_batch<'a>(
        &'a self,
        words: &'a [String],
        source_lang: &'a str,
        target_lang: &'a str,
        difficulty: Difficulty,
    ) -> BoxFuture<'a, HashMap<String, String>> {
        Box::pin(async move {
            if words.is_empty() {
                return HashMap::new();
            }

            let Some(user_id) = self.ensure_registered().await else {
                tracing::debug!("尚未注册，跳过本批 {} 个词", words.len());
                return HashMap::new();
            };

            let mut translations = HashMap::new();
            for chunk in words.chunks(SERVER_BATCH_SIZE) {
                match self
                    .translate_chunk(chunk, source_lang, target_lang, difficulty, &user_id)
                    .await
                {
                    Ok(pairs) => {
                        translations.extend(
                            pairs
                                .into_iter()
                                .map(|t| (t.original_word, t.translated_word)),
                        );
                    }
                    Err(e) => {
                        // 整批失败降级为"本批无翻译"
                        tracing::warn!("服务器批量翻译失败: {}", e);
                    }
                }
            }

            translations
        })
    }

    fn submit_feedback<'a>(&'a self, feedback: FeedbackRecord) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let Some(user_id) = self.ensure_registered().await else {
                tracing::debug!("尚未注册，跳过反馈上报");
                return false;
            };

            let request = FeedbackRequest {
                user_uuid: &user_id,
                original_word: &feedback.original_word,
                translated_word: &feedback.translated_word,
                source_language: "auto",
                target_language: &feedback.target_language,
                feedback_type: feedback.feedback_type,
                custom_translation: feedback.custom_translation.as_deref(),
            };

            let response = self
                .http
                .post(format!("{}/api/extension/feedback", self.base_url))
                .json(&request)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => true,
                Ok(response) => {
                    tracing::debug!("反馈上报失败: {}", response.status());
                    false
                }
                Err(e) => {
                    tracing::debug!("反馈上报失败: {}", e);
                    false
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "server"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn test_client(storage: Arc<Storage>) -> ServerClient {
        ServerClient::new(
            // 不可达地址：本地连接立即被拒绝
            "http://127.0.0.1:9".to_string(),
            storage,
            Arc::new(RateLimiter::new(100, Duration::from_secs(1)).expect("创建限速器失败")),
            Duration::from_secs(1),
        )
        .expect("创建客户端失败")
    }

    #[test]
    fn test_identity_generated_once() {
        let storage = Arc::new(Storage::open(Box::new(MemoryStore::new())));
        let client = test_client(Arc::clone(&storage));

        let first = client.identity();
        let second = client.identity();
        assert_eq!(first.id, second.id);
        assert!(!first.registered);

        // 身份已持久化
        let persisted = storage.read(|state| state.identity.clone());
        assert_eq!(persisted.map(|i| i.id), Some(first.id));
    }

    #[tokio::test]
    async fn test_unregistered_translate_degrades_to_empty() {
        let storage = Arc::new(Storage::open(Box::new(MemoryStore::new())));
        let client = test_client(storage);

        let words = vec!["house".to_string()];
        let result = client
            .translate_batch(&words, "auto", "fr", Difficulty::Beginner)
            .await;

        // 注册失败：本批降级为空结果，身份仍保持未注册以便下批重试
        assert!(result.is_empty());
        assert!(!client.identity().registered);
    }

    #[tokio::test]
    async fn test_feedback_requires_registration() {
        let storage = Arc::new(Storage::open(Box::new(MemoryStore::new())));
        let client = test_client(storage);

        let delivered = client
            .submit_feedback(FeedbackRecord {
                original_word: "house".to_string(),
                translated_word: "maison".to_string(),
                target_language: "fr".to_string(),
                feedback_type: super::super::FeedbackType::Incorrect,
                custom_translation: None,
            })
            .await;
        assert!(!delivered);
    }
}
