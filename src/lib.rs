//! # Lexilearn
//!
//! 面向附带式词汇学习的后台翻译管线：接收页面代理提取的候选词批，
//! 经本地覆盖规则去重过滤后提交给速率受限的远程翻译提供者，结果
//! 带过期时间缓存并异步流式推回页面，同时按标签页跟踪处理进度。
//!
//! ## 模块组织
//!
//! - `error` - 统一错误类型与分类
//! - `settings` - 用户设置与管线配置
//! - `limiter` - 滑动窗口速率限制器
//! - `cache` - 带 TTL 的翻译缓存
//! - `vocabulary` - 词汇追踪与已学会词集
//! - `storage` - 持久化状态与存储后端
//! - `provider` - 翻译提供者客户端（直连 / 中间服务器）
//! - `coordinator` - 每标签页队列与编排核心
//!
//! ## 使用示例
//!
//! ```no_run
//! use std::sync::Arc;
//! use lexilearn::{
//!     ChannelSink, Coordinator, JsonFileStore, PipelineConfig, Request, SettingsUpdate,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (sink, mut events) = ChannelSink::new();
//!     let coordinator = Coordinator::new(
//!         PipelineConfig::default(),
//!         Box::new(JsonFileStore::new("lexilearn-state.json")),
//!         Arc::new(sink),
//!     )?;
//!
//!     coordinator
//!         .handle(Request::UpdateSettings(SettingsUpdate {
//!             enabled: Some(true),
//!             ..Default::default()
//!         }))
//!         .await?;
//!
//!     while let Some((tab_id, event)) = events.recv().await {
//!         println!("标签页 {}: {:?}", tab_id, event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod limiter;
pub mod provider;
pub mod settings;
pub mod storage;
pub mod vocabulary;

// Re-export commonly used items for convenience
pub use cache::{CacheConfig, CacheEntry, TranslationCache};
pub use coordinator::{
    ChannelSink, Coordinator, EventSink, Request, Response, TabEvent, TabId, UsageStats,
    WordCandidate,
};
pub use error::{TranslationError, TranslationResult};
pub use limiter::RateLimiter;
pub use provider::{TranslationProvider, usefully_translated};
pub use settings::{Difficulty, PipelineConfig, ProviderMode, Settings, SettingsUpdate};
pub use storage::{JsonFileStore, MemoryStore, PersistedState, StateStore};
pub use vocabulary::{VocabularyEntry, VocabularyTracker};
