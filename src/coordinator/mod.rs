//! 协调器模块
//!
//! 管线的编排核心：接收页面代理送来的词批，按 黑名单 → 自定义翻译 →
//! 已学会 → 缓存命中 → 需要翻译 的顺序分流，把缓存未命中交给速率
//! 受限的提供者客户端，结果写穿缓存与词汇表，并把逐词翻译事件异步
//! 推回源标签页。
//!
//! ## 并发模型
//!
//! 单逻辑线程协作式调度：共享状态只在显式异步边界之间被触碰。
//! 每个标签页至多一个活跃处理循环（`Idle → Processing → Idle`
//! 状态机），块内逐词子任务并发派发、块末汇合，限速压力因此被
//! 限定在一块以内。标签页关闭即是事实上的取消：在途请求照常完成，
//! 投递失败被静默丢弃。

pub mod events;
pub mod queue;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::cache::{normalize_word, CacheConfig, TranslationCache};
use crate::error::TranslationResult;
use crate::limiter::RateLimiter;
use crate::provider::{
    build_provider, usefully_translated, FeedbackRecord, FeedbackType, TranslationProvider,
};
use crate::settings::{Difficulty, PipelineConfig, SettingsUpdate};
use crate::storage::{IncorrectTranslation, PersistedState, StateStore, Storage};
use crate::vocabulary::VocabularyTracker;

pub use events::{ChannelSink, DeliveryError, EventSink, TabEvent};
pub use queue::{TabId, TabQueue, TabState, WordCandidate};

/// 周期清扫缓存的默认间隔（6 小时）
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// 入站请求
///
/// 每种操作一个变体，经单一类型化入口分发。
#[derive(Debug, Clone)]
pub enum Request {
    /// 页面代理：为某标签页入队一批候选词
    ProcessWords {
        tab_id: TabId,
        words: Vec<WordCandidate>,
        target_language: String,
    },
    /// 设置面：部分更新设置
    UpdateSettings(SettingsUpdate),
    /// 设置面：查询使用统计
    GetStats,
    /// 用户纠错：标记已学会
    MarkLearned { word: String },
    /// 用户纠错：加入黑名单（连带清除缓存）
    BlacklistWord { word: String },
    /// 用户纠错：设置自定义翻译（连带清除缓存）
    SetCustomTranslation { word: String, translation: String },
    /// 用户纠错：上报误译（连带清除缓存，记入诊断日志）
    MarkIncorrect { word: String, translation: String },
    /// 设置面：清空翻译缓存
    ClearCache,
    /// 设置面：清空全部学习数据（保留设置与安装身份）
    ClearAllData,
    /// 设置面：导出全部持久化状态
    ExportData,
    /// 设置面：合并导入快照
    ImportData(Box<PersistedState>),
}

/// 请求响应
#[derive(Debug, Clone)]
pub enum Response {
    Ack,
    Stats(UsageStats),
    Snapshot(Box<PersistedState>),
}

/// 使用统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub vocabulary_size: usize,
    pub learned_words_count: usize,
    pub cache_size: usize,
    pub target_language: String,
    pub difficulty: Difficulty,
    pub replacement_percentage: u8,
}

/// 协调器统计
#[derive(Debug, Clone, Default)]
pub struct CoordinatorStats {
    pub words_enqueued: u64,
    pub chunks_processed: u64,
    pub translations_emitted: u64,
    pub loops_started: u64,
    pub max_concurrent_loops: usize,
}

/// 一块词的分流结果
struct ChunkPartition {
    emitted_immediately: usize,
    needs_translation: Vec<WordCandidate>,
}

/// 管线协调器
pub struct Coordinator {
    config: PipelineConfig,
    storage: Arc<Storage>,
    cache: TranslationCache,
    vocabulary: VocabularyTracker,
    provider: Arc<dyn TranslationProvider>,
    sink: Arc<dyn EventSink>,
    tabs: Mutex<HashMap<TabId, TabQueue>>,
    stats: RwLock<CoordinatorStats>,
    active_loops: AtomicUsize,
}

impl Coordinator {
    /// 按配置构建协调器，提供者由配置决定
    pub fn new(
        config: PipelineConfig,
        store: Box<dyn StateStore>,
        sink: Arc<dyn EventSink>,
    ) -> TranslationResult<Arc<Self>> {
        config.validate()?;
        let storage = Arc::new(Storage::open(store));
        let limiter = Arc::new(RateLimiter::new(config.max_requests, config.window())?);
        let provider = build_provider(&config, limiter, Arc::clone(&storage))?;
        Self::assemble(config, storage, provider, sink)
    }

    /// 注入自定义提供者构建协调器
    pub fn with_provider(
        config: PipelineConfig,
        store: Box<dyn StateStore>,
        provider: Arc<dyn TranslationProvider>,
        sink: Arc<dyn EventSink>,
    ) -> TranslationResult<Arc<Self>> {
        config.validate()?;
        let storage = Arc::new(Storage::open(store));
        Self::assemble(config, storage, provider, sink)
    }

    fn assemble(
        config: PipelineConfig,
        storage: Arc<Storage>,
        provider: Arc<dyn TranslationProvider>,
        sink: Arc<dyn EventSink>,
    ) -> TranslationResult<Arc<Self>> {
        let cache = TranslationCache::new(
            Arc::clone(&storage),
            CacheConfig {
                ttl: config.cache_ttl(),
                persist_every: config.cache_persist_every,
            },
        );
        let vocabulary = VocabularyTracker::new(Arc::clone(&storage));

        let coordinator = Arc::new(Self {
            config,
            storage,
            cache,
            vocabulary,
            provider,
            sink,
            tabs: Mutex::new(HashMap::new()),
            stats: RwLock::new(CoordinatorStats::default()),
            active_loops: AtomicUsize::new(0),
        });

        // 启动清扫：过期条目在第一次请求到来前回收
        let swept = coordinator.cache.sweep_expired();
        tracing::info!(
            "协调器就绪: 提供者 {}, 启动清扫删除 {} 条",
            coordinator.provider.name(),
            swept
        );

        Ok(coordinator)
    }

    /// 启动周期性缓存清扫任务
    pub fn spawn_sweep_timer(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // 第一次立即到期，启动清扫已在构建时完成
            loop {
                ticker.tick().await;
                this.cache.sweep_expired();
            }
        })
    }

    /// 统一请求入口
    pub async fn handle(self: &Arc<Self>, request: Request) -> TranslationResult<Response> {
        match request {
            Request::ProcessWords {
                tab_id,
                words,
                target_language,
            } => {
                self.process_words(tab_id, words, target_language);
                Ok(Response::Ack)
            }
            Request::UpdateSettings(update) => {
                self.update_settings(update)?;
                Ok(Response::Ack)
            }
            Request::GetStats => Ok(Response::Stats(self.usage_stats())),
            Request::MarkLearned { word } => {
                self.mark_learned(&word);
                Ok(Response::Ack)
            }
            Request::BlacklistWord { word } => {
                self.blacklist_word(&word);
                Ok(Response::Ack)
            }
            Request::SetCustomTranslation { word, translation } => {
                self.set_custom_translation(&word, &translation);
                Ok(Response::Ack)
            }
            Request::MarkIncorrect { word, translation } => {
                self.mark_incorrect(&word, &translation);
                Ok(Response::Ack)
            }
            Request::ClearCache => {
                self.cache.clear();
                tracing::info!("翻译缓存已清空");
                Ok(Response::Ack)
            }
            Request::ClearAllData => {
                self.clear_all_data();
                Ok(Response::Ack)
            }
            Request::ExportData => Ok(Response::Snapshot(Box::new(self.storage.snapshot()))),
            Request::ImportData(snapshot) => {
                self.import_data(*snapshot);
                Ok(Response::Ack)
            }
        }
    }

    // ========================================================================
    // 热路径：词批处理
    // ========================================================================

    /// 入队一批候选词，必要时启动该标签页的处理循环
    pub fn process_words(
        self: &Arc<Self>,
        tab_id: TabId,
        words: Vec<WordCandidate>,
        target_language: String,
    ) {
        if !self.storage.read(|state| state.settings.enabled) {
            tracing::debug!("词汇替换未启用，丢弃标签页 {} 的 {} 个词", tab_id, words.len());
            return;
        }
        if words.is_empty() {
            return;
        }

        {
            let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
            stats.words_enqueued += words.len() as u64;
        }

        let start_loop = {
            let mut tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
            let queue = tabs
                .entry(tab_id)
                .or_insert_with(|| TabQueue::new(target_language.clone()));
            queue.target_language = target_language;
            queue.enqueue(words);

            if queue.state == TabState::Idle {
                queue.state = TabState::Processing;
                true
            } else {
                // 处理中：只合并队列，绝不启动第二个循环
                false
            }
        };

        if start_loop {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.run_tab(tab_id).await;
            });
        }
    }

    /// 标签页处理循环：FIFO 取块，直到队列排空
    async fn run_tab(self: Arc<Self>, tab_id: TabId) {
        let active = self.active_loops.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
            stats.loops_started += 1;
            stats.max_concurrent_loops = stats.max_concurrent_loops.max(active);
        }

        loop {
            let chunk_data = {
                let mut tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
                let Some(tab_queue) = tabs.get_mut(&tab_id) else {
                    break;
                };
                if tab_queue.pending.is_empty() {
                    let total = tab_queue.processed;
                    tabs.remove(&tab_id);
                    drop(tabs);
                    let _ = self.sink.send(
                        tab_id,
                        TabEvent::Ready {
                            message: format!("Processed {} words", total),
                        },
                    );
                    break;
                }
                let chunk = tab_queue.next_chunk(self.config.chunk_size);
                (chunk, tab_queue.target_language.clone())
            };

            let (chunk, target_language) = chunk_data;
            let chunk_len = chunk.len();

            self.process_chunk(tab_id, &target_language, chunk).await;

            // 逐词失败已被吞掉，processed 无条件按块前进
            let (current, total) = {
                let mut tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
                match tabs.get_mut(&tab_id) {
                    Some(tab_queue) => {
                        tab_queue.processed += chunk_len;
                        (tab_queue.processed, tab_queue.total)
                    }
                    None => break,
                }
            };

            {
                let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
                stats.chunks_processed += 1;
            }

            let percentage = if total == 0 { 100 } else { current * 100 / total };
            let _ = self.sink.send(
                tab_id,
                TabEvent::ProgressUpdate {
                    message: format!("Processing words... {}/{}", current, total),
                    current,
                    total,
                    percentage,
                    tab_id,
                },
            );
        }

        self.active_loops.fetch_sub(1, Ordering::SeqCst);
    }

    /// 处理一块词：分流、提交提供者、写穿缓存与词汇、推送事件
    async fn process_chunk(&self, tab_id: TabId, target_language: &str, chunk: Vec<WordCandidate>) {
        let partition = self.partition_chunk(tab_id, target_language, chunk);
        let mut emitted = partition.emitted_immediately;

        if !partition.needs_translation.is_empty() {
            let words: Vec<String> = partition
                .needs_translation
                .iter()
                .map(|c| c.text.clone())
                .collect();
            let difficulty = self.storage.read(|state| state.settings.difficulty);

            // 块内并发由提供者客户端负责，此处 await 即是块末汇合点
            let translations = self
                .provider
                .translate_batch(&words, "auto", target_language, difficulty)
                .await;

            for candidate in partition.needs_translation {
                let Some(translation) = translations.get(&candidate.text) else {
                    // 响应中缺失的词视为"无可用翻译"，计数照常前进
                    continue;
                };

                // 与原词相同的译文照样写入缓存（兼作跨重启的失败记忆），
                // 只在展示层被过滤
                self.cache
                    .set(&candidate.text, "auto", target_language, translation, false);

                if usefully_translated(&candidate.text, translation) {
                    self.vocabulary.add_word(&candidate.text, translation);
                    let _ = self.sink.send(
                        tab_id,
                        TabEvent::TranslationReady {
                            original_text: candidate.text,
                            translation: translation.clone(),
                            index: candidate.index,
                        },
                    );
                    emitted += 1;
                }
            }
        }

        let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
        stats.translations_emitted += emitted as u64;
    }

    /// 分流一块词，立即可出结果的当场推送
    fn partition_chunk(
        &self,
        tab_id: TabId,
        target_language: &str,
        chunk: Vec<WordCandidate>,
    ) -> ChunkPartition {
        let (blacklist, custom, learned) = self.storage.read(|state| {
            (
                state.word_blacklist.clone(),
                state.custom_translations.clone(),
                state.learned_words.clone(),
            )
        });

        let mut emitted_immediately = 0;
        let mut needs_translation = Vec::new();

        for candidate in chunk {
            let normalized = normalize_word(&candidate.text);

            if blacklist.contains(&normalized) || learned.contains(&normalized) {
                continue;
            }

            if let Some(translation) = custom.get(&normalized) {
                let _ = self.sink.send(
                    tab_id,
                    TabEvent::TranslationReady {
                        original_text: candidate.text,
                        translation: translation.clone(),
                        index: candidate.index,
                    },
                );
                emitted_immediately += 1;
                continue;
            }

            if let Some(translation) = self.cache.get(&candidate.text, "auto", target_language) {
                if usefully_translated(&candidate.text, &translation) {
                    self.vocabulary.add_word(&candidate.text, &translation);
                    let _ = self.sink.send(
                        tab_id,
                        TabEvent::TranslationReady {
                            original_text: candidate.text,
                            translation,
                            index: candidate.index,
                        },
                    );
                    emitted_immediately += 1;
                }
                continue;
            }

            needs_translation.push(candidate);
        }

        ChunkPartition {
            emitted_immediately,
            needs_translation,
        }
    }

    // ========================================================================
    // 用户纠错动作
    // ========================================================================

    /// 标记已学会，之后不再替换该词
    pub fn mark_learned(&self, word: &str) {
        self.vocabulary.mark_learned(word);
        tracing::debug!("词 '{}' 已标记为学会", word);
    }

    /// 加入黑名单并清除该词的全部缓存条目
    pub fn blacklist_word(&self, word: &str) {
        let normalized = normalize_word(word);
        self.storage.update(|state| {
            state.word_blacklist.insert(normalized.clone());
        });
        let purged = self.cache.purge_word(word);
        tracing::debug!("词 '{}' 已加入黑名单，清除 {} 条缓存", word, purged);
    }

    /// 设置自定义翻译：清除缓存条目，之后短路于覆盖表
    pub fn set_custom_translation(&self, word: &str, translation: &str) {
        let normalized = normalize_word(word);
        self.storage.update(|state| {
            state
                .custom_translations
                .insert(normalized, translation.to_string());
        });
        self.cache.purge_word(word);
        self.forward_feedback(word, translation, FeedbackType::Custom, Some(translation));
    }

    /// 上报误译：清除缓存条目并记入诊断日志，不自动学习替代翻译
    pub fn mark_incorrect(&self, word: &str, translation: &str) {
        self.cache.purge_word(word);
        let target_language = self
            .storage
            .read(|state| state.settings.target_language.clone());
        self.storage.update(|state| {
            state.incorrect_translations.push(IncorrectTranslation {
                word: word.to_string(),
                incorrect_translation: translation.to_string(),
                reported_at: Utc::now(),
                target_language,
            });
        });
        self.forward_feedback(word, translation, FeedbackType::Incorrect, None);
    }

    /// 向提供者转发纠错反馈（发后即忘）
    fn forward_feedback(
        &self,
        word: &str,
        translation: &str,
        feedback_type: FeedbackType,
        custom_translation: Option<&str>,
    ) {
        let record = FeedbackRecord {
            original_word: word.to_string(),
            translated_word: translation.to_string(),
            target_language: self
                .storage
                .read(|state| state.settings.target_language.clone()),
            feedback_type,
            custom_translation: custom_translation.map(str::to_string),
        };
        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move {
            let _ = provider.submit_feedback(record).await;
        });
    }

    /// 该词当前是否还会被翻译
    pub fn should_translate(&self, word: &str) -> bool {
        let normalized = normalize_word(word);
        self.storage.read(|state| {
            !state.word_blacklist.contains(&normalized) && !state.learned_words.contains(&normalized)
        })
    }

    // ========================================================================
    // 设置与数据管理
    // ========================================================================

    /// 部分更新设置并持久化
    ///
    /// 先在副本上验证，非法更新不会污染已持久化的设置。
    pub fn update_settings(&self, update: SettingsUpdate) -> TranslationResult<()> {
        let mut updated = self.storage.read(|state| state.settings.clone());
        updated.apply(update);
        updated.validate()?;
        self.storage.update(|state| state.settings = updated);
        Ok(())
    }

    /// 使用统计
    pub fn usage_stats(&self) -> UsageStats {
        let vocabulary_stats = self.vocabulary.stats();
        self.storage.read(|state| UsageStats {
            vocabulary_size: vocabulary_stats.vocabulary_size,
            learned_words_count: vocabulary_stats.learned_count,
            cache_size: state.cache_v2.len(),
            target_language: state.settings.target_language.clone(),
            difficulty: state.settings.difficulty,
            replacement_percentage: state.settings.replacement_percentage,
        })
    }

    /// 清空全部学习数据，保留设置与安装身份
    pub fn clear_all_data(&self) {
        self.storage.update(|state| {
            state.cache_v2.clear();
            state.vocabulary.clear();
            state.learned_words.clear();
            state.word_blacklist.clear();
            state.custom_translations.clear();
            state.incorrect_translations.clear();
        });
        tracing::info!("全部学习数据已清空");
    }

    /// 合并导入快照
    ///
    /// 词汇并集、末见较新者覆盖；已学会词集并集；缓存并集、创建
    /// 较新者覆盖。对同一快照重复导入是幂等的。
    pub fn import_data(&self, snapshot: PersistedState) {
        self.storage.update(|state| {
            for (key, incoming) in snapshot.cache_v2 {
                match state.cache_v2.get(&key) {
                    Some(existing) if existing.created_at >= incoming.created_at => {}
                    _ => {
                        state.cache_v2.insert(key, incoming);
                    }
                }
            }
        });
        self.vocabulary
            .import(snapshot.vocabulary, snapshot.learned_words);
        tracing::info!("数据导入完成");
    }

    /// 协调器统计快照
    pub fn stats(&self) -> CoordinatorStats {
        self.stats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 缓存组件（诊断与测试）
    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    /// 词汇组件（诊断与测试）
    pub fn vocabulary(&self) -> &VocabularyTracker {
        &self.vocabulary
    }

    /// 某标签页当前是否有活跃处理循环
    pub fn is_tab_processing(&self, tab_id: TabId) -> bool {
        let tabs = self.tabs.lock().unwrap_or_else(|e| e.into_inner());
        tabs.get(&tab_id)
            .map(|q| q.state == TabState::Processing)
            .unwrap_or(false)
    }

    /// 等待某标签页的队列排空
    pub async fn wait_for_tab(&self, tab_id: TabId) {
        loop {
            if !self.is_tab_processing(tab_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
