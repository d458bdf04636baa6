//! 翻译缓存模块
//!
//! 以 `词|源语言|目标语言` 为键缓存翻译结果，条目超过存活时间即视为
//! 过期：读取命中过期条目会顺手删除并按未命中处理，周期性清扫负责
//! 物理回收剩余的过期条目。
//!
//! 写回是批量的：每 N 次变更落盘一次。丢失一次写回只会造成一次
//! 多余的重复翻译，属于可接受的延迟/持久性折衷。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::{DEFAULT_CACHE_PERSIST_EVERY, DEFAULT_CACHE_TTL_SECS};
use crate::storage::Storage;

// ============================================================================
// 核心类型
// ============================================================================

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub translation: String,
    pub created_at: DateTime<Utc>,
    /// 用户自定义翻译写入的条目
    #[serde(default)]
    pub custom: bool,
}

impl CacheEntry {
    /// 创建新条目，以当前时间为创建时间戳
    pub fn new(translation: String, custom: bool) -> Self {
        Self {
            translation,
            created_at: Utc::now(),
            custom,
        }
    }

    /// 检查条目是否过期
    pub fn is_expired(&self, ttl: chrono::Duration) -> bool {
        Utc::now().signed_duration_since(self.created_at) > ttl
    }
}

/// 缓存配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 条目存活时间
    pub ttl: Duration,
    /// 每 N 次变更写回一次
    pub persist_every: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            persist_every: DEFAULT_CACHE_PERSIST_EVERY,
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub expired_removed: u64,
    pub purged: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 翻译缓存
pub struct TranslationCache {
    storage: Arc<Storage>,
    config: CacheConfig,
    mutations: AtomicUsize,
    stats: RwLock<CacheStats>,
}

// ============================================================================
// 实现
// ============================================================================

/// 规范化词形：去除首尾空白并转为小写
pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}

/// 生成缓存键
pub fn cache_key(word: &str, source_lang: &str, target_lang: &str) -> String {
    format!("{}|{}|{}", normalize_word(word), source_lang, target_lang)
}

impl TranslationCache {
    /// 创建缓存，数据从共享存储镜像中读写
    pub fn new(storage: Arc<Storage>, config: CacheConfig) -> Self {
        Self {
            storage,
            config,
            mutations: AtomicUsize::new(0),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.ttl).unwrap_or(chrono::Duration::MAX)
    }

    /// 查询翻译
    ///
    /// 命中过期条目时删除该条目并返回未命中。
    pub fn get(&self, word: &str, source_lang: &str, target_lang: &str) -> Option<String> {
        let key = cache_key(word, source_lang, target_lang);
        let ttl = self.ttl();

        enum Outcome {
            Hit(String),
            Expired,
            Miss,
        }

        let outcome = self.storage.update_deferred(|state| {
            match state.cache_v2.get(&key) {
                Some(entry) if !entry.is_expired(ttl) => Outcome::Hit(entry.translation.clone()),
                Some(_) => {
                    state.cache_v2.remove(&key);
                    Outcome::Expired
                }
                None => Outcome::Miss,
            }
        });

        let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
        stats.requests += 1;
        match outcome {
            Outcome::Hit(translation) => {
                stats.hits += 1;
                Some(translation)
            }
            Outcome::Expired => {
                stats.misses += 1;
                stats.expired_removed += 1;
                None
            }
            Outcome::Miss => {
                stats.misses += 1;
                None
            }
        }
    }

    /// 写入翻译，盖掉同键旧条目
    pub fn set(
        &self,
        word: &str,
        source_lang: &str,
        target_lang: &str,
        translation: &str,
        custom: bool,
    ) {
        let key = cache_key(word, source_lang, target_lang);
        self.storage.update_deferred(|state| {
            state
                .cache_v2
                .insert(key, CacheEntry::new(translation.to_string(), custom));
        });

        self.stats.write().unwrap_or_else(|e| e.into_inner()).sets += 1;

        let mutations = self.mutations.fetch_add(1, Ordering::Relaxed) + 1;
        if mutations % self.config.persist_every == 0 {
            self.storage.persist();
        }
    }

    /// 清扫过期条目，返回删除数量
    ///
    /// 启动时和周期定时器各跑一次。
    pub fn sweep_expired(&self) -> usize {
        let ttl = self.ttl();
        let removed = self.storage.update_deferred(|state| {
            let before = state.cache_v2.len();
            state.cache_v2.retain(|_, entry| !entry.is_expired(ttl));
            before - state.cache_v2.len()
        });

        if removed > 0 {
            self.storage.persist();
            tracing::info!("缓存清扫完成，删除 {} 条过期条目", removed);
        }

        let mut stats = self.stats.write().unwrap_or_else(|e| e.into_inner());
        stats.expired_removed += removed as u64;
        removed
    }

    /// 删除某个词在所有语言组合下的条目，返回删除数量
    pub fn purge_word(&self, word: &str) -> usize {
        let normalized = normalize_word(word);
        let removed = self.storage.update(|state| {
            let before = state.cache_v2.len();
            state
                .cache_v2
                .retain(|key, _| key.split('|').next() != Some(normalized.as_str()));
            before - state.cache_v2.len()
        });

        self.stats
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .purged += removed as u64;
        removed
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.storage.update(|state| {
            state.cache_v2.clear();
        });
    }

    /// 缓存条目数
    pub fn len(&self) -> usize {
        self.storage.read(|state| state.cache_v2.len())
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 获取统计信息
    pub fn stats(&self) -> CacheStats {
        self.stats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{JsonFileStore, MemoryStore, StateStore};

    fn test_cache(config: CacheConfig) -> TranslationCache {
        let storage = Arc::new(Storage::open(Box::new(MemoryStore::new())));
        TranslationCache::new(storage, config)
    }

    #[test]
    fn test_basic_operations() {
        let cache = test_cache(CacheConfig::default());

        cache.set("house", "auto", "fr", "maison", false);
        assert_eq!(cache.get("house", "auto", "fr"), Some("maison".to_string()));
        assert_eq!(cache.get("house", "auto", "de"), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_normalization() {
        let cache = test_cache(CacheConfig::default());

        cache.set("  House ", "auto", "fr", "maison", false);
        // 大小写与空白归一到同一个键
        assert_eq!(cache.get("house", "auto", "fr"), Some("maison".to_string()));
        assert_eq!(cache.get("HOUSE", "auto", "fr"), Some("maison".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entry_removed_on_get() {
        let cache = test_cache(CacheConfig {
            ttl: Duration::from_millis(0),
            ..Default::default()
        });

        cache.set("house", "auto", "fr", "maison", false);
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.get("house", "auto", "fr"), None);
        // 读取时已物理删除，后续清扫不再计入
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.sweep_expired(), 0);
    }

    #[test]
    fn test_sweep_expired() {
        let cache = test_cache(CacheConfig {
            ttl: Duration::from_millis(0),
            ..Default::default()
        });

        cache.set("one", "auto", "fr", "un", false);
        cache.set("two", "auto", "fr", "deux", false);
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.sweep_expired(), 2);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_purge_word_across_languages() {
        let cache = test_cache(CacheConfig::default());

        cache.set("house", "auto", "fr", "maison", false);
        cache.set("house", "auto", "de", "Haus", false);
        cache.set("cat", "auto", "fr", "chat", false);

        assert_eq!(cache.purge_word("House"), 2);
        assert_eq!(cache.get("house", "auto", "fr"), None);
        assert_eq!(cache.get("house", "auto", "de"), None);
        assert_eq!(cache.get("cat", "auto", "fr"), Some("chat".to_string()));

        // 幂等：再次清除没有剩余条目
        assert_eq!(cache.purge_word("house"), 0);
    }

    #[test]
    fn test_batched_persistence() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("state.json");

        let storage = Arc::new(Storage::open(Box::new(JsonFileStore::new(path.clone()))));
        let cache = TranslationCache::new(
            storage,
            CacheConfig {
                persist_every: 5,
                ..Default::default()
            },
        );

        for i in 0..4 {
            cache.set(&format!("word{}", i), "auto", "fr", "mot", false);
        }
        // 未到写回间隔，后端还看不到数据
        let on_disk = JsonFileStore::new(path.clone()).load().expect("读取失败");
        assert!(on_disk.cache_v2.is_empty());

        cache.set("word4", "auto", "fr", "mot", false);
        let on_disk = JsonFileStore::new(path).load().expect("读取失败");
        assert_eq!(on_disk.cache_v2.len(), 5);
    }

    #[test]
    fn test_stats() {
        let cache = test_cache(CacheConfig::default());

        cache.set("house", "auto", "fr", "maison", false);
        cache.get("house", "auto", "fr");
        cache.get("missing", "auto", "fr");

        let stats = cache.stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
