//! 词汇追踪模块
//!
//! 记录每个曾展示给用户的（原词 → 翻译）对，维护遇见次数和首末
//! 时间戳，外加独立的"已学会"词集。这是面向用户的数据，量小且
//! 正确性优先，所有变更立即落盘。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::normalize_word;
use crate::storage::Storage;

/// 词汇条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub original: String,
    pub translation: String,
    pub encounters: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// 词汇统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VocabularyStats {
    pub vocabulary_size: usize,
    pub learned_count: usize,
}

/// 词汇追踪器
pub struct VocabularyTracker {
    storage: Arc<Storage>,
}

impl VocabularyTracker {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// 记录一次词汇展示
    ///
    /// 首次出现创建条目，之后累加遇见次数、保留首见时间、刷新末见时间。
    pub fn add_word(&self, original: &str, translation: &str) {
        let key = normalize_word(original);
        let now = Utc::now();
        self.storage.update(|state| {
            state
                .vocabulary
                .entry(key)
                .and_modify(|entry| {
                    entry.translation = translation.to_string();
                    entry.encounters += 1;
                    entry.last_seen = now;
                })
                .or_insert_with(|| VocabularyEntry {
                    original: original.to_string(),
                    translation: translation.to_string(),
                    encounters: 1,
                    first_seen: now,
                    last_seen: now,
                });
        });
    }

    /// 将词标记为已学会，之后不再替换
    pub fn mark_learned(&self, word: &str) {
        let key = normalize_word(word);
        self.storage.update(|state| {
            state.learned_words.insert(key);
        });
    }

    /// 词是否已学会
    pub fn is_learned(&self, word: &str) -> bool {
        let key = normalize_word(word);
        self.storage.read(|state| state.learned_words.contains(&key))
    }

    /// 查询词汇条目
    pub fn get(&self, word: &str) -> Option<VocabularyEntry> {
        let key = normalize_word(word);
        self.storage.read(|state| state.vocabulary.get(&key).cloned())
    }

    /// 词汇统计
    pub fn stats(&self) -> VocabularyStats {
        self.storage.read(|state| VocabularyStats {
            vocabulary_size: state.vocabulary.len(),
            learned_count: state.learned_words.len(),
        })
    }

    /// 清空词汇表与已学会词集
    pub fn clear(&self) {
        self.storage.update(|state| {
            state.vocabulary.clear();
            state.learned_words.clear();
        });
    }

    /// 合并导入快照
    ///
    /// 词汇按键求并，末见时间较新者覆盖；已学会词集求并。
    /// 对同一快照重复导入是幂等的。
    pub fn import(
        &self,
        vocabulary: HashMap<String, VocabularyEntry>,
        learned_words: HashSet<String>,
    ) {
        self.storage.update(|state| {
            for (key, incoming) in vocabulary {
                match state.vocabulary.get(&key) {
                    Some(existing) if existing.last_seen >= incoming.last_seen => {}
                    _ => {
                        state.vocabulary.insert(key, incoming);
                    }
                }
            }
            state.learned_words.extend(learned_words);
        });
    }
}
