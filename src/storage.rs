//! 持久化状态模块
//!
//! 整个管线的持久化状态是一个扁平结构：缓存、词汇、已学会词集、
//! 黑名单、自定义翻译、误译日志、用户设置和安装身份。状态在启动时
//! 一次性加载，之后由各组件通过 `Storage` 镜像读写。
//!
//! 写入失败只记录日志、不向调用方传播：丢失一次缓存写回最多导致
//! 一次多余的重复翻译，不会产生错误输出。

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::cache::CacheEntry;
use crate::error::{TranslationError, TranslationResult};
use crate::settings::Settings;
use crate::vocabulary::VocabularyEntry;

/// 误译记录（诊断日志，只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncorrectTranslation {
    pub word: String,
    pub incorrect_translation: String,
    pub reported_at: DateTime<Utc>,
    pub target_language: String,
}

/// 安装身份
///
/// 本地生成的 RFC-4122 v4 标识，独立于任何用户账号；
/// `registered` 保证只向中间服务器成功注册一次。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationIdentity {
    pub id: String,
    pub registered: bool,
    pub user_id: Option<String>,
}

impl InstallationIdentity {
    /// 生成全新的未注册身份
    pub fn generate() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            registered: false,
            user_id: None,
        }
    }
}

/// 全部持久化状态
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    /// 翻译缓存，键为 `词|源语言|目标语言`
    pub cache_v2: HashMap<String, CacheEntry>,
    /// 词汇表，键为小写原词
    pub vocabulary: HashMap<String, VocabularyEntry>,
    /// 已学会词集（小写）
    pub learned_words: HashSet<String>,
    /// 永不翻译词集（小写）
    pub word_blacklist: HashSet<String>,
    /// 用户自定义翻译，键为小写原词
    pub custom_translations: HashMap<String, String>,
    /// 误译日志
    pub incorrect_translations: Vec<IncorrectTranslation>,
    /// 用户设置
    pub settings: Settings,
    /// 安装身份
    pub identity: Option<InstallationIdentity>,
}

/// 状态存储后端
pub trait StateStore: Send + Sync {
    /// 加载全部状态；文件不存在时返回默认状态
    fn load(&self) -> TranslationResult<PersistedState>;

    /// 写回全部状态
    fn save(&self, state: &PersistedState) -> TranslationResult<()>;
}

/// JSON 文件后端
///
/// 通过临时文件 + 原子改名写入，崩溃不会留下半写状态。
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> TranslationResult<PersistedState> {
        if !self.path.exists() {
            return Ok(PersistedState::default());
        }
        let file = File::open(&self.path)?;
        let state = serde_json::from_reader(BufReader::new(file))?;
        Ok(state)
    }

    fn save(&self, state: &PersistedState) -> TranslationResult<()> {
        let parent = self
            .path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;

        let temp = NamedTempFile::new_in(&parent)?;
        serde_json::to_writer(BufWriter::new(&temp), state)?;
        temp.persist(&self.path)
            .map_err(|e| TranslationError::Storage(format!("状态文件改名失败: {}", e)))?;
        Ok(())
    }
}

/// 内存后端（测试与嵌入场景）
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<PersistedState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定初始状态创建
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> TranslationResult<PersistedState> {
        Ok(self
            .state
            .read()
            .map_err(|_| TranslationError::Internal("状态锁中毒".to_string()))?
            .clone())
    }

    fn save(&self, state: &PersistedState) -> TranslationResult<()> {
        *self
            .state
            .write()
            .map_err(|_| TranslationError::Internal("状态锁中毒".to_string()))? = state.clone();
        Ok(())
    }
}

/// 共享状态镜像
///
/// 启动时从后端一次性加载，之后所有读写都针对内存镜像；
/// `update` 每次变更后立即写回，`update_deferred` 留给调用方
/// 自行决定写回时机（缓存的批量写回走这条路径）。
pub struct Storage {
    store: Box<dyn StateStore>,
    mirror: RwLock<PersistedState>,
}

impl Storage {
    /// 打开存储，立即加载持久化状态
    ///
    /// 加载失败降级为默认状态：丢失的只是学习数据快照，
    /// 管线仍可继续工作。
    pub fn open(store: Box<dyn StateStore>) -> Self {
        let state = match store.load() {
            Ok(state) => {
                tracing::info!(
                    "已加载持久化状态: 缓存 {} 条, 词汇 {} 条",
                    state.cache_v2.len(),
                    state.vocabulary.len()
                );
                state
            }
            Err(e) => {
                tracing::warn!("加载持久化状态失败，使用默认状态: {}", e);
                PersistedState::default()
            }
        };
        Self {
            store,
            mirror: RwLock::new(state),
        }
    }

    /// 只读访问
    pub fn read<R>(&self, f: impl FnOnce(&PersistedState) -> R) -> R {
        let guard = self.mirror.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    /// 变更并立即写回
    pub fn update<R>(&self, f: impl FnOnce(&mut PersistedState) -> R) -> R {
        let result = {
            let mut guard = self.mirror.write().unwrap_or_else(|e| e.into_inner());
            f(&mut guard)
        };
        self.persist();
        result
    }

    /// 只变更镜像，不写回
    pub fn update_deferred<R>(&self, f: impl FnOnce(&mut PersistedState) -> R) -> R {
        let mut guard = self.mirror.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// 将镜像写回后端，失败只记录日志
    pub fn persist(&self) {
        let guard = self.mirror.read().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = self.store.save(&guard) {
            tracing::warn!("持久化状态写回失败: {}", e);
        }
    }

    /// 当前状态快照（数据导出）
    pub fn snapshot(&self) -> PersistedState {
        self.read(|state| state.clone())
    }
}
