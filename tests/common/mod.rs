//! 集成测试共用辅助设施

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc::UnboundedReceiver;

use lexilearn::coordinator::{ChannelSink, Coordinator, TabEvent, TabId, WordCandidate};
use lexilearn::provider::TranslationProvider;
use lexilearn::settings::{Difficulty, PipelineConfig};
use lexilearn::storage::{MemoryStore, PersistedState};

/// 固定词表的模拟提供者
///
/// 记录批次数与请求词数，可注入延迟模拟慢速网络。
pub struct MockProvider {
    table: HashMap<String, String>,
    delay: Option<Duration>,
    batch_calls: AtomicUsize,
    words_requested: AtomicUsize,
}

impl MockProvider {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            table: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            delay: None,
            batch_calls: AtomicUsize::new(0),
            words_requested: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 收到的批次数
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// 收到的词总数
    pub fn words_requested(&self) -> usize {
        self.words_requested.load(Ordering::SeqCst)
    }
}

impl TranslationProvider for MockProvider {
    fn translate_batch<'a>(
        &'a self,
        words: &'a [String],
        _source_lang: &'a str,
        _target_lang: &'a str,
        _difficulty: Difficulty,
    ) -> BoxFuture<'a, HashMap<String, String>> {
        Box::pin(async move {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            self.words_requested.fetch_add(words.len(), Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            words
                .iter()
                .filter_map(|word| {
                    self.table
                        .get(word)
                        .map(|translation| (word.clone(), translation.clone()))
                })
                .collect()
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// 初始化测试日志订阅器，重复调用自动忽略
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// 构建启用状态的协调器与事件接收通道
pub fn enabled_coordinator(
    provider: Arc<MockProvider>,
) -> (Arc<Coordinator>, UnboundedReceiver<(TabId, TabEvent)>) {
    init_test_tracing();

    let mut state = PersistedState::default();
    state.settings.enabled = true;

    let (sink, rx) = ChannelSink::new();
    let coordinator = Coordinator::with_provider(
        PipelineConfig::default(),
        Box::new(MemoryStore::with_state(state)),
        provider,
        Arc::new(sink),
    )
    .expect("构建协调器失败");

    (coordinator, rx)
}

/// 构建候选词批，索引按位置递增
pub fn word_batch(words: &[&str]) -> Vec<WordCandidate> {
    words
        .iter()
        .enumerate()
        .map(|(index, text)| WordCandidate {
            text: text.to_string(),
            index,
        })
        .collect()
}

/// 等待标签页队列排空后取走全部已投递事件
pub async fn drain_events(
    coordinator: &Arc<Coordinator>,
    tab_id: TabId,
    rx: &mut UnboundedReceiver<(TabId, TabEvent)>,
) -> Vec<TabEvent> {
    coordinator.wait_for_tab(tab_id).await;
    // 队列移除与最后的 Ready 投递之间留出余量
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut events = Vec::new();
    while let Ok((event_tab, event)) = rx.try_recv() {
        assert_eq!(event_tab, tab_id, "事件投递到了错误的标签页");
        events.push(event);
    }
    events
}

/// 过滤出翻译就绪事件，返回 (原词, 译文) 对
pub fn ready_translations(events: &[TabEvent]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            TabEvent::TranslationReady {
                original_text,
                translation,
                ..
            } => Some((original_text.clone(), translation.clone())),
            _ => None,
        })
        .collect()
}
