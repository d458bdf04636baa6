//! 持久化集成测试
//!
//! 缓存与学习数据必须在进程重启后仍然可用。

use std::sync::Arc;

use lexilearn::coordinator::Request;
use lexilearn::storage::{JsonFileStore, StateStore};
use lexilearn::{ChannelSink, Coordinator, PipelineConfig};

mod common;

use common::{drain_events, word_batch, MockProvider};

fn file_coordinator(
    path: std::path::PathBuf,
    provider: Arc<MockProvider>,
) -> (
    Arc<Coordinator>,
    tokio::sync::mpsc::UnboundedReceiver<(u64, lexilearn::TabEvent)>,
) {
    common::init_test_tracing();
    let (sink, rx) = ChannelSink::new();
    let coordinator = Coordinator::with_provider(
        PipelineConfig {
            // 立即写回，测试不依赖批量间隔
            cache_persist_every: 1,
            ..Default::default()
        },
        Box::new(JsonFileStore::new(path)),
        provider,
        Arc::new(sink),
    )
    .expect("构建协调器失败");
    (coordinator, rx)
}

/// 缓存与词汇在重启后仍然可用，重启后的同词请求不再访问提供者
#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("state.json");

    // 第一个进程生命周期：翻译并落盘
    {
        let provider = Arc::new(MockProvider::new(&[("house", "maison")]));
        let (coordinator, mut rx) = file_coordinator(path.clone(), Arc::clone(&provider));
        coordinator
            .handle(Request::UpdateSettings(lexilearn::SettingsUpdate {
                enabled: Some(true),
                ..Default::default()
            }))
            .await
            .expect("更新设置失败");

        coordinator
            .handle(Request::ProcessWords {
                tab_id: 1,
                words: word_batch(&["house"]),
                target_language: "fr".to_string(),
            })
            .await
            .expect("入队失败");
        drain_events(&coordinator, 1, &mut rx).await;
        assert_eq!(provider.batch_calls(), 1);
    }

    // 第二个进程生命周期：从同一状态文件冷启动
    let provider = Arc::new(MockProvider::new(&[]));
    let (coordinator, mut rx) = file_coordinator(path, Arc::clone(&provider));

    // 设置一并恢复
    let stats = coordinator.usage_stats();
    assert_eq!(stats.vocabulary_size, 1);
    assert_eq!(stats.cache_size, 1);

    coordinator
        .handle(Request::ProcessWords {
            tab_id: 2,
            words: word_batch(&["house"]),
            target_language: "fr".to_string(),
        })
        .await
        .expect("入队失败");
    let events = drain_events(&coordinator, 2, &mut rx).await;

    // 缓存命中：提供者一次也不会被调用
    assert_eq!(common::ready_translations(&events).len(), 1);
    assert_eq!(provider.batch_calls(), 0);

    let entry = coordinator.vocabulary().get("house").expect("词汇条目缺失");
    assert_eq!(entry.encounters, 2);

    println!("✅ 状态重启存活通过");
}

/// 状态文件损坏时降级为默认状态而不是崩溃
#[tokio::test]
async fn test_corrupt_state_degrades_to_default() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("state.json");
    std::fs::write(&path, b"{ not valid json").expect("写入损坏文件失败");

    let provider = Arc::new(MockProvider::new(&[]));
    let (coordinator, _rx) = file_coordinator(path.clone(), provider);

    let stats = coordinator.usage_stats();
    assert_eq!(stats.vocabulary_size, 0);
    assert_eq!(stats.cache_size, 0);

    // 之后的写入恢复出合法的状态文件
    coordinator.mark_learned("house");
    let reloaded = JsonFileStore::new(path).load().expect("重新加载失败");
    assert!(reloaded.learned_words.contains("house"));

    println!("✅ 损坏状态文件降级通过");
}
