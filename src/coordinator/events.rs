//! 出站事件与投递通道
//!
//! 向标签页的投递是尽力而为的发后即忘：页面可能已经跳转或关闭，
//! 发送失败只能静默丢弃——目标文本节点已经不存在了。`send` 返回
//! 的结果允许调用方直接丢弃，失败绝不升级为致命错误。

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

use super::queue::TabId;

/// 推送给标签页的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TabEvent {
    /// 单个词的翻译已就绪
    TranslationReady {
        original_text: String,
        translation: String,
        index: usize,
    },
    /// 每块处理完后的进度
    ProgressUpdate {
        message: String,
        current: usize,
        total: usize,
        percentage: usize,
        tab_id: TabId,
    },
    /// 队列排空
    Ready { message: String },
}

/// 投递失败
#[derive(Debug, Clone)]
pub struct DeliveryError(pub String);

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "事件投递失败: {}", self.0)
    }
}

impl std::error::Error for DeliveryError {}

/// 事件接收端
pub trait EventSink: Send + Sync {
    /// 尽力投递一个事件，调用方可以丢弃结果
    fn send(&self, tab_id: TabId, event: TabEvent) -> Result<(), DeliveryError>;
}

/// 基于通道的接收端
///
/// 嵌入方持有接收半边，把事件转发给真正的页面消息通道。
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(TabId, TabEvent)>,
}

impl ChannelSink {
    /// 创建接收端与配套的接收通道
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(TabId, TabEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn send(&self, tab_id: TabId, event: TabEvent) -> Result<(), DeliveryError> {
        self.tx
            .send((tab_id, event))
            .map_err(|_| DeliveryError("接收端已关闭".to_string()))
    }
}
