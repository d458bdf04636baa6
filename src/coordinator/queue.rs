//! 每标签页处理队列
//!
//! 显式状态机：`Idle → Processing → Idle`。批次到达时若无活跃处理
//! 循环则启动一个；处理期间到达的批次只追加到同一队列，绝不并发
//! 启动第二个循环——这是整个协调器的核心并发不变量。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// 标签页标识
pub type TabId = u64;

/// 待翻译候选词
///
/// 由页面代理在每次扫描时创建，`index` 是其在源文本单元中的偏移，
/// 匹配到翻译或被丢弃后即消亡。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCandidate {
    pub text: String,
    pub index: usize,
}

/// 标签页处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabState {
    Idle,
    Processing,
}

/// 标签页队列
#[derive(Debug)]
pub struct TabQueue {
    pub state: TabState,
    pub pending: VecDeque<WordCandidate>,
    pub target_language: String,
    /// 已处理词数（含跳过与失败）
    pub processed: usize,
    /// 累计入队词数
    pub total: usize,
}

impl TabQueue {
    pub fn new(target_language: String) -> Self {
        Self {
            state: TabState::Idle,
            pending: VecDeque::new(),
            target_language,
            processed: 0,
            total: 0,
        }
    }

    /// 追加一批候选词
    pub fn enqueue(&mut self, words: Vec<WordCandidate>) {
        self.total += words.len();
        self.pending.extend(words);
    }

    /// 取出下一块，至多 `chunk_size` 个词
    pub fn next_chunk(&mut self, chunk_size: usize) -> Vec<WordCandidate> {
        let n = self.pending.len().min(chunk_size);
        self.pending.drain(..n).collect()
    }

    /// 处理进度百分比
    pub fn percentage(&self) -> usize {
        if self.total == 0 {
            100
        } else {
            self.processed * 100 / self.total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(words: &[&str]) -> Vec<WordCandidate> {
        words
            .iter()
            .enumerate()
            .map(|(i, w)| WordCandidate {
                text: w.to_string(),
                index: i,
            })
            .collect()
    }

    #[test]
    fn test_enqueue_and_chunk() {
        let mut queue = TabQueue::new("fr".to_string());
        queue.enqueue(candidates(&["a", "b", "c"]));
        queue.enqueue(candidates(&["d"]));

        assert_eq!(queue.total, 4);
        // 块按 FIFO 顺序取出
        let chunk = queue.next_chunk(3);
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk[0].text, "a");
        assert_eq!(queue.pending.len(), 1);
    }

    #[test]
    fn test_percentage() {
        let mut queue = TabQueue::new("fr".to_string());
        assert_eq!(queue.percentage(), 100);

        queue.enqueue(candidates(&["a", "b", "c", "d"]));
        queue.processed = 1;
        assert_eq!(queue.percentage(), 25);
    }
}
