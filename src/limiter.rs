//! 滑动窗口速率限制器
//!
//! 保护按量计费的外部翻译接口：窗口内的预约数永远不会超过预算，
//! 超出预算的调用方被挂起，直到最早的预约滑出窗口。

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::{TranslationError, TranslationResult};

/// 重新评估前的安全余量，避免因计时精度在窗口边缘空转
const WAIT_EPSILON: Duration = Duration::from_millis(5);

/// 滑动窗口速率限制器
///
/// 多个调用方可以并发 `acquire`；唤醒后重新竞争预约槽，
/// 因此等待者之间不存在固定顺序，但窗口不变量始终成立。
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    reservations: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// 创建速率限制器
    ///
    /// `max_requests` 为 0 会导致无界等待，视为配置错误立即失败。
    pub fn new(max_requests: usize, window: Duration) -> TranslationResult<Self> {
        if max_requests == 0 {
            return Err(TranslationError::Config("速率预算不能为0".to_string()));
        }
        if window.is_zero() {
            return Err(TranslationError::Config("速率窗口不能为0".to_string()));
        }
        Ok(Self {
            max_requests,
            window,
            reservations: Mutex::new(VecDeque::new()),
        })
    }

    /// 获取一个请求槽，必要时挂起等待
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut reservations = self.reservations.lock().await;
                let now = Instant::now();

                // 丢弃已滑出窗口的预约
                while let Some(&front) = reservations.front() {
                    if now.duration_since(front) >= self.window {
                        reservations.pop_front();
                    } else {
                        break;
                    }
                }

                if reservations.len() < self.max_requests {
                    reservations.push_back(now);
                    return;
                }

                match reservations.front() {
                    Some(&oldest) => {
                        self.window
                            .checked_sub(now.duration_since(oldest))
                            .unwrap_or_default()
                            + WAIT_EPSILON
                    }
                    None => continue,
                }
            };

            tracing::trace!("速率窗口已满，等待 {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// 当前窗口内的预约数（诊断用）
    pub async fn pending(&self) -> usize {
        let mut reservations = self.reservations.lock().await;
        let now = Instant::now();
        while let Some(&front) = reservations.front() {
            if now.duration_since(front) >= self.window {
                reservations.pop_front();
            } else {
                break;
            }
        }
        reservations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_fails_fast() {
        assert!(matches!(
            RateLimiter::new(0, Duration::from_millis(100)),
            Err(TranslationError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_within_budget_no_wait() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10)).expect("创建限速器失败");

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.pending().await, 3);
    }

    #[tokio::test]
    async fn test_over_budget_waits_for_window() {
        let window = Duration::from_millis(200);
        let limiter = RateLimiter::new(2, window).expect("创建限速器失败");

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        // 第三次必须等待第一条预约滑出窗口
        limiter.acquire().await;

        assert!(start.elapsed() >= window);
    }

    #[tokio::test]
    async fn test_window_never_exceeds_budget() {
        use std::sync::Arc;

        let limiter = Arc::new(
            RateLimiter::new(2, Duration::from_millis(150)).expect("创建限速器失败"),
        );

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
            }));
        }
        for handle in handles {
            handle.await.expect("acquire 任务失败");
        }

        // 所有并发调用完成后，窗口内的预约数仍不超过预算
        assert!(limiter.pending().await <= 2);
    }
}
