//! 速率限制集成测试
//!
//! 验证滑动窗口语义：延迟随窗口滑动而来，不是固定间隔。

use std::sync::Arc;
use std::time::{Duration, Instant};

use lexilearn::RateLimiter;

/// 场景 E：2 请求 / 2000ms 窗口下的 5 次顺序 acquire
///
/// 第 3、4、5 次调用分别相对第 1、2、3 次延迟至少约一个窗口。
#[tokio::test]
async fn test_sequential_acquires_follow_sliding_window() {
    let window = Duration::from_millis(2000);
    let limiter = RateLimiter::new(2, window).expect("创建限速器失败");

    let mut timestamps = Vec::with_capacity(5);
    for _ in 0..5 {
        limiter.acquire().await;
        timestamps.push(Instant::now());
    }

    // 前两次在预算内立即通过
    assert!(timestamps[1].duration_since(timestamps[0]) < Duration::from_millis(200));

    // 滑动窗口界限（留出少量计时容差）
    let lower = window - Duration::from_millis(50);
    assert!(timestamps[2].duration_since(timestamps[0]) >= lower);
    assert!(timestamps[3].duration_since(timestamps[1]) >= lower);
    assert!(timestamps[4].duration_since(timestamps[2]) >= lower);

    println!("✅ 场景 E 通过：滑动窗口延迟符合预期");
}

/// 并发 acquire 下窗口预约数不超过预算
#[tokio::test]
async fn test_concurrent_acquires_respect_budget() {
    let max_requests = 3;
    let window = Duration::from_millis(300);
    let limiter = Arc::new(RateLimiter::new(max_requests, window).expect("创建限速器失败"));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..9 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            limiter.acquire().await;
            Instant::now()
        }));
    }

    let mut completions: Vec<Instant> = Vec::new();
    for handle in handles {
        completions.push(handle.await.expect("acquire 任务失败"));
    }
    completions.sort();

    // 任意窗口长度的滑动区间内最多 max_requests 次放行
    for window_start in 0..completions.len() {
        let deadline = completions[window_start] + window - Duration::from_millis(20);
        let in_window = completions[window_start..]
            .iter()
            .filter(|&&t| t < deadline)
            .count();
        assert!(
            in_window <= max_requests,
            "窗口内放行 {} 次，超过预算 {}",
            in_window,
            max_requests
        );
    }

    // 9 次请求、每窗口 3 次，至少需要两个完整窗口
    assert!(start.elapsed() >= window * 2 - Duration::from_millis(50));

    println!("✅ 并发预算约束通过");
}
