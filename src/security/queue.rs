//! 单通道请求队列
//!
//! 入队的任务按提交顺序执行，同一时刻只有一个任务在运行。
//! 前一个任务无论成功、失败还是 panic，结束后下一个任务都会继续执行。
//!
//! 任务一旦入队就由队列自己的工作任务驱动：调用方放弃等待（超时、`select!`）
//! 不会取消已入队的任务。

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::utils::{CoreError, Result};

type Job = BoxFuture<'static, ()>;

/// 单通道 FIFO 请求队列
///
/// 第一次入队时在当前 tokio 运行时上启动工作任务，克隆出的队列共享同一通道。
#[derive(Clone, Default)]
pub struct RequestQueue {
    lane: Arc<OnceLock<mpsc::UnboundedSender<Job>>>,
    /// 已提交但尚未结束的任务数
    pending: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

/// 任务结束（包括 panic）时更新计数
struct Settle {
    pending: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl Drop for Settle {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self) -> &mpsc::UnboundedSender<Job> {
        self.lane.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_lane(rx));
            tx
        })
    }

    /// 串行执行任务
    ///
    /// 调用时立即入队（`pending` 随即加一），任务在前序任务全部结束后才开始。
    /// 返回任务自身的结果；任务 panic 时返回 `Internal` 错误。
    pub async fn serie<Fut, T>(&self, task: Fut) -> Result<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let settle = Settle {
            pending: self.pending.clone(),
            completed: self.completed.clone(),
        };
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let output = task.await;
            // 计数先于结果送达，调用方拿到结果时统计已更新
            drop(settle);
            // 调用方可能已经放弃等待
            let _ = tx.send(output);
        });

        if let Err(mpsc::error::SendError(job)) = self.sender().send(job) {
            tracing::warn!("请求队列工作任务已退出，任务直接执行");
            job.await;
        }

        rx.await
            .map_err(|_| CoreError::Internal("队列任务异常终止".to_string()))
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending(),
            completed: self.completed.load(Ordering::SeqCst),
        }
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

/// 逐个执行任务；每个任务在独立的 tokio 任务中运行，panic 不会终止通道
async fn run_lane(mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        if let Err(e) = tokio::spawn(job).await {
            tracing::warn!(error = %e, "队列任务异常终止");
        }
    }
}

/// 队列统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub completed: usize,
}
