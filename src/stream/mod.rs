//! 结果流
//!
//! 面向单个提交的有序出站通道。阶段完成时调用 `emit` 推送事件，
//! 运行结束时调用 `close` 推送终止事件并关闭通道。
//!
//! ## 顺序保证
//!
//! 序号在推送时刻分配（而非阶段启动时刻），分配与入队在同一把锁内
//! 完成，因此消费方观察到的序号严格递增，并发完成的阶段按真实完成
//! 顺序排列，之后不再被重排。
//!
//! ## 背压
//!
//! 通道有界：消费方读取缓慢时 `emit` 会挂起，上游生产随之暂停，
//! 事件绝不静默丢弃。消费方断开（接收端被丢弃）时 `emit` 返回
//! `StreamClosed`，调度器据此取消剩余任务。

use tokio::sync::{mpsc, Mutex};

use crate::error::{EvalError, EvalResult, PipelineError};
use crate::models::StageEvent;

/// 默认通道容量
const DEFAULT_CAPACITY: usize = 16;

struct StreamInner {
    next_seq: u64,
    tx: Option<mpsc::Sender<StageEvent>>,
}

/// 一次提交的结果流（发送侧）
pub struct ResultStream {
    inner: Mutex<StreamInner>,
}

impl ResultStream {
    /// 创建结果流，返回发送侧与消费侧
    pub fn channel() -> (Self, mpsc::Receiver<StageEvent>) {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<StageEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                inner: Mutex::new(StreamInner {
                    next_seq: 1,
                    tx: Some(tx),
                }),
            },
            rx,
        )
    }

    /// 推送一条事件，返回分配到的序号
    ///
    /// 序号分配与入队在同一临界区内完成；消费方缓慢时在此处等待
    /// （背压），消费方断开时返回 `StreamClosed`。
    pub async fn emit(&self, mut event: StageEvent) -> EvalResult<u64> {
        let mut inner = self.inner.lock().await;
        let tx = inner
            .tx
            .as_ref()
            .ok_or(EvalError::Pipeline(PipelineError::StreamClosed))?
            .clone();

        let seq = inner.next_seq;
        event.sequence_number = seq;

        tx.send(event)
            .await
            .map_err(|_| EvalError::Pipeline(PipelineError::StreamClosed))?;

        inner.next_seq += 1;
        Ok(seq)
    }

    /// 推送终止事件并关闭流
    ///
    /// 之后的 `emit` 一律返回 `StreamClosed`。重复 `close` 是无害的
    /// 空操作。
    pub async fn close(&self, terminal: StageEvent) -> EvalResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(tx) = inner.tx.take() else {
            return Ok(());
        };

        let mut event = terminal;
        event.sequence_number = inner.next_seq;
        inner.next_seq += 1;

        // 消费方已断开时关闭同样视为完成
        let _ = tx.send(event).await;
        Ok(())
    }

    /// 流是否已关闭
    pub async fn is_closed(&self) -> bool {
        let inner = self.inner.lock().await;
        match &inner.tx {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }
}
