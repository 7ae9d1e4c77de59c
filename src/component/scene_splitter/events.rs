//! 進度事件
//!
//! 工作執行緒以 `try_send` 推送事件，不會因訂閱端處理太慢而停下；
//! 緩衝區滿或訂閱端已關閉時事件被丟棄並計數。

use super::job::JobStatus;
use log::warn;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

/// 預設事件緩衝區大小
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    JobStarted {
        job_id: usize,
        input_path: PathBuf,
    },
    JobStageChanged {
        job_id: usize,
        status: JobStatus,
    },
    SegmentFinished {
        job_id: usize,
        index: usize,
        planned: usize,
        success: bool,
    },
    JobCompleted {
        job_id: usize,
        status: JobStatus,
        produced: usize,
        planned: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Option<SyncSender<ProgressEvent>>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    /// 建立有界事件通道
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        (
            Self {
                sender: Some(sender),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// 沒有訂閱者的事件出口，所有事件直接丟棄（不計數）
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            sender: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        let Some(sender) = &self.sender else {
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total == 1 {
                    warn!("事件緩衝區已滿，開始丟棄進度事件: {event:?}");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(job_id: usize) -> ProgressEvent {
        ProgressEvent::JobStarted {
            job_id,
            input_path: PathBuf::from(format!("{job_id}.mp4")),
        }
    }

    #[test]
    fn test_full_buffer_drops_without_blocking() {
        let (sink, receiver) = EventSink::channel(2);
        for id in 0..5 {
            sink.emit(started(id));
        }
        assert_eq!(sink.dropped(), 3);

        let received: Vec<ProgressEvent> = receiver.try_iter().collect();
        assert_eq!(received, vec![started(0), started(1)]);
    }

    #[test]
    fn test_disconnected_subscriber_counts_drops() {
        let (sink, receiver) = EventSink::channel(4);
        drop(receiver);
        sink.emit(started(0));
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn test_clones_share_drop_counter() {
        let (sink, _receiver) = EventSink::channel(0);
        let other = sink.clone();
        sink.emit(started(0));
        other.emit(started(1));
        assert_eq!(sink.dropped(), 2);
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        let sink = EventSink::disabled();
        sink.emit(started(0));
        assert_eq!(sink.dropped(), 0);
    }
}
