use crate::error::SplitError;
use crate::tools::EngineError;
use std::time::{Duration, Instant};

/// 單一工作的逾時期限
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    #[must_use]
    pub fn start(budget: Option<Duration>) -> Option<Self> {
        budget.map(|budget| Self {
            at: Instant::now() + budget,
            budget,
        })
    }

    #[must_use]
    pub const fn instant(self) -> Instant {
        self.at
    }

    #[must_use]
    pub fn is_exceeded(self) -> bool {
        Instant::now() >= self.at
    }

    #[must_use]
    pub const fn timeout_error(self) -> SplitError {
        SplitError::Timeout {
            seconds: self.budget.as_secs(),
        }
    }
}

/// 引擎逾時轉為 `Timeout`；其他錯誤交給呼叫端決定
pub fn timeout_from_engine(err: &EngineError, deadline: Option<Deadline>) -> Option<SplitError> {
    match err {
        EngineError::DeadlineExceeded { .. } => Some(
            deadline.map_or(SplitError::Timeout { seconds: 0 }, Deadline::timeout_error),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_start() {
        assert!(Deadline::start(None).is_none());
        let deadline = Deadline::start(Some(Duration::from_secs(30))).unwrap();
        assert!(!deadline.is_exceeded());
        assert_eq!(deadline.timeout_error(), SplitError::Timeout { seconds: 30 });
    }

    #[test]
    fn test_timeout_from_engine() {
        let deadline = Deadline::start(Some(Duration::from_secs(7)));
        let err = EngineError::DeadlineExceeded {
            program: "ffmpeg".into(),
        };
        assert_eq!(
            timeout_from_engine(&err, deadline),
            Some(SplitError::Timeout { seconds: 7 })
        );
    }
}
