// Status du sink audio, partagé entre le générateur et son thread

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Closed = 0,
    Open = 1,
    Failed = 2,
}

impl From<u8> for SinkStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => SinkStatus::Open,
            2 => SinkStatus::Failed,
            _ => SinkStatus::Closed,
        }
    }
}

/// Atomic wrapper pour partager le status entre threads
pub struct AtomicSinkStatus {
    inner: AtomicU8,
}

impl AtomicSinkStatus {
    pub fn new(status: SinkStatus) -> Self {
        Self {
            inner: AtomicU8::new(status as u8),
        }
    }

    pub fn get(&self) -> SinkStatus {
        SinkStatus::from(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, status: SinkStatus) {
        self.inner.store(status as u8, Ordering::Release);
    }
}

impl Default for AtomicSinkStatus {
    fn default() -> Self {
        Self::new(SinkStatus::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_set_and_get() {
        let status = AtomicSinkStatus::default();
        assert_eq!(status.get(), SinkStatus::Closed);
        status.set(SinkStatus::Failed);
        assert_eq!(status.get(), SinkStatus::Failed);
    }

    #[test]
    fn test_unknown_value_is_closed() {
        assert_eq!(SinkStatus::from(42), SinkStatus::Closed);
    }
}
