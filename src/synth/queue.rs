// Tone queue - bounded FIFO between tone producers and the synthesis thread
//
// A single mutex guards the tones. Three condition variables hang off it:
// - `tone_available`: the consumer waits here for a new tone (or a stop request)
// - `drained`: producers wait here for the queue to shrink to a given level
// - `dequeue_event`: observers wait here for the next dequeue of any kind
//
// The low-water callback runs after the mutex has been released, so it may
// call back into the queue.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::QueueError;
use crate::synth::tone::Tone;

/// Largest capacity a queue can be configured with
pub const MAX_CAPACITY: usize = 3000;
pub const DEFAULT_CAPACITY: usize = 3000;
pub const DEFAULT_HIGH_WATER_MARK: usize = 2900;

/// Callback fired when the queue length drops to the registered level
pub type LowWaterCallback = Arc<dyn Fn() + Send + Sync>;

/// Result of a dequeue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueOutcome {
    /// A tone was taken from the head of the queue
    Dequeued(Tone),
    /// The previous call took the last tone; the queue is now idle.
    /// The consumer should pad its output buffer with silence once.
    EmptyTransition,
    /// The queue was already idle. Nothing changed.
    StillEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    Idle,
    Busy,
}

struct QueueInner {
    tones: VecDeque<Tone>,
    capacity: usize,
    high_water_mark: usize,
    state: QueueState,
    low_water: Option<(usize, LowWaterCallback)>,
    dequeue_events: u64,
}

impl QueueInner {
    fn new(capacity: usize, high_water_mark: usize) -> Self {
        Self {
            tones: VecDeque::with_capacity(capacity),
            capacity,
            high_water_mark,
            state: QueueState::Idle,
            low_water: None,
            dequeue_events: 0,
        }
    }
}

pub struct ToneQueue {
    inner: Mutex<QueueInner>,
    tone_available: Condvar,
    drained: Condvar,
    dequeue_event: Condvar,
}

impl ToneQueue {
    /// Create a queue with the default capacity and high water mark
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::new(DEFAULT_CAPACITY, DEFAULT_HIGH_WATER_MARK)),
            tone_available: Condvar::new(),
            drained: Condvar::new(),
            dequeue_event: Condvar::new(),
        }
    }

    /// Create a queue with a custom capacity
    pub fn with_capacity(capacity: usize, high_water_mark: usize) -> Result<Self, QueueError> {
        validate_capacity(capacity, high_water_mark)?;
        Ok(Self {
            inner: Mutex::new(QueueInner::new(capacity, high_water_mark)),
            tone_available: Condvar::new(),
            drained: Condvar::new(),
            dequeue_event: Condvar::new(),
        })
    }

    /// Append a tone at the tail.
    ///
    /// Tones of zero (or negative) duration are dropped without error,
    /// forever tones excepted.
    ///
    /// # Returns
    /// `QueueError::QueueFull` if the queue holds `capacity` tones
    pub fn enqueue(&self, tone: Tone) -> Result<(), QueueError> {
        if tone.duration_us <= 0 && !tone.is_forever {
            tracing::trace!("dropping zero-length tone {:?}", tone);
            return Ok(());
        }

        let mut inner = self.inner.lock();
        if inner.tones.len() >= inner.capacity {
            return Err(QueueError::QueueFull);
        }

        inner.tones.push_back(tone);
        inner.state = QueueState::Busy;
        tracing::trace!(len = inner.tones.len(), "tone enqueued");

        self.tone_available.notify_all();
        Ok(())
    }

    /// Take the tone at the head of the queue.
    ///
    /// A forever tone that is the only tone left is returned but stays
    /// in the queue, so the consumer keeps playing it until another tone
    /// is enqueued behind it.
    pub fn dequeue(&self) -> DequeueOutcome {
        let mut inner = self.inner.lock();

        if inner.state == QueueState::Idle {
            return DequeueOutcome::StillEmpty;
        }

        let old_len = inner.tones.len();
        let Some(tone) = inner.tones.front().copied() else {
            // Busy with nothing left: the last tone went out on the previous call
            inner.state = QueueState::Idle;
            inner.dequeue_events = inner.dequeue_events.wrapping_add(1);
            drop(inner);

            self.drained.notify_all();
            self.dequeue_event.notify_all();
            return DequeueOutcome::EmptyTransition;
        };

        if !(tone.is_forever && old_len == 1) {
            inner.tones.pop_front();
        }
        let new_len = inner.tones.len();

        let callback = match &inner.low_water {
            Some((level, callback)) if old_len > *level && new_len <= *level => {
                Some(Arc::clone(callback))
            }
            _ => None,
        };
        inner.dequeue_events = inner.dequeue_events.wrapping_add(1);
        drop(inner);

        self.drained.notify_all();
        self.dequeue_event.notify_all();

        if let Some(callback) = callback {
            callback();
        }

        DequeueOutcome::Dequeued(tone)
    }

    /// Discard every queued tone and wake drain waiters
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.tones.clear();
        drop(inner);

        self.drained.notify_all();
    }

    /// Return the queue to its initial state: empty, idle, default
    /// capacity, no low-water callback
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        *inner = QueueInner::new(DEFAULT_CAPACITY, DEFAULT_HIGH_WATER_MARK);
        drop(inner);

        self.drained.notify_all();
    }

    /// Change capacity and high water mark
    pub fn set_capacity(&self, capacity: usize, high_water_mark: usize) -> Result<(), QueueError> {
        validate_capacity(capacity, high_water_mark)?;

        let mut inner = self.inner.lock();
        if inner.tones.len() > capacity {
            return Err(QueueError::InvalidCapacity {
                capacity,
                high_water_mark,
            });
        }
        inner.capacity = capacity;
        inner.high_water_mark = high_water_mark;
        Ok(())
    }

    /// Register a callback fired when the length drops from above `level`
    /// to `level` or below. Replaces any previous callback.
    pub fn register_low_water_callback<F>(&self, callback: F, level: usize) -> Result<(), QueueError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        if level >= inner.capacity {
            return Err(QueueError::InvalidLevel {
                level,
                capacity: inner.capacity,
            });
        }
        inner.low_water = Some((level, Arc::new(callback)));
        Ok(())
    }

    pub fn clear_low_water_callback(&self) {
        self.inner.lock().low_water = None;
    }

    /// Block until the queue holds at most `level` tones
    pub fn wait_until_len_at_most(&self, level: usize) {
        let mut inner = self.inner.lock();
        while inner.tones.len() > level {
            self.drained.wait(&mut inner);
        }
    }

    /// Block until the next dequeue of any kind (a tone or the empty
    /// transition)
    pub fn wait_for_any_dequeue(&self) {
        let mut inner = self.inner.lock();
        let seen = inner.dequeue_events;
        while inner.dequeue_events == seen {
            self.dequeue_event.wait(&mut inner);
        }
    }

    /// Consumer side: block while the queue is empty and `running` is set
    pub(crate) fn wait_for_tone(&self, running: &AtomicBool) {
        let mut inner = self.inner.lock();
        while inner.tones.is_empty() && running.load(Ordering::Acquire) {
            self.tone_available.wait(&mut inner);
        }
    }

    /// Wake a consumer blocked in `wait_for_tone`
    pub(crate) fn wake_consumer(&self) {
        let _inner = self.inner.lock();
        self.tone_available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tones.is_empty()
    }

    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock();
        inner.tones.len() >= inner.capacity
    }

    /// Length reached the high water mark
    pub fn is_nearly_full(&self) -> bool {
        let inner = self.inner.lock();
        inner.tones.len() >= inner.high_water_mark
    }

    /// The consumer has not yet seen the queue run dry
    pub fn is_busy(&self) -> bool {
        self.inner.lock().state == QueueState::Busy
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn high_water_mark(&self) -> usize {
        self.inner.lock().high_water_mark
    }
}

impl Default for ToneQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_capacity(capacity: usize, high_water_mark: usize) -> Result<(), QueueError> {
    if capacity == 0 || capacity > MAX_CAPACITY || high_water_mark == 0 || high_water_mark > capacity
    {
        return Err(QueueError::InvalidCapacity {
            capacity,
            high_water_mark,
        });
    }
    Ok(())
}
