use super::SimpleResult;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

const BYTES_PER_TASK_ESTIMATE: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureProfile {
    Fast,
    #[default]
    Balanced,
    Slow,
}

impl BackpressureProfile {
    pub fn max_concurrent(&self) -> usize {
        match self {
            BackpressureProfile::Fast => 16,
            BackpressureProfile::Balanced => 8,
            BackpressureProfile::Slow => 4,
        }
    }

    pub fn max_bytes_in_flight(&self) -> u64 {
        match self {
            BackpressureProfile::Fast => 512 * 1024 * 1024,
            BackpressureProfile::Balanced => 256 * 1024 * 1024,
            BackpressureProfile::Slow => 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerState {
    pub active_tasks: usize,
    pub max_concurrent: usize,
    pub bytes_in_flight: u64,
    pub max_bytes_in_flight: u64,
    pub queued_tasks: usize,
}

type StateCallback = Box<dyn Fn(ControllerState) + Send + Sync>;

struct Waiter {
    estimated_bytes: u64,
    sender: oneshot::Sender<()>,
}

struct Inner {
    active_tasks: usize,
    bytes_in_flight: u64,
    queue: VecDeque<Waiter>,
}

/// Admission control over concurrent tasks and bytes in flight. Admission is
/// FIFO; a request larger than the byte budget is admitted once nothing else
/// is running.
pub struct BackpressureController {
    max_concurrent: usize,
    max_bytes_in_flight: u64,
    inner: Mutex<Inner>,
    on_state_change: Option<StateCallback>,
}

impl BackpressureController {
    pub fn new(profile: BackpressureProfile) -> Self {
        Self::with_limits(profile.max_concurrent(), profile.max_bytes_in_flight())
    }

    /// `jobs` overrides the profile's concurrency cap; the byte budget is
    /// raised so it can never admit fewer tasks than the cap allows.
    pub fn with_jobs(profile: BackpressureProfile, jobs: usize) -> Self {
        let max_bytes_in_flight = profile
            .max_bytes_in_flight()
            .max(jobs as u64 * 2 * BYTES_PER_TASK_ESTIMATE);
        Self::with_limits(jobs.max(1), max_bytes_in_flight)
    }

    pub fn with_limits(max_concurrent: usize, max_bytes_in_flight: u64) -> Self {
        Self {
            max_concurrent,
            max_bytes_in_flight,
            inner: Mutex::new(Inner {
                active_tasks: 0,
                bytes_in_flight: 0,
                queue: VecDeque::new(),
            }),
            on_state_change: None,
        }
    }

    pub fn with_state_callback(mut self, callback: StateCallback) -> Self {
        self.on_state_change = Some(callback);
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn state(&self) -> ControllerState {
        let inner = self.inner.lock().unwrap();
        self.snapshot(&inner)
    }

    /// Block until the task fits within both caps. Returns an error when the
    /// operation is cancelled while waiting.
    pub async fn acquire(
        &self,
        estimated_bytes: u64,
        cancellation: &CancellationToken,
    ) -> SimpleResult<()> {
        let receiver = {
            let mut inner = self.inner.lock().unwrap();
            if inner.queue.is_empty() && self.admits(&inner, estimated_bytes) {
                inner.active_tasks += 1;
                inner.bytes_in_flight += estimated_bytes;
                let state = self.snapshot(&inner);
                drop(inner);
                self.notify(state);
                return Ok(());
            }
            let (sender, receiver) = oneshot::channel();
            inner.queue.push_back(Waiter {
                estimated_bytes,
                sender,
            });
            receiver
        };

        tokio::select! {
            _ = cancellation.cancelled() => bail!("Acquire cancelled"),
            granted = receiver => match granted {
                Ok(()) => Ok(()),
                Err(_) => bail!("Controller closed"),
            },
        }
    }

    /// Return a task's budget and wake the oldest waiters that now fit.
    pub fn release(&self, estimated_bytes: u64, _actual_bytes: u64) {
        let mut states = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.active_tasks = inner.active_tasks.saturating_sub(1);
            inner.bytes_in_flight = inner.bytes_in_flight.saturating_sub(estimated_bytes);
            states.push(self.snapshot(&inner));

            while let Some(waiter) = inner.queue.front() {
                if !self.admits(&inner, waiter.estimated_bytes) {
                    break;
                }
                let waiter = inner.queue.pop_front().unwrap();
                // a waiter whose receiver is gone was cancelled, skip it
                if waiter.sender.send(()).is_ok() {
                    inner.active_tasks += 1;
                    inner.bytes_in_flight += waiter.estimated_bytes;
                    states.push(self.snapshot(&inner));
                }
            }
        }
        for state in states {
            self.notify(state);
        }
    }

    fn admits(&self, inner: &Inner, estimated_bytes: u64) -> bool {
        if inner.active_tasks >= self.max_concurrent {
            return false;
        }
        if inner.bytes_in_flight + estimated_bytes <= self.max_bytes_in_flight {
            return true;
        }
        // oversized single requests run alone
        estimated_bytes > self.max_bytes_in_flight && inner.active_tasks == 0
    }

    fn snapshot(&self, inner: &Inner) -> ControllerState {
        ControllerState {
            active_tasks: inner.active_tasks,
            max_concurrent: self.max_concurrent,
            bytes_in_flight: inner.bytes_in_flight,
            max_bytes_in_flight: self.max_bytes_in_flight,
            queued_tasks: inner.queue.len(),
        }
    }

    fn notify(&self, state: ControllerState) {
        if let Some(callback) = &self.on_state_change {
            callback(state);
        }
    }
}
