use std::sync::Mutex;
use tokio::time::{Duration, Instant, sleep_until};

/// Round-robin token scheduler. Each lane fires at most once per
/// `min_delay`, so total throughput is `lanes / min_delay` while every lane
/// respects the per-thread floor.
pub struct LaneRateLimiter {
    state: Mutex<LaneState>,
    min_delay: Duration,
}

struct LaneState {
    next_ready: Vec<Instant>,
    cursor: usize,
}

impl LaneRateLimiter {
    pub fn new(lanes: usize, min_delay: Duration) -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(LaneState {
                next_ready: vec![now; lanes.max(1)],
                cursor: 0,
            }),
            min_delay,
        }
    }

    pub fn lanes(&self) -> usize {
        self.state.lock().unwrap().next_ready.len()
    }

    /// Reserve the next lane in round-robin order and sleep until it is
    /// ready. The fire time is recorded at reservation, so concurrent
    /// callers cannot share a slot.
    pub async fn wait(&self) {
        let ready = {
            let mut state = self.state.lock().unwrap();
            let lane = state.cursor;
            state.cursor = (state.cursor + 1) % state.next_ready.len();
            let ready = state.next_ready[lane].max(Instant::now());
            state.next_ready[lane] = ready + self.min_delay;
            ready
        };
        sleep_until(ready).await;
    }
}
