// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Runtime Context
//!
//! Process-level hooks that feed the run's `CancellationToken`:
//! 1. **Signals**: SIGINT/SIGTERM via `ctrlc`.
//! 2. **Watchdog**: an optional wall-clock limit on the whole run.

use crate::domain::cancellation::CancellationToken;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const WATCHDOG_TICK: Duration = Duration::from_millis(100);

/// Routes SIGINT/SIGTERM to `cancel`. Can only be installed once per process.
pub fn install_signal_handler(cancel: &CancellationToken) -> Result<(), ctrlc::Error> {
    let token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, cancelling the run...");
        token.cancel("interrupted by signal");
    })
}

/// Cancels the run once `limit` has elapsed. Stops quietly when dropped.
pub struct Watchdog {
    finished: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn start(cancel: CancellationToken, limit: Duration) -> Self {
        info!("Run timeout set to {}s", limit.as_secs());
        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();
        let handle = thread::spawn(move || {
            let deadline = Instant::now() + limit;
            while !done.load(Ordering::SeqCst) && !cancel.is_cancelled() {
                let now = Instant::now();
                if now >= deadline {
                    warn!("Run exceeded {}s, cancelling", limit.as_secs());
                    cancel.cancel(format!("run timeout of {}s exceeded", limit.as_secs()));
                    break;
                }
                thread::sleep(WATCHDOG_TICK.min(deadline - now));
            }
        });
        Self {
            finished,
            handle: Some(handle),
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_cancels_after_limit() {
        let cancel = CancellationToken::new();
        let _watchdog = Watchdog::start(cancel.clone(), Duration::from_millis(50));
        let started = Instant::now();
        while !cancel.is_cancelled() && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(cancel.is_cancelled());
        assert!(cancel.reason().contains("timeout"));
    }

    #[test]
    fn test_dropped_watchdog_never_fires() {
        let cancel = CancellationToken::new();
        let watchdog = Watchdog::start(cancel.clone(), Duration::from_millis(200));
        drop(watchdog);
        thread::sleep(Duration::from_millis(300));
        assert!(!cancel.is_cancelled());
    }
}
