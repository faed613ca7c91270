use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Auto-reset event: one `set` releases one `wait`, then the signal clears.
///
/// Sets that happen while nobody waits are remembered (but not counted), so
/// the write loop never misses a push made between two drains.
#[derive(Debug, Default)]
pub struct WakeSignal {
    set: Mutex<bool>,
    cond: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        *set = true;
        self.cond.notify_one();
    }

    /// Block until signalled, then reset.
    pub fn wait(&self) {
        let set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        let mut set = self
            .cond
            .wait_while(set, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        *set = false;
    }

    /// Like [`wait`](Self::wait) with a deadline. Returns false on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut set, _) = self
            .cond
            .wait_timeout_while(set, timeout, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *set, false)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn set_before_wait_is_remembered() {
        let signal = WakeSignal::new();
        signal.set();
        signal.set();
        assert!(signal.wait_timeout(Duration::from_millis(10)));
        // Auto-reset: the two sets collapsed into one.
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn set_releases_waiter_on_another_thread() {
        let signal = Arc::new(WakeSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait())
        };

        thread::sleep(Duration::from_millis(20));
        signal.set();
        waiter.join().unwrap();
    }

    #[test]
    fn wait_timeout_expires_without_set() {
        let signal = WakeSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }
}
