use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// At-most-one-in-flight marker. A second caller is rejected, never queued.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    active: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot; `None` while another holder is active
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                active: Arc::clone(&self.active),
            })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Releases the slot on drop, panics and cancellation included
#[derive(Debug)]
pub struct FlightGuard {
    active: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_holder() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire().expect("first acquire");
        assert!(flight.is_active());
        assert!(flight.try_acquire().is_none());

        drop(guard);
        assert!(!flight.is_active());
        assert!(flight.try_acquire().is_some());
    }
}
