//! Reference-counted handle to a topology shared between solver objects.
//!
//! Holders register with [`SharedTopology::retain`] and deregister with
//! [`SharedTopology::release`]. When the holder count reaches zero the
//! topology is torn down exactly once; handles that are still around report
//! `InvalidState` from then on instead of touching freed state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::topology::NetworkTopology;
use crate::{PflowError, PflowResult};

#[derive(Debug)]
struct Inner {
    holders: AtomicUsize,
    topology: Mutex<Option<NetworkTopology>>,
}

#[derive(Debug, Clone)]
pub struct SharedTopology {
    inner: Arc<Inner>,
}

impl SharedTopology {
    /// Wraps a topology with one holder.
    pub fn new(topology: NetworkTopology) -> Self {
        Self {
            inner: Arc::new(Inner {
                holders: AtomicUsize::new(1),
                topology: Mutex::new(Some(topology)),
            }),
        }
    }

    /// Registers another holder and returns its handle.
    pub fn retain(&self) -> PflowResult<Self> {
        self.inner
            .holders
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n > 0).then_some(n + 1)
            })
            .map_err(|_| PflowError::invalid_state("topology has already been destroyed"))?;
        Ok(self.clone())
    }

    /// Drops one holder; the last release tears the topology down. Returns
    /// the number of holders left.
    pub fn release(&self) -> PflowResult<usize> {
        let before = self
            .inner
            .holders
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| PflowError::invalid_state("topology has already been destroyed"))?;
        let left = before - 1;
        if left == 0 {
            let torn_down = self.lock()?.take();
            if let Some(topology) = torn_down {
                debug!(buses = topology.buses().len(), "topology destroyed");
            }
        }
        Ok(left)
    }

    pub fn holders(&self) -> usize {
        self.inner.holders.load(Ordering::Acquire)
    }

    pub fn is_alive(&self) -> bool {
        self.holders() > 0
    }

    /// Runs `f` with shared access to the topology.
    pub fn with<R>(&self, f: impl FnOnce(&NetworkTopology) -> R) -> PflowResult<R> {
        let guard = self.lock()?;
        let topology = guard
            .as_ref()
            .ok_or_else(|| PflowError::invalid_state("topology has already been destroyed"))?;
        Ok(f(topology))
    }

    /// Runs `f` with exclusive access; every holder observes the edit.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut NetworkTopology) -> R) -> PflowResult<R> {
        let mut guard = self.lock()?;
        let topology = guard
            .as_mut()
            .ok_or_else(|| PflowError::invalid_state("topology has already been destroyed"))?;
        Ok(f(topology))
    }

    fn lock(&self) -> PflowResult<MutexGuard<'_, Option<NetworkTopology>>> {
        self.inner
            .topology
            .lock()
            .map_err(|_| PflowError::invalid_state("topology lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bus, BusId, BusType};

    fn handle() -> SharedTopology {
        let mut t = NetworkTopology::new(100.0);
        t.add_bus(Bus::new(BusId::new(1), BusType::Reference)).unwrap();
        SharedTopology::new(t)
    }

    #[test]
    fn test_teardown_on_last_release() {
        let first = handle();
        let second = first.retain().unwrap();
        assert_eq!(first.holders(), 2);

        assert_eq!(first.release().unwrap(), 1);
        assert_eq!(second.with(|t| t.buses().len()).unwrap(), 1);

        assert_eq!(second.release().unwrap(), 0);
        assert!(!first.is_alive());
        assert!(matches!(
            first.with(|t| t.buses().len()),
            Err(PflowError::InvalidState(_))
        ));
    }

    #[test]
    fn test_release_after_teardown_is_invalid_state() {
        let h = handle();
        h.release().unwrap();
        assert!(matches!(h.release(), Err(PflowError::InvalidState(_))));
        assert!(matches!(h.retain(), Err(PflowError::InvalidState(_))));
    }

    #[test]
    fn test_edits_are_visible_to_every_holder() {
        let a = handle();
        let b = a.retain().unwrap();
        a.with_mut(|t| t.add_bus(Bus::new(BusId::new(2), BusType::Pq)))
            .unwrap()
            .unwrap();
        assert_eq!(b.with(|t| t.buses().len()).unwrap(), 2);
    }

    #[test]
    fn test_concurrent_retain_release() {
        let h = handle();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let mine = h.retain().unwrap();
                    mine.with(|t| t.base_mva()).unwrap();
                    mine.release().unwrap();
                });
            }
        });
        assert_eq!(h.holders(), 1);
    }
}
