use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// The one lock between the audio callback and the editing side.
///
/// Guards release on drop, so early returns and `?` never leave it held. A
/// panic while holding the gate does not take playback down with it: the
/// poisoned state is recovered and handed out as-is.
pub struct Gate<T> {
    inner: Arc<Mutex<T>>,
}

pub type GateGuard<'a, T> = MutexGuard<'a, T>;

impl<T> Clone for Gate<T> {
    fn clone(&self) -> Self {
        Gate { inner: Arc::clone(&self.inner) }
    }
}

impl<T> Gate<T> {
    pub fn new(value: T) -> Self {
        Gate { inner: Arc::new(Mutex::new(value)) }
    }

    /// Blocking acquisition for the edit context.
    pub fn lock(&self) -> GateGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking acquisition for the audio context. `None` while an edit
    /// holds the gate.
    pub fn try_lock(&self) -> Option<GateGuard<'_, T>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_lock_fails_while_held() {
        let gate = Gate::new(0u32);
        let other = gate.clone();
        {
            let mut guard = gate.lock();
            *guard += 1;
            assert!(other.try_lock().is_none());
        }
        assert_eq!(other.try_lock().map(|g| *g), Some(1));
    }

    #[test]
    fn released_on_early_return() {
        fn bump(gate: &Gate<Vec<u8>>, fail: bool) -> Result<(), ()> {
            let mut guard = gate.lock();
            if fail {
                return Err(());
            }
            guard.push(1);
            Ok(())
        }

        let gate = Gate::new(Vec::new());
        assert!(bump(&gate, true).is_err());
        assert!(bump(&gate, false).is_ok());
        assert!(gate.try_lock().is_some());
    }

    #[test]
    fn survives_poisoning() {
        let gate = Gate::new(5i32);
        let g2 = gate.clone();
        let _ = std::thread::spawn(move || {
            let _guard = g2.lock();
            panic!("edit failed");
        })
        .join();
        assert_eq!(*gate.lock(), 5);
        assert!(gate.try_lock().is_some());
    }
}
