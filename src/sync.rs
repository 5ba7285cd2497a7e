//! Lock shims unifying `std::sync` and `parking_lot`.
//!
//! `parking_lot` never poisons. For `std`, a poisoned lock is recovered: every
//! value guarded in this crate is replaced wholesale (an `Arc` swap or a unit
//! token), so a panicking holder cannot leave it half-written.

#[cfg(feature = "parking-lot")]
pub(crate) use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(not(feature = "parking-lot"))]
pub(crate) use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(feature = "parking-lot")]
pub(crate) fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read()
}

#[cfg(not(feature = "parking-lot"))]
pub(crate) fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(feature = "parking-lot")]
pub(crate) fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write()
}

#[cfg(not(feature = "parking-lot"))]
pub(crate) fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(feature = "parking-lot")]
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock()
}

#[cfg(not(feature = "parking-lot"))]
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn read_and_write_round_trip() {
        let l = RwLock::new(1u64);
        *write(&l) = 2;
        assert_eq!(*read(&l), 2);
    }

    #[cfg(not(feature = "parking-lot"))]
    #[test]
    fn poisoned_lock_is_recovered() {
        let l = Arc::new(RwLock::new(Arc::new(7u64)));
        let l2 = Arc::clone(&l);
        let _ = std::thread::spawn(move || {
            let _g = write(&l2);
            panic!("poison it");
        })
        .join();

        assert!(l.is_poisoned());
        assert_eq!(**read(&l), 7);
    }

    #[test]
    fn mutex_lock() {
        let m = Arc::new(Mutex::new(()));
        let _g = lock(&m);
    }
}
