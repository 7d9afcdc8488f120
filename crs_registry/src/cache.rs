//! Construct-once cache of registry objects, keyed by code.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::OnceCell;

use crate::error::Result;

type Slot<T> = Arc<OnceCell<Arc<T>>>;

/// Each code owns a cell. The first caller builds the object inside the
/// cell; concurrent callers for the same code block on it and share the
/// result. A failed build leaves the cell empty so the next lookup retries.
#[derive(Debug)]
pub struct Cache<T> {
    kind: &'static str,
    entries: RwLock<HashMap<i32, Slot<T>>>,
}

impl<T> Cache<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, code: i32) -> Slot<T> {
        if let Some(slot) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&code)
        {
            return slot.clone();
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(code)
            .or_default()
            .clone()
    }

    pub fn get_or_try_insert(&self, code: i32, build: impl FnOnce() -> Result<T>) -> Result<Arc<T>> {
        let slot = self.slot(code);
        if let Some(value) = slot.get() {
            return Ok(value.clone());
        }
        slot.get_or_try_init(|| {
            log::debug!("building {} {}", self.kind, code);
            build().map(Arc::new)
        })
        .cloned()
    }

    pub fn get(&self, code: i32) -> Option<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&code)
            .and_then(|slot| slot.get().cloned())
    }

    /// Number of built objects.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.is_empty() {
            log::debug!("dropping {} cached {} entries", entries.len(), self.kind);
        }
        entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrsError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn builds_once_per_code() {
        let cache = Cache::new("test");
        let a = cache.get_or_try_insert(1, || Ok(String::from("one"))).unwrap();
        let b = cache
            .get_or_try_insert(1, || -> Result<String> { panic!("rebuilt") })
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache: Cache<i32> = Cache::new("test");
        let failed = cache.get_or_try_insert(7, || Err(CrsError::InvalidCode("7".into())));
        assert!(failed.is_err());
        assert!(cache.is_empty());
        assert_eq!(*cache.get_or_try_insert(7, || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn concurrent_first_access() {
        let cache = Arc::new(Cache::new("test"));
        let builds = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (cache, builds, barrier) = (cache.clone(), builds.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_try_insert(42, || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok(vec![42u8])
                        })
                        .unwrap()
                })
            })
            .collect();
        let values: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    }

    #[test]
    fn clear_drops_everything() {
        let cache = Cache::new("test");
        let before = cache.get_or_try_insert(1, || Ok(1.0)).unwrap();
        cache.clear();
        assert!(cache.get(1).is_none());
        let after = cache.get_or_try_insert(1, || Ok(1.0)).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
