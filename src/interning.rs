//! Interned error messages for the asyn error slot.
//!
//! asyn reports failures through a message slot on the `asynUser` that does
//! not own its text. Messages handed to that slot are interned here: the same
//! text always yields the same allocation, and no allocation is ever released
//! or moved while the store is alive. Every returned [`Arc<str>`] therefore
//! stays valid for at least the lifetime of the owning interface.

use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct ErrorMessages {
    messages: Mutex<HashSet<Arc<str>>>,
}

impl ErrorMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the interned copy of `message`, inserting it if unseen.
    ///
    /// Safe to call concurrently from several dispatcher threads.
    pub fn intern(&self, message: &str) -> Arc<str> {
        let mut messages = self.messages.lock();
        if let Some(existing) = messages.get(message) {
            return existing.clone();
        }
        let interned: Arc<str> = Arc::from(message);
        messages.insert(interned.clone());
        interned
    }

    /// Number of distinct messages seen
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn same_text_same_allocation() {
        let store = ErrorMessages::new();
        let first = store.intern("Device not ready");
        let second = store.intern(&String::from("Device not ready"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(&*first, "Device not ready");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn distinct_text_distinct_allocation() {
        let store = ErrorMessages::new();
        let a = store.intern("Timeout");
        let b = store.intern("Timeout while writing");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.as_ptr(), b.as_ptr());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn concurrent_interning() {
        let store = Arc::new(ErrorMessages::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    (0..100)
                        .map(|n| store.intern(&format!("error {}", (n + i) % 10)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<Arc<str>>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(store.len(), 10);
        let reference = store.intern("error 3");
        for interned in results.iter().flatten().filter(|m| &***m == "error 3") {
            assert!(Arc::ptr_eq(interned, &reference));
        }
    }
}
