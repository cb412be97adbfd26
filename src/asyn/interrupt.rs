//! Interrupt subscription lists.
//!
//! Records scanned on "I/O Intr" subscribe through one list per asyn
//! interrupt interface. A push walks the list while holding it, so callbacks
//! must not subscribe or unsubscribe from inside the call.

use parking_lot::{Mutex, MutexGuard};

use crate::{asyn::AsynUser, utils::wrapping_inplace_add};

pub type InterruptCallback<T> = Box<dyn FnMut(&AsynUser, &T) + Send>;

/// One subscription: the subscriber's asyn user and its callback
pub struct Interrupt<T: ?Sized> {
    pub user: AsynUser,
    id: u32,
    callback: InterruptCallback<T>,
}

impl<T: ?Sized> Interrupt<T> {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Deliver a value, with whatever the user currently holds
    pub fn call(&mut self, value: &T) {
        (self.callback)(&self.user, value)
    }
}

struct Subscriptions<T: ?Sized> {
    entries: Vec<Interrupt<T>>,
    next_id: u32,
}

pub struct InterruptList<T: ?Sized> {
    inner: Mutex<Subscriptions<T>>,
}

impl<T: ?Sized> Default for InterruptList<T> {
    fn default() -> Self {
        InterruptList {
            inner: Mutex::new(Subscriptions {
                entries: Vec::new(),
                next_id: 0,
            }),
        }
    }
}

impl<T: ?Sized> InterruptList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe, returning an id to unsubscribe with
    pub fn add<F>(&self, user: AsynUser, callback: F) -> u32
    where
        F: FnMut(&AsynUser, &T) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        let id = wrapping_inplace_add(&mut inner.next_id);
        inner.entries.push(Interrupt {
            user,
            id,
            callback: Box::new(callback),
        });
        id
    }

    pub fn remove(&self, id: u32) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|i| i.id != id);
        inner.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock the list for one pass over the subscribers
    pub fn start(&self) -> InterruptPass<'_, T> {
        InterruptPass {
            guard: self.inner.lock(),
        }
    }
}

/// A locked walk over an [`InterruptList`]. Dropping it ends the pass.
pub struct InterruptPass<'a, T: ?Sized> {
    guard: MutexGuard<'a, Subscriptions<T>>,
}

impl<T: ?Sized> InterruptPass<'_, T> {
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Interrupt<T>> {
        self.guard.entries.iter_mut()
    }

    pub fn end(self) {}
}

/// The interrupt lists of a port
#[derive(Default)]
pub struct InterruptLists {
    pub int32: InterruptList<i32>,
    pub float64: InterruptList<f64>,
    pub int8_array: InterruptList<[i8]>,
    pub int16_array: InterruptList<[i16]>,
    pub int32_array: InterruptList<[i32]>,
    pub float64_array: InterruptList<[f64]>,
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, atomic::AtomicUsize, atomic::Ordering};

    use super::*;

    #[test]
    fn add_walk_remove() {
        let list: InterruptList<[i16]> = InterruptList::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let first = list.add(AsynUser::new(0), move |_, v: &[i16]| {
            counter.fetch_add(v.len(), Ordering::SeqCst);
        });
        let second = list.add(AsynUser::new(1), |_, _| {});
        assert_ne!(first, second);
        assert_eq!(list.len(), 2);

        let mut pass = list.start();
        for interrupt in pass.iter_mut() {
            interrupt.call(&[1, 2, 3]);
        }
        pass.end();
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        assert!(list.remove(first));
        assert!(!list.remove(first));
        assert_eq!(list.len(), 1);
    }
}
