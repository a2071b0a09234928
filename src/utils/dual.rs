use std::cell::{Ref, RefCell, RefMut};

#[cfg(test)]
mod tests;

/// A pending/current state pair.
///
/// `current` holds the last state the kernel accepted. `pending` is what the
/// next commit will request. The only way to move pending state into
/// `current` is [`Dual::apply`].
#[derive(Default)]
pub struct Dual<T> {
    current: RefCell<T>,
    pending: RefCell<T>,
}

impl<T: Clone> Dual<T> {
    pub fn new(state: T) -> Self {
        Self {
            current: RefCell::new(state.clone()),
            pending: RefCell::new(state),
        }
    }

    pub fn current(&self) -> Ref<'_, T> {
        self.current.borrow()
    }

    pub fn pending(&self) -> Ref<'_, T> {
        self.pending.borrow()
    }

    pub fn pending_mut(&self) -> RefMut<'_, T> {
        self.pending.borrow_mut()
    }

    /// Promotes the pending state after a successful commit.
    ///
    /// Returns the state that was current before.
    pub fn apply(&self) -> T {
        let pending = self.pending.borrow().clone();
        self.current.replace(pending)
    }

    /// Discards the pending state.
    pub fn revert(&self) {
        let current = self.current.borrow().clone();
        *self.pending.borrow_mut() = current;
    }
}
