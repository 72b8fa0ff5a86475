//! Read-only cell handles.
//!
//! Consumers of flag state should not care whether a value is stored in a
//! signal or derived by a memo. [`ReadCell`] covers both and never exposes a
//! write path.

use std::fmt::Debug;

use super::memo::Memo;
use super::signal::{ReadSignal, Signal};

/// A readable reactive cell: either a stored source or a derived memo.
pub enum ReadCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    Source(ReadSignal<T>),
    Derived(Memo<T>),
}

impl<T> ReadCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Read the value, tracking it inside a reactive context.
    pub fn get(&self) -> T {
        match self {
            Self::Source(signal) => signal.get(),
            Self::Derived(memo) => memo.get(),
        }
    }

    pub fn get_untracked(&self) -> T {
        match self {
            Self::Source(signal) => signal.get_untracked(),
            Self::Derived(memo) => memo.get_untracked(),
        }
    }

    /// Source ID of the underlying cell. Two handles with the same ID are the
    /// same cell.
    pub fn id(&self) -> u64 {
        match self {
            Self::Source(signal) => signal.id(),
            Self::Derived(memo) => memo.id(),
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, Self::Derived(_))
    }

    /// Whether both handles point at the same cell.
    pub fn same_cell(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Source(a), Self::Source(b)) => a.ptr_eq(b),
            (Self::Derived(a), Self::Derived(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl<T> Clone for ReadCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        match self {
            Self::Source(signal) => Self::Source(signal.clone()),
            Self::Derived(memo) => Self::Derived(memo.clone()),
        }
    }
}

impl<T> Debug for ReadCell<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(signal) => f.debug_tuple("Source").field(signal).finish(),
            Self::Derived(memo) => f.debug_tuple("Derived").field(memo).finish(),
        }
    }
}

impl<T> From<ReadSignal<T>> for ReadCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn from(signal: ReadSignal<T>) -> Self {
        Self::Source(signal)
    }
}

impl<T> From<Signal<T>> for ReadCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn from(signal: Signal<T>) -> Self {
        Self::Source(signal.read_only())
    }
}

impl<T> From<Memo<T>> for ReadCell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn from(memo: Memo<T>) -> Self {
        Self::Derived(memo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_and_derived_read_through() {
        let signal = Signal::new(4);
        let source: ReadCell<i32> = signal.clone().into();

        let signal_clone = signal.clone();
        let derived: ReadCell<i32> = Memo::new(move || signal_clone.get() + 1).into();

        assert_eq!(source.get(), 4);
        assert_eq!(derived.get(), 5);
        assert!(derived.is_derived());

        signal.set(9);
        assert_eq!(source.get_untracked(), 9);
        assert_eq!(derived.get_untracked(), 10);
    }

    #[test]
    fn same_cell_follows_identity() {
        let signal = Signal::new(true);
        let a: ReadCell<bool> = signal.clone().into();
        let b: ReadCell<bool> = signal.read_only().into();
        let other: ReadCell<bool> = Signal::new(true).into();

        assert!(a.same_cell(&b));
        assert_eq!(a.id(), b.id());
        assert!(!a.same_cell(&other));
    }
}
