//! Append-only storage addressed by typed handles.
//!
//! Everything in a [`Module`](crate::Module) that other nodes refer to lives in
//! an arena: types, variables, functions, blocks and instructions. Nodes refer
//! to each other through [`Handle`]s, so shared children (a struct member type
//! used by several structs, a constant used from several blocks) need no
//! reference counting and are dropped together with their arena.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed index into an [`Arena`] or [`UniqueArena`].
pub struct Handle<T> {
    index: u32,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl<T> Handle<T> {
    fn from_position(position: usize) -> Self {
        let index = u32::try_from(position)
            .unwrap_or_else(|_| panic!("arena overflow: {position} items exceeds u32::MAX"));
        Self {
            index,
            _phantom: PhantomData,
        }
    }

    /// Returns the zero-based position of this handle in its arena.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// An append-only arena.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    data: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a value and returns its handle.
    pub fn append(&mut self, value: T) -> Handle<T> {
        let handle = Handle::from_position(self.data.len());
        self.data.push(value);
        handle
    }

    /// Returns the value behind `handle`, or `None` if the handle belongs to
    /// a larger arena.
    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.data.get(handle.index())
    }

    /// Returns `true` if `handle` points into this arena.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        handle.index() < self.data.len()
    }

    /// Iterates over `(handle, &value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, v)| (Handle::from_position(i), v))
    }

    /// Iterates over `(handle, &mut value)` pairs in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.data
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (Handle::from_position(i), v))
    }

    /// Iterates over the handles of every value in insertion order.
    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> + use<T> {
        (0..self.data.len()).map(Handle::from_position)
    }
}

impl<T> Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        &self.data[handle.index()]
    }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.data[handle.index()]
    }
}

/// An arena that hands out the same [`Handle`] for equal values.
#[derive(Clone, Debug)]
pub struct UniqueArena<T> {
    data: Vec<T>,
    map: HashMap<T, u32>,
}

impl<T: Hash + Eq> Default for UniqueArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq> UniqueArena<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            map: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Inserts `value`, or returns the handle of an equal value inserted
    /// earlier.
    pub fn insert(&mut self, value: T) -> Handle<T>
    where
        T: Clone,
    {
        if let Some(&index) = self.map.get(&value) {
            return Handle::from_position(index as usize);
        }
        let handle = Handle::from_position(self.data.len());
        self.map.insert(value.clone(), handle.index);
        self.data.push(value);
        handle
    }

    /// Returns the handle of a value equal to `value`, if one was inserted.
    pub fn get(&self, value: &T) -> Option<Handle<T>> {
        self.map
            .get(value)
            .map(|&index| Handle::from_position(index as usize))
    }

    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.data.get(handle.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, v)| (Handle::from_position(i), v))
    }
}

impl<T> Index<Handle<T>> for UniqueArena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        &self.data[handle.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_sequential_handles() {
        let mut arena = Arena::new();
        let a = arena.append("entry");
        let b = arena.append("merge");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(arena[b], "merge");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn index_mut_updates_in_place() {
        let mut arena = Arena::new();
        let h = arena.append(vec![1u32]);
        arena[h].push(2);
        assert_eq!(arena[h], vec![1, 2]);
    }

    #[test]
    fn handles_follow_insertion_order() {
        let mut arena = Arena::new();
        arena.append('a');
        arena.append('b');
        arena.append('c');
        let handles: Vec<_> = arena.handles().map(Handle::index).collect();
        assert_eq!(handles, vec![0, 1, 2]);
        let values: Vec<_> = arena.iter().map(|(_, &v)| v).collect();
        assert_eq!(values, vec!['a', 'b', 'c']);
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let mut big = Arena::new();
        big.append(1);
        let far = big.append(2);
        let mut small = Arena::new();
        small.append(3);
        assert!(!small.contains(far));
        assert_eq!(small.try_get(far), None);
    }

    #[test]
    fn unique_arena_dedups() {
        let mut arena = UniqueArena::new();
        let f32_a = arena.insert("f32");
        let vec4 = arena.insert("vec4");
        let f32_b = arena.insert("f32");
        assert_eq!(f32_a, f32_b);
        assert_ne!(f32_a, vec4);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(&"vec4"), Some(vec4));
        assert_eq!(arena.get(&"mat4"), None);
    }

    #[test]
    fn handles_order_by_position() {
        let mut arena = Arena::new();
        let first = arena.append(());
        let second = arena.append(());
        assert!(first < second);
        assert_eq!(format!("{second:?}"), "#1");
    }
}
