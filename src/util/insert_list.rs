use std::fmt::{Debug, Error, Formatter};
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Keys into an [`InsertList`]
///
/// Keys are handed out by the list and are never reused, even after the element they refer to is
/// removed. This makes them usable as the identity of the element.
pub trait ArenaKey: Copy + Eq + Hash + Ord + Debug {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

/// Define a new opaque key type for use in an [`InsertList`]
macro_rules! arena_key {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($prefix:literal);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name(u32);

        impl $crate::util::ArenaKey for $name {
            fn from_index(index: usize) -> Self {
                $name(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

pub(crate) use arena_key;

struct Node<T> {
    value: Option<T>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ordered sequence of elements supporting insertion and iteration relative to other elements
///
/// Elements live in an arena and are linked together in order. Inserting or removing an element
/// never invalidates the keys of other elements, so keys can be held onto as stable references
/// (eg. branch targets).
pub struct InsertList<K, T> {
    nodes: Vec<Node<T>>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    key: PhantomData<K>,
}

impl<K: ArenaKey, T> InsertList<K, T> {
    pub fn new() -> InsertList<K, T> {
        InsertList {
            nodes: vec![],
            head: None,
            tail: None,
            len: 0,
            key: PhantomData,
        }
    }

    /// Number of (non-removed) elements
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, key: K) -> bool {
        self.node(key).is_some()
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.node(key).and_then(|node| node.value.as_ref())
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.nodes
            .get_mut(key.index())
            .and_then(|node| node.value.as_mut())
    }

    pub fn first(&self) -> Option<K> {
        self.head.map(K::from_index)
    }

    pub fn last(&self) -> Option<K> {
        self.tail.map(K::from_index)
    }

    /// Element following `key`
    pub fn next(&self, key: K) -> Option<K> {
        self.node(key).and_then(|node| node.next).map(K::from_index)
    }

    /// Element preceding `key`
    pub fn prev(&self, key: K) -> Option<K> {
        self.node(key).and_then(|node| node.prev).map(K::from_index)
    }

    /// Add an element to the end of the list
    pub fn push_back(&mut self, value: T) -> K {
        let index = self.alloc(value);
        match self.tail {
            None => self.head = Some(index),
            Some(tail) => {
                self.nodes[tail].next = Some(index);
                self.nodes[index].prev = Some(tail);
            }
        }
        self.tail = Some(index);
        K::from_index(index)
    }

    /// Insert an element right before `location`
    ///
    /// Returns `None` if `location` is not in the list.
    pub fn insert_before(&mut self, location: K, value: T) -> Option<K> {
        if !self.contains(location) {
            return None;
        }
        let location = location.index();
        let index = self.alloc(value);
        let prev = self.nodes[location].prev;
        self.nodes[index].prev = prev;
        self.nodes[index].next = Some(location);
        self.nodes[location].prev = Some(index);
        match prev {
            None => self.head = Some(index),
            Some(prev) => self.nodes[prev].next = Some(index),
        }
        Some(K::from_index(index))
    }

    /// Insert an element right after `location`
    ///
    /// Returns `None` if `location` is not in the list.
    pub fn insert_after(&mut self, location: K, value: T) -> Option<K> {
        if !self.contains(location) {
            return None;
        }
        let location = location.index();
        let index = self.alloc(value);
        let next = self.nodes[location].next;
        self.nodes[index].next = next;
        self.nodes[index].prev = Some(location);
        self.nodes[location].next = Some(index);
        match next {
            None => self.tail = Some(index),
            Some(next) => self.nodes[next].prev = Some(index),
        }
        Some(K::from_index(index))
    }

    /// Unlink an element from the list
    pub fn remove(&mut self, key: K) -> Option<T> {
        let index = key.index();
        let node = self.nodes.get_mut(index)?;
        let value = node.value.take()?;
        let (prev, next) = (node.prev.take(), node.next.take());
        match prev {
            None => self.head = next,
            Some(prev) => self.nodes[prev].next = next,
        }
        match next {
            None => self.tail = prev,
            Some(next) => self.nodes[next].prev = prev,
        }
        self.len -= 1;
        Some(value)
    }

    /// Iterate over all elements in order
    pub fn iter(&self) -> Iter<'_, K, T> {
        Iter {
            list: self,
            cursor: self.head,
            end: None,
        }
    }

    /// Iterate in order starting at `start` (inclusive)
    pub fn iter_from(&self, start: K) -> Iter<'_, K, T> {
        Iter {
            list: self,
            cursor: self.node(start).map(|_| start.index()),
            end: None,
        }
    }

    /// Iterate over the elements from `start` to `end` (both inclusive)
    ///
    /// Returns `None` if `end` does not come at or after `start`.
    pub fn range(&self, start: K, end: K) -> Option<Iter<'_, K, T>> {
        if !self.iter_from(start).any(|(key, _)| key == end) {
            return None;
        }
        Some(Iter {
            list: self,
            cursor: Some(start.index()),
            end: Some(end.index()),
        })
    }

    /// Keys of all elements in order
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Position of every element in iteration order
    pub fn positions(&self) -> std::collections::HashMap<K, usize> {
        self.keys().enumerate().map(|(pos, key)| (key, pos)).collect()
    }

    fn node(&self, key: K) -> Option<&Node<T>> {
        self.nodes
            .get(key.index())
            .filter(|node| node.value.is_some())
    }

    fn alloc(&mut self, value: T) -> usize {
        self.nodes.push(Node {
            value: Some(value),
            prev: None,
            next: None,
        });
        self.len += 1;
        self.nodes.len() - 1
    }
}

impl<K: ArenaKey, T> Default for InsertList<K, T> {
    fn default() -> Self {
        InsertList::new()
    }
}

impl<K: ArenaKey, T: Clone> Clone for InsertList<K, T> {
    fn clone(&self) -> Self {
        InsertList {
            nodes: self
                .nodes
                .iter()
                .map(|node| Node {
                    value: node.value.clone(),
                    prev: node.prev,
                    next: node.next,
                })
                .collect(),
            head: self.head,
            tail: self.tail,
            len: self.len,
            key: PhantomData,
        }
    }
}

impl<K: ArenaKey, T: Debug> Debug for InsertList<K, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: ArenaKey, T> Index<K> for InsertList<K, T> {
    type Output = T;

    fn index(&self, key: K) -> &T {
        match self.get(key) {
            Some(value) => value,
            None => panic!("{:?} is not in the list", key),
        }
    }
}

impl<K: ArenaKey, T> IndexMut<K> for InsertList<K, T> {
    fn index_mut(&mut self, key: K) -> &mut T {
        match self.get_mut(key) {
            Some(value) => value,
            None => panic!("{:?} is not in the list", key),
        }
    }
}

impl<K: ArenaKey, T> FromIterator<T> for InsertList<K, T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = InsertList::new();
        for value in iter {
            list.push_back(value);
        }
        list
    }
}

/// In-order iterator over an [`InsertList`]
pub struct Iter<'a, K, T> {
    list: &'a InsertList<K, T>,
    cursor: Option<usize>,
    end: Option<usize>,
}

impl<'a, K: ArenaKey, T> Iterator for Iter<'a, K, T> {
    type Item = (K, &'a T);

    fn next(&mut self) -> Option<(K, &'a T)> {
        let index = self.cursor?;
        let node = &self.list.nodes[index];
        self.cursor = if self.end == Some(index) {
            None
        } else {
            node.next
        };
        node.value.as_ref().map(|value| (K::from_index(index), value))
    }
}
