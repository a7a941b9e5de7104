//! # rangetree-rs
//!
//! An immutable, multi-dimensional range tree.
//!
//! Every mutating operation returns a new [`RangeTree`] and leaves every tree
//! returned earlier observably unchanged. Only the chain of lists from the
//! mutation site up to the root is copied; all other subtrees are shared
//! between a tree and the trees derived from it.
//!
//! ## Example
//!
//! ```rust
//! use rangetree_rs::RangeTree;
//!
//! let tree: RangeTree<[i64; 2]> = RangeTree::new(2).unwrap();
//! let tree = tree.add([[1, 1], [1, 2], [2, 1]]);
//! assert_eq!(tree.len(), 3);
//!
//! let smaller = tree.delete([&[1i64, 2]]);
//! assert_eq!(smaller.len(), 2);
//! assert_eq!(tree.len(), 3);
//!
//! let hits: Vec<[i64; 2]> = smaller.query(&[1i64..=2, 1..=2]).iter().map(|e| **e).collect();
//! assert_eq!(hits, vec![[1, 1], [2, 1]]);
//! ```

mod config;
mod error;
mod node;

pub use config::{Config, MAX_DIMENSIONS};
pub use error::{RangeTreeError, Result};

use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};

use node::{Node, NodeList, Payload};

// =============================================================================
// Capabilities consumed from callers
// =============================================================================

/// A point indexed by the tree.
///
/// `value_at_dimension` must be a pure function of the entry for as long as the
/// entry is stored. Dimensions are numbered from `1`.
pub trait Entry {
    fn value_at_dimension(&self, dimension: usize) -> i64;
}

/// An inclusive, per-dimension query box.
///
/// A dimension with `low > high` matches nothing.
pub trait Interval {
    fn low_at_dimension(&self, dimension: usize) -> i64;
    fn high_at_dimension(&self, dimension: usize) -> i64;
}

impl<T: Entry + ?Sized> Entry for &T {
    #[inline]
    fn value_at_dimension(&self, dimension: usize) -> i64 {
        (**self).value_at_dimension(dimension)
    }
}

impl<T: Entry + ?Sized> Entry for Arc<T> {
    #[inline]
    fn value_at_dimension(&self, dimension: usize) -> i64 {
        (**self).value_at_dimension(dimension)
    }
}

// Missing dimensions read as 0.
impl Entry for [i64] {
    #[inline]
    fn value_at_dimension(&self, dimension: usize) -> i64 {
        dimension
            .checked_sub(1)
            .and_then(|i| self.get(i))
            .copied()
            .unwrap_or_default()
    }
}

impl<const N: usize> Entry for [i64; N] {
    #[inline]
    fn value_at_dimension(&self, dimension: usize) -> i64 {
        self.as_slice().value_at_dimension(dimension)
    }
}

impl Entry for Vec<i64> {
    #[inline]
    fn value_at_dimension(&self, dimension: usize) -> i64 {
        self.as_slice().value_at_dimension(dimension)
    }
}

#[inline]
fn range_at(ranges: &[RangeInclusive<i64>], dimension: usize) -> Option<&RangeInclusive<i64>> {
    dimension.checked_sub(1).and_then(|i| ranges.get(i))
}

// Missing dimensions read as an empty range.
impl Interval for [RangeInclusive<i64>] {
    #[inline]
    fn low_at_dimension(&self, dimension: usize) -> i64 {
        range_at(self, dimension).map_or(i64::MAX, |r| *r.start())
    }

    #[inline]
    fn high_at_dimension(&self, dimension: usize) -> i64 {
        range_at(self, dimension).map_or(i64::MIN, |r| *r.end())
    }
}

impl<const N: usize> Interval for [RangeInclusive<i64>; N] {
    #[inline]
    fn low_at_dimension(&self, dimension: usize) -> i64 {
        self.as_slice().low_at_dimension(dimension)
    }

    #[inline]
    fn high_at_dimension(&self, dimension: usize) -> i64 {
        self.as_slice().high_at_dimension(dimension)
    }
}

impl Interval for Vec<RangeInclusive<i64>> {
    #[inline]
    fn low_at_dimension(&self, dimension: usize) -> i64 {
        self.as_slice().low_at_dimension(dimension)
    }

    #[inline]
    fn high_at_dimension(&self, dimension: usize) -> i64 {
        self.as_slice().high_at_dimension(dimension)
    }
}

// =============================================================================
// Per-call copy-on-write bookkeeping
// =============================================================================

/// Coordinates from dimension 1 up to some dimension `d`; its length is `d`.
type Prefix = SmallVec<[i64; 4]>;

fn coordinates<Q: Entry + ?Sized>(entry: &Q, dimensions: usize) -> Prefix {
    (1..=dimensions)
        .map(|dimension| entry.value_at_dimension(dimension))
        .collect()
}

/// Prefixes whose node was created or cloned during the current call.
///
/// Such a node is referenced only by the call's working lists and can be
/// written in place. Lives for exactly one `add`/`delete` call.
#[derive(Default)]
struct Scratch {
    owned: HashSet<Prefix>,
}

impl Scratch {
    #[inline]
    fn is_owned(&self, prefix: &[i64]) -> bool {
        self.owned.contains(prefix)
    }

    #[inline]
    fn mark(&mut self, prefix: &[i64]) {
        self.owned.insert(Prefix::from_slice(prefix));
    }
}

/// Returns the node behind `slot` for writing, cloning it first unless the
/// current call already owns it.
fn writable<E>(slot: &mut Arc<Node<E>>, owned: bool) -> &mut Node<E> {
    if !owned {
        *slot = Arc::new(Node::clone(&**slot));
    }
    // Exclusive at this point, so this never clones.
    Arc::make_mut(slot)
}

// =============================================================================
// RangeTree
// =============================================================================

/// Result of [`RangeTree::insert_at_dimension`].
///
/// `moved` and `removed` are disjoint.
pub struct Shift<E> {
    /// The shifted tree.
    pub tree: RangeTree<E>,
    /// Entries that now sit at a shifted coordinate.
    pub moved: Vec<Arc<E>>,
    /// Entries dropped by the shift.
    pub removed: Vec<Arc<E>>,
}

/// An immutable range tree over `D`-dimensional integer points.
///
/// Cloning is O(1). A tree is `Send + Sync` whenever `E` is, and any number of
/// threads may query a tree or derive new trees from it at the same time.
pub struct RangeTree<E> {
    dimensions: usize,
    top: Arc<NodeList<E>>,
    count: usize,
    result_capacity: usize,
}

impl<E> Clone for RangeTree<E> {
    fn clone(&self) -> Self {
        Self {
            dimensions: self.dimensions,
            top: Arc::clone(&self.top),
            count: self.count,
            result_capacity: self.result_capacity,
        }
    }
}

impl<E: Entry> RangeTree<E> {
    /// An empty tree over `dimensions` dimensions.
    pub fn new(dimensions: usize) -> Result<Self> {
        Self::with_config(Config::with_dimensions(dimensions))
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dimensions: config.dimensions,
            top: Arc::new(NodeList::new()),
            count: 0,
            result_capacity: config.result_capacity,
        })
    }

    #[inline]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of distinct points in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn derive(&self, top: NodeList<E>, count: usize) -> Self {
        Self {
            dimensions: self.dimensions,
            top: Arc::new(top),
            count,
            result_capacity: self.result_capacity,
        }
    }

    fn locate(&self, list: &NodeList<E>, coords: &[i64]) -> Option<Arc<E>> {
        let (last, path) = coords.split_last()?;
        let mut list = list;
        for &value in path {
            let (_, node) = list.get(value)?;
            list = node.children()?;
        }
        let (_, node) = list.get(*last)?;
        node.entry().cloned()
    }
}

// -----------------------------------------------------------------------------
// Add
// -----------------------------------------------------------------------------

impl<E: Entry> RangeTree<E> {
    /// Returns a tree that also holds `entries`.
    ///
    /// An entry with the same coordinates as a stored one replaces it without
    /// changing `len`. Adding nothing returns a tree sharing this one's root.
    pub fn add<I>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = E>,
    {
        self.add_shared(entries.into_iter().map(Arc::new))
    }

    /// Like [`RangeTree::add`] for entries the caller already holds in an `Arc`.
    pub fn add_shared<I>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = Arc<E>>,
    {
        let mut entries = entries.into_iter().peekable();
        if entries.peek().is_none() {
            debug!("add called with no entries");
            return self.clone();
        }

        let mut top = NodeList::clone(&self.top);
        let mut scratch = Scratch::default();
        let mut added = 0usize;
        for entry in entries {
            let coords = coordinates(&*entry, self.dimensions);
            if Self::add_path(&mut top, &coords, 0, entry, &mut scratch) {
                added += 1;
            }
        }

        let tree = self.derive(top, self.count + added);
        trace!(added, len = tree.count, "added entries");
        tree
    }

    /// Interns `entry` below `list`, which sits at dimension `depth + 1`.
    /// Returns whether a new point was created.
    fn add_path(
        list: &mut NodeList<E>,
        coords: &[i64],
        depth: usize,
        entry: Arc<E>,
        scratch: &mut Scratch,
    ) -> bool {
        let value = coords[depth];
        if depth + 1 == coords.len() {
            return list
                .add_or_overwrite(Arc::new(Node::leaf(value, entry)))
                .is_none();
        }

        let prefix = &coords[..=depth];
        let (index, owned) = match list.search(value) {
            Ok(index) => (index, scratch.is_owned(prefix)),
            Err(index) => {
                list.insert_at(index, Arc::new(Node::branch(value, NodeList::new())));
                scratch.mark(prefix);
                (index, true)
            }
        };
        if !owned {
            scratch.mark(prefix);
        }

        let node = writable(list.slot_mut(index), owned);
        let children = node
            .children_mut()
            .expect("nodes above the last dimension hold a children list");
        Self::add_path(children, coords, depth + 1, entry, scratch)
    }
}

// -----------------------------------------------------------------------------
// Delete
// -----------------------------------------------------------------------------

impl<E: Entry> RangeTree<E> {
    /// Returns a tree without the points at the coordinates of `entries`.
    ///
    /// Only coordinates are compared. Entries with no stored point are
    /// skipped.
    pub fn delete<'a, Q, I>(&self, entries: I) -> Self
    where
        Q: Entry + ?Sized + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        let mut top: Option<NodeList<E>> = None;
        let mut scratch = Scratch::default();
        let mut deleted = 0usize;
        for entry in entries {
            let coords = coordinates(entry, self.dimensions);
            let current = top.as_ref().unwrap_or(&*self.top);
            if self.locate(current, &coords).is_none() {
                continue;
            }

            let list = top.get_or_insert_with(|| NodeList::clone(&self.top));
            if Self::remove_path(list, &coords, 0, &mut scratch) {
                deleted += 1;
            }
        }

        let Some(top) = top else {
            debug!("delete matched no entries");
            return self.clone();
        };
        let tree = self.derive(top, self.count - deleted);
        trace!(deleted, len = tree.count, "deleted entries");
        tree
    }

    /// Removes the point at `coords` below `list`, which sits at dimension
    /// `depth + 1`, dropping any children list the removal empties.
    fn remove_path(
        list: &mut NodeList<E>,
        coords: &[i64],
        depth: usize,
        scratch: &mut Scratch,
    ) -> bool {
        let value = coords[depth];
        let Ok(index) = list.search(value) else {
            return false;
        };
        if depth + 1 == coords.len() {
            list.delete_at(index);
            return true;
        }

        let prefix = &coords[..=depth];
        let owned = scratch.is_owned(prefix);
        if !owned {
            scratch.mark(prefix);
        }

        let (removed, emptied) = {
            let node = writable(list.slot_mut(index), owned);
            let children = node
                .children_mut()
                .expect("nodes above the last dimension hold a children list");
            let removed = Self::remove_path(children, coords, depth + 1, scratch);
            (removed, children.is_empty())
        };
        if emptied {
            list.delete_at(index);
        }
        removed
    }
}

// -----------------------------------------------------------------------------
// Shift
// -----------------------------------------------------------------------------

impl<E: Entry> RangeTree<E> {
    /// Shifts every point whose coordinate at `dimension` is `>= index` by
    /// `delta`.
    ///
    /// Points that are not shifted always keep their place: a shifted point
    /// whose new coordinate is below `index`, either because it collides with
    /// one of them or because it fell into the range a negative `delta`
    /// vacated, is dropped and reported in [`Shift::removed`]. So is a point
    /// whose coordinate would overflow. Every other shifted point is reported
    /// in [`Shift::moved`].
    ///
    /// Stored entries are not touched; only the tree's coordinates change.
    /// `dimension` outside `1..=D` or a zero `delta` returns this tree and two
    /// empty lists.
    pub fn insert_at_dimension(&self, dimension: usize, index: i64, delta: i64) -> Shift<E> {
        if dimension == 0 || dimension > self.dimensions || delta == 0 {
            debug!(dimension, delta, "shift is a no-op");
            return Shift {
                tree: self.clone(),
                moved: Vec::new(),
                removed: Vec::new(),
            };
        }

        let mut moved = Vec::with_capacity(self.result_capacity);
        let mut removed = Vec::with_capacity(self.result_capacity);
        let mut shifter = Shifter {
            dimension,
            index,
            delta,
            moved: &mut moved,
            removed: &mut removed,
        };

        let top = match shifter.shift(&self.top, 1) {
            Some(top) => Arc::new(top),
            None => Arc::clone(&self.top),
        };
        let tree = Self {
            dimensions: self.dimensions,
            top,
            count: self.count - removed.len(),
            result_capacity: self.result_capacity,
        };
        trace!(
            dimension,
            index,
            delta,
            moved = moved.len(),
            removed = removed.len(),
            len = tree.count,
            "shifted entries"
        );
        Shift {
            tree,
            moved,
            removed,
        }
    }
}

struct Shifter<'a, E> {
    dimension: usize,
    index: i64,
    delta: i64,
    moved: &'a mut Vec<Arc<E>>,
    removed: &'a mut Vec<Arc<E>>,
}

impl<E> Shifter<'_, E> {
    /// Rewrites `list`, which sits at dimension `level`. `None` means nothing
    /// below it changed and it can be shared as is.
    fn shift(&mut self, list: &NodeList<E>, level: usize) -> Option<NodeList<E>> {
        if level == self.dimension {
            return self.shift_level(list);
        }

        let mut rebuilt: Option<NodeList<E>> = None;
        for (position, node) in list.iter().enumerate() {
            let children = node
                .children()
                .expect("nodes above the last dimension hold a children list");
            match self.shift(children, level + 1) {
                Some(children) => {
                    let out = rebuilt.get_or_insert_with(|| list.head(position));
                    if !children.is_empty() {
                        out.push(Arc::new(node.with_children(children)));
                    }
                }
                None => {
                    if let Some(out) = rebuilt.as_mut() {
                        out.push(Arc::clone(node));
                    }
                }
            }
        }
        rebuilt
    }

    fn shift_level(&mut self, list: &NodeList<E>) -> Option<NodeList<E>> {
        let start = list.lower_bound(self.index);
        if start == list.len() {
            return None;
        }

        let mut out = list.head(start);
        for node in list.iter().skip(start) {
            let shifted = node
                .value()
                .checked_add(self.delta)
                .filter(|value| *value >= self.index);
            match shifted {
                Some(value) => {
                    node.collect_entries(self.moved);
                    out.push(Arc::new(node.with_value(value)));
                }
                None => node.collect_entries(self.removed),
            }
        }
        Some(out)
    }
}

// -----------------------------------------------------------------------------
// Reads
// -----------------------------------------------------------------------------

impl<E: Entry> RangeTree<E> {
    /// Every entry inside `interval`, in ascending lexicographic order of
    /// coordinates.
    pub fn query<I: Interval + ?Sized>(&self, interval: &I) -> Vec<Arc<E>> {
        let mut entries = Vec::new();
        self.apply(interval, |entry| {
            entries.push(Arc::clone(entry));
            true
        });
        entries
    }

    /// Calls `visit` on every entry inside `interval` in the order of
    /// [`RangeTree::query`] until it returns `false`.
    ///
    /// Returns `false` if the traversal was cancelled.
    pub fn apply<I, F>(&self, interval: &I, mut visit: F) -> bool
    where
        I: Interval + ?Sized,
        F: FnMut(&Arc<E>) -> bool,
    {
        Self::apply_list(&self.top, interval, 1, &mut visit)
    }

    fn apply_list<I, F>(list: &NodeList<E>, interval: &I, dimension: usize, visit: &mut F) -> bool
    where
        I: Interval + ?Sized,
        F: FnMut(&Arc<E>) -> bool,
    {
        let low = interval.low_at_dimension(dimension);
        let high = interval.high_at_dimension(dimension);
        list.apply_range(low, high, |node| match node.payload() {
            Payload::Entry(entry) => visit(entry),
            Payload::Children(children) => {
                Self::apply_list(children, interval, dimension + 1, visit)
            }
        })
    }

    /// The stored entry at the coordinates of each of `entries`, in input
    /// order.
    pub fn get<'a, Q, I>(&self, entries: I) -> Vec<Option<Arc<E>>>
    where
        Q: Entry + ?Sized + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        entries
            .into_iter()
            .map(|entry| self.locate(&self.top, &coordinates(entry, self.dimensions)))
            .collect()
    }

    /// All entries in ascending lexicographic order of coordinates.
    pub fn iter(&self) -> Iter<'_, E> {
        Iter {
            stack: vec![self.top.iter()],
        }
    }
}

impl<E: fmt::Debug + Entry> fmt::Debug for RangeTree<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeTree")
            .field("dimensions", &self.dimensions)
            .field("len", &self.count)
            .field("entries", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

pub struct Iter<'a, E> {
    stack: Vec<std::slice::Iter<'a, Arc<Node<E>>>>,
}

impl<'a, E> Iterator for Iter<'a, E> {
    type Item = &'a Arc<E>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(level) = self.stack.last_mut() {
            let Some(node) = level.next() else {
                self.stack.pop();
                continue;
            };
            match node.payload() {
                Payload::Entry(entry) => return Some(entry),
                Payload::Children(children) => self.stack.push(children.iter()),
            }
        }
        None
    }
}


#[cfg(test)]
mod proptests;
