//! Nodes and the ordered node lists that hold them.
//!
//! A [`NodeList`] is the fan-out of distinct coordinates seen at one dimension
//! under a fixed prefix of coordinates from the dimensions before it. Lists
//! hold `Arc` handles, so cloning a list copies handles and never the subtrees
//! behind them.

use std::sync::Arc;

/// What a node owns: the entry itself at the last dimension, the next
/// dimension's list everywhere else.
pub(crate) enum Payload<E> {
    Entry(Arc<E>),
    Children(NodeList<E>),
}

impl<E> Clone for Payload<E> {
    fn clone(&self) -> Self {
        match self {
            Payload::Entry(entry) => Payload::Entry(Arc::clone(entry)),
            Payload::Children(children) => Payload::Children(children.clone()),
        }
    }
}

/// One coordinate value at one dimension.
///
/// Nodes linked into a published tree are never written again. The only
/// in-place writes happen on nodes that a single mutating call created or
/// cloned itself and that are still exclusively owned by its working lists.
pub(crate) struct Node<E> {
    value: i64,
    payload: Payload<E>,
}

impl<E> Clone for Node<E> {
    fn clone(&self) -> Self {
        Self {
            value: self.value,
            payload: self.payload.clone(),
        }
    }
}

impl<E> Node<E> {
    /// A node at the last dimension.
    #[inline]
    pub(crate) fn leaf(value: i64, entry: Arc<E>) -> Self {
        Self {
            value,
            payload: Payload::Entry(entry),
        }
    }

    /// A node at any dimension but the last.
    #[inline]
    pub(crate) fn branch(value: i64, children: NodeList<E>) -> Self {
        Self {
            value,
            payload: Payload::Children(children),
        }
    }

    #[inline]
    pub(crate) fn value(&self) -> i64 {
        self.value
    }

    #[inline]
    pub(crate) fn payload(&self) -> &Payload<E> {
        &self.payload
    }

    #[inline]
    pub(crate) fn is_last_dimension(&self) -> bool {
        matches!(self.payload, Payload::Entry(_))
    }

    #[inline]
    pub(crate) fn entry(&self) -> Option<&Arc<E>> {
        match &self.payload {
            Payload::Entry(entry) => Some(entry),
            Payload::Children(_) => None,
        }
    }

    #[inline]
    pub(crate) fn children(&self) -> Option<&NodeList<E>> {
        match &self.payload {
            Payload::Entry(_) => None,
            Payload::Children(children) => Some(children),
        }
    }

    #[inline]
    pub(crate) fn children_mut(&mut self) -> Option<&mut NodeList<E>> {
        match &mut self.payload {
            Payload::Entry(_) => None,
            Payload::Children(children) => Some(children),
        }
    }

    /// Same payload, new coordinate.
    pub(crate) fn with_value(&self, value: i64) -> Self {
        Self {
            value,
            payload: self.payload.clone(),
        }
    }

    /// Same coordinate, new children list.
    pub(crate) fn with_children(&self, children: NodeList<E>) -> Self {
        debug_assert!(!self.is_last_dimension());
        Self::branch(self.value, children)
    }

    /// Appends every entry beneath this node, in ascending coordinate order.
    pub(crate) fn collect_entries(&self, out: &mut Vec<Arc<E>>) {
        match &self.payload {
            Payload::Entry(entry) => out.push(Arc::clone(entry)),
            Payload::Children(children) => {
                for child in children.iter() {
                    child.collect_entries(out);
                }
            }
        }
    }
}

/// Nodes sorted ascending by value, values unique.
pub(crate) struct NodeList<E> {
    nodes: Vec<Arc<Node<E>>>,
}

impl<E> Clone for NodeList<E> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
        }
    }
}

impl<E> Default for NodeList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> NodeList<E> {
    pub(crate) fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub(crate) fn iter(&self) -> std::slice::Iter<'_, Arc<Node<E>>> {
        self.nodes.iter()
    }

    /// `Ok(index)` of the node holding `value`, or `Err(index)` where it would
    /// be inserted.
    #[inline]
    pub(crate) fn search(&self, value: i64) -> Result<usize, usize> {
        self.nodes.binary_search_by_key(&value, |node| node.value)
    }

    /// Index of the first node whose value is `>= value`.
    #[inline]
    pub(crate) fn lower_bound(&self, value: i64) -> usize {
        self.nodes.partition_point(|node| node.value < value)
    }

    pub(crate) fn get(&self, value: i64) -> Option<(usize, &Arc<Node<E>>)> {
        let index = self.search(value).ok()?;
        Some((index, &self.nodes[index]))
    }

    /// Inserts `node`, or replaces the node with the same value and returns it.
    ///
    /// `None` means the list grew by one.
    pub(crate) fn add_or_overwrite(&mut self, node: Arc<Node<E>>) -> Option<Arc<Node<E>>> {
        match self.search(node.value) {
            Ok(index) => Some(std::mem::replace(&mut self.nodes[index], node)),
            Err(index) => {
                self.nodes.insert(index, node);
                None
            }
        }
    }

    /// Inserts at a position obtained from [`NodeList::search`].
    pub(crate) fn insert_at(&mut self, index: usize, node: Arc<Node<E>>) {
        debug_assert!(index == 0 || self.nodes[index - 1].value < node.value);
        debug_assert!(index == self.nodes.len() || node.value < self.nodes[index].value);
        self.nodes.insert(index, node);
    }

    /// Appends a node whose value is greater than every value in the list.
    pub(crate) fn push(&mut self, node: Arc<Node<E>>) {
        debug_assert!(self.nodes.last().map_or(true, |last| last.value < node.value));
        self.nodes.push(node);
    }

    #[inline]
    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Arc<Node<E>> {
        &mut self.nodes[index]
    }

    pub(crate) fn delete_at(&mut self, index: usize) {
        self.nodes.remove(index);
    }

    /// A new list sharing the first `len` handles.
    pub(crate) fn head(&self, len: usize) -> Self {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        nodes.extend(self.nodes[..len].iter().cloned());
        Self { nodes }
    }

    /// Visits every node with `low <= value <= high` in ascending order.
    ///
    /// Returns `false` as soon as `visit` does; an inverted range visits
    /// nothing.
    pub(crate) fn apply_range(
        &self,
        low: i64,
        high: i64,
        mut visit: impl FnMut(&Node<E>) -> bool,
    ) -> bool {
        if low > high {
            return true;
        }

        let start = self.lower_bound(low);
        let end = self.nodes.partition_point(|node| node.value <= high);
        for node in &self.nodes[start..end] {
            if !visit(node) {
                return false;
            }
        }
        true
    }
}
