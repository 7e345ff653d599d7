//! Generic Ordered Registry backed by an Arena of Doubly-Linked Nodes
//!
//! ## Overview
//!
//! The registry is the ordered collection used for both the active connection
//! set (owned by the connection manager) and the sensor metadata table (owned
//! by the aggregation worker). Each use site customizes three capabilities
//! through [`ElementOps`]:
//!
//! | Capability | Used by                                  |
//! |------------|------------------------------------------|
//! | `copy`     | `insert_copy_*` variants                 |
//! | `free`     | `free_*` variants, `clear`, and `Drop`   |
//! | `compare`  | index/reference lookup, `insert_sorted`  |
//!
//! ## Memory Layout
//!
//! Nodes live in a `Vec` of slots and link to each other by slot index. A
//! removed slot goes onto a vacant list and its generation is bumped, so a
//! [`NodeRef`] taken before the removal no longer resolves:
//!
//! ```text
//! slots:   [ g0 A ] [ g1 -- ] [ g0 C ] [ g0 B ]
//!             │                 ↑  │      ↑ │
//!             └─────── next ────┼──┼──────┘ │
//!                               └──┼── next ┘
//! order:   A → B → C          vacant: [1]
//! ```
//!
//! ## Index Contract
//!
//! Indices are 0-based and dense. Out-of-range indices clamp instead of
//! failing:
//! - insert: `index <= 0` inserts at the head, `index >= len` appends
//! - get/remove/reference: `index <= 0` targets the head, `index >= len`
//!   targets the tail
//!
//! Every lookup on an empty registry, and every stale [`NodeRef`], yields
//! `None`. Callers must check results.
//!
//! ## Usage Example
//!
//! ```rust
//! use sensorgate_core::registry::{OrdOps, Registry};
//!
//! let mut reg = Registry::new(OrdOps);
//! reg.insert_at_index(10, 0);
//! reg.insert_at_index(30, 99);      // clamps to the tail
//! reg.insert_sorted(20);
//!
//! let values: Vec<i32> = reg.iter().copied().collect();
//! assert_eq!(values, vec![10, 20, 30]);
//! assert_eq!(reg.get_element_at_index(-4), Some(&10));
//! assert_eq!(reg.get_index_of_element(&30), Some(2));
//! ```

use core::cmp::Ordering;
use core::fmt;

/// Per-use-site element capabilities
///
/// The copy/free/compare triple the registry is parameterized with.
pub trait ElementOps<T> {
    /// Deep copy of an element, or `None` when the element type cannot be
    /// duplicated (an owned socket, for example)
    fn copy(&self, element: &T) -> Option<T>;

    /// Release an element the registry owned
    fn free(&self, element: T) {
        drop(element);
    }

    /// Total order used for lookup and sorted insertion
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

/// Capabilities for any `Clone + Ord` element
#[derive(Debug, Clone, Copy, Default)]
pub struct OrdOps;

impl<T: Clone + Ord> ElementOps<T> for OrdOps {
    fn copy(&self, element: &T) -> Option<T> {
        Some(element.clone())
    }

    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

/// Stable handle to a registry node
///
/// Stays valid while other nodes are inserted or removed. Resolves to `None`
/// once its own node is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    slot: usize,
    generation: u32,
}

struct Node<T> {
    element: T,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Ordered sequence of owned elements
pub struct Registry<T, O: ElementOps<T>> {
    slots: Vec<Slot<T>>,
    vacant: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    ops: O,
}

impl<T, O: ElementOps<T>> Registry<T, O> {
    /// Create an empty registry with the given element capabilities
    pub fn new(ops: O) -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            ops,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the registry holds no elements
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element capabilities this registry was created with
    pub fn ops(&self) -> &O {
        &self.ops
    }

    // ------------------------------------------------------------------
    // Index based operations
    // ------------------------------------------------------------------

    /// Insert by move at a clamped index
    pub fn insert_at_index(&mut self, element: T, index: isize) -> NodeRef {
        let before = if index <= 0 {
            self.head
        } else if index as usize >= self.len {
            None
        } else {
            self.slot_at(index as usize)
        };
        self.link_before(element, before)
    }

    /// Insert a deep copy at a clamped index
    ///
    /// Returns `None` when the element capabilities cannot copy.
    pub fn insert_copy_at_index(&mut self, element: &T, index: isize) -> Option<NodeRef> {
        let copy = self.ops.copy(element)?;
        Some(self.insert_at_index(copy, index))
    }

    /// Detach the element at a clamped index and hand it to the caller
    pub fn remove_at_index(&mut self, index: isize) -> Option<T> {
        let slot = self.slot_at(self.clamp(index)?)?;
        self.unlink(slot)
    }

    /// Remove the element at a clamped index and release it through `free`
    ///
    /// Returns `false` when the registry was empty.
    pub fn free_at_index(&mut self, index: isize) -> bool {
        match self.remove_at_index(index) {
            Some(element) => {
                self.ops.free(element);
                true
            }
            None => false,
        }
    }

    /// Element at a clamped index
    pub fn get_element_at_index(&self, index: isize) -> Option<&T> {
        let slot = self.slot_at(self.clamp(index)?)?;
        self.element(slot)
    }

    /// Mutable element at a clamped index
    pub fn get_element_at_index_mut(&mut self, index: isize) -> Option<&mut T> {
        let slot = self.slot_at(self.clamp(index)?)?;
        self.element_mut(slot)
    }

    /// Index of the first element comparing equal to `element`
    pub fn get_index_of_element(&self, element: &T) -> Option<usize> {
        self.iter()
            .position(|candidate| self.ops.compare(element, candidate) == Ordering::Equal)
    }

    /// Insert so that the registry stays ordered by `compare`
    ///
    /// The new element goes before the first element comparing greater, so
    /// duplicates keep their insertion order.
    pub fn insert_sorted(&mut self, element: T) -> NodeRef {
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let Some(node) = self.slots[slot].node.as_ref() else {
                break;
            };
            if self.ops.compare(&node.element, &element) == Ordering::Greater {
                break;
            }
            cursor = node.next;
        }
        self.link_before(element, cursor)
    }

    /// Sorted insertion of a deep copy
    pub fn insert_copy_sorted(&mut self, element: &T) -> Option<NodeRef> {
        let copy = self.ops.copy(element)?;
        Some(self.insert_sorted(copy))
    }

    /// Detach the first element comparing equal to `element`
    pub fn remove_element(&mut self, element: &T) -> Option<T> {
        let reference = self.reference_of_element(element)?;
        self.remove_at_reference(reference)
    }

    /// Remove and release the first element comparing equal to `element`
    pub fn free_element(&mut self, element: &T) -> bool {
        match self.remove_element(element) {
            Some(found) => {
                self.ops.free(found);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Reference based operations
    // ------------------------------------------------------------------

    /// Handle of the node at a clamped index
    pub fn reference_at_index(&self, index: isize) -> Option<NodeRef> {
        let slot = self.slot_at(self.clamp(index)?)?;
        Some(self.reference(slot))
    }

    /// Handle of the head node
    pub fn first_reference(&self) -> Option<NodeRef> {
        self.head.map(|slot| self.reference(slot))
    }

    /// Handle of the tail node
    pub fn last_reference(&self) -> Option<NodeRef> {
        self.tail.map(|slot| self.reference(slot))
    }

    /// Handle of the node after `reference`
    pub fn next_reference(&self, reference: NodeRef) -> Option<NodeRef> {
        let slot = self.resolve(reference)?;
        let next = self.slots[slot].node.as_ref()?.next?;
        Some(self.reference(next))
    }

    /// Handle of the node before `reference`
    pub fn previous_reference(&self, reference: NodeRef) -> Option<NodeRef> {
        let slot = self.resolve(reference)?;
        let prev = self.slots[slot].node.as_ref()?.prev?;
        Some(self.reference(prev))
    }

    /// Element behind a handle
    pub fn element_at_reference(&self, reference: NodeRef) -> Option<&T> {
        let slot = self.resolve(reference)?;
        self.element(slot)
    }

    /// Mutable element behind a handle
    pub fn element_at_reference_mut(&mut self, reference: NodeRef) -> Option<&mut T> {
        let slot = self.resolve(reference)?;
        self.element_mut(slot)
    }

    /// Current index of a handle
    pub fn index_of_reference(&self, reference: NodeRef) -> Option<usize> {
        let target = self.resolve(reference)?;
        let mut cursor = self.head;
        let mut index = 0;
        while let Some(slot) = cursor {
            if slot == target {
                return Some(index);
            }
            cursor = self.slots[slot].node.as_ref()?.next;
            index += 1;
        }
        None
    }

    /// Handle of the first element comparing equal to `element`
    pub fn reference_of_element(&self, element: &T) -> Option<NodeRef> {
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let node = self.slots[slot].node.as_ref()?;
            if self.ops.compare(element, &node.element) == Ordering::Equal {
                return Some(self.reference(slot));
            }
            cursor = node.next;
        }
        None
    }

    /// Insert by move in front of the node behind `reference`
    ///
    /// A stale handle gives the element back untouched.
    pub fn insert_at_reference(&mut self, element: T, reference: NodeRef) -> Result<NodeRef, T> {
        match self.resolve(reference) {
            Some(slot) => Ok(self.link_before(element, Some(slot))),
            None => Err(element),
        }
    }

    /// Detach the element behind a handle
    pub fn remove_at_reference(&mut self, reference: NodeRef) -> Option<T> {
        let slot = self.resolve(reference)?;
        self.unlink(slot)
    }

    /// Remove and release the element behind a handle
    pub fn free_at_reference(&mut self, reference: NodeRef) -> bool {
        match self.remove_at_reference(reference) {
            Some(element) => {
                self.ops.free(element);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Iterate from head to tail
    pub fn iter(&self) -> Iter<'_, T, O> {
        Iter {
            registry: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    /// First element matching a predicate, mutably
    pub fn find_mut<P>(&mut self, mut predicate: P) -> Option<&mut T>
    where
        P: FnMut(&T) -> bool,
    {
        let mut cursor = self.head;
        let mut found = None;
        while let Some(slot) = cursor {
            let node = self.slots[slot].node.as_ref()?;
            if predicate(&node.element) {
                found = Some(slot);
                break;
            }
            cursor = node.next;
        }
        self.element_mut(found?)
    }

    /// Release every element through `free`
    ///
    /// Slots are kept (with bumped generations) so that handles taken before
    /// the clear stay stale.
    pub fn clear(&mut self) {
        while let Some(head) = self.head {
            match self.unlink(head) {
                Some(element) => self.ops.free(element),
                None => break,
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn clamp(&self, index: isize) -> Option<usize> {
        if self.len == 0 {
            None
        } else if index <= 0 {
            Some(0)
        } else {
            Some((index as usize).min(self.len - 1))
        }
    }

    /// Walk to the slot at an in-range index, from whichever end is closer
    fn slot_at(&self, index: usize) -> Option<usize> {
        if index >= self.len {
            return None;
        }
        if index <= self.len / 2 {
            let mut slot = self.head?;
            for _ in 0..index {
                slot = self.slots[slot].node.as_ref()?.next?;
            }
            Some(slot)
        } else {
            let mut slot = self.tail?;
            for _ in 0..(self.len - 1 - index) {
                slot = self.slots[slot].node.as_ref()?.prev?;
            }
            Some(slot)
        }
    }

    fn resolve(&self, reference: NodeRef) -> Option<usize> {
        let slot = self.slots.get(reference.slot)?;
        (slot.generation == reference.generation && slot.node.is_some()).then_some(reference.slot)
    }

    fn reference(&self, slot: usize) -> NodeRef {
        NodeRef {
            slot,
            generation: self.slots[slot].generation,
        }
    }

    fn element(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot)?.node.as_ref().map(|node| &node.element)
    }

    fn element_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.slots.get_mut(slot)?.node.as_mut().map(|node| &mut node.element)
    }

    fn allocate(&mut self, node: Node<T>) -> usize {
        match self.vacant.pop() {
            Some(slot) => {
                self.slots[slot].node = Some(node);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                self.slots.len() - 1
            }
        }
    }

    /// Link a new node in front of `before`, or at the tail when `None`
    fn link_before(&mut self, element: T, before: Option<usize>) -> NodeRef {
        let prev = match before {
            Some(next) => self.slots[next].node.as_ref().and_then(|node| node.prev),
            None => self.tail,
        };
        let slot = self.allocate(Node {
            element,
            prev,
            next: before,
        });

        match prev {
            Some(p) => {
                if let Some(node) = self.slots[p].node.as_mut() {
                    node.next = Some(slot);
                }
            }
            None => self.head = Some(slot),
        }
        match before {
            Some(n) => {
                if let Some(node) = self.slots[n].node.as_mut() {
                    node.prev = Some(slot);
                }
            }
            None => self.tail = Some(slot),
        }

        self.len += 1;
        self.reference(slot)
    }

    fn unlink(&mut self, slot: usize) -> Option<T> {
        let entry = self.slots.get_mut(slot)?;
        let node = entry.node.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.vacant.push(slot);

        match node.prev {
            Some(p) => {
                if let Some(prev) = self.slots[p].node.as_mut() {
                    prev.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => {
                if let Some(next) = self.slots[n].node.as_mut() {
                    next.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.len -= 1;
        Some(node.element)
    }
}

impl<T, O: ElementOps<T>> Drop for Registry<T, O> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: fmt::Debug, O: ElementOps<T>> fmt::Debug for Registry<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Head-to-tail iterator over a registry
pub struct Iter<'a, T, O: ElementOps<T>> {
    registry: &'a Registry<T, O>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, T, O: ElementOps<T>> Iterator for Iter<'a, T, O> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.registry.slots[slot].node.as_ref()?;
        self.cursor = node.next;
        self.remaining = self.remaining.saturating_sub(1);
        Some(&node.element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T, O: ElementOps<T>> IntoIterator for &'a Registry<T, O> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, O>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
