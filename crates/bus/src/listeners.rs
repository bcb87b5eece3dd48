// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2026 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Weak listener list: an intrusive singly-linked list of weak handles.
//!
//! Readers traverse via atomic loads only and never block each other or the
//! writer. All structural mutation — add, remove, orphan unlink — runs under
//! one per-list mutex (the single-writer discipline). Unlinking only detaches
//! a node: its own next link is never re-pointed, so a reader standing on a
//! detached node continues into the remainder of the list.

use std::{
    any::Any,
    fmt::Debug,
    sync::{Arc, Weak},
};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

/// An erased, shared listener instance.
pub type ListenerRef = Arc<dyn Any + Send + Sync>;

/// One entry in a [`WeakListenerList`].
pub(crate) struct ListenerNode {
    referent: Weak<dyn Any + Send + Sync>,
    /// Serializes handler invocations on this listener instance.
    invoke_lock: Mutex<()>,
    next: ArcSwapOption<ListenerNode>,
}

impl ListenerNode {
    /// Attempts to upgrade the weak handle to a live listener.
    pub(crate) fn upgrade(&self) -> Option<ListenerRef> {
        self.referent.upgrade()
    }

    /// Returns the successor node, if any.
    pub(crate) fn next_node(&self) -> Option<Arc<ListenerNode>> {
        self.next.load_full()
    }

    /// Returns the per-listener invocation lock.
    pub(crate) fn invoke_lock(&self) -> &Mutex<()> {
        &self.invoke_lock
    }
}

impl Debug for ListenerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ListenerNode))
            .field("live", &(self.referent.strong_count() > 0))
            .finish()
    }
}

/// Intrusive singly-linked list of weak listener handles.
#[derive(Debug, Default)]
pub struct WeakListenerList {
    head: ArcSwapOption<ListenerNode>,
    write_lock: Mutex<()>,
}

impl WeakListenerList {
    /// Creates a new empty [`WeakListenerList`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `listener` at the head of the list.
    ///
    /// Idempotent with respect to duplicate insertion: returns `false` when
    /// the same instance (by identity) is already present and live.
    pub fn add(&self, listener: &ListenerRef) -> bool {
        let _guard = self.write_lock.lock();
        if self.position_of(listener).is_some() {
            return false;
        }

        let node = Arc::new(ListenerNode {
            referent: Arc::downgrade(listener),
            invoke_lock: Mutex::new(()),
            next: ArcSwapOption::new(self.head.load_full()),
        });
        self.head.store(Some(node));
        true
    }

    /// Unlinks the first entry whose live referent is `listener` by identity.
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&self, listener: &ListenerRef) -> bool {
        let _guard = self.write_lock.lock();
        match self.position_of(listener) {
            Some(node) => {
                self.unlink_locked(&node);
                true
            }
            None => false,
        }
    }

    /// Unlinks a node found dead during traversal.
    ///
    /// Safe to call for a node another thread already unlinked: the node is
    /// simply no longer reachable from the head and the walk finds nothing.
    pub(crate) fn reclaim(&self, dead: &Arc<ListenerNode>) {
        let _guard = self.write_lock.lock();
        self.unlink_locked(dead);
    }

    /// Returns the head node for lock-free traversal.
    pub(crate) fn head_node(&self) -> Option<Arc<ListenerNode>> {
        self.head.load_full()
    }

    /// Counts currently-live entries (advisory; for introspection and tests).
    #[must_use]
    pub fn live_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head_node();
        while let Some(node) = cursor {
            if node.referent.strong_count() > 0 {
                count += 1;
            }
            cursor = node.next_node();
        }
        count
    }

    // Requires the write lock to be held.
    fn position_of(&self, listener: &ListenerRef) -> Option<Arc<ListenerNode>> {
        let mut cursor = self.head.load_full();
        while let Some(node) = cursor {
            if let Some(live) = node.upgrade()
                && Arc::ptr_eq(&live, listener)
            {
                return Some(node);
            }
            cursor = node.next_node();
        }
        None
    }

    // Requires the write lock to be held.
    fn unlink_locked(&self, target: &Arc<ListenerNode>) {
        let mut prev: Option<Arc<ListenerNode>> = None;
        let mut cursor = self.head.load_full();
        while let Some(node) = cursor {
            if Arc::ptr_eq(&node, target) {
                let successor = node.next_node();
                match &prev {
                    None => self.head.store(successor),
                    Some(prev) => prev.next.store(successor),
                }
                return;
            }
            cursor = node.next_node();
            prev = Some(node);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn listener(value: i64) -> ListenerRef {
        Arc::new(value)
    }

    fn collect_live(list: &WeakListenerList) -> Vec<i64> {
        let mut out = Vec::new();
        let mut cursor = list.head_node();
        while let Some(node) = cursor {
            if let Some(live) = node.upgrade() {
                out.push(*live.downcast_ref::<i64>().unwrap());
            }
            cursor = node.next_node();
        }
        out
    }

    #[rstest]
    fn test_add_inserts_at_head() {
        let list = WeakListenerList::new();
        let first = listener(1);
        let second = listener(2);

        assert!(list.add(&first));
        assert!(list.add(&second));
        assert_eq!(collect_live(&list), vec![2, 1]);
    }

    #[rstest]
    fn test_add_is_idempotent_per_identity() {
        let list = WeakListenerList::new();
        let first = listener(1);

        assert!(list.add(&first));
        assert!(!list.add(&first));
        assert_eq!(list.live_count(), 1);

        // A distinct instance with an equal value is a different listener
        let twin = listener(1);
        assert!(list.add(&twin));
        assert_eq!(list.live_count(), 2);
    }

    #[rstest]
    fn test_remove_unlinks_by_identity() {
        let list = WeakListenerList::new();
        let first = listener(1);
        let second = listener(2);
        let third = listener(3);
        list.add(&first);
        list.add(&second);
        list.add(&third);

        assert!(list.remove(&second));
        assert_eq!(collect_live(&list), vec![3, 1]);

        assert!(!list.remove(&second));
    }

    #[rstest]
    fn test_remove_head_and_tail() {
        let list = WeakListenerList::new();
        let first = listener(1);
        let second = listener(2);
        list.add(&first);
        list.add(&second);

        assert!(list.remove(&second)); // head
        assert_eq!(collect_live(&list), vec![1]);
        assert!(list.remove(&first)); // tail
        assert_eq!(collect_live(&list), Vec::<i64>::new());
    }

    #[rstest]
    fn test_dropped_listener_reclaimed() {
        let list = WeakListenerList::new();
        let kept = listener(1);
        let dropped = listener(2);
        list.add(&kept);
        list.add(&dropped);
        drop(dropped);

        assert_eq!(list.live_count(), 1);

        // Reclaim the orphan the way a traversal would
        let mut dead_node = None;
        let mut cursor = list.head_node();
        while let Some(node) = cursor {
            let next = node.next_node();
            if node.upgrade().is_none() {
                list.reclaim(&node);
                dead_node = Some(node);
            }
            cursor = next;
        }
        assert_eq!(collect_live(&list), vec![1]);

        // Reclaiming an already-unlinked node is a no-op
        list.reclaim(&dead_node.unwrap());
        assert_eq!(collect_live(&list), vec![1]);
    }

    #[rstest]
    fn test_reader_on_detached_node_continues() {
        let list = WeakListenerList::new();
        let first = listener(1);
        let second = listener(2);
        let third = listener(3);
        list.add(&first);
        list.add(&second);
        list.add(&third);

        // Reader is standing on the middle node
        let standing = list.head_node().unwrap().next_node().unwrap();
        list.remove(&second);

        // The detached node still leads into the remainder of the list
        let continued = standing.next_node().unwrap();
        assert_eq!(
            *continued.upgrade().unwrap().downcast_ref::<i64>().unwrap(),
            1
        );
    }
}
