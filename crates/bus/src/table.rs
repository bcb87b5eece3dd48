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

//! Concurrent subscription table: many readers, one writer.
//!
//! Writers (subscribe, unsubscribe) serialize on a single mutex and commit by
//! atomically replacing snapshots; publishers read the current snapshot
//! without any lock. A snapshot mutation touches only the affected entry —
//! the map clone shares the untouched subscription arrays, and the trie is
//! path-copied with structure sharing below the copied path.

use std::{
    any::TypeId,
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use ahash::{AHashMap, AHashSet};
use arc_swap::ArcSwap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
    error::ErrorSinks,
    handler::{HandlerRegistry, Listener},
    hierarchy::TypeHierarchyCache,
    listeners::ListenerRef,
    message::TypeSpec,
    subscription::Subscription,
};

/// Immutable, atomically-replaceable array of subscriptions.
pub type SubArray = Arc<[Arc<Subscription>]>;

/// Persistent trie keyed by parameter type sequences (arity ≥ 2).
///
/// Lookups walk shared nodes; inserts rebuild only the nodes along the key
/// path and share everything else with the previous version.
#[derive(Clone, Debug, Default)]
pub(crate) struct SignatureTrie {
    root: TrieNode,
}

#[derive(Clone, Debug, Default)]
struct TrieNode {
    children: AHashMap<TypeId, Arc<TrieNode>>,
    subs: Option<SubArray>,
}

impl SignatureTrie {
    fn get(&self, key: &[TypeId]) -> Option<SubArray> {
        let mut node = &self.root;
        for id in key {
            node = node.children.get(id)?;
        }
        node.subs.clone()
    }

    fn with_appended(&self, key: &[TypeId], sub: Arc<Subscription>) -> Self {
        Self {
            root: Self::rebuild(&self.root, key, sub),
        }
    }

    fn rebuild(node: &TrieNode, key: &[TypeId], sub: Arc<Subscription>) -> TrieNode {
        let mut next = node.clone();
        match key.split_first() {
            None => next.subs = Some(append_sub(node.subs.as_ref(), sub)),
            Some((head, rest)) => {
                let child = node
                    .children
                    .get(head)
                    .map_or_else(TrieNode::default, |c| (**c).clone());
                next.children
                    .insert(*head, Arc::new(Self::rebuild(&child, rest, sub)));
            }
        }
        next
    }
}

fn append_sub(existing: Option<&SubArray>, sub: Arc<Subscription>) -> SubArray {
    let mut subs: Vec<Arc<Subscription>> = existing.map(|a| a.to_vec()).unwrap_or_default();
    subs.push(sub);
    subs.into()
}

/// State mutated only while holding the writer lock.
#[derive(Debug, Default)]
struct WriterState {
    /// Listener type → its subscriptions, in descriptor declaration order.
    subs_by_listener: IndexMap<TypeId, SubArray>,
    /// Listener types known to declare no usable handlers.
    non_listeners: AHashSet<TypeId>,
}

/// Maps message-type signatures to subscriptions.
///
/// Subscriptions are created once per {listener type, handler} pair on the
/// first subscribe of that type and never deleted; unsubscribe only removes
/// listener instances, and an emptied subscription is reused on resubscribe.
#[derive(Debug)]
pub struct SubscriptionTable {
    by_single: ArcSwap<AHashMap<TypeId, SubArray>>,
    by_multi: ArcSwap<SignatureTrie>,
    var_arg_possible: AtomicBool,
    writer: Mutex<WriterState>,
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self {
            by_single: ArcSwap::from_pointee(AHashMap::new()),
            by_multi: ArcSwap::from_pointee(SignatureTrie::default()),
            var_arg_possible: AtomicBool::new(false),
            writer: Mutex::new(WriterState::default()),
        }
    }
}

impl SubscriptionTable {
    /// Creates a new empty [`SubscriptionTable`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a listener instance of type `L`.
    ///
    /// The first subscribe of a listener type scans its handlers through
    /// `registry` and publishes the new subscriptions into the lookup
    /// buckets; later subscribes only add the instance to the existing
    /// subscriptions.
    pub fn subscribe<L: Listener>(
        &self,
        listener: &ListenerRef,
        registry: &HandlerRegistry,
        sinks: &ErrorSinks,
    ) {
        let mut state = self.writer.lock();
        let listener_type = TypeId::of::<L>();

        if state.non_listeners.contains(&listener_type) {
            return;
        }
        if let Some(subs) = state.subs_by_listener.get(&listener_type) {
            for sub in subs.iter() {
                sub.add_listener(listener);
            }
            return;
        }

        let descriptors = registry.describe::<L>(sinks);
        if descriptors.is_empty() {
            log::debug!(
                "Listener type {} declares no handlers",
                std::any::type_name::<L>()
            );
            state.non_listeners.insert(listener_type);
            return;
        }

        let subs: Vec<Arc<Subscription>> = descriptors
            .iter()
            .cloned()
            .map(|descriptor| Arc::new(Subscription::new(descriptor)))
            .collect();

        for sub in &subs {
            sub.add_listener(listener);
            let descriptor = sub.descriptor();
            if descriptor.is_variadic() {
                self.publish_single(descriptor.single_key(), sub.clone());
                self.var_arg_possible.store(true, Ordering::Release);
            } else if descriptor.arity() == 1 {
                self.publish_single(descriptor.single_key(), sub.clone());
            } else {
                self.publish_multi(&descriptor.key_sequence(), sub.clone());
            }
        }

        state.subs_by_listener.insert(listener_type, subs.into());
    }

    /// Unsubscribes a listener instance of type `L`.
    ///
    /// A no-op for unknown listener types or instances.
    pub fn unsubscribe<L: Listener>(&self, listener: &ListenerRef) {
        let state = self.writer.lock();
        match state.subs_by_listener.get(&TypeId::of::<L>()) {
            Some(subs) => {
                for sub in subs.iter() {
                    sub.remove_listener(listener);
                }
            }
            None => log::debug!(
                "Unsubscribe for unknown listener type {}",
                std::any::type_name::<L>()
            ),
        }
    }

    /// Returns the subscriptions whose single parameter type is exactly `key`.
    #[must_use]
    pub fn get_exact(&self, key: TypeId) -> Option<SubArray> {
        self.by_single.load().get(&key).cloned()
    }

    /// Returns the subscriptions for the exact parameter sequence `key`.
    #[must_use]
    pub fn get_exact_seq(&self, key: &[TypeId]) -> Option<SubArray> {
        self.by_multi.load().get(key)
    }

    /// Returns the single-arity subscriptions matching `spec` through its
    /// supertypes, in declared supertype order.
    #[must_use]
    pub fn get_super(
        &self,
        spec: TypeSpec,
        hierarchy: &TypeHierarchyCache,
    ) -> SmallVec<[Arc<Subscription>; 4]> {
        let mut matches = SmallVec::new();
        let single = self.by_single.load();
        for supertype in hierarchy.supertypes_of(spec).iter() {
            if let Some(subs) = single.get(&supertype.id()) {
                for sub in subs.iter() {
                    if sub.descriptor().accepts_subtypes() {
                        matches.push(sub.clone());
                    }
                }
            }
        }
        matches
    }

    /// Returns the variadic subscriptions over element type `spec`.
    ///
    /// Short-circuits unless a variadic handler has ever been subscribed.
    #[must_use]
    pub fn get_var_arg(&self, spec: TypeSpec) -> SmallVec<[Arc<Subscription>; 4]> {
        let mut matches = SmallVec::new();
        if !self.var_arg_possible.load(Ordering::Acquire) {
            return matches;
        }
        if let Some(subs) = self.by_single.load().get(&spec.seq_id()) {
            for sub in subs.iter() {
                if sub.descriptor().is_variadic() {
                    matches.push(sub.clone());
                }
            }
        }
        matches
    }

    /// Returns whether any variadic handler has ever been subscribed.
    #[must_use]
    pub fn var_arg_possible(&self) -> bool {
        self.var_arg_possible.load(Ordering::Acquire)
    }

    /// Returns the subscriptions belonging to a listener type (introspection;
    /// never used by publish).
    #[must_use]
    pub fn subscriptions_of(&self, listener_type: TypeId) -> Option<SubArray> {
        self.writer.lock().subs_by_listener.get(&listener_type).cloned()
    }

    /// Returns whether the listener type is known to declare no handlers.
    #[must_use]
    pub fn is_non_listener(&self, listener_type: TypeId) -> bool {
        self.writer.lock().non_listeners.contains(&listener_type)
    }

    fn publish_single(&self, key: TypeId, sub: Arc<Subscription>) {
        let current = self.by_single.load();
        let mut next = (**current).clone();
        let appended = append_sub(next.get(&key), sub);
        next.insert(key, appended);
        self.by_single.store(Arc::new(next));
    }

    fn publish_multi(&self, key: &[TypeId], sub: Arc<Subscription>) {
        let next = self.by_multi.load().with_appended(key, sub);
        self.by_multi.store(Arc::new(next));
    }
}
