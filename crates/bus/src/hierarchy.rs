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

//! Cached transitive supertype resolution for message types.

use std::{any::TypeId, collections::VecDeque, sync::Arc};

use ahash::{AHashMap, AHashSet};
use arc_swap::ArcSwap;

use crate::message::TypeSpec;

/// Maps a message type to its full ordered set of supertypes.
///
/// The walk is a breadth-first traversal over the declared direct supertypes:
/// nearest declarations first, in declaration order, the type itself excluded,
/// duplicates dropped on first visit. There is no implicit root type; a type
/// with no declared supertypes matches exactly only.
///
/// Results are memoized in an atomically-published snapshot map, so publishers
/// read without locks. Racing recomputations for the same type produce the
/// same value and are benign.
#[derive(Debug, Default)]
pub struct TypeHierarchyCache {
    cache: ArcSwap<AHashMap<TypeId, Arc<[TypeSpec]>>>,
}

impl TypeHierarchyCache {
    /// Creates a new empty [`TypeHierarchyCache`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ordered transitive supertypes of `spec`.
    #[must_use]
    pub fn supertypes_of(&self, spec: TypeSpec) -> Arc<[TypeSpec]> {
        if let Some(found) = self.cache.load().get(&spec.id()) {
            return found.clone();
        }

        let computed: Arc<[TypeSpec]> = Self::walk(spec).into();
        let inserted = computed.clone();
        self.cache.rcu(|current| {
            let mut next = (**current).clone();
            next.entry(spec.id()).or_insert_with(|| inserted.clone());
            next
        });
        computed
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.load().len()
    }

    /// Returns whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.load().is_empty()
    }

    fn walk(spec: TypeSpec) -> Vec<TypeSpec> {
        let mut out = Vec::new();
        let mut visited: AHashSet<TypeId> = AHashSet::from_iter([spec.id()]);
        let mut frontier: VecDeque<TypeSpec> = spec.supertypes().iter().map(|s| s.spec()).collect();

        while let Some(current) = frontier.pop_front() {
            if !visited.insert(current.id()) {
                continue;
            }
            out.push(current);
            frontier.extend(current.supertypes().iter().map(|s| s.spec()));
        }

        out
    }
}
