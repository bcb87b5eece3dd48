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

//! Resolution of matching subscriptions for a published tuple.
//!
//! Within one publication, exact matches always precede supertype matches,
//! and supertype matches precede variadic matches; supertype matches follow
//! the declared hierarchy order. Duplicates are removed by subscription
//! identity. No further cross-subscription ordering is guaranteed.

use std::{any::TypeId, sync::Arc};

use smallvec::SmallVec;

use crate::{
    config::PublishMode,
    hierarchy::TypeHierarchyCache,
    message::Envelope,
    subscription::Subscription,
    table::SubscriptionTable,
};

/// Inline capacity for resolved subscription sets.
pub const MATCH_BUFFER_CAP: usize = 8;

/// Resolved subscription set for one publication.
pub type Matches = SmallVec<[Arc<Subscription>; MATCH_BUFFER_CAP]>;

/// Resolves the subscription set for `envelope` under the given publish mode.
pub fn resolve(
    table: &SubscriptionTable,
    hierarchy: &TypeHierarchyCache,
    mode: PublishMode,
    envelope: &Envelope,
) -> Matches {
    let mut matches = Matches::new();

    match envelope.len() {
        0 => {}
        1 => {
            let spec = match envelope.get(0) {
                Some(message) => message.spec(),
                None => return matches,
            };
            if let Some(subs) = table.get_exact(spec.id()) {
                for sub in subs.iter() {
                    push_unique(&mut matches, sub.clone());
                }
            }
            if mode.includes_supertypes() {
                for sub in table.get_super(spec, hierarchy) {
                    push_unique(&mut matches, sub);
                }
            }
            if mode.includes_var_args() {
                for sub in table.get_var_arg(spec) {
                    push_unique(&mut matches, sub);
                }
            }
        }
        _ => {
            let key: SmallVec<[TypeId; 4]> =
                envelope.specs().iter().map(|spec| spec.id()).collect();
            if let Some(subs) = table.get_exact_seq(&key) {
                for sub in subs.iter() {
                    push_unique(&mut matches, sub.clone());
                }
            }
            if mode.includes_var_args()
                && let Some(spec) = envelope.homogeneous_spec()
            {
                for sub in table.get_var_arg(spec) {
                    push_unique(&mut matches, sub);
                }
            }
        }
    }

    matches
}

fn push_unique(matches: &mut Matches, sub: Arc<Subscription>) {
    if !matches.iter().any(|existing| Arc::ptr_eq(existing, &sub)) {
        matches.push(sub);
    }
}
