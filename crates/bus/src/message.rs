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

//! Message type metadata and the dispatch envelope.
//!
//! Rust has no runtime class hierarchy, so publishable types declare their
//! metadata explicitly: [`MessageType`] provides a display name and the set of
//! direct supertypes, and [`TypeSpec`] is the runtime identity derived from
//! those declarations. Supertype declarations carry a projection built on
//! `AsRef`, so a handler subscribed to a supertype receives a genuine `&S`
//! view of the published value rather than a failed downcast.

use std::{
    any::{Any, TypeId},
    fmt::Debug,
    sync::Arc,
};

use smallvec::SmallVec;

/// Runtime identity for a publishable message type.
///
/// Equality and hashing use the underlying [`TypeId`] only; the name and the
/// supertype accessor ride along for diagnostics and hierarchy walks.
#[derive(Clone, Copy)]
pub struct TypeSpec {
    id: TypeId,
    seq_id: TypeId,
    name: &'static str,
    supertypes: fn() -> Vec<SuperSpec>,
}

impl TypeSpec {
    /// Returns the spec for message type `M`.
    #[must_use]
    pub fn of<M: MessageType>() -> Self {
        Self {
            id: TypeId::of::<M>(),
            seq_id: TypeId::of::<[M]>(),
            name: M::type_name(),
            supertypes: M::supertypes,
        }
    }

    /// Returns the type identity.
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the identity of the sequence form `[M]`, used as the bucket
    /// key for variadic subscriptions over element type `M`.
    #[must_use]
    pub const fn seq_id(&self) -> TypeId {
        self.seq_id
    }

    /// Returns the display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the declared direct supertypes.
    #[must_use]
    pub fn supertypes(&self) -> Vec<SuperSpec> {
        (self.supertypes)()
    }
}

impl PartialEq for TypeSpec {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeSpec {}

impl std::hash::Hash for TypeSpec {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for TypeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(TypeSpec))
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

impl std::fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A declared direct supertype together with the projection that views a
/// value of the declaring type as that supertype.
#[derive(Clone, Copy)]
pub struct SuperSpec {
    spec: TypeSpec,
    project: fn(&dyn Any, TypeId) -> Option<&dyn Any>,
}

impl SuperSpec {
    /// Declares `S` as a direct supertype of `C`.
    ///
    /// The `AsRef<S>` bound is the upcast: composition stands in for
    /// inheritance, with the subtype embedding its supertype view.
    #[must_use]
    pub fn of<C, S>() -> Self
    where
        C: MessageType + AsRef<S>,
        S: MessageType,
    {
        Self {
            spec: TypeSpec::of::<S>(),
            project: |value, target| {
                let concrete = value.downcast_ref::<C>()?;
                let parent: &S = concrete.as_ref();
                parent.project(target)
            },
        }
    }

    /// Returns the supertype's spec.
    #[must_use]
    pub const fn spec(&self) -> TypeSpec {
        self.spec
    }

    pub(crate) fn project<'a>(&self, value: &'a dyn Any, target: TypeId) -> Option<&'a dyn Any> {
        (self.project)(value, target)
    }
}

impl Debug for SuperSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(SuperSpec))
            .field("spec", &self.spec)
            .finish()
    }
}

/// Declared metadata for a publishable message type.
///
/// The defaults give a leaf type: the Rust type name and no supertypes.
/// Types opt into super-type matching by declaring their direct supertypes
/// with [`SuperSpec::of`].
pub trait MessageType: Any + Send + Sync + Debug {
    /// Display name used in diagnostics.
    #[must_use]
    fn type_name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }

    /// Direct supertypes, nearest declarations first.
    #[must_use]
    fn supertypes() -> Vec<SuperSpec>
    where
        Self: Sized,
    {
        Vec::new()
    }
}

/// Object-safe view of a published message.
///
/// Blanket-implemented for every [`MessageType`]; messages travel through the
/// bus as `Arc<dyn Message>`.
pub trait Message: Any + Send + Sync + Debug {
    /// Runtime type metadata for this message.
    fn spec(&self) -> TypeSpec;

    /// Upcast for handler-side downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Views this message as the given declared (transitive) supertype, or as
    /// itself when `target` is its own type. Returns `None` for any type
    /// outside the declared hierarchy.
    fn project(&self, target: TypeId) -> Option<&dyn Any>;
}

impl<M: MessageType> Message for M {
    fn spec(&self) -> TypeSpec {
        TypeSpec::of::<M>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn project(&self, target: TypeId) -> Option<&dyn Any> {
        if target == TypeId::of::<M>() {
            return Some(self);
        }
        M::supertypes()
            .iter()
            .find_map(|sup| sup.project(self, target))
    }
}

/// Wrapper republished when a message tuple matches no live subscription.
#[derive(Debug)]
pub struct DeadMessage {
    /// The original published tuple.
    pub messages: Vec<Arc<dyn Message>>,
}

impl DeadMessage {
    /// Creates a new [`DeadMessage`] carrying the original tuple.
    #[must_use]
    pub fn new(messages: Vec<Arc<dyn Message>>) -> Self {
        Self { messages }
    }
}

impl MessageType for DeadMessage {
    fn type_name() -> &'static str {
        stringify!(DeadMessage)
    }
}

/// A published message tuple in transit.
///
/// Carries the arity in the discriminant with up to three inline slots plus
/// an array variant; cloning is by reference count only.
#[derive(Clone, Debug)]
pub enum Envelope {
    /// Arity-1 publication.
    Single(Arc<dyn Message>),
    /// Arity-2 publication.
    Pair(Arc<dyn Message>, Arc<dyn Message>),
    /// Arity-3 publication.
    Triple(Arc<dyn Message>, Arc<dyn Message>, Arc<dyn Message>),
    /// Arity-N publication.
    Array(Arc<[Arc<dyn Message>]>),
}

impl Envelope {
    /// Wraps a single message.
    #[must_use]
    pub fn single<M: MessageType>(message: M) -> Self {
        Self::Single(Arc::new(message))
    }

    /// Wraps a two-message tuple.
    #[must_use]
    pub fn pair<A: MessageType, B: MessageType>(first: A, second: B) -> Self {
        Self::Pair(Arc::new(first), Arc::new(second))
    }

    /// Wraps a three-message tuple.
    #[must_use]
    pub fn triple<A: MessageType, B: MessageType, C: MessageType>(
        first: A,
        second: B,
        third: C,
    ) -> Self {
        Self::Triple(Arc::new(first), Arc::new(second), Arc::new(third))
    }

    /// Wraps an already-erased message array.
    #[must_use]
    pub fn array(messages: Vec<Arc<dyn Message>>) -> Self {
        Self::Array(messages.into())
    }

    /// Returns the tuple arity.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Pair(_, _) => 2,
            Self::Triple(_, _, _) => 3,
            Self::Array(items) => items.len(),
        }
    }

    /// Returns whether the tuple is empty (only possible for the array form).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the message at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<dyn Message>> {
        match (self, index) {
            (Self::Single(a), 0) | (Self::Pair(a, _), 0) | (Self::Triple(a, _, _), 0) => Some(a),
            (Self::Pair(_, b), 1) | (Self::Triple(_, b, _), 1) => Some(b),
            (Self::Triple(_, _, c), 2) => Some(c),
            (Self::Array(items), i) => items.get(i),
            _ => None,
        }
    }

    /// Returns a borrowed view of all messages in order.
    #[must_use]
    pub fn items(&self) -> SmallVec<[&Arc<dyn Message>; 3]> {
        let mut items = SmallVec::new();
        match self {
            Self::Single(a) => items.push(a),
            Self::Pair(a, b) => items.extend([a, b]),
            Self::Triple(a, b, c) => items.extend([a, b, c]),
            Self::Array(messages) => items.extend(messages.iter()),
        }
        items
    }

    /// Returns the type specs of all messages in order.
    #[must_use]
    pub fn specs(&self) -> SmallVec<[TypeSpec; 3]> {
        self.items().iter().map(|m| m.spec()).collect()
    }

    /// Returns the shared spec when every message in the tuple has the same
    /// concrete type, which is the precondition for variadic matching.
    #[must_use]
    pub fn homogeneous_spec(&self) -> Option<TypeSpec> {
        let items = self.items();
        let (first, rest) = items.split_first()?;
        let spec = first.spec();
        rest.iter().all(|m| m.spec() == spec).then_some(spec)
    }

    /// Copies the tuple out as an owned vector (for error reports and
    /// dead-message wrapping).
    #[must_use]
    pub fn to_vec(&self) -> Vec<Arc<dyn Message>> {
        self.items().into_iter().cloned().collect()
    }
}
