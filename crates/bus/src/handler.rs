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

//! Handler declaration and normalized handler metadata.
//!
//! A listener type declares its handlers by returning [`HandlerSpec`]s from
//! [`Listener::handler_specs`] — the declaration site standing in for
//! annotation scanning. The [`HandlerRegistry`] normalizes those declarations
//! into immutable [`HandlerDescriptor`]s once per listener type and caches
//! the result.

use std::{
    any::{Any, TypeId},
    fmt::Debug,
    sync::Arc,
};

use ahash::{AHashMap, AHashSet};
use manifold_core::correctness::check_valid_string;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::{
    error::{ErrorSinks, HandlerError, HandlerResult, PublicationError},
    message::{Envelope, MessageType, TypeSpec},
};

/// Type-erased handler invocation closure.
///
/// Invokes the handler on the given listener with the given tuple, reporting
/// failures as values rather than letting them escape.
pub type Invoker = Arc<dyn Fn(&dyn Any, &Envelope) -> HandlerResult + Send + Sync>;

/// A type whose instances can be subscribed to the bus.
pub trait Listener: Any + Send + Sync {
    /// Handler declarations for this type, most-derived first.
    ///
    /// When composing in another type's handlers, append them after the own
    /// declarations; the registry keeps the first occurrence of each handler
    /// name, so the most-derived declaration wins.
    fn handler_specs() -> Vec<HandlerSpec>
    where
        Self: Sized;
}

/// Declares one handler method on a listener type.
///
/// Construction goes through the arity-typed constructors; the recognized
/// options default to `{enabled = true, accepts_subtypes = true,
/// synchronized = false}` and are adjusted with the builder methods.
#[derive(Clone)]
pub struct HandlerSpec {
    name: &'static str,
    params: SmallVec<[TypeSpec; 3]>,
    elem: Option<TypeSpec>,
    accepts_subtypes: bool,
    variadic: bool,
    enabled: bool,
    synchronized: bool,
    invoker: Invoker,
}

impl HandlerSpec {
    /// Creates a spec from raw parts.
    ///
    /// The typed constructors below are the normal entry points; this exists
    /// so malformed declarations remain representable and reportable.
    #[must_use]
    pub fn new(name: &'static str, params: Vec<TypeSpec>, invoker: Invoker) -> Self {
        Self {
            name,
            params: params.into(),
            elem: None,
            accepts_subtypes: true,
            variadic: false,
            enabled: true,
            synchronized: false,
            invoker,
        }
    }

    /// Declares a single-message handler.
    #[must_use]
    pub fn unary<L, M, F>(name: &'static str, handler: F) -> Self
    where
        L: Listener,
        M: MessageType,
        F: Fn(&L, &M) -> HandlerResult + Send + Sync + 'static,
    {
        let invoker: Invoker = Arc::new(move |listener, envelope| {
            let listener = listener_arg::<L>(listener)?;
            let message = message_arg::<M>(envelope, 0)?;
            handler(listener, message)
        });
        Self::new(name, vec![TypeSpec::of::<M>()], invoker)
    }

    /// Declares a two-message handler.
    #[must_use]
    pub fn binary<L, A, B, F>(name: &'static str, handler: F) -> Self
    where
        L: Listener,
        A: MessageType,
        B: MessageType,
        F: Fn(&L, &A, &B) -> HandlerResult + Send + Sync + 'static,
    {
        let invoker: Invoker = Arc::new(move |listener, envelope| {
            let listener = listener_arg::<L>(listener)?;
            let first = message_arg::<A>(envelope, 0)?;
            let second = message_arg::<B>(envelope, 1)?;
            handler(listener, first, second)
        });
        Self::new(name, vec![TypeSpec::of::<A>(), TypeSpec::of::<B>()], invoker)
    }

    /// Declares a three-message handler.
    #[must_use]
    pub fn ternary<L, A, B, C, F>(name: &'static str, handler: F) -> Self
    where
        L: Listener,
        A: MessageType,
        B: MessageType,
        C: MessageType,
        F: Fn(&L, &A, &B, &C) -> HandlerResult + Send + Sync + 'static,
    {
        let invoker: Invoker = Arc::new(move |listener, envelope| {
            let listener = listener_arg::<L>(listener)?;
            let first = message_arg::<A>(envelope, 0)?;
            let second = message_arg::<B>(envelope, 1)?;
            let third = message_arg::<C>(envelope, 2)?;
            handler(listener, first, second, third)
        });
        Self::new(
            name,
            vec![TypeSpec::of::<A>(), TypeSpec::of::<B>(), TypeSpec::of::<C>()],
            invoker,
        )
    }

    /// Declares a variadic handler over element type `M`.
    ///
    /// The handler receives every element of a type-homogeneous publication
    /// as one slice; scalar publications of `M` with matching arity reach it
    /// when the bus runs in the variadic publish mode.
    #[must_use]
    pub fn variadic<L, M, F>(name: &'static str, handler: F) -> Self
    where
        L: Listener,
        M: MessageType,
        F: Fn(&L, &[&M]) -> HandlerResult + Send + Sync + 'static,
    {
        let invoker: Invoker = Arc::new(move |listener, envelope| {
            let listener = listener_arg::<L>(listener)?;
            let len = envelope.len();
            let mut elements: SmallVec<[&M; 3]> = SmallVec::with_capacity(len);
            for index in 0..len {
                elements.push(message_arg::<M>(envelope, index)?);
            }
            handler(listener, &elements)
        });
        let mut spec = Self::new(name, vec![TypeSpec::of::<M>()], invoker);
        spec.variadic = true;
        spec.elem = Some(TypeSpec::of::<M>());
        spec
    }

    /// Restricts matching to the declared parameter type, excluding subtypes.
    #[must_use]
    pub fn exact(mut self) -> Self {
        self.accepts_subtypes = false;
        self
    }

    /// Marks the handler disabled; it is dropped at discovery.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Serializes invocations of this handler per listener instance.
    #[must_use]
    pub fn synchronized(mut self) -> Self {
        self.synchronized = true;
        self
    }

    /// Returns the handler name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns whether the handler is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Debug for HandlerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(HandlerSpec))
            .field("name", &self.name)
            .field("params", &self.params)
            .field("accepts_subtypes", &self.accepts_subtypes)
            .field("variadic", &self.variadic)
            .field("enabled", &self.enabled)
            .field("synchronized", &self.synchronized)
            .finish()
    }
}

fn listener_arg<L: Listener>(listener: &dyn Any) -> Result<&L, HandlerError> {
    listener.downcast_ref::<L>().ok_or_else(|| {
        log::error!(
            "Listener downcast failed: expected {}",
            std::any::type_name::<L>()
        );
        HandlerError::Failed(anyhow::anyhow!(
            "listener type mismatch: expected {}",
            std::any::type_name::<L>()
        ))
    })
}

fn message_arg<'a, M: MessageType>(
    envelope: &'a Envelope,
    index: usize,
) -> Result<&'a M, HandlerError> {
    let item = envelope.get(index).ok_or_else(|| {
        HandlerError::Failed(anyhow::anyhow!(
            "message tuple has arity {}, handler expected a message at position {index}",
            envelope.len()
        ))
    })?;
    item.project(TypeId::of::<M>())
        .and_then(|view| view.downcast_ref::<M>())
        .ok_or_else(|| {
            log::error!(
                "Message downcast failed: expected {} got {}",
                std::any::type_name::<M>(),
                item.spec().name()
            );
            HandlerError::Failed(anyhow::anyhow!(
                "message type mismatch: expected {} got {}",
                std::any::type_name::<M>(),
                item.spec().name()
            ))
        })
}

/// Normalized, immutable metadata for one handler on one listener type.
#[derive(Clone)]
pub struct HandlerDescriptor {
    listener_type: TypeId,
    listener_name: &'static str,
    name: &'static str,
    params: SmallVec<[TypeSpec; 3]>,
    elem: Option<TypeSpec>,
    accepts_subtypes: bool,
    variadic: bool,
    synchronized: bool,
    invoker: Invoker,
}

impl HandlerDescriptor {
    fn from_spec<L: Listener>(spec: HandlerSpec) -> Self {
        Self {
            listener_type: TypeId::of::<L>(),
            listener_name: std::any::type_name::<L>(),
            name: spec.name,
            params: spec.params,
            elem: spec.elem,
            accepts_subtypes: spec.accepts_subtypes,
            variadic: spec.variadic,
            synchronized: spec.synchronized,
            invoker: spec.invoker,
        }
    }

    /// Returns the declaring listener type.
    #[must_use]
    pub fn listener_type(&self) -> TypeId {
        self.listener_type
    }

    /// Returns the declaring listener type name.
    #[must_use]
    pub fn listener_name(&self) -> &'static str {
        self.listener_name
    }

    /// Returns the handler name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the declared parameter types.
    #[must_use]
    pub fn params(&self) -> &[TypeSpec] {
        &self.params
    }

    /// Returns the handler arity.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Returns the variadic element type, if any.
    #[must_use]
    pub fn elem(&self) -> Option<TypeSpec> {
        self.elem
    }

    /// Returns whether strict subtypes of the parameter type also match.
    #[must_use]
    pub fn accepts_subtypes(&self) -> bool {
        self.accepts_subtypes
    }

    /// Returns whether this is a variadic handler.
    #[must_use]
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Returns whether invocations are serialized per listener instance.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Returns the single-arity bucket key: the sequence id of the element
    /// type for variadic handlers, otherwise the sole parameter type id.
    #[must_use]
    pub(crate) fn single_key(&self) -> TypeId {
        match self.elem {
            Some(elem) => elem.seq_id(),
            None => self.params[0].id(),
        }
    }

    /// Returns the multi-arity bucket key: the full parameter sequence in
    /// document order.
    #[must_use]
    pub(crate) fn key_sequence(&self) -> SmallVec<[TypeId; 4]> {
        self.params.iter().map(TypeSpec::id).collect()
    }

    /// Invokes the handler on `listener` with the given tuple.
    pub fn invoke(&self, listener: &dyn Any, envelope: &Envelope) -> HandlerResult {
        (self.invoker)(listener, envelope)
    }
}

impl Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(HandlerDescriptor))
            .field("listener", &self.listener_name)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("accepts_subtypes", &self.accepts_subtypes)
            .field("variadic", &self.variadic)
            .field("synchronized", &self.synchronized)
            .finish()
    }
}

/// Normalizes and caches handler metadata per listener type.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    cache: RwLock<AHashMap<TypeId, Arc<[HandlerDescriptor]>>>,
}

impl HandlerRegistry {
    /// Creates a new empty [`HandlerRegistry`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the normalized descriptors for listener type `L`.
    ///
    /// The first call scans the declarations; configuration errors are
    /// reported through `sinks` and the offending declarations dropped. The
    /// result — possibly empty — is cached so the type is never scanned
    /// twice.
    pub fn describe<L: Listener>(&self, sinks: &ErrorSinks) -> Arc<[HandlerDescriptor]> {
        let key = TypeId::of::<L>();
        if let Some(found) = self.cache.read().get(&key) {
            return found.clone();
        }

        let descriptors = Self::normalize::<L>(L::handler_specs(), sinks);
        let mut cache = self.cache.write();
        cache.entry(key).or_insert(descriptors).clone()
    }

    /// Returns the number of scanned listener types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Returns whether any listener type has been scanned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    fn normalize<L: Listener>(
        specs: Vec<HandlerSpec>,
        sinks: &ErrorSinks,
    ) -> Arc<[HandlerDescriptor]> {
        let listener_name = std::any::type_name::<L>();
        let mut seen: AHashSet<&'static str> = AHashSet::new();
        let mut descriptors = Vec::with_capacity(specs.len());

        for spec in specs {
            if !seen.insert(spec.name) {
                // Most-derived declaration wins; later same-name specs are overrides.
                log::debug!(
                    "Skipping overridden handler {listener_name}::{}",
                    spec.name
                );
                continue;
            }
            if !spec.enabled {
                log::debug!("Skipping disabled handler {listener_name}::{}", spec.name);
                continue;
            }
            if let Err(e) = check_valid_string(spec.name, "handler name") {
                sinks.report(PublicationError::new(format!(
                    "invalid handler configuration on {listener_name}: {e}"
                )));
                continue;
            }
            if spec.params.is_empty() {
                sinks.report(PublicationError::new(format!(
                    "invalid handler configuration: {listener_name}::{} declares no message \
                     parameters",
                    spec.name
                )));
                continue;
            }
            descriptors.push(HandlerDescriptor::from_spec::<L>(spec));
        }

        descriptors.into()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::stubs::{
        Counter, Numeric, NumericListener, RecordingSink, VariadicListener, ZeroArityListener,
    };

    fn sinks_with_recording() -> (ErrorSinks, Arc<RecordingSink>) {
        let sinks = ErrorSinks::new();
        let recording = Arc::new(RecordingSink::default());
        sinks.add(recording.clone());
        (sinks, recording)
    }

    #[rstest]
    fn test_describe_caches_per_listener_type() {
        let registry = HandlerRegistry::new();
        let (sinks, _) = sinks_with_recording();

        let first = registry.describe::<NumericListener>(&sinks);
        let second = registry.describe::<NumericListener>(&sinks);

        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[rstest]
    fn test_descriptor_metadata() {
        let registry = HandlerRegistry::new();
        let (sinks, _) = sinks_with_recording();

        let descriptors = registry.describe::<NumericListener>(&sinks);
        assert_eq!(descriptors.len(), 1);

        let descriptor = &descriptors[0];
        assert_eq!(descriptor.name(), "on_numeric");
        assert_eq!(descriptor.arity(), 1);
        assert!(descriptor.accepts_subtypes());
        assert!(!descriptor.is_variadic());
        assert!(!descriptor.is_synchronized());
        assert_eq!(descriptor.single_key(), TypeId::of::<Numeric>());
    }

    #[rstest]
    fn test_variadic_descriptor_keys_by_sequence_id() {
        let registry = HandlerRegistry::new();
        let (sinks, _) = sinks_with_recording();

        let descriptors = registry.describe::<VariadicListener>(&sinks);
        assert_eq!(descriptors.len(), 1);

        let descriptor = &descriptors[0];
        assert!(descriptor.is_variadic());
        assert_eq!(descriptor.elem(), Some(TypeSpec::of::<Numeric>()));
        assert_eq!(descriptor.single_key(), TypeId::of::<[Numeric]>());
    }

    #[rstest]
    fn test_zero_arity_reported_and_dropped() {
        let registry = HandlerRegistry::new();
        let (sinks, recording) = sinks_with_recording();

        let descriptors = registry.describe::<ZeroArityListener>(&sinks);
        assert!(descriptors.is_empty());
        assert_eq!(recording.error_count(), 1);
        assert!(recording.messages()[0].contains("no message parameters"));

        // Cached: a second describe reports nothing new
        registry.describe::<ZeroArityListener>(&sinks);
        assert_eq!(recording.error_count(), 1);
    }

    #[rstest]
    fn test_disabled_and_overridden_specs_dropped() {
        struct Derived;
        impl Listener for Derived {
            fn handler_specs() -> Vec<HandlerSpec> {
                vec![
                    HandlerSpec::unary::<Self, Numeric, _>("on_numeric", |_, _| Ok(())),
                    // Inherited declaration with the same name loses
                    HandlerSpec::unary::<Self, Counter, _>("on_numeric", |_, _| Ok(())),
                    HandlerSpec::unary::<Self, Numeric, _>("on_disabled", |_, _| Ok(())).disabled(),
                ]
            }
        }

        let registry = HandlerRegistry::new();
        let (sinks, recording) = sinks_with_recording();

        let descriptors = registry.describe::<Derived>(&sinks);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].params()[0], TypeSpec::of::<Numeric>());
        assert_eq!(recording.error_count(), 0);
    }

    #[rstest]
    fn test_unary_invoker_delivers_message() {
        let registry = HandlerRegistry::new();
        let (sinks, _) = sinks_with_recording();

        let descriptors = registry.describe::<NumericListener>(&sinks);
        let listener = NumericListener::default();
        let envelope = Envelope::single(Numeric { value: 42 });

        descriptors[0].invoke(&listener, &envelope).unwrap();
        assert_eq!(listener.received(), vec![42]);
    }

    #[rstest]
    fn test_unary_invoker_projects_subtype() {
        let registry = HandlerRegistry::new();
        let (sinks, _) = sinks_with_recording();

        let descriptors = registry.describe::<NumericListener>(&sinks);
        let listener = NumericListener::default();
        let envelope = Envelope::single(Counter::new(7));

        descriptors[0].invoke(&listener, &envelope).unwrap();
        assert_eq!(listener.received(), vec![7]);
    }

    #[rstest]
    fn test_invoker_rejects_unrelated_message() {
        let registry = HandlerRegistry::new();
        let (sinks, _) = sinks_with_recording();

        let descriptors = registry.describe::<VariadicListener>(&sinks);
        let listener = VariadicListener::default();
        let envelope = Envelope::single(crate::stubs::Note::new("x"));

        let result = descriptors[0].invoke(&listener, &envelope);
        assert!(matches!(result, Err(HandlerError::Failed(_))));
    }
}
