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

//! Message, listener, and sink stubs for testing.

use std::{
    any::TypeId,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    error::{ErrorSink, HandlerError, PublicationError},
    handler::{HandlerSpec, Listener},
    message::{DeadMessage, MessageType, SuperSpec},
};

/// A plain numeric message; the root of the stub hierarchy.
#[derive(Clone, Debug)]
pub struct Numeric {
    pub value: i64,
}

impl MessageType for Numeric {}

/// A message declaring [`Numeric`] as its supertype.
#[derive(Clone, Debug)]
pub struct Counter {
    numeric: Numeric,
}

impl Counter {
    pub fn new(value: i64) -> Self {
        Self {
            numeric: Numeric { value },
        }
    }

    pub fn value(&self) -> i64 {
        self.numeric.value
    }
}

impl AsRef<Numeric> for Counter {
    fn as_ref(&self) -> &Numeric {
        &self.numeric
    }
}

impl MessageType for Counter {
    fn supertypes() -> Vec<SuperSpec> {
        vec![SuperSpec::of::<Self, Numeric>()]
    }
}

/// A message two levels below [`Numeric`], for transitive supertype walks.
#[derive(Clone, Debug)]
pub struct StepCounter {
    counter: Counter,
}

impl StepCounter {
    pub fn new(value: i64) -> Self {
        Self {
            counter: Counter::new(value),
        }
    }
}

impl AsRef<Counter> for StepCounter {
    fn as_ref(&self) -> &Counter {
        &self.counter
    }
}

impl MessageType for StepCounter {
    fn supertypes() -> Vec<SuperSpec> {
        vec![SuperSpec::of::<Self, Counter>()]
    }
}

/// A text message unrelated to the numeric hierarchy.
#[derive(Clone, Debug)]
pub struct Note {
    pub text: String,
}

impl Note {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self { text: text.into() }
    }
}

impl MessageType for Note {}

/// Records every publication error it receives.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(String, Vec<i64>)>>,
}

impl RecordingSink {
    pub fn error_count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    /// Numeric values carried in the published tuples, flattened in order.
    pub fn published_values(&self) -> Vec<i64> {
        self.records
            .lock()
            .iter()
            .flat_map(|(_, values)| values.clone())
            .collect()
    }
}

impl ErrorSink for RecordingSink {
    fn on_publication_error(&self, error: &PublicationError) {
        let values = error
            .published()
            .iter()
            .filter_map(|message| {
                message
                    .project(TypeId::of::<Numeric>())
                    .and_then(|view| view.downcast_ref::<Numeric>())
                    .map(|numeric| numeric.value)
            })
            .collect();
        self.records.lock().push((error.to_string(), values));
    }
}

/// Records every [`Numeric`] it receives, including projected subtypes.
#[derive(Default)]
pub struct NumericListener {
    received: Mutex<Vec<i64>>,
}

impl NumericListener {
    pub fn received(&self) -> Vec<i64> {
        self.received.lock().clone()
    }
}

impl Listener for NumericListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![HandlerSpec::unary::<Self, Numeric, _>(
            "on_numeric",
            |listener, message| {
                listener.received.lock().push(message.value);
                Ok(())
            },
        )]
    }
}

/// Records every [`Counter`] it receives.
#[derive(Default)]
pub struct CounterListener {
    received: Mutex<Vec<i64>>,
}

impl CounterListener {
    pub fn received(&self) -> Vec<i64> {
        self.received.lock().clone()
    }
}

impl Listener for CounterListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![HandlerSpec::unary::<Self, Counter, _>(
            "on_counter",
            |listener, message| {
                listener.received.lock().push(message.value());
                Ok(())
            },
        )]
    }
}

/// Handles [`Numeric`] with subtype matching opted out.
#[derive(Default)]
pub struct ExactOnlyListener {
    received: Mutex<Vec<i64>>,
}

impl ExactOnlyListener {
    pub fn received(&self) -> Vec<i64> {
        self.received.lock().clone()
    }
}

impl Listener for ExactOnlyListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![
            HandlerSpec::unary::<Self, Numeric, _>("on_numeric", |listener, message| {
                listener.received.lock().push(message.value);
                Ok(())
            })
            .exact(),
        ]
    }
}

/// Records ([`Numeric`], [`Note`]) pairs.
#[derive(Default)]
pub struct PairListener {
    received: Mutex<Vec<(i64, String)>>,
}

impl PairListener {
    pub fn received(&self) -> Vec<(i64, String)> {
        self.received.lock().clone()
    }
}

impl Listener for PairListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![HandlerSpec::binary::<Self, Numeric, Note, _>(
            "on_pair",
            |listener, numeric, note| {
                listener
                    .received
                    .lock()
                    .push((numeric.value, note.text.clone()));
                Ok(())
            },
        )]
    }
}

/// Records the sum of each [`Numeric`] triple.
#[derive(Default)]
pub struct TripleListener {
    sums: Mutex<Vec<i64>>,
}

impl TripleListener {
    pub fn sums(&self) -> Vec<i64> {
        self.sums.lock().clone()
    }
}

impl Listener for TripleListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![HandlerSpec::ternary::<Self, Numeric, Numeric, Numeric, _>(
            "on_triple",
            |listener, a, b, c| {
                listener.sums.lock().push(a.value + b.value + c.value);
                Ok(())
            },
        )]
    }
}

/// Records each variadic [`Numeric`] batch.
#[derive(Default)]
pub struct VariadicListener {
    batches: Mutex<Vec<Vec<i64>>>,
}

impl VariadicListener {
    pub fn batches(&self) -> Vec<Vec<i64>> {
        self.batches.lock().clone()
    }
}

impl Listener for VariadicListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![HandlerSpec::variadic::<Self, Numeric, _>(
            "on_many",
            |listener, elements| {
                listener
                    .batches
                    .lock()
                    .push(elements.iter().map(|n| n.value).collect());
                Ok(())
            },
        )]
    }
}

/// Records the tuple length of each [`DeadMessage`] it receives.
#[derive(Default)]
pub struct DeadMessageListener {
    tuples: Mutex<Vec<usize>>,
}

impl DeadMessageListener {
    pub fn dead_tuples(&self) -> Vec<usize> {
        self.tuples.lock().clone()
    }
}

impl Listener for DeadMessageListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![HandlerSpec::unary::<Self, DeadMessage, _>(
            "on_dead",
            |listener, dead| {
                listener.tuples.lock().push(dead.messages.len());
                Ok(())
            },
        )]
    }
}

/// Fails on every invocation.
#[derive(Default)]
pub struct FailingListener {
    calls: AtomicUsize,
}

impl FailingListener {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Listener for FailingListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![HandlerSpec::unary::<Self, Numeric, _>(
            "on_numeric",
            |listener, message| {
                listener.calls.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::Failed(anyhow::anyhow!(
                    "cannot handle {}",
                    message.value
                )))
            },
        )]
    }
}

/// Panics on every invocation.
#[derive(Default)]
pub struct PanickingListener;

impl Listener for PanickingListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![HandlerSpec::unary::<Self, Numeric, _>(
            "on_numeric",
            |_, message| panic!("cannot handle {}", message.value),
        )]
    }
}

/// Cancels dispatch on every invocation.
#[derive(Default)]
pub struct CancellingListener {
    calls: AtomicUsize,
}

impl CancellingListener {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Listener for CancellingListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![HandlerSpec::unary::<Self, Numeric, _>(
            "on_numeric",
            |listener, _| {
                listener.calls.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::CancelDispatch)
            },
        )]
    }
}

/// Tallies deliveries; safe under concurrent publication.
#[derive(Default)]
pub struct CountingListener {
    count: AtomicUsize,
}

impl CountingListener {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Listener for CountingListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![HandlerSpec::unary::<Self, Numeric, _>(
            "on_numeric",
            |listener, _| {
                listener.count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )]
    }
}

/// Observes how many invocations overlap on this instance.
#[derive(Default)]
pub struct SynchronizedListener {
    active: AtomicUsize,
    max_seen: AtomicUsize,
    entries: AtomicUsize,
}

impl SynchronizedListener {
    pub fn entries(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }
}

impl Listener for SynchronizedListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![
            HandlerSpec::unary::<Self, Numeric, _>("on_numeric", |listener, _| {
                let concurrent = listener.active.fetch_add(1, Ordering::SeqCst) + 1;
                listener.max_seen.fetch_max(concurrent, Ordering::SeqCst);
                std::thread::sleep(Duration::from_micros(100));
                listener.active.fetch_sub(1, Ordering::SeqCst);
                listener.entries.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .synchronized(),
        ]
    }
}

/// Declares no handlers at all.
pub struct NoHandlersListener;

impl Listener for NoHandlersListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        Vec::new()
    }
}

/// Declares a malformed zero-arity handler.
#[derive(Default)]
pub struct ZeroArityListener;

impl Listener for ZeroArityListener {
    fn handler_specs() -> Vec<HandlerSpec> {
        vec![HandlerSpec::new(
            "on_nothing",
            Vec::new(),
            std::sync::Arc::new(|_, _| Ok(())),
        )]
    }
}

impl std::fmt::Debug for RecordingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(RecordingSink))
            .field("errors", &self.error_count())
            .finish()
    }
}
