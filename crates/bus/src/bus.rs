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

//! The message bus façade.

use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use manifold_core::{UUID4, correctness::check_predicate_true};
use parking_lot::Mutex;

use crate::{
    config::BusConfig,
    dispatch::DispatcherPool,
    error::{ErrorSink, ErrorSinks, PublicationError},
    handler::{HandlerRegistry, Listener},
    hierarchy::TypeHierarchyCache,
    listeners::ListenerRef,
    matching,
    message::{DeadMessage, Envelope, Message, MessageType},
    queue::DispatchQueue,
    subscription::Subscription,
    table::SubscriptionTable,
};

/// An in-process publish/subscribe message bus.
///
/// The handle is cheap to clone and share; all clones publish into the same
/// subscription table and dispatch queue. Synchronous publication returns
/// after every matching handler completed or errored; asynchronous
/// publication enqueues the tuple and returns, blocking only while the queue
/// is saturated.
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Creates a new [`MessageBus`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: BusConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let queue = Arc::new(DispatchQueue::with_capacity(config.queue_capacity));
        Ok(Self {
            inner: Arc::new(BusInner {
                instance_id: UUID4::new(),
                config,
                registry: HandlerRegistry::new(),
                hierarchy: TypeHierarchyCache::new(),
                table: SubscriptionTable::new(),
                sinks: ErrorSinks::new(),
                queue,
                pool: Mutex::new(None),
                running: AtomicBool::new(false),
            }),
        })
    }

    /// Returns the bus instance identifier.
    #[must_use]
    pub fn instance_id(&self) -> UUID4 {
        self.inner.instance_id
    }

    /// Returns the bus configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Subscribes every handler declared by `L` for the given instance.
    ///
    /// Idempotent per instance: repeated subscribes add nothing.
    pub fn subscribe<L: Listener>(&self, listener: &Arc<L>) {
        let erased: ListenerRef = listener.clone();
        self.inner
            .table
            .subscribe::<L>(&erased, &self.inner.registry, &self.inner.sinks);
    }

    /// Unsubscribes the given instance from every handler declared by `L`.
    ///
    /// Unknown listeners are tolerated.
    pub fn unsubscribe<L: Listener>(&self, listener: &Arc<L>) {
        let erased: ListenerRef = listener.clone();
        self.inner.table.unsubscribe::<L>(&erased);
    }

    /// Publishes one message synchronously.
    pub fn publish<M: MessageType>(&self, message: M) {
        self.inner.publish_envelope(&Envelope::single(message));
    }

    /// Publishes a two-message tuple synchronously.
    pub fn publish2<A: MessageType, B: MessageType>(&self, first: A, second: B) {
        self.inner.publish_envelope(&Envelope::pair(first, second));
    }

    /// Publishes a three-message tuple synchronously.
    pub fn publish3<A: MessageType, B: MessageType, C: MessageType>(
        &self,
        first: A,
        second: B,
        third: C,
    ) {
        self.inner
            .publish_envelope(&Envelope::triple(first, second, third));
    }

    /// Publishes a homogeneous message array synchronously.
    ///
    /// # Errors
    ///
    /// Returns an error if `messages` is empty.
    pub fn publish_array<M: MessageType>(&self, messages: Vec<M>) -> anyhow::Result<()> {
        let envelope = array_envelope(messages)?;
        self.inner.publish_envelope(&envelope);
        Ok(())
    }

    /// Enqueues one message for asynchronous publication.
    ///
    /// Blocks while the queue is saturated; enqueue failures after shutdown
    /// are routed to the error sinks.
    pub fn publish_async<M: MessageType>(&self, message: M) {
        self.inner.enqueue(Envelope::single(message));
    }

    /// Enqueues a two-message tuple for asynchronous publication.
    pub fn publish_async2<A: MessageType, B: MessageType>(&self, first: A, second: B) {
        self.inner.enqueue(Envelope::pair(first, second));
    }

    /// Enqueues a three-message tuple for asynchronous publication.
    pub fn publish_async3<A: MessageType, B: MessageType, C: MessageType>(
        &self,
        first: A,
        second: B,
        third: C,
    ) {
        self.inner.enqueue(Envelope::triple(first, second, third));
    }

    /// Enqueues a homogeneous message array for asynchronous publication.
    ///
    /// # Errors
    ///
    /// Returns an error if `messages` is empty; all other enqueue failures
    /// are routed to the error sinks.
    pub fn publish_async_array<M: MessageType>(&self, messages: Vec<M>) -> anyhow::Result<()> {
        let envelope = array_envelope(messages)?;
        self.inner.enqueue(envelope);
        Ok(())
    }

    /// Returns whether undispatched envelopes are pending. Advisory only.
    #[must_use]
    pub fn has_pending_messages(&self) -> bool {
        self.inner.queue.has_pending_messages()
    }

    /// Registers an error sink.
    pub fn add_error_handler(&self, sink: Arc<dyn ErrorSink>) {
        self.inner.sinks.add(sink);
    }

    /// Starts the dispatcher pool. Idempotent.
    ///
    /// Installs the default stderr error sink when none is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a dispatcher thread cannot be spawned.
    pub fn start(&self) -> anyhow::Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.sinks.install_default_if_empty();

        let weak = Arc::downgrade(&self.inner);
        let publish = move |envelope: &Envelope| match weak.upgrade() {
            Some(inner) => {
                inner.publish_envelope(envelope);
                true
            }
            None => false,
        };
        let worker_count = self.inner.config.effective_worker_threads();
        let pool = match DispatcherPool::spawn(self.inner.queue.clone(), worker_count, publish) {
            Ok(pool) => pool,
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        *self.inner.pool.lock() = Some(pool);

        log::debug!(
            "MessageBus {} started with {worker_count} dispatchers",
            self.inner.instance_id
        );
        Ok(())
    }

    /// Returns whether the dispatcher pool is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Shuts the dispatcher pool down and joins the workers. Idempotent.
    ///
    /// Envelopes still queued are discarded; synchronous publication remains
    /// valid afterwards.
    pub fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.queue.close();
        let pool = self.inner.pool.lock().take();
        if let Some(pool) = pool {
            pool.join();
        }
        log::debug!("MessageBus {} stopped", self.inner.instance_id);
    }
}

impl Clone for MessageBus {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Default for MessageBus {
    /// Creates a bus with the default configuration.
    fn default() -> Self {
        Self::new(BusConfig::default()).expect(manifold_core::correctness::FAILED)
    }
}

impl Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(MessageBus))
            .field("instance_id", &self.inner.instance_id)
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish()
    }
}

fn array_envelope<M: MessageType>(messages: Vec<M>) -> anyhow::Result<Envelope> {
    check_predicate_true(
        !messages.is_empty(),
        "published message array must not be empty",
    )?;
    let erased: Vec<Arc<dyn Message>> = messages
        .into_iter()
        .map(|message| Arc::new(message) as Arc<dyn Message>)
        .collect();
    Ok(Envelope::array(erased))
}

pub(crate) struct BusInner {
    instance_id: UUID4,
    config: BusConfig,
    registry: HandlerRegistry,
    hierarchy: TypeHierarchyCache,
    table: SubscriptionTable,
    sinks: ErrorSinks,
    queue: Arc<DispatchQueue>,
    pool: Mutex<Option<DispatcherPool>>,
    running: AtomicBool,
}

impl BusInner {
    /// Delivers `envelope` to every matching subscription, then republishes
    /// as a [`DeadMessage`] when nothing was delivered to a live listener.
    pub(crate) fn publish_envelope(&self, envelope: &Envelope) {
        let matches = matching::resolve(
            &self.table,
            &self.hierarchy,
            self.config.publish_mode,
            envelope,
        );

        let mut delivered = false;
        for sub in &matches {
            delivered |= sub.invoke(&self.sinks, envelope);
        }

        if !delivered && !is_dead_message(envelope) {
            let dead = Envelope::single(DeadMessage::new(envelope.to_vec()));
            let dead_matches = matching::resolve(
                &self.table,
                &self.hierarchy,
                self.config.publish_mode,
                &dead,
            );
            for sub in &dead_matches {
                sub.invoke(&self.sinks, &dead);
            }
        }
    }

    fn enqueue(&self, envelope: Envelope) {
        if let Err(e) = self.queue.transfer(envelope.clone()) {
            self.sinks.report(
                PublicationError::new(format!("async publish failed: {e}"))
                    .with_cause(e.into())
                    .with_published(envelope.to_vec()),
            );
        }
    }
}

impl Drop for BusInner {
    fn drop(&mut self) {
        // Wakes any worker still blocked on the queue once the last handle
        // is gone without an explicit shutdown.
        self.queue.close();
    }
}

fn is_dead_message(envelope: &Envelope) -> bool {
    matches!(envelope, Envelope::Single(message) if message.as_any().is::<DeadMessage>())
}

impl Debug for BusInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(BusInner))
            .field("instance_id", &self.instance_id)
            .field("config", &self.config)
            .finish()
    }
}

impl MessageBus {
    /// Returns the subscriptions created for listener type `L`, if that type
    /// has ever been subscribed. Diagnostics surface; never consulted by
    /// publish.
    #[must_use]
    pub fn subscriptions_of<L: Listener>(&self) -> Option<Arc<[Arc<Subscription>]>> {
        self.inner
            .table
            .subscriptions_of(std::any::TypeId::of::<L>())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use rstest::rstest;

    use super::*;
    use crate::{
        config::PublishMode,
        stubs::{
            Counter, CountingListener, DeadMessageListener, FailingListener, NoHandlersListener,
            Note, Numeric, NumericListener, PairListener, RecordingSink, SynchronizedListener,
            TripleListener, VariadicListener,
        },
    };

    fn bus(mode: PublishMode) -> MessageBus {
        MessageBus::new(BusConfig::new().with_publish_mode(mode)).unwrap()
    }

    fn wait_until<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[rstest]
    fn test_exact_delivery() {
        let bus = bus(PublishMode::Exact);
        let listener = Arc::new(NumericListener::default());
        bus.subscribe(&listener);

        bus.publish(Numeric { value: 42 });
        assert_eq!(listener.received(), vec![42]);
    }

    #[rstest]
    fn test_supertype_delivery() {
        let bus = bus(PublishMode::ExactWithSupertypes);
        let listener = Arc::new(NumericListener::default());
        bus.subscribe(&listener);

        // Counter declares Numeric as its supertype
        bus.publish(Counter::new(42));
        assert_eq!(listener.received(), vec![42]);
    }

    #[rstest]
    fn test_variadic_delivery() {
        let bus = bus(PublishMode::ExactWithSupertypesAndVarArgs);
        let listener = Arc::new(VariadicListener::default());
        bus.subscribe(&listener);

        bus.publish3(
            Numeric { value: 1 },
            Numeric { value: 2 },
            Numeric { value: 3 },
        );
        assert_eq!(listener.batches(), vec![vec![1, 2, 3]]);
    }

    #[rstest]
    fn test_variadic_requires_mode() {
        let bus = bus(PublishMode::ExactWithSupertypes);
        let listener = Arc::new(VariadicListener::default());
        bus.subscribe(&listener);

        bus.publish3(
            Numeric { value: 1 },
            Numeric { value: 2 },
            Numeric { value: 3 },
        );
        assert!(listener.batches().is_empty());
    }

    #[rstest]
    fn test_multi_arity_delivery() {
        let bus = bus(PublishMode::Exact);
        let pair = Arc::new(PairListener::default());
        let triple = Arc::new(TripleListener::default());
        bus.subscribe(&pair);
        bus.subscribe(&triple);

        bus.publish2(Numeric { value: 5 }, Note::new("five"));
        assert_eq!(pair.received(), vec![(5, "five".to_string())]);

        bus.publish3(
            Numeric { value: 1 },
            Numeric { value: 2 },
            Numeric { value: 4 },
        );
        assert_eq!(triple.sums(), vec![7]);
    }

    #[rstest]
    fn test_dead_message_published_once() {
        let bus = bus(PublishMode::ExactWithSupertypesAndVarArgs);
        let listener = Arc::new(DeadMessageListener::default());
        bus.subscribe(&listener);

        bus.publish(Note::new("x"));

        let dead = listener.dead_tuples();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0], 1);
    }

    #[rstest]
    fn test_no_dead_message_cascade_without_dead_handler() {
        let bus = bus(PublishMode::ExactWithSupertypesAndVarArgs);
        // No subscriptions at all: the publication completes silently
        bus.publish(Note::new("x"));
    }

    #[rstest]
    fn test_dead_message_when_all_listeners_dropped() {
        let bus = bus(PublishMode::ExactWithSupertypesAndVarArgs);
        let dead_listener = Arc::new(DeadMessageListener::default());
        bus.subscribe(&dead_listener);

        let dropped = Arc::new(NumericListener::default());
        bus.subscribe(&dropped);
        drop(dropped);

        bus.publish(Numeric { value: 1 });
        assert_eq!(listener_dead_count(&dead_listener), 1);
    }

    fn listener_dead_count(listener: &Arc<DeadMessageListener>) -> usize {
        listener.dead_tuples().len()
    }

    #[rstest]
    fn test_handler_error_reaches_sink_and_publish_returns() {
        let bus = bus(PublishMode::Exact);
        let sink = Arc::new(RecordingSink::default());
        bus.add_error_handler(sink.clone());

        let listener = Arc::new(FailingListener::default());
        bus.subscribe(&listener);

        bus.publish(Numeric { value: 7 });

        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.published_values(), vec![7]);
        assert_eq!(listener.calls(), 1);
    }

    #[rstest]
    fn test_unsubscribe_stops_delivery() {
        let bus = bus(PublishMode::Exact);
        let listener = Arc::new(NumericListener::default());
        bus.subscribe(&listener);
        bus.unsubscribe(&listener);

        bus.publish(Numeric { value: 1 });
        assert!(listener.received().is_empty());

        // Subscription objects are retained for reuse
        let subs = bus.subscriptions_of::<NumericListener>().unwrap();
        assert_eq!(subs.len(), 1);
    }

    #[rstest]
    fn test_repeated_subscribe_delivers_once() {
        let bus = bus(PublishMode::Exact);
        let listener = Arc::new(NumericListener::default());
        bus.subscribe(&listener);
        bus.subscribe(&listener);

        bus.publish(Numeric { value: 3 });
        assert_eq!(listener.received(), vec![3]);
    }

    #[rstest]
    fn test_unsubscribe_unknown_listener_tolerated() {
        let bus = bus(PublishMode::Exact);
        let listener = Arc::new(NumericListener::default());
        bus.unsubscribe(&listener);
    }

    #[rstest]
    fn test_handlerless_listener_is_cheap_noop() {
        let bus = bus(PublishMode::Exact);
        let listener = Arc::new(NoHandlersListener);
        bus.subscribe(&listener);
        bus.subscribe(&listener);
        bus.unsubscribe(&listener);
        assert!(bus.subscriptions_of::<NoHandlersListener>().is_none());
    }

    #[rstest]
    fn test_dropped_listener_never_observed_after_reclaim() {
        let bus = bus(PublishMode::Exact);
        let kept = Arc::new(NumericListener::default());
        let dropped = Arc::new(NumericListener::default());
        bus.subscribe(&kept);
        bus.subscribe(&dropped);
        drop(dropped);

        bus.publish(Numeric { value: 1 });
        bus.publish(Numeric { value: 2 });
        assert_eq!(kept.received(), vec![1, 2]);

        let subs = bus.subscriptions_of::<NumericListener>().unwrap();
        assert_eq!(subs[0].listeners().live_count(), 1);
    }

    #[rstest]
    fn test_publish_array_empty_is_precondition_error() {
        let bus = bus(PublishMode::Exact);
        assert!(bus.publish_array(Vec::<Numeric>::new()).is_err());
        assert!(bus.publish_async_array(Vec::<Numeric>::new()).is_err());
    }

    #[rstest]
    fn test_publish_array_delivers_variadic() {
        let bus = bus(PublishMode::ExactWithSupertypesAndVarArgs);
        let listener = Arc::new(VariadicListener::default());
        bus.subscribe(&listener);

        bus.publish_array(vec![
            Numeric { value: 1 },
            Numeric { value: 2 },
            Numeric { value: 3 },
            Numeric { value: 4 },
        ])
        .unwrap();
        assert_eq!(listener.batches(), vec![vec![1, 2, 3, 4]]);
    }

    #[rstest]
    fn test_start_is_idempotent_and_shutdown_joins() {
        let bus = bus(PublishMode::Exact);
        bus.start().unwrap();
        bus.start().unwrap();
        assert!(bus.is_running());

        bus.shutdown();
        bus.shutdown();
        assert!(!bus.is_running());

        // Synchronous publication remains valid after shutdown
        let listener = Arc::new(NumericListener::default());
        bus.subscribe(&listener);
        bus.publish(Numeric { value: 9 });
        assert_eq!(listener.received(), vec![9]);
    }

    #[rstest]
    fn test_async_publish_delivers_through_pool() {
        let bus = bus(PublishMode::Exact);
        let listener = Arc::new(CountingListener::default());
        bus.subscribe(&listener);
        bus.start().unwrap();

        for value in 0..50 {
            bus.publish_async(Numeric { value });
        }

        wait_until(|| listener.count() == 50);
        bus.shutdown();
    }

    #[rstest]
    fn test_async_publish_after_shutdown_reports_queue_error() {
        let bus = bus(PublishMode::Exact);
        let sink = Arc::new(RecordingSink::default());
        bus.add_error_handler(sink.clone());

        bus.start().unwrap();
        bus.shutdown();

        bus.publish_async(Numeric { value: 1 });
        assert_eq!(sink.error_count(), 1);
        assert!(sink.messages()[0].contains("async publish failed"));
    }

    #[rstest]
    fn test_concurrent_async_publishers() {
        let bus = bus(PublishMode::Exact);
        let listener = Arc::new(CountingListener::default());
        bus.subscribe(&listener);
        bus.start().unwrap();

        let mut producers = Vec::new();
        for _ in 0..8 {
            let bus = bus.clone();
            producers.push(thread::spawn(move || {
                for k in 0..100 {
                    bus.publish_async(Numeric { value: k % 100 });
                }
            }));
        }
        for producer in producers {
            producer.join().unwrap();
        }

        wait_until(|| !bus.has_pending_messages());
        bus.shutdown();

        let count = listener.count();
        assert!(count > 0);
        assert!(count <= 800);
    }

    #[rstest]
    fn test_synchronized_handler_serialized_per_listener() {
        let bus = bus(PublishMode::Exact);
        let listener = Arc::new(SynchronizedListener::default());
        bus.subscribe(&listener);
        bus.start().unwrap();

        for value in 0..64 {
            bus.publish_async(Numeric { value });
        }

        wait_until(|| listener.entries() == 64);
        bus.shutdown();

        assert_eq!(listener.max_concurrency(), 1);
    }

    #[rstest]
    fn test_concurrent_subscribe_and_publish() {
        let bus = bus(PublishMode::ExactWithSupertypesAndVarArgs);
        let stop = Arc::new(AtomicBool::new(false));

        let publisher = {
            let bus = bus.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut published = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    bus.publish(Numeric { value: 1 });
                    published += 1;
                }
                published
            })
        };

        let mut listeners = Vec::new();
        for _ in 0..100 {
            let listener = Arc::new(NumericListener::default());
            bus.subscribe(&listener);
            bus.unsubscribe(&listener);
            listeners.push(listener);
        }

        stop.store(true, Ordering::Relaxed);
        let published = publisher.join().unwrap();
        assert!(published > 0);

        // Unsubscribed listeners must not have received anything after the
        // unsubscribe; each listener saw either zero or more deliveries, and
        // no publish panicked or tore a snapshot.
        let subs = bus.subscriptions_of::<NumericListener>().unwrap();
        assert_eq!(subs[0].listeners().live_count(), 0);
    }
}
