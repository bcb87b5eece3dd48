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

//! One handler × listener-type binding with its live listener instances.

use std::{any::Any, fmt::Debug, panic::AssertUnwindSafe};

use crate::{
    error::{ErrorSinks, HandlerError, HandlerResult, PublicationError},
    handler::HandlerDescriptor,
    listeners::{ListenerRef, WeakListenerList},
    message::Envelope,
};

/// The binding of one [`HandlerDescriptor`] to its listener type, owning the
/// weak list of subscribed instances.
///
/// Created once per {listener type, handler} pair on first subscribe and
/// retained for the life of the bus; the descriptor never changes after
/// construction. Identity is the allocation itself.
pub struct Subscription {
    descriptor: HandlerDescriptor,
    listeners: WeakListenerList,
}

impl Subscription {
    /// Creates a new [`Subscription`] instance.
    #[must_use]
    pub fn new(descriptor: HandlerDescriptor) -> Self {
        Self {
            descriptor,
            listeners: WeakListenerList::new(),
        }
    }

    /// Returns the handler descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    /// Returns the listener list.
    #[must_use]
    pub fn listeners(&self) -> &WeakListenerList {
        &self.listeners
    }

    /// Adds a listener instance; duplicate instances are ignored.
    pub fn add_listener(&self, listener: &ListenerRef) {
        if self.listeners.add(listener) {
            log::debug!(
                "Subscribed listener to {}::{}",
                self.descriptor.listener_name(),
                self.descriptor.name()
            );
        }
    }

    /// Removes a listener instance; unknown instances are ignored.
    pub fn remove_listener(&self, listener: &ListenerRef) {
        if self.listeners.remove(listener) {
            log::debug!(
                "Unsubscribed listener from {}::{}",
                self.descriptor.listener_name(),
                self.descriptor.name()
            );
        }
    }

    /// Delivers `envelope` to every live listener.
    ///
    /// Cleared weak handles found along the way are unlinked. Handler
    /// failures and panics become [`PublicationError`]s on `sinks` and
    /// delivery continues; a cancel-dispatch signal stops delivery to this
    /// subscription's remaining listeners.
    ///
    /// Returns whether at least one live listener existed at traversal start.
    pub fn invoke(&self, sinks: &ErrorSinks, envelope: &Envelope) -> bool {
        let mut any_live = false;
        let mut cursor = self.listeners.head_node();

        while let Some(node) = cursor {
            let next = node.next_node();
            match node.upgrade() {
                None => self.listeners.reclaim(&node),
                Some(listener) => {
                    any_live = true;
                    match self.invoke_on(&listener, &node, envelope) {
                        Ok(()) => {}
                        Err(HandlerError::CancelDispatch) => return any_live,
                        Err(HandlerError::Failed(cause)) => {
                            sinks.report(
                                PublicationError::new(format!(
                                    "handler {}::{} failed",
                                    self.descriptor.listener_name(),
                                    self.descriptor.name()
                                ))
                                .with_cause(cause)
                                .with_published(envelope.to_vec()),
                            );
                        }
                    }
                }
            }
            cursor = next;
        }

        any_live
    }

    fn invoke_on(
        &self,
        listener: &ListenerRef,
        node: &crate::listeners::ListenerNode,
        envelope: &Envelope,
    ) -> HandlerResult {
        let _serialized = self
            .descriptor
            .is_synchronized()
            .then(|| node.invoke_lock().lock());

        let target: &dyn Any = &**listener;
        let outcome =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.descriptor.invoke(target, envelope)));
        match outcome {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::Failed(anyhow::anyhow!(
                "handler {}::{} panicked: {}",
                self.descriptor.listener_name(),
                self.descriptor.name(),
                panic_message(&payload)
            ))),
        }
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Subscription))
            .field("descriptor", &self.descriptor)
            .field("live_listeners", &self.listeners.live_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
