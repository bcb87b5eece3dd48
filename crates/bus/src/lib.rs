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

//! In-process publish/subscribe message bus.
//!
//! # Messaging model
//!
//! Listener types declare handlers through [`Listener::handler_specs`];
//! subscribing an instance registers it with every handler its type
//! declares. Publication is by message type signature: a published tuple
//! reaches every handler whose parameter sequence matches, with optional
//! super-type and variadic matching selected by [`PublishMode`].
//!
//! - **Synchronous** (`publish*`): returns after every matching handler
//!   completed or errored.
//! - **Asynchronous** (`publish_async*`): enqueues the tuple onto a bounded
//!   MPMC queue drained by a fixed dispatcher pool; blocks only while the
//!   queue is saturated.
//!
//! # Concurrency
//!
//! The bus follows the single-writer principle: subscribe and unsubscribe
//! serialize on one writer lock and commit by atomically replacing
//! snapshots, while publication reads the current snapshot without locks.
//! Listener instances are held weakly; dropped listeners are unlinked lazily
//! during publication.
//!
//! # Failure containment
//!
//! Handler failures and panics never escape a publish call: they are
//! converted into [`PublicationError`]s and forwarded to the registered
//! [`ErrorSink`]s. A handler may cancel delivery of the current message with
//! [`HandlerError::CancelDispatch`]. Publications matching no live handler
//! are republished once as a [`DeadMessage`].

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod hierarchy;
pub mod listeners;
pub mod matching;
pub mod message;
pub mod queue;
pub mod subscription;
pub mod table;

#[cfg(any(test, feature = "stubs"))]
pub mod stubs;

pub use self::{
    bus::MessageBus,
    config::{BusConfig, PublishMode},
    error::{ErrorSink, HandlerError, HandlerResult, PublicationError, QueueError},
    handler::{HandlerDescriptor, HandlerRegistry, HandlerSpec, Listener},
    hierarchy::TypeHierarchyCache,
    listeners::{ListenerRef, WeakListenerList},
    message::{DeadMessage, Envelope, Message, MessageType, SuperSpec, TypeSpec},
    queue::DispatchQueue,
    subscription::Subscription,
    table::SubscriptionTable,
};
