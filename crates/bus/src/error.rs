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

//! Error model and publication error sinks.
//!
//! Nothing raised inside a handler escapes a publish call: failures are
//! converted into [`PublicationError`] values and forwarded to the registered
//! [`ErrorSink`]s, and delivery continues with the next subscription.

use std::{fmt::Debug, sync::Arc};

use parking_lot::RwLock;
use smallvec::SmallVec;
use thiserror::Error;

use crate::message::Message;

/// Outcome signal returned by a message handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Aborts delivery of the current tuple to the remaining listeners of
    /// this subscription. A control signal, not an error.
    #[error("dispatch cancelled by handler")]
    CancelDispatch,
    /// The handler failed. Reported to the error sinks; delivery continues.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Convenience alias for handler return values.
pub type HandlerResult = Result<(), HandlerError>;

/// Failure of an asynchronous enqueue or dequeue operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue was shut down before the operation could start.
    #[error("dispatch queue is closed")]
    Closed,
    /// A blocked operation was interrupted by shutdown.
    #[error("queue operation interrupted by shutdown")]
    Interrupted,
}

/// An error surfaced while publishing a message tuple.
#[derive(Debug)]
pub struct PublicationError {
    message: String,
    cause: Option<anyhow::Error>,
    published: Vec<Arc<dyn Message>>,
}

impl PublicationError {
    /// Creates a new [`PublicationError`] with the given description.
    #[must_use]
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            cause: None,
            published: Vec::new(),
        }
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: anyhow::Error) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Attaches a copy of the published tuple.
    #[must_use]
    pub fn with_published(mut self, published: Vec<Arc<dyn Message>>) -> Self {
        self.published = published;
        self
    }

    /// Returns the error description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_ref()
    }

    /// Returns the published tuple the error relates to.
    #[must_use]
    pub fn published(&self) -> &[Arc<dyn Message>] {
        &self.published
    }
}

impl std::fmt::Display for PublicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// Collector for publication errors surfaced from handlers or dispatch.
pub trait ErrorSink: Send + Sync {
    /// Receives one publication error.
    fn on_publication_error(&self, error: &PublicationError);
}

/// Writes publication errors to the standard error stream.
///
/// Installed automatically when the bus starts with no sink registered.
#[derive(Debug, Default)]
pub struct StderrErrorSink;

impl ErrorSink for StderrErrorSink {
    fn on_publication_error(&self, error: &PublicationError) {
        eprintln!("manifold: {error}");
    }
}

/// Thread-safe dynamic registry of error sinks.
#[derive(Default)]
pub struct ErrorSinks {
    sinks: RwLock<Vec<Arc<dyn ErrorSink>>>,
}

impl ErrorSinks {
    /// Creates a new empty [`ErrorSinks`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink.
    pub fn add(&self, sink: Arc<dyn ErrorSink>) {
        self.sinks.write().push(sink);
    }

    /// Returns whether any sink is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    /// Installs the stderr sink when no sink has been registered.
    pub fn install_default_if_empty(&self) {
        let mut sinks = self.sinks.write();
        if sinks.is_empty() {
            sinks.push(Arc::new(StderrErrorSink));
        }
    }

    /// Forwards `error` to every registered sink.
    ///
    /// Sinks are called outside the registry lock so a sink may itself
    /// register further sinks.
    pub fn report(&self, error: PublicationError) {
        log::error!("Publication error: {error}");
        let sinks: SmallVec<[Arc<dyn ErrorSink>; 2]> =
            self.sinks.read().iter().cloned().collect();
        for sink in sinks {
            sink.on_publication_error(&error);
        }
    }
}

impl Debug for ErrorSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ErrorSinks))
            .field("len", &self.sinks.read().len())
            .finish()
    }
}
