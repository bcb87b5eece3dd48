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

//! Bounded MPMC queue carrying dispatch envelopes.
//!
//! `transfer` blocks while the queue is full and `take` blocks while it is
//! empty; both are interrupted by shutdown through a zero-capacity quit
//! channel whose disconnect wakes every blocked thread. FIFO holds per
//! producer; cross-producer ordering is unspecified, and consumers balance
//! by contention.

use std::fmt::Debug;

use crossbeam_channel::{Receiver, Sender, bounded, select};
use parking_lot::Mutex;

use crate::{error::QueueError, message::Envelope};

/// Bounded multi-producer/multi-consumer dispatch queue.
pub struct DispatchQueue {
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
    quit_tx: Mutex<Option<Sender<()>>>,
    quit_rx: Receiver<()>,
    capacity: usize,
}

impl DispatchQueue {
    /// Creates a queue with at least the requested capacity, rounded up to a
    /// power of two.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let (tx, rx) = bounded(capacity);
        let (quit_tx, quit_rx) = bounded(0);
        Self {
            tx,
            rx,
            quit_tx: Mutex::new(Some(quit_tx)),
            quit_rx,
            capacity,
        }
    }

    /// Returns the effective capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueues an envelope, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] when the queue has been shut down, or
    /// [`QueueError::Interrupted`] when shutdown arrives while blocked.
    pub fn transfer(&self, envelope: Envelope) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        select! {
            send(self.tx, envelope) -> result => result.map_err(|_| QueueError::Closed),
            recv(self.quit_rx) -> _ => Err(QueueError::Interrupted),
        }
    }

    /// Dequeues the next envelope, blocking while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Interrupted`] when shutdown arrives while
    /// blocked. Envelopes still queued at shutdown may be discarded.
    pub fn take(&self) -> Result<Envelope, QueueError> {
        select! {
            recv(self.rx) -> result => result.map_err(|_| QueueError::Closed),
            recv(self.quit_rx) -> _ => Err(QueueError::Interrupted),
        }
    }

    /// Shuts the queue down, waking every blocked producer and consumer.
    ///
    /// Idempotent.
    pub fn close(&self) {
        self.quit_tx.lock().take();
    }

    /// Returns whether the queue has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.quit_tx.lock().is_none()
    }

    /// Returns whether envelopes are waiting. Advisory: the answer may be
    /// stale by the time the caller acts on it.
    #[must_use]
    pub fn has_pending_messages(&self) -> bool {
        !self.rx.is_empty()
    }
}

impl Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(DispatchQueue))
            .field("capacity", &self.capacity)
            .field("pending", &self.rx.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use rstest::rstest;

    use super::*;
    use crate::stubs::Numeric;

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 4)]
    #[case(1000, 1024)]
    fn test_capacity_rounded_to_power_of_two(#[case] requested: usize, #[case] expected: usize) {
        let queue = DispatchQueue::with_capacity(requested);
        assert_eq!(queue.capacity(), expected);
    }

    #[rstest]
    fn test_transfer_take_round_trip() {
        let queue = DispatchQueue::with_capacity(4);
        assert!(!queue.has_pending_messages());

        queue.transfer(Envelope::single(Numeric { value: 7 })).unwrap();
        assert!(queue.has_pending_messages());

        let envelope = queue.take().unwrap();
        assert_eq!(envelope.len(), 1);
        assert!(!queue.has_pending_messages());
    }

    #[rstest]
    fn test_fifo_per_producer() {
        let queue = DispatchQueue::with_capacity(16);
        for value in 0..10 {
            queue.transfer(Envelope::single(Numeric { value })).unwrap();
        }
        for expected in 0..10 {
            let envelope = queue.take().unwrap();
            let value = envelope
                .get(0)
                .unwrap()
                .as_any()
                .downcast_ref::<Numeric>()
                .unwrap()
                .value;
            assert_eq!(value, expected);
        }
    }

    #[rstest]
    fn test_transfer_after_close_fails() {
        let queue = DispatchQueue::with_capacity(4);
        queue.close();
        assert!(queue.is_closed());
        assert_eq!(
            queue.transfer(Envelope::single(Numeric { value: 1 })),
            Err(QueueError::Closed)
        );
    }

    #[rstest]
    fn test_close_interrupts_blocked_take() {
        let queue = Arc::new(DispatchQueue::with_capacity(4));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.take())
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        let result = consumer.join().unwrap();
        assert!(matches!(result, Err(QueueError::Interrupted)));
    }

    #[rstest]
    fn test_close_interrupts_blocked_transfer() {
        let queue = Arc::new(DispatchQueue::with_capacity(1));
        queue.transfer(Envelope::single(Numeric { value: 1 })).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.transfer(Envelope::single(Numeric { value: 2 })))
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        let result = producer.join().unwrap();
        assert_eq!(result, Err(QueueError::Interrupted));
    }

    #[rstest]
    fn test_close_is_idempotent() {
        let queue = DispatchQueue::with_capacity(4);
        queue.close();
        queue.close();
        assert!(queue.is_closed());
    }
}
