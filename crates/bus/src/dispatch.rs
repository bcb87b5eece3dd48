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

//! Fixed pool of dispatcher threads draining the queue into synchronous
//! publication.

use std::{fmt::Debug, sync::Arc, thread::JoinHandle};

use crate::{message::Envelope, queue::DispatchQueue};

/// A fixed set of named OS worker threads, each looping take → publish.
///
/// Workers exit when the queue shuts down or when the delivery callback
/// reports that the bus is gone; envelopes still queued at that point are
/// discarded.
pub struct DispatcherPool {
    workers: Vec<JoinHandle<()>>,
}

impl DispatcherPool {
    /// Spawns `worker_count` dispatcher threads over `queue`.
    ///
    /// `publish` performs the synchronous publication for one envelope and
    /// returns whether the worker should keep running.
    ///
    /// # Errors
    ///
    /// Returns an error if the operating system refuses to spawn a thread.
    pub fn spawn<F>(
        queue: Arc<DispatchQueue>,
        worker_count: usize,
        publish: F,
    ) -> anyhow::Result<Self>
    where
        F: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        let publish = Arc::new(publish);
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let queue = queue.clone();
            let publish = publish.clone();
            let handle = std::thread::Builder::new()
                .name(format!("bus-dispatch-{index}"))
                .spawn(move || worker_loop(&queue, &*publish))?;
            workers.push(handle);
        }
        Ok(Self { workers })
    }

    /// Returns the number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every worker to exit.
    ///
    /// Callers shut the queue down first; otherwise this blocks until the
    /// workers stop on their own.
    pub fn join(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                log::warn!("Dispatcher thread panicked");
            }
        }
    }
}

impl Debug for DispatcherPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(DispatcherPool))
            .field("workers", &self.workers.len())
            .finish()
    }
}

fn worker_loop<F>(queue: &DispatchQueue, publish: &F)
where
    F: Fn(&Envelope) -> bool,
{
    log::debug!("Dispatcher started");
    loop {
        match queue.take() {
            Ok(envelope) => {
                if !publish(&envelope) {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    log::debug!("Dispatcher stopped");
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::{Duration, Instant},
    };

    use rstest::rstest;

    use super::*;
    use crate::stubs::Numeric;

    fn wait_until<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[rstest]
    fn test_workers_drain_queue() {
        let queue = Arc::new(DispatchQueue::with_capacity(64));
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = delivered.clone();

        let pool = DispatcherPool::spawn(queue.clone(), 2, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();
        assert_eq!(pool.worker_count(), 2);

        for value in 0..100 {
            queue.transfer(Envelope::single(Numeric { value })).unwrap();
        }

        wait_until(|| delivered.load(Ordering::SeqCst) == 100);
        queue.close();
        pool.join();
    }

    #[rstest]
    fn test_workers_exit_on_shutdown() {
        let queue = Arc::new(DispatchQueue::with_capacity(4));
        let pool = DispatcherPool::spawn(queue.clone(), 2, |_| true).unwrap();

        queue.close();
        pool.join();
    }

    #[rstest]
    fn test_worker_stops_when_publish_reports_gone() {
        let queue = Arc::new(DispatchQueue::with_capacity(4));
        let pool = DispatcherPool::spawn(queue.clone(), 1, |_| false).unwrap();

        queue.transfer(Envelope::single(Numeric { value: 1 })).unwrap();
        // The single worker consumed the envelope and stopped without the
        // queue being closed.
        pool.join();
        assert!(!queue.is_closed());
    }
}
