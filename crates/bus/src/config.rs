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

//! Bus configuration.

use manifold_core::correctness::check_positive_usize;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Strategy used to resolve matching subscriptions for a published tuple.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum PublishMode {
    /// Deliver to exact signature matches only.
    Exact,
    /// Deliver to exact matches and opted-in supertype handlers.
    ExactWithSupertypes,
    /// Deliver to exact, supertype, and variadic matches.
    #[default]
    ExactWithSupertypesAndVarArgs,
}

impl PublishMode {
    /// Returns whether supertype matching is enabled.
    #[must_use]
    pub fn includes_supertypes(&self) -> bool {
        !matches!(self, Self::Exact)
    }

    /// Returns whether variadic matching is enabled.
    #[must_use]
    pub fn includes_var_args(&self) -> bool {
        matches!(self, Self::ExactWithSupertypesAndVarArgs)
    }
}

/// Minimum dispatcher thread count.
pub const MIN_WORKER_THREADS: usize = 2;

/// Default dispatch queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configuration for a [`crate::bus::MessageBus`] instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Subscription resolution strategy.
    pub publish_mode: PublishMode,
    /// Requested dispatcher thread count; the effective count is at least
    /// [`MIN_WORKER_THREADS`], rounded up to a power of two.
    pub worker_threads: usize,
    /// Requested dispatch queue capacity, rounded up to a power of two.
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            publish_mode: PublishMode::default(),
            worker_threads: MIN_WORKER_THREADS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl BusConfig {
    /// Creates a new [`BusConfig`] with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the publish mode.
    #[must_use]
    pub fn with_publish_mode(mut self, publish_mode: PublishMode) -> Self {
        self.publish_mode = publish_mode;
        self
    }

    /// Sets the requested dispatcher thread count.
    #[must_use]
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Sets the requested dispatch queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any sizing parameter is zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        check_positive_usize(self.worker_threads, stringify!(worker_threads))?;
        check_positive_usize(self.queue_capacity, stringify!(queue_capacity))?;
        Ok(())
    }

    /// Returns the effective dispatcher thread count.
    #[must_use]
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads
            .max(MIN_WORKER_THREADS)
            .next_power_of_two()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(PublishMode::Exact, false, false)]
    #[case(PublishMode::ExactWithSupertypes, true, false)]
    #[case(PublishMode::ExactWithSupertypesAndVarArgs, true, true)]
    fn test_publish_mode_flags(
        #[case] mode: PublishMode,
        #[case] supertypes: bool,
        #[case] var_args: bool,
    ) {
        assert_eq!(mode.includes_supertypes(), supertypes);
        assert_eq!(mode.includes_var_args(), var_args);
    }

    #[rstest]
    fn test_publish_mode_string_round_trip() {
        let mode = PublishMode::ExactWithSupertypes;
        let parsed: PublishMode = mode.to_string().parse().unwrap();
        assert_eq!(mode, parsed);
    }

    #[rstest]
    #[case(1, 2)]
    #[case(2, 2)]
    #[case(3, 4)]
    #[case(5, 8)]
    #[case(8, 8)]
    fn test_effective_worker_threads(#[case] requested: usize, #[case] expected: usize) {
        let config = BusConfig::new().with_worker_threads(requested);
        assert_eq!(config.effective_worker_threads(), expected);
    }

    #[rstest]
    fn test_validate_rejects_zero_sizes() {
        assert!(BusConfig::new().validate().is_ok());
        assert!(BusConfig::new().with_worker_threads(0).validate().is_err());
        assert!(BusConfig::new().with_queue_capacity(0).validate().is_err());
    }
}
