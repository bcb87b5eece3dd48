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

//! A universally unique identifier (UUID) version 4.

use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// A UUID version 4 based on a 122-bit random number.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UUID4 {
    value: uuid::Uuid,
}

impl UUID4 {
    /// Creates a new [`UUID4`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: uuid::Uuid::new_v4(),
        }
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub const fn inner(&self) -> uuid::Uuid {
        self.value
    }
}

impl Default for UUID4 {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for UUID4 {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            value: uuid::Uuid::parse_str(value)?,
        })
    }
}

impl From<uuid::Uuid> for UUID4 {
    fn from(value: uuid::Uuid) -> Self {
        Self { value }
    }
}

impl Debug for UUID4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}('{}')", stringify!(UUID4), self.value)
    }
}

impl Display for UUID4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
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
    fn test_new_produces_unique_values() {
        let a = UUID4::new();
        let b = UUID4::new();
        assert_ne!(a, b);
    }

    #[rstest]
    fn test_from_str_round_trip() {
        let original = UUID4::new();
        let parsed: UUID4 = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[rstest]
    fn test_from_str_invalid() {
        assert!("not-a-uuid".parse::<UUID4>().is_err());
    }

    #[rstest]
    fn test_debug_format() {
        let uuid = UUID4::new();
        assert_eq!(format!("{uuid:?}"), format!("UUID4('{uuid}')"));
    }
}
