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

//! Condition checks similar to design-by-contract preconditions.
//!
//! Each function returns an `anyhow::Result` so callers can propagate with `?`
//! or escalate with `.expect(FAILED)` at sites where a violation is a bug.

/// Standard message for a failed condition check.
pub const FAILED: &str = "Condition check failed";

/// Checks that `predicate` is true.
///
/// # Errors
///
/// Returns an error with `fail_msg` if the predicate is false.
pub fn check_predicate_true(predicate: bool, fail_msg: &str) -> anyhow::Result<()> {
    if !predicate {
        anyhow::bail!("{fail_msg}")
    }
    Ok(())
}

/// Checks that `value` is a valid string: non-empty and not all whitespace.
///
/// # Errors
///
/// Returns an error if the string is empty or contains only whitespace.
pub fn check_valid_string<T: AsRef<str>>(value: T, param: &str) -> anyhow::Result<()> {
    let value = value.as_ref();
    if value.is_empty() || value.chars().all(char::is_whitespace) {
        anyhow::bail!("invalid string for '{param}', was '{value}'")
    }
    Ok(())
}

/// Checks that `value` is positive (non-zero).
///
/// # Errors
///
/// Returns an error if the value is zero.
pub fn check_positive_usize(value: usize, param: &str) -> anyhow::Result<()> {
    if value == 0 {
        anyhow::bail!("invalid usize for '{param}', was {value}")
    }
    Ok(())
}
