//! Assertion helpers for test bodies
//!
//! Each helper returns `ProbeError::Assertion` carrying an expected-vs-actual
//! message and the caller's source location.

use crate::error::{ProbeError, Result};
use std::fmt::Debug;
use std::panic::Location;

#[track_caller]
pub fn expect_eq<T: PartialEq + Debug>(actual: T, expected: T, what: &str) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(located(format!("{}: expected {:?} but was {:?}", what, expected, actual)))
    }
}

#[track_caller]
pub fn expect_true(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(located(message.to_string()))
    }
}

#[track_caller]
pub fn expect_contains(haystack: &str, needle: &str, what: &str) -> Result<()> {
    if haystack.contains(needle) {
        Ok(())
    } else {
        let preview: String = haystack.chars().take(200).collect();
        Err(located(format!("{}: expected to contain {:?} but was {:?}", what, needle, preview)))
    }
}

#[track_caller]
pub fn expect_status(actual: u16, expected: &[u16]) -> Result<()> {
    if expected.contains(&actual) {
        Ok(())
    } else {
        Err(located(format!("expected HTTP status {:?} but was {}", expected, actual)))
    }
}

#[track_caller]
fn located(message: String) -> ProbeError {
    let caller = Location::caller();
    ProbeError::Assertion(format!("{} (at {}:{})", message, caller.file(), caller.line()))
}
