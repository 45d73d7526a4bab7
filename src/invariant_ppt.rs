//! Runtime invariant checks with contract-test bookkeeping.
//!
//! Production code asserts invariants with [`assert_invariant!`]; tests then
//! call [`contract_test`] to prove the assertions were actually exercised.
//! The log is process-wide because session invariants are checked on the
//! camera worker thread, not on the test thread.
//!
//! ```rust,ignore
//! use rangefinder::invariant_ppt::*;
//!
//! assert_invariant!(
//!     census.is_all_or_none(),
//!     "Session resources exist all together or not at all",
//!     "session"
//! );
//!
//! #[test]
//! fn contract_session_resources() {
//!     contract_test("session resources", &[
//!         "Session resources exist all together or not at all",
//!     ]);
//! }
//! ```

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

fn invariant_log() -> &'static Mutex<HashSet<String>> {
    static LOG: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    LOG.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Assert an invariant and record that it was checked.
///
/// # Panics
/// Panics if the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&str>) {
    match invariant_log().lock() {
        Ok(mut log) => {
            log.insert(message.to_string());
        }
        Err(poisoned) => {
            poisoned.into_inner().insert(message.to_string());
        }
    }

    if !condition {
        let ctx = context.unwrap_or("unknown");
        log::error!("INVARIANT VIOLATION [{}]: {}", ctx, message);
        panic!("INVARIANT VIOLATION [{}]: {}", ctx, message);
    }
}

/// Whether `message` has been checked at least once in this process.
pub fn invariant_checked(message: &str) -> bool {
    match invariant_log().lock() {
        Ok(log) => log.contains(message),
        Err(poisoned) => poisoned.into_inner().contains(message),
    }
}

/// Check that every listed invariant was verified during the test run.
///
/// # Panics
/// Panics naming the invariants that were never checked.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|invariant| !invariant_checked(invariant))
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: The following invariants were not checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}
