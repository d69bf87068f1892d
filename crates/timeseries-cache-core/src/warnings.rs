//! Once-per-action user warnings.
//!
//! A single user action (drawing a frame, stepping the time slider) can ask
//! for the same missing value many times. [`WarningDeduplicationContext`]
//! lets the caller report each distinct cause once per action:
//!
//! ```
//! use timeseries_cache_core::warnings::{WarningCause, WarningDeduplicationContext};
//!
//! let mut ctx = WarningDeduplicationContext::new();
//! let cause = WarningCause::new("gap:kp:no-samples");
//!
//! ctx.begin_operation();
//! assert!(ctx.should_report(&cause));
//! assert!(!ctx.should_report(&cause));
//! ctx.end_operation();
//!
//! ctx.begin_operation();
//! assert!(ctx.should_report(&cause));
//! ```

use std::{collections::HashSet, fmt};

use log::warn;

/// Identifier of the thing that went wrong (field plus failure kind, say).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WarningCause(String);

impl WarningCause {
    /// Wrap a cause identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WarningCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one logical user operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(u64);

/// Tracks which causes were already reported in the current operation.
#[derive(Debug, Default)]
pub struct WarningDeduplicationContext {
    next_id: u64,
    current: Option<OperationId>,
    reported: HashSet<(WarningCause, OperationId)>,
}

impl WarningDeduplicationContext {
    /// Context with no operation open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new operation, closing any operation still open.
    pub fn begin_operation(&mut self) -> OperationId {
        self.end_operation();
        let id = OperationId(self.next_id);
        self.next_id += 1;
        self.current = Some(id);
        id
    }

    /// Close the current operation and forget what it reported.
    pub fn end_operation(&mut self) {
        if let Some(id) = self.current.take() {
            self.reported.retain(|(_, op)| *op != id);
        }
    }

    /// The open operation, if any.
    pub fn current_operation(&self) -> Option<OperationId> {
        self.current
    }

    /// True the first time `cause` is seen in the open operation.
    ///
    /// Outside an operation nothing is deduplicated.
    pub fn should_report(&mut self, cause: &WarningCause) -> bool {
        match self.current {
            Some(op) => self.reported.insert((cause.clone(), op)),
            None => true,
        }
    }

    /// Log `message` as a warning unless `cause` was already reported in
    /// this operation. Returns whether it was logged.
    pub fn report(&mut self, cause: &WarningCause, message: impl fmt::Display) -> bool {
        if !self.should_report(cause) {
            return false;
        }
        warn!("{message}");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_causes_are_reported_separately() {
        let mut ctx = WarningDeduplicationContext::new();
        let kp = WarningCause::new("gap:kp:no-samples");
        let dst = WarningCause::new("gap:dst:no-samples");

        ctx.begin_operation();
        assert!(ctx.should_report(&kp));
        assert!(ctx.should_report(&dst));
        assert!(!ctx.should_report(&kp));
        assert!(!ctx.report(&dst, "again"));
    }

    #[test]
    fn no_dedup_outside_operation() {
        let mut ctx = WarningDeduplicationContext::new();
        let cause = WarningCause::new("fetch:download");
        assert!(ctx.should_report(&cause));
        assert!(ctx.should_report(&cause));
        assert!(ctx.current_operation().is_none());
    }

    #[test]
    fn begin_closes_previous_operation() {
        let mut ctx = WarningDeduplicationContext::new();
        let cause = WarningCause::new("gap:kp:fill-only");

        let first = ctx.begin_operation();
        assert!(ctx.should_report(&cause));
        let second = ctx.begin_operation();
        assert_ne!(first, second);
        assert!(ctx.should_report(&cause));
        ctx.end_operation();
        assert!(ctx.reported.is_empty());
    }
}
