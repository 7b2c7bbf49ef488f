//! Flush failure policy.
//!
//! Whether a table flush failure during `BLOCK_DDL` or `BLOCK_COMMIT` fails
//! the stage is decided here and nowhere else.

use hotbackup_core::effects::FlushScope;
use hotbackup_core::FlushFailurePolicy;

/// What is known about a failed flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushFailureContext {
    /// Tables that were being flushed.
    pub scope: FlushScope,
    /// The session carries an error, raised by this failure or earlier.
    pub session_error_raised: bool,
}

/// Whether a flush failure fails the stage.
///
/// System and log table flushes are never fatal. A non-transactional flush is
/// fatal under [`FlushFailurePolicy::FatalOnSessionError`] only when the
/// session ended up with an error.
pub fn is_fatal(policy: FlushFailurePolicy, context: FlushFailureContext) -> bool {
    match (policy, context.scope) {
        (FlushFailurePolicy::Ignore, _) => false,
        (_, FlushScope::SystemAndLog) => false,
        (FlushFailurePolicy::FatalOnSessionError, FlushScope::NonTransactional) => {
            context.session_error_raised
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(scope: FlushScope, session_error_raised: bool) -> FlushFailureContext {
        FlushFailureContext {
            scope,
            session_error_raised,
        }
    }

    #[test]
    fn test_truth_table() {
        use FlushFailurePolicy::*;
        use FlushScope::*;

        let cases = [
            (FatalOnSessionError, NonTransactional, true, true),
            (FatalOnSessionError, NonTransactional, false, false),
            (FatalOnSessionError, SystemAndLog, true, false),
            (FatalOnSessionError, SystemAndLog, false, false),
            (Ignore, NonTransactional, true, false),
            (Ignore, NonTransactional, false, false),
            (Ignore, SystemAndLog, true, false),
        ];
        for (policy, scope, raised, expected) in cases {
            assert_eq!(
                is_fatal(policy, ctx(scope, raised)),
                expected,
                "{policy:?} {scope:?} raised={raised}"
            );
        }
    }
}
