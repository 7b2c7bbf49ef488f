//! Lock escalation protocol.
//!
//! Which lock request each stage makes, as data:
//!
//! | stage          | request                      | mode after    |
//! |----------------|------------------------------|---------------|
//! | `FLUSH`        | acquire                      | `FLUSH`       |
//! | `BLOCK_DDL`    | upgrade, then upgrade again  | `WAIT_DDL`    |
//! | `BLOCK_COMMIT` | upgrade                      | `WAIT_COMMIT` |
//!
//! `BLOCK_DDL` first waits for in-flight writers (`WAIT_FLUSH`) and only then
//! blocks new DDL (`WAIT_DDL`), so schema changes keep running during the
//! potentially long wait.

use hotbackup_core::{BackupError, LockMode, Stage};

/// One lock request made by a stage handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStep {
    /// Acquire a new backup ticket in this mode.
    Acquire(LockMode),
    /// Upgrade the existing backup ticket to this mode.
    Upgrade(LockMode),
}

impl LockStep {
    /// Mode the ticket holds once the step succeeds.
    pub fn mode(self) -> LockMode {
        match self {
            LockStep::Acquire(mode) | LockStep::Upgrade(mode) => mode,
        }
    }
}

/// Stateless description of the backup lock ladder.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockEscalationProtocol;

impl LockEscalationProtocol {
    /// FLUSH: block new writes to non-transactional tables.
    pub const FLUSH: LockStep = LockStep::Acquire(LockMode::Flush);
    /// BLOCK_DDL (a): wait for in-flight non-transactional writers.
    pub const WAIT_FOR_WRITERS: LockStep = LockStep::Upgrade(LockMode::WaitFlush);
    /// BLOCK_DDL (b): block new DDL.
    pub const BLOCK_DDL: LockStep = LockStep::Upgrade(LockMode::WaitDdl);
    /// BLOCK_COMMIT: block commits.
    pub const BLOCK_COMMIT: LockStep = LockStep::Upgrade(LockMode::WaitCommit);

    /// Lock requests made by `stage`, in order.
    pub fn steps(stage: Stage) -> &'static [LockStep] {
        const FLUSH: &[LockStep] = &[LockEscalationProtocol::FLUSH];
        const WAIT_FOR_FLUSH: &[LockStep] = &[
            LockEscalationProtocol::WAIT_FOR_WRITERS,
            LockEscalationProtocol::BLOCK_DDL,
        ];
        const LOCK_COMMIT: &[LockStep] = &[LockEscalationProtocol::BLOCK_COMMIT];

        match stage {
            Stage::Flush => FLUSH,
            Stage::WaitForFlush => WAIT_FOR_FLUSH,
            Stage::LockCommit => LOCK_COMMIT,
            Stage::Finished | Stage::Start | Stage::End => &[],
        }
    }

    /// Mode the backup ticket holds after `stage` completes, if the stage
    /// touches the ticket at all.
    pub fn mode_after(stage: Stage) -> Option<LockMode> {
        Self::steps(stage).last().map(|step| step.mode())
    }

    /// Reject steps that would move a ticket anywhere but up the ladder.
    ///
    /// `current` is the mode of the ticket the session holds, `None` if it
    /// holds none. Re-requesting the held mode is allowed.
    pub fn check_step(current: Option<LockMode>, step: LockStep) -> Result<(), BackupError> {
        match (current, step) {
            (None, LockStep::Acquire(_)) => Ok(()),
            (Some(held), LockStep::Acquire(to)) => {
                Err(BackupError::LadderViolation { from: held, to })
            }
            (None, LockStep::Upgrade(_)) => Ok(()),
            (Some(held), LockStep::Upgrade(to)) if held == to || held.escalates_to(to) => Ok(()),
            (Some(held), LockStep::Upgrade(to)) => {
                Err(BackupError::LadderViolation { from: held, to })
            }
        }
    }

    /// Check the one sanctioned off-ladder move (`WAIT_DDL <-> ALTER_COPY`).
    pub fn check_lateral(from: LockMode, to: LockMode) -> Result<(), BackupError> {
        if from.is_lateral_move(to) {
            Ok(())
        } else {
            Err(BackupError::LadderViolation { from, to })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_table() {
        assert_eq!(
            LockEscalationProtocol::steps(Stage::Flush),
            &[LockStep::Acquire(LockMode::Flush)]
        );
        assert_eq!(
            LockEscalationProtocol::steps(Stage::WaitForFlush),
            &[
                LockStep::Upgrade(LockMode::WaitFlush),
                LockStep::Upgrade(LockMode::WaitDdl)
            ]
        );
        assert_eq!(
            LockEscalationProtocol::steps(Stage::LockCommit),
            &[LockStep::Upgrade(LockMode::WaitCommit)]
        );
        for stage in [Stage::Finished, Stage::Start, Stage::End] {
            assert!(LockEscalationProtocol::steps(stage).is_empty());
        }
    }

    #[test]
    fn test_modes_climb_with_stages() {
        let modes: Vec<_> = Stage::ALL
            .into_iter()
            .flat_map(|stage| LockEscalationProtocol::steps(stage).iter().copied())
            .map(LockStep::mode)
            .collect();
        assert!(modes.windows(2).all(|w| w[0].escalates_to(w[1])));
        assert_eq!(
            LockEscalationProtocol::mode_after(Stage::WaitForFlush),
            Some(LockMode::WaitDdl)
        );
        assert_eq!(LockEscalationProtocol::mode_after(Stage::Start), None);
    }

    #[test]
    fn test_whole_ladder_passes_check() {
        let mut held = None;
        for stage in Stage::ALL {
            for step in LockEscalationProtocol::steps(stage) {
                LockEscalationProtocol::check_step(held, *step).unwrap();
                held = Some(step.mode());
            }
        }
        assert_eq!(held, Some(LockMode::WaitCommit));
    }

    #[test]
    fn test_backward_and_duplicate_acquire_are_rejected() {
        let err = LockEscalationProtocol::check_step(
            Some(LockMode::WaitCommit),
            LockEscalationProtocol::BLOCK_DDL,
        )
        .unwrap_err();
        assert_eq!(
            err,
            BackupError::LadderViolation {
                from: LockMode::WaitCommit,
                to: LockMode::WaitDdl
            }
        );
        assert!(LockEscalationProtocol::check_step(
            Some(LockMode::Flush),
            LockEscalationProtocol::FLUSH
        )
        .is_err());
        assert!(LockEscalationProtocol::check_step(
            Some(LockMode::AlterCopy),
            LockEscalationProtocol::BLOCK_COMMIT
        )
        .is_err());
    }

    #[test]
    fn test_skipping_rungs_is_an_escalation() {
        assert!(LockEscalationProtocol::check_step(
            Some(LockMode::WaitFlush),
            LockEscalationProtocol::BLOCK_COMMIT
        )
        .is_ok());
    }

    #[test]
    fn test_lateral_move() {
        assert!(LockEscalationProtocol::check_lateral(LockMode::WaitDdl, LockMode::AlterCopy).is_ok());
        assert!(LockEscalationProtocol::check_lateral(LockMode::AlterCopy, LockMode::WaitDdl).is_ok());
        assert!(LockEscalationProtocol::check_lateral(LockMode::Flush, LockMode::AlterCopy).is_err());
    }
}
