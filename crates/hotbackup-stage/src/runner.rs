//! Stage sequencing.
//!
//! A request names a target stage. The runner validates it against the
//! session's current stage, computes the stages still to run and runs their
//! handlers in order, stopping at the first failure.

use hotbackup_core::{BackupError, Stage};

use crate::handlers::{StageContext, StageHandler};

/// Per-session stage state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageRunner;

impl StageRunner {
    /// Stages to run to get from `current` to `target`.
    ///
    /// Intermediate stages are backfilled, except that `END` always runs
    /// alone.
    pub fn plan(current: Stage, target: Stage) -> Result<Vec<Stage>, BackupError> {
        if current == Stage::Finished {
            return if target == Stage::Start {
                Ok(vec![Stage::Start])
            } else {
                Err(BackupError::NotRunning)
            };
        }
        if target == Stage::End {
            return Ok(vec![Stage::End]);
        }
        if target <= current {
            return Err(BackupError::WrongStage {
                requested: target,
                current,
            });
        }

        let mut stages = Vec::new();
        let mut next = current.next();
        while let Some(stage) = next {
            stages.push(stage);
            if stage == target {
                break;
            }
            next = stage.next();
        }
        Ok(stages)
    }

    /// Move the session to `target`, running every handler on the way.
    ///
    /// Failures are reported as [`BackupError::StageFailed`] naming `target`.
    /// The session stays at the stage that failed, unless that was `START`,
    /// which leaves no backup behind. A `START` dropped while it waits for the
    /// slot likewise leaves the session `FINISHED`.
    pub(crate) async fn advance(
        ctx: &mut StageContext<'_>,
        target: Stage,
    ) -> Result<(), BackupError> {
        let session = ctx.session.id();
        let plan = Self::plan(ctx.session.current_stage(), target)?;

        for stage in plan {
            let Some(handler) = StageHandler::for_stage(stage) else {
                continue;
            };
            tracing::debug!(session = %session, stage = %stage, "running backup stage");
            // START moves the session itself once it holds the backup slot.
            if stage != Stage::Start {
                ctx.session.set_current_stage(stage);
            }

            if let Err(err) = handler.run(ctx).await {
                if stage == Stage::Start {
                    ctx.session.set_current_stage(Stage::Finished);
                }
                tracing::warn!(
                    session = %session,
                    stage = %stage,
                    requested = %target,
                    error = %err,
                    "backup stage failed"
                );
                return Err(BackupError::stage_failed(target, err));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_start_from_finished() {
        assert_eq!(
            StageRunner::plan(Stage::Finished, Stage::Start).unwrap(),
            vec![Stage::Start]
        );
        for target in [Stage::Flush, Stage::WaitForFlush, Stage::LockCommit, Stage::End] {
            assert_eq!(
                StageRunner::plan(Stage::Finished, target),
                Err(BackupError::NotRunning)
            );
        }
    }

    #[test]
    fn test_backfills_intermediate_stages() {
        assert_eq!(
            StageRunner::plan(Stage::Start, Stage::LockCommit).unwrap(),
            vec![Stage::Flush, Stage::WaitForFlush, Stage::LockCommit]
        );
        assert_eq!(
            StageRunner::plan(Stage::Flush, Stage::WaitForFlush).unwrap(),
            vec![Stage::WaitForFlush]
        );
    }

    #[test]
    fn test_end_runs_alone() {
        for current in [Stage::Start, Stage::Flush, Stage::WaitForFlush, Stage::LockCommit] {
            assert_eq!(StageRunner::plan(current, Stage::End).unwrap(), vec![Stage::End]);
        }
    }

    #[test]
    fn test_same_or_earlier_stage_is_wrong() {
        assert_eq!(
            StageRunner::plan(Stage::Flush, Stage::Flush),
            Err(BackupError::WrongStage {
                requested: Stage::Flush,
                current: Stage::Flush
            })
        );
        assert_eq!(
            StageRunner::plan(Stage::LockCommit, Stage::Start),
            Err(BackupError::WrongStage {
                requested: Stage::Start,
                current: Stage::LockCommit
            })
        );
    }
}
