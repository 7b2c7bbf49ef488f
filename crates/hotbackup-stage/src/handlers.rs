//! Stage handlers.
//!
//! One handler per stage, looked up through [`StageHandler::for_stage`]. A
//! handler runs with the session already moved to its stage, except `START`,
//! which moves the session only once it holds the backup slot. Sequencing and
//! error wrapping belong to the [`StageRunner`](crate::runner::StageRunner).

use hotbackup_core::effects::{FlushScope, LockManagerEffects, TableCacheEffects};
use hotbackup_core::{BackupConfig, BackupError, LockRequest, Stage};

use crate::coordinator::BackupCoordinator;
use crate::engines::StorageEngineRegistry;
use crate::policy::{self, FlushFailureContext};
use crate::protocol::{LockEscalationProtocol, LockStep};
use crate::session::BackupSession;

/// Everything a handler may touch while running one stage.
pub(crate) struct StageContext<'a> {
    pub session: &'a mut BackupSession,
    pub coordinator: &'a BackupCoordinator,
    pub locks: &'a dyn LockManagerEffects,
    pub engines: &'a StorageEngineRegistry,
    pub tables: &'a dyn TableCacheEffects,
    pub config: &'a BackupConfig,
}

/// Handler table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageHandler {
    /// Take the backup slot and notify storage engines.
    Start,
    /// Block new writes to non-transactional tables.
    Flush,
    /// Wait for in-flight writers, then block DDL.
    BlockDdl,
    /// Block commits.
    BlockCommit,
    /// Release everything and free the slot.
    End,
}

impl StageHandler {
    /// Handler for `stage`. `FINISHED` has none.
    pub fn for_stage(stage: Stage) -> Option<Self> {
        match stage {
            Stage::Finished => None,
            Stage::Start => Some(Self::Start),
            Stage::Flush => Some(Self::Flush),
            Stage::WaitForFlush => Some(Self::BlockDdl),
            Stage::LockCommit => Some(Self::BlockCommit),
            Stage::End => Some(Self::End),
        }
    }

    pub(crate) async fn run(self, ctx: &mut StageContext<'_>) -> Result<(), BackupError> {
        match self {
            Self::Start => start(ctx).await,
            Self::Flush => flush(ctx).await,
            Self::BlockDdl => block_ddl(ctx).await,
            Self::BlockCommit => block_commit(ctx).await,
            Self::End => {
                end(ctx).await;
                Ok(())
            }
        }
    }
}

async fn start(ctx: &mut StageContext<'_>) -> Result<(), BackupError> {
    if ctx.session.read_only_protection() {
        return Err(BackupError::ReadOnlyProtection);
    }
    if ctx.session.locked_tables_mode() {
        return Err(BackupError::LockOrActiveTransaction);
    }

    let cancel = ctx.session.cancellation();
    ctx.coordinator
        .try_begin(ctx.session.id(), cancel.as_ref(), ctx.config.start_wait_timeout())
        .await?;
    ctx.session.set_current_stage(Stage::Start);

    ctx.engines.prepare_for_backup_all().await;
    Ok(())
}

async fn flush(ctx: &mut StageContext<'_>) -> Result<(), BackupError> {
    let step = LockEscalationProtocol::FLUSH;
    LockEscalationProtocol::check_step(ctx.session.backup_ticket_mode(), step)?;

    let cancel = ctx.session.cancellation();
    let ticket = ctx
        .locks
        .acquire(
            LockRequest::backup(step.mode()),
            ctx.session.lock_wait_timeout(),
            cancel.as_ref(),
        )
        .await?;

    ctx.coordinator
        .register_flush_ticket(ctx.session.id(), ticket.id());
    tracing::debug!(session = %ctx.session.id(), ticket = %ticket.id(), "backup ticket acquired");
    ctx.session.set_backup_ticket(ticket);

    // Best effort.
    if let Err(err) = ctx.tables.purge_unused_tables().await {
        tracing::warn!(session = %ctx.session.id(), error = %err, "purging unused tables failed");
    }
    Ok(())
}

async fn block_ddl(ctx: &mut StageContext<'_>) -> Result<(), BackupError> {
    escalate(ctx, LockEscalationProtocol::WAIT_FOR_WRITERS).await?;

    if let Err(err) = ctx.tables.flush_tables(FlushScope::NonTransactional).await {
        if err.raised_session_error() {
            ctx.session.diagnostics_mut().raise(err.to_string());
        }
        let failure = FlushFailureContext {
            scope: FlushScope::NonTransactional,
            session_error_raised: ctx.session.diagnostics().has_error(),
        };
        if policy::is_fatal(ctx.config.flush_failure_policy, failure) {
            return Err(err.into());
        }
        tracing::warn!(
            session = %ctx.session.id(),
            error = %err,
            "flushing non-transactional tables failed; continuing"
        );
    }

    escalate(ctx, LockEscalationProtocol::BLOCK_DDL).await
}

async fn block_commit(ctx: &mut StageContext<'_>) -> Result<(), BackupError> {
    escalate(ctx, LockEscalationProtocol::BLOCK_COMMIT).await?;

    // Statistics and log tables may still be written; a failed flush only
    // leaves them marked as not closed.
    if let Err(err) = ctx.tables.flush_tables(FlushScope::SystemAndLog).await {
        tracing::warn!(
            session = %ctx.session.id(),
            error = %err,
            "flushing system and log tables failed; continuing"
        );
    }
    Ok(())
}

/// Tear down the session's backup. Never fails.
pub(crate) async fn end(ctx: &mut StageContext<'_>) {
    if ctx.session.current_stage() == Stage::Finished {
        return;
    }
    ctx.session.set_current_stage(Stage::Finished);

    let session = ctx.session.id();
    if let Some(ticket) = ctx.session.take_backup_ticket() {
        ctx.coordinator
            .release_flush_ticket(session, ticket, ctx.locks);
    }
    ctx.engines.end_backup_all().await;
    ctx.coordinator.end(session, None, ctx.locks);
}

async fn escalate(ctx: &mut StageContext<'_>, step: LockStep) -> Result<(), BackupError> {
    let stage = ctx.session.current_stage();
    LockEscalationProtocol::check_step(ctx.session.backup_ticket_mode(), step)?;

    let timeout = ctx.session.lock_wait_timeout();
    let cancel = ctx.session.cancellation();
    let session = ctx.session.id();
    let ticket = ctx
        .session
        .backup_ticket_mut()
        .ok_or(BackupError::MissingTicket { stage })?;

    ctx.locks
        .upgrade(ticket, step.mode(), timeout, cancel.as_ref())
        .await?;
    tracing::debug!(session = %session, mode = %step.mode(), "backup ticket upgraded");
    Ok(())
}
