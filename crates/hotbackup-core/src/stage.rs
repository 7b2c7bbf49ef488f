//! Backup stages.
//!
//! Two views of the same ladder live here:
//!
//! - [`Stage`] is the internal, totally ordered state of a session:
//!   `Finished < Start < Flush < WaitForFlush < LockCommit < End`.
//! - [`BackupStageName`] is the externally visible command vocabulary
//!   (`START`, `FLUSH`, `BLOCK_DDL`, `BLOCK_COMMIT`, `END`).
//!
//! `Finished` is both "no backup active" and "backup concluded". It is never
//! requestable from outside, which is why it has no [`BackupStageName`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::BackupError;

/// Internal backup stage of a session.
///
/// The derived ordering follows declaration order and is the ordering the
/// stage runner enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// No backup active (initial and terminal state).
    Finished,
    /// Backup slot acquired, storage engines prepared.
    Start,
    /// Backup ticket acquired in `FLUSH` mode.
    Flush,
    /// In-flight non-transactional writers drained, new DDL blocked.
    WaitForFlush,
    /// Commits blocked.
    LockCommit,
    /// Backup finalized; the session returns to `Finished`.
    End,
}

impl Stage {
    /// Every stage, in ladder order.
    pub const ALL: [Stage; 6] = [
        Stage::Finished,
        Stage::Start,
        Stage::Flush,
        Stage::WaitForFlush,
        Stage::LockCommit,
        Stage::End,
    ];

    /// The stage immediately after this one, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Finished => Some(Stage::Start),
            Stage::Start => Some(Stage::Flush),
            Stage::Flush => Some(Stage::WaitForFlush),
            Stage::WaitForFlush => Some(Stage::LockCommit),
            Stage::LockCommit => Some(Stage::End),
            Stage::End => None,
        }
    }

    /// Whether a backup is in progress for a session at this stage.
    pub fn is_active(self) -> bool {
        self != Stage::Finished
    }

    /// Name used in user-facing messages.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Finished => "FINISHED",
            Stage::Start => "START",
            Stage::Flush => "FLUSH",
            Stage::WaitForFlush => "BLOCK_DDL",
            Stage::LockCommit => "BLOCK_COMMIT",
            Stage::End => "END",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stage names accepted from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStageName {
    /// `START`
    Start,
    /// `FLUSH`
    Flush,
    /// `BLOCK_DDL`
    BlockDdl,
    /// `BLOCK_COMMIT`
    BlockCommit,
    /// `END`
    End,
}

impl BackupStageName {
    /// The external ladder, in order.
    pub const ALL: [BackupStageName; 5] = [
        BackupStageName::Start,
        BackupStageName::Flush,
        BackupStageName::BlockDdl,
        BackupStageName::BlockCommit,
        BackupStageName::End,
    ];

    /// Canonical spelling.
    pub fn as_str(self) -> &'static str {
        self.stage().name()
    }

    /// Internal stage this name drives the session to.
    pub fn stage(self) -> Stage {
        match self {
            BackupStageName::Start => Stage::Start,
            BackupStageName::Flush => Stage::Flush,
            BackupStageName::BlockDdl => Stage::WaitForFlush,
            BackupStageName::BlockCommit => Stage::LockCommit,
            BackupStageName::End => Stage::End,
        }
    }
}

impl From<BackupStageName> for Stage {
    fn from(name: BackupStageName) -> Self {
        name.stage()
    }
}

impl fmt::Display for BackupStageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupStageName {
    type Err = BackupError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        BackupStageName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| BackupError::UnknownStage {
                name: trimmed.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        assert!(Stage::Finished < Stage::Start);
        assert!(Stage::Start < Stage::Flush);
        assert!(Stage::Flush < Stage::WaitForFlush);
        assert!(Stage::WaitForFlush < Stage::LockCommit);
        assert!(Stage::LockCommit < Stage::End);

        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL);
    }

    #[test]
    fn test_next_walks_the_ladder() {
        let mut walked = vec![Stage::Finished];
        while let Some(next) = walked.last().and_then(|s| s.next()) {
            walked.push(next);
        }
        assert_eq!(walked, Stage::ALL.to_vec());
    }

    #[test]
    fn test_external_names_map_to_internal_stages() {
        assert_eq!(Stage::from(BackupStageName::BlockDdl), Stage::WaitForFlush);
        assert_eq!(Stage::from(BackupStageName::BlockCommit), Stage::LockCommit);
        assert_eq!(BackupStageName::BlockDdl.to_string(), "BLOCK_DDL");
        assert_eq!(Stage::Finished.to_string(), "FINISHED");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "block_commit".parse::<BackupStageName>().ok(),
            Some(BackupStageName::BlockCommit)
        );
        assert_eq!(
            " Start ".parse::<BackupStageName>().ok(),
            Some(BackupStageName::Start)
        );
    }

    #[test]
    fn test_parse_rejects_internal_and_unknown_names() {
        for name in ["FINISHED", "WAIT_FOR_FLUSH", "", "STOP"] {
            let err = name.parse::<BackupStageName>().unwrap_err();
            assert!(matches!(err, BackupError::UnknownStage { .. }), "{name}");
        }
    }
}
