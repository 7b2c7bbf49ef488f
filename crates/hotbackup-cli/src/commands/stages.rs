// Stage ladder listing

use hotbackup_core::BackupStageName;
use hotbackup_stage::LockEscalationProtocol;

/// Print every requestable stage with the backup lock mode it leaves.
pub fn list() {
    println!("{:<14} {}", "STAGE", "BACKUP LOCK AFTER");
    for stage in BackupStageName::ALL {
        let mode = LockEscalationProtocol::mode_after(stage.stage())
            .map_or_else(|| "-".to_string(), |mode| mode.to_string());
        println!("{:<14} {mode}", stage.as_str());
    }
}
