use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-subscription result of one reconciliation pass. Only used for reporting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    Unchanged,
    UpdatedNoAlert,
    UpdatedAlerted,
    AlertAttemptFailed,
    Failed,
}

impl ReconciliationOutcome {
    pub const ALL: [ReconciliationOutcome; 5] = [
        ReconciliationOutcome::Unchanged,
        ReconciliationOutcome::UpdatedNoAlert,
        ReconciliationOutcome::UpdatedAlerted,
        ReconciliationOutcome::AlertAttemptFailed,
        ReconciliationOutcome::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReconciliationOutcome::Unchanged => "unchanged",
            ReconciliationOutcome::UpdatedNoAlert => "updated_no_alert",
            ReconciliationOutcome::UpdatedAlerted => "updated_alerted",
            ReconciliationOutcome::AlertAttemptFailed => "alert_attempt_failed",
            ReconciliationOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for ReconciliationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
