use serde::{Deserialize, Serialize};

/// Status of one participant inside one saga transaction.
///
/// Stored as a short code (`U`, `S`, `F`, `R`, `RF`, `D`) so the log stays
/// compact and readable from SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Forward action requested, no outcome yet.
    Pending,
    /// Forward action succeeded.
    Success,
    /// Forward action failed or was declined.
    Failed,
    /// Compensating action succeeded.
    RolledBack,
    /// Compensating action failed; needs manual intervention.
    RollbackFailed,
    /// Closed out after the saga was compensated.
    Done,
}

impl TransactionStatus {
    /// Storage code for this status.
    pub fn code(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "U",
            TransactionStatus::Success => "S",
            TransactionStatus::Failed => "F",
            TransactionStatus::RolledBack => "R",
            TransactionStatus::RollbackFailed => "RF",
            TransactionStatus::Done => "D",
        }
    }

    /// Parses a storage code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "U" => Some(TransactionStatus::Pending),
            "S" => Some(TransactionStatus::Success),
            "F" => Some(TransactionStatus::Failed),
            "R" => Some(TransactionStatus::RolledBack),
            "RF" => Some(TransactionStatus::RollbackFailed),
            "D" => Some(TransactionStatus::Done),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TransactionStatus::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransactionStatus::Success)
    }

    /// Failed either on the forward or on the compensating path.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Failed | TransactionStatus::RollbackFailed
        )
    }

    /// No further action will ever be taken for this service.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::RolledBack
                | TransactionStatus::RollbackFailed
                | TransactionStatus::Done
        )
    }

    /// A later row with this status means the service is no longer waiting
    /// on its forward action.
    pub fn resolves_pending(&self) -> bool {
        matches!(self, TransactionStatus::Success) || self.is_terminal()
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::RolledBack => "ROLLED_BACK",
            TransactionStatus::RollbackFailed => "ROLLBACK_FAILED",
            TransactionStatus::Done => "DONE",
        };
        f.write_str(s)
    }
}
