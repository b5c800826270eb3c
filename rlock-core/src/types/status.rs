use serde::{Deserialize, Serialize};

/// Reply status of every lock RPC, in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LockStatus {
    /// Granted or acknowledged
    Ok,
    /// Not granted yet; wait for a retry callback before asking again
    Retry,
    /// The server could not reach a party it needed
    IoErr,
}

impl LockStatus {
    pub fn is_ok(self) -> bool {
        self == LockStatus::Ok
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockStatus::Ok => write!(f, "OK"),
            LockStatus::Retry => write!(f, "RETRY"),
            LockStatus::IoErr => write!(f, "IOERR"),
        }
    }
}
