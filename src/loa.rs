use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Level of access granted to the caller by the host platform.
///
/// `Root` is the platform's "System Manager" role and is the only level
/// allowed to touch backups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LOA {
    Guest,
    Observer,
    Operator,
    Root,
}

impl FromStr for LOA {
    type Err = ();

    fn from_str(input: &str) -> Result<LOA, Self::Err> {
        match input.to_lowercase().as_str() {
            "guest" => Ok(LOA::Guest),
            "observer" => Ok(LOA::Observer),
            "operator" => Ok(LOA::Operator),
            "root" | "system manager" | "system_manager" => Ok(LOA::Root),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LOA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Capability gate consulted before every backup operation.
pub trait BackupAccess {
    fn can_manage_backups(&self) -> bool;

    /// Write permission on an existing archive record (restore flips its status).
    fn can_write_archive(&self) -> bool {
        self.can_manage_backups()
    }
}

impl BackupAccess for LOA {
    fn can_manage_backups(&self) -> bool {
        matches!(self, LOA::Root)
    }
}
