use crate::errors::{BackupError, BackupResult};
use crate::loa::{BackupAccess, LOA};
use uuid::Uuid;

/// Per-call caller context threaded into every engine operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub principal: String,
    pub loa: LOA,
}

impl RequestContext {
    pub fn new(principal: &str, loa: LOA) -> Self {
        RequestContext {
            request_id: Uuid::new_v4().to_string(),
            principal: principal.to_string(),
            loa,
        }
    }

    /// Fails with a permission error unless the caller holds the backup role.
    pub fn require_backup_manager(&self) -> BackupResult<()> {
        if !self.loa.can_manage_backups() {
            return Err(BackupError::permission(format!(
                "{} ({}) is not permitted to manage backups",
                self.principal, self.loa
            )));
        }
        Ok(())
    }

    pub fn require_archive_write(&self, archive: &str) -> BackupResult<()> {
        if !self.loa.can_write_archive() {
            return Err(BackupError::permission(format!(
                "{} ({}) may not modify archive {archive}",
                self.principal, self.loa
            )));
        }
        Ok(())
    }

    pub fn summary_string(&self) -> String {
        format!("{}@{} [{}]", self.principal, self.loa, self.request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_is_rejected() {
        let ctx = RequestContext::new("ops@example.com", LOA::Operator);
        let err = ctx.require_backup_manager().unwrap_err();
        assert!(matches!(err, BackupError::Permission { .. }));
    }

    #[test]
    fn root_is_accepted() {
        let ctx = RequestContext::new("Administrator", LOA::Root);
        assert!(ctx.require_backup_manager().is_ok());
        assert!(ctx.require_archive_write("ARCH-1").is_ok());
        assert!(ctx.summary_string().starts_with("Administrator@Root"));
    }
}
