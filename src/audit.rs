// Audit trail for privileged backup operations
// Every create/restore/download attempt, allowed or denied, is emitted under the `audit` target

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request_context::RequestContext;

/// Severity levels for structured log classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub who: String,
    pub action: String,
    pub target: Option<String>,
    pub context: Option<String>,
    pub severity: LogLevel,
}

impl AuditEvent {
    pub fn new(ctx: &RequestContext, action: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: ctx.request_id.clone(),
            timestamp: Utc::now(),
            who: ctx.principal.clone(),
            action: action.to_string(),
            target: None,
            context: None,
            severity: LogLevel::Info,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_severity(mut self, level: LogLevel) -> Self {
        self.severity = level;
        self
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    pub fn emit(&self) {
        let target = self.target.as_deref().unwrap_or("-");
        let context = self.context.as_deref().unwrap_or("");
        match self.severity {
            LogLevel::Info => tracing::info!(
                target: "audit",
                audit_id = %self.id,
                request_id = %self.request_id,
                who = %self.who,
                action = %self.action,
                archive = %target,
                "{context}"
            ),
            LogLevel::Warn => tracing::warn!(
                target: "audit",
                audit_id = %self.id,
                request_id = %self.request_id,
                who = %self.who,
                action = %self.action,
                archive = %target,
                "{context}"
            ),
            LogLevel::Error => tracing::error!(
                target: "audit",
                audit_id = %self.id,
                request_id = %self.request_id,
                who = %self.who,
                action = %self.action,
                archive = %target,
                "{context}"
            ),
        }
    }
}

/// Emit an audit event describing the outcome of `result` and pass it through.
pub fn audited<T, E: std::fmt::Display>(
    ctx: &RequestContext,
    action: &str,
    target: Option<&str>,
    result: Result<T, E>,
) -> Result<T, E> {
    let mut event = AuditEvent::new(ctx, action);
    if let Some(target) = target {
        event = event.with_target(target);
    }
    match &result {
        Ok(_) => event.with_context("allowed").emit(),
        Err(e) => event
            .with_severity(LogLevel::Warn)
            .with_context(format!("failed: {e}"))
            .emit(),
    }
    result
}
