//! Audit event model - append-only security trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed vocabulary of audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    LoginSuccess,
    LoginFailure,
    Logout,
    PasswordChange,
    PasswordResetRequest,
    PasswordResetSuccess,
    PermissionChange,
    ResourceCreate,
    ResourceUpdate,
    ResourceDelete,
    SessionCreate,
    SessionDestroy,
    TokenRefresh,
    UnauthorizedAccess,
    RateLimitExceeded,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSuccess => "login_success",
            AuditAction::LoginFailure => "login_failure",
            AuditAction::Logout => "logout",
            AuditAction::PasswordChange => "password_change",
            AuditAction::PasswordResetRequest => "password_reset_request",
            AuditAction::PasswordResetSuccess => "password_reset_success",
            AuditAction::PermissionChange => "permission_change",
            AuditAction::ResourceCreate => "resource_create",
            AuditAction::ResourceUpdate => "resource_update",
            AuditAction::ResourceDelete => "resource_delete",
            AuditAction::SessionCreate => "session_create",
            AuditAction::SessionDestroy => "session_destroy",
            AuditAction::TokenRefresh => "token_refresh",
            AuditAction::UnauthorizedAccess => "unauthorized_access",
            AuditAction::RateLimitExceeded => "rate_limit_exceeded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failure => "failure",
            AuditStatus::Error => "error",
        }
    }
}

/// Audit event entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<serde_json::Value>,
    pub status: AuditStatus,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, status: AuditStatus) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id: None,
            action,
            resource_type: None,
            resource_id: None,
            ip_address: None,
            user_agent: None,
            details: None,
            status,
            created_utc: Utc::now(),
        }
    }

    pub fn success(action: AuditAction) -> Self {
        Self::new(action, AuditStatus::Success)
    }

    pub fn failure(action: AuditAction) -> Self {
        Self::new(action, AuditStatus::Failure)
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_resource(mut self, resource_type: &str, resource_id: impl ToString) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn at(mut self, created_utc: DateTime<Utc>) -> Self {
        self.created_utc = created_utc;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_codes_match_serde_names() {
        for action in [
            AuditAction::LoginSuccess,
            AuditAction::PasswordResetRequest,
            AuditAction::RateLimitExceeded,
            AuditAction::UnauthorizedAccess,
        ] {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, serde_json::Value::String(action.as_str().to_string()));
        }
    }

    #[test]
    fn test_builder_fills_context() {
        let user_id = Uuid::new_v4();
        let event = AuditEvent::failure(AuditAction::LoginFailure)
            .with_user(user_id)
            .with_resource("session", "abc")
            .with_client(Some("10.0.0.1".to_string()), None)
            .with_details(serde_json::json!({ "reason": "bad_password" }));

        assert_eq!(event.user_id, Some(user_id));
        assert_eq!(event.status, AuditStatus::Failure);
        assert_eq!(event.resource_id.as_deref(), Some("abc"));
        assert_eq!(event.details.unwrap()["reason"], "bad_password");
    }
}
