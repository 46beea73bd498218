//! First-run admin account.

use secrecy::ExposeSecret;
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    config::BootstrapAdminConfig,
    models::{AuditAction, AuditEvent, Role, User},
    services::AuditRecorder,
    store::UserStore,
    utils::{hash_password, Password},
};

/// Create the configured admin unless a user with that username already
/// exists. Returns the new user id, or `None` when nothing was created.
pub async fn ensure_bootstrap_admin(
    users: &dyn UserStore,
    audit: &AuditRecorder,
    admin: &BootstrapAdminConfig,
) -> Result<Option<Uuid>, AppError> {
    if users.find_user_by_username(&admin.username).await?.is_some() {
        tracing::debug!(username = %admin.username, "Bootstrap admin already present");
        return Ok(None);
    }

    let hash = hash_password(&Password::new(admin.password.expose_secret().clone()))?;
    let user = User::new(
        admin.username.clone(),
        admin.email.clone(),
        hash.into_string(),
        None,
        Role::Admin,
    );
    users.insert_user(&user).await?;

    audit
        .record(
            AuditEvent::success(AuditAction::ResourceCreate)
                .with_user(user.user_id)
                .with_resource("user", user.user_id)
                .with_details(serde_json::json!({ "bootstrap": true, "role": "admin" })),
        )
        .await;

    tracing::info!(user_id = %user.user_id, username = %user.username, "Bootstrap admin created");
    Ok(Some(user.user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::MemoryStore, utils::verify_password, utils::PasswordHashString};
    use secrecy::Secret;
    use service_core::utils::SystemClock;
    use std::sync::Arc;

    fn admin_config() -> BootstrapAdminConfig {
        BootstrapAdminConfig {
            username: "root".to_string(),
            email: "root@school.example".to_string(),
            password: Secret::new("bootstrap-pass-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_creates_admin_once() {
        let store = Arc::new(MemoryStore::new());
        let audit = AuditRecorder::new(store.clone(), Arc::new(SystemClock));

        let first = ensure_bootstrap_admin(store.as_ref(), &audit, &admin_config())
            .await
            .unwrap();
        let user_id = first.expect("admin created");

        let second = ensure_bootstrap_admin(store.as_ref(), &audit, &admin_config())
            .await
            .unwrap();
        assert!(second.is_none());

        let user = store.find_user_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.role, Role::Admin);
        assert!(user.is_active);
        assert!(verify_password(
            &Password::new("bootstrap-pass-1".to_string()),
            &PasswordHashString::new(user.password_hash),
        ));

        let events = store.audit_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::ResourceCreate);
    }
}
