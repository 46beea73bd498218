pub mod audit_event;
pub mod password_reset_token;
pub mod session;
pub mod user;

pub use audit_event::{AuditAction, AuditEvent, AuditStatus};
pub use password_reset_token::PasswordResetToken;
pub use session::Session;
pub use user::{Role, User, UserProfile};
