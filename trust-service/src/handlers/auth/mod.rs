pub mod cookies;
pub mod csrf;
pub mod password;
pub mod session;

pub use csrf::issue_csrf_token;
pub use password::{
    change_password, confirm_password_reset, request_password_reset, reset_token_status,
};
pub use session::{login, logout, refresh, verify};
