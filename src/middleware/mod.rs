pub mod auth_guard;
pub mod error_detail;
pub mod role_guard;
