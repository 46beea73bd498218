//! HTTP handlers for the trust service.

pub mod admin;
pub mod auth;
