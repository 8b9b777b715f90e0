pub mod alert;
pub mod auth;
pub mod config;
pub mod interfaces;
pub mod lifecycle;
pub mod security;
