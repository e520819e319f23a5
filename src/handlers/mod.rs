//! HTTP request handlers.

pub mod auth;
pub mod companies;
pub mod finances;
pub mod health;
pub mod images;
pub mod members;
pub mod properties;
