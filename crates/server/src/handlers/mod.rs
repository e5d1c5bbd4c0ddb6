//! HTTP request handlers.

pub mod admin;
pub mod uploads;

pub use admin::*;
pub use uploads::*;
