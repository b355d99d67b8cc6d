//! Factories for common resource kinds

pub mod database;
pub mod generic;
pub mod http;
