//! Core business logic for plaza.

pub mod services;

pub use services::*;
