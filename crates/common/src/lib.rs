//! Common utilities and shared types for plaza.
//!
//! This crate provides foundational components used across all plaza crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: Monotonic ULID identifiers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use plaza_common::{AppResult, Config, IdGenerator};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate()?;
//!     println!("Listening on {} with new ID {}", config.server.port, id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::{IdGenerator, normalize_id};
