pub mod ai;
pub mod api;
pub mod config;
pub mod error;
pub mod security;
pub mod utils;

pub use error::{AuthError, CipherError};

// Crate version exposed for runtime queries
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
