pub mod price;
pub mod run_config;
pub mod run_state;

// Re-exports for convenience
pub use price::*;
pub use run_config::*;
pub use run_state::*;
