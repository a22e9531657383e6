pub mod deck;
pub mod error;
pub mod find;
pub mod plan;

// Re-export common types for convenience
pub use deck::{Deck, ElementKind};
pub use error::{Error, ErrorCode, Result};
pub use plan::Plan;
