//! Generic utility primitives with zero domain knowledge.
//!
//! - `io` - File I/O with consistent error handling
//! - `numeric` - Lenient integer and real parsing
//! - `ranges` - Compressing integer sets into contiguous ranges

pub mod io;
pub mod numeric;
pub mod ranges;
