//! rwkvforge generation driver and command line.

pub mod cli;
pub mod generation;

pub use cli::*;
pub use generation::*;
