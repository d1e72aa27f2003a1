//! Numeric kernels for the RWKV recurrent evaluator.
//!
//! Everything here works on single vectors: the model evaluates one token at
//! a time, so the hot path is matrix·vector rather than matrix·matrix.

pub mod config;
pub mod layernorm;
pub mod matvec;
pub mod utils;

pub use config::*;
pub use layernorm::*;
pub use matvec::*;
pub use utils::*;
