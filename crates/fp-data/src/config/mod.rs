//! Data-level configuration

pub mod missing;

pub use missing::*;
