pub mod cache;
pub mod common;
pub mod passes;
pub mod patch;
pub mod types;
