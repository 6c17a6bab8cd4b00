// Common test utilities
#![allow(dead_code)]

pub mod engine;
pub mod fixtures;
pub mod harness;

pub use engine::*;
pub use fixtures::*;
pub use harness::*;
