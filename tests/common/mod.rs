#![allow(dead_code)]

// Test utilities and common setup
pub mod builders;
pub mod fixtures;

pub use builders::*;
pub use fixtures::*;
