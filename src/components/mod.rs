//! Built-in component implementations.

pub mod mock;
