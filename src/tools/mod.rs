//! Tool registry and selection (C10).

pub mod builtin;
pub mod registry;
pub mod selector;
