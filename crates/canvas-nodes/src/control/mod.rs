//! Control flow nodes

mod conditional;

pub use conditional::ConditionalDefinition;
