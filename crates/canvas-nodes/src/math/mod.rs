//! Math nodes

mod arithmetic;

pub use arithmetic::ArithmeticDefinition;
