//! Input nodes
//!
//! Nodes whose value comes from the user rather than from other nodes.

mod file_input;
mod number;
mod text_input;

pub use file_input::FileInputDefinition;
pub use number::NumberDefinition;
pub use text_input::TextInputDefinition;
