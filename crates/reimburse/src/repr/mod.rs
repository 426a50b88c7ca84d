//! Model representations.

mod tree;

pub use tree::{MutableTree, NodeId, Tree, TreeValidationError};
