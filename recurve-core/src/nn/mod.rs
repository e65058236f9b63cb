//! Building blocks of the differentiation engine: shared weights,
//! computation nodes, composition trees and losses.

pub mod init;
pub mod losses;
pub mod node;
pub mod tree;
pub mod weight;

pub use node::Node;
pub use tree::CompositionTree;
pub use weight::{SharedWeight, WeightTensor};
