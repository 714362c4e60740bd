//! An AVL tree engine: a self-balancing binary search tree of unique keys
//! with recursive insert and delete, the four rotation cases, and pre-order
//! traversal.
//!
//! ```
//! use avl_engine::AvlTree;
//! let mut tree = AvlTree::new();
//! for key in 1..=7 {
//!     tree.insert(key).unwrap();
//! }
//! assert_eq!(tree.height(), 3);
//! tree.remove(&1);
//! assert_eq!(tree.len(), 6);
//! assert_eq!(tree.preorder().copied().collect::<Vec<_>>(), [4, 2, 3, 6, 5, 7]);
//! ```
//!
//! The [`shell`] module drives a tree of `i32` keys from a text menu.

mod error;
pub mod shell;
mod tree;

pub use error::Error;
pub use tree::{AvlTree, Preorder};
