//! Filesystem side of the tree: listing, filtering, the node store and the
//! expansion controller that ties them together.

pub mod access;
pub mod bookmark;
pub mod expander;
pub mod policy;
pub mod tree;
