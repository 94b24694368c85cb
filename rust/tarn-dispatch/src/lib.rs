//! Tarn Dispatch
//!
//! Overload tables, signature matching, and the per-name dispatch trees the
//! compiler walks to pick the most specific overload for a call.

pub mod signature;
pub mod table;
pub mod tree;
pub mod type_system;

pub use signature::{Argument, Parameter, Signature};
pub use table::{params_fit_sig, Function, FunctionTable, ResolveError};
pub use tree::{make_function_trees, BuildError, FnTreeNode, FunctionGroup, TypeNodePair};
pub use type_system::TypeSystem;
