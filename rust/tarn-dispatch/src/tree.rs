//! Dispatch trees: one per function name, with edges labelled by the type
//! accepted at each argument position.

use crate::signature::{Argument, TUPLE};
use crate::table::{Function, FunctionTable};
use crate::type_system::TypeSystem;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tarn_core::diagnostics::Token;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("overloads of '{name}' disagree on reference parameters: expected {expected}, found {found} at {token}")]
    RefPrefix {
        name: String,
        expected: usize,
        found: usize,
        token: Token,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FnTreeNode {
    pub function: Option<Function>,
    pub branches: Vec<TypeNodePair>,
}

/// An edge of the tree. Bling edges are labelled by their keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNodePair {
    pub label: String,
    pub bling: bool,
    pub node: FnTreeNode,
}

impl TypeNodePair {
    fn accepts(&self, arg: &Argument, ts: &TypeSystem) -> bool {
        if self.bling {
            return arg.bling.as_deref() == Some(self.label.as_str());
        }
        if arg.bling.is_some() {
            return false;
        }
        ts.is_same_type_or_subtype(&arg.ty, &self.label)
    }

    fn is_tuple(&self) -> bool {
        !self.bling && self.label == TUPLE
    }
}

impl FnTreeNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `f` from signature position `pos` onward.
    pub fn add_sig(&mut self, f: &Function, pos: usize, ts: &TypeSystem) {
        let params = f.sig.params();
        let Some(param) = params.get(pos) else {
            // A leaf already here belongs to a more specific overload.
            if self.function.is_none() {
                self.function = Some(f.clone());
            }
            return;
        };
        let label = param.tree_label();
        let bling = param.is_bling();
        if !self.branches.iter().any(|b| b.label == label && b.bling == bling) {
            self.branches.push(TypeNodePair {
                label: label.to_string(),
                bling,
                node: FnTreeNode::new(),
            });
        }
        for branch in &mut self.branches {
            let reachable = if branch.bling || bling {
                branch.bling == bling && branch.label == label
            } else {
                ts.is_same_type_or_subtype(&branch.label, label)
            };
            if !reachable {
                continue;
            }
            branch.node.add_sig(f, pos + 1, ts);
            if !bling && label == TUPLE && !branch.is_tuple() {
                branch.node.add_sig(f, pos, ts);
            }
        }
    }

    /// The most specific overload accepting `args`, if any.
    pub fn resolve(&self, args: &[Argument], ts: &TypeSystem) -> Option<&Function> {
        self.resolve_from(args, 0, ts)
    }

    fn resolve_from(&self, args: &[Argument], pos: usize, ts: &TypeSystem) -> Option<&Function> {
        if pos == args.len() {
            if let Some(f) = &self.function {
                return Some(f);
            }
            // A trailing tuple may be empty.
            return self
                .branches
                .iter()
                .filter(|b| b.is_tuple())
                .find_map(|b| b.node.function.as_ref());
        }
        for branch in &self.branches {
            if !branch.accepts(&args[pos], ts) {
                continue;
            }
            if branch.is_tuple() {
                // A tuple position swallows one or more arguments.
                let found = (pos + 1..=args.len()).find_map(|end| branch.node.resolve_from(args, end, ts));
                if found.is_some() {
                    return found;
                }
            } else if let Some(f) = branch.node.resolve_from(args, pos + 1, ts) {
                return Some(f);
            }
        }
        None
    }

    /// Indented outline of the tree, one edge per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.write_outline(&mut out, "");
        out
    }

    fn write_outline(&self, out: &mut String, indent: &str) {
        for branch in &self.branches {
            let _ = write!(out, "\n{indent}{}", branch.label);
            if let Some(f) = &branch.node.function {
                let _ = write!(out, " -> {}{}", f.name, f.sig);
            }
            branch.node.write_outline(out, &format!("{indent}    "));
        }
    }
}

/// The dispatch tree for one name, with the shared count of leading
/// reference parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionGroup {
    pub tree: FnTreeNode,
    pub ref_count: usize,
}

impl FunctionGroup {
    pub fn resolve(&self, args: &[Argument], ts: &TypeSystem) -> Option<&Function> {
        self.tree.resolve(args, ts)
    }
}

/// Builds a dispatch tree for every name in the table. Overloads of one name
/// must all start with the same number of `ref` parameters.
pub fn make_function_trees(
    table: &FunctionTable,
    ts: &TypeSystem,
) -> Result<BTreeMap<String, FunctionGroup>, BuildError> {
    let mut groups = BTreeMap::new();
    for (name, overloads) in table.iter() {
        let mut tree = FnTreeNode::new();
        let ref_count = overloads.first().map(|f| f.sig.ref_count()).unwrap_or(0);
        for f in overloads {
            let found = f.sig.ref_count();
            if found != ref_count {
                return Err(BuildError::RefPrefix {
                    name: name.clone(),
                    expected: ref_count,
                    found,
                    token: f.token.clone(),
                });
            }
            tree.add_sig(f, 0, ts);
        }
        debug!(name = %name, overloads = overloads.len(), ref_count, "built dispatch tree");
        groups.insert(name.clone(), FunctionGroup { tree, ref_count });
    }
    Ok(groups)
}
