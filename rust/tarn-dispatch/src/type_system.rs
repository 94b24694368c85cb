//! Named type graph used for subtype tests during overload resolution.

use crate::signature::{ANY, TUPLE};
use std::collections::{BTreeSet, HashMap, VecDeque};

const ANY_OR_NULL: &str = "any?";

const BUILTIN_SINGLES: [&str; 12] = [
    "int", "bool", "string", "rune", "float", "type", "func", "pair", "list", "map", "set", "label",
];

/// Maps each type name to the names it directly points to.
#[derive(Debug, Clone, Default)]
pub struct TypeSystem {
    supertypes: HashMap<String, BTreeSet<String>>,
}

impl TypeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in hierarchy: every single native type is an `any`, and
    /// `any` and `null` are both `any?`.
    pub fn with_builtins() -> Self {
        let mut ts = Self::new();
        for t in BUILTIN_SINGLES {
            ts.add(t, ANY);
        }
        ts.add(ANY, ANY_OR_NULL);
        ts.add("null", ANY_OR_NULL);
        ts
    }

    pub fn add(&mut self, sub: &str, sup: &str) {
        self.supertypes
            .entry(sub.to_string())
            .or_default()
            .insert(sup.to_string());
    }

    /// Declares a user type, which is an `any` plus any extra supertypes.
    pub fn add_user_type(&mut self, name: &str, also: &[&str]) {
        self.add(name, ANY);
        for sup in also {
            self.add(name, sup);
        }
    }

    /// Whether `sup` is reachable from `sub` by following supertype edges.
    pub fn points_to(&self, sub: &str, sup: &str) -> bool {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([sub]);
        while let Some(t) = queue.pop_front() {
            let Some(parents) = self.supertypes.get(t) else {
                continue;
            };
            for p in parents {
                if p == sup {
                    return true;
                }
                if seen.insert(p.as_str()) {
                    queue.push_back(p);
                }
            }
        }
        false
    }

    /// A `tuple` position accepts anything, so every type is a subtype of it.
    pub fn is_same_type_or_subtype(&self, sub: &str, sup: &str) -> bool {
        sub == sup || sup == TUPLE || self.points_to(sub, sup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_point_to_any() {
        let ts = TypeSystem::with_builtins();
        assert!(ts.points_to("int", "any"));
        assert!(ts.points_to("int", "any?"));
        assert!(ts.points_to("null", "any?"));
        assert!(!ts.points_to("null", "any"));
        assert!(!ts.points_to("any", "int"));
    }

    #[test]
    fn test_user_types_are_transitive() {
        let mut ts = TypeSystem::with_builtins();
        ts.add_user_type("Meters", &["number"]);
        ts.add("number", "any");
        assert!(ts.points_to("Meters", "number"));
        assert!(ts.points_to("Meters", "any?"));
        assert!(ts.is_same_type_or_subtype("Meters", "Meters"));
        assert!(ts.is_same_type_or_subtype("Meters", "tuple"));
    }

    #[test]
    fn test_cycles_terminate() {
        let mut ts = TypeSystem::new();
        ts.add("a", "b");
        ts.add("b", "a");
        assert!(ts.points_to("a", "b"));
        assert!(!ts.points_to("a", "c"));
    }
}
