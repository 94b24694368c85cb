//! Concrete type registry and abstract types.
//!
//! Every runtime value carries a concrete type id. The first ids are the
//! fixed native types; user enums, structs, snippets and clones follow in
//! declaration order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of one concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueType(pub u32);

impl ValueType {
    pub const UNDEFINED: ValueType = ValueType(0);
    pub const INT_ARRAY: ValueType = ValueType(1);
    pub const SNIPPET_DATA: ValueType = ValueType(2);
    pub const THUNK: ValueType = ValueType(3);
    pub const BLING: ValueType = ValueType(4);
    pub const UNSATISFIED_CONDITIONAL: ValueType = ValueType(5);
    pub const REFERENCE: ValueType = ValueType(6);
    pub const ITERATOR: ValueType = ValueType(7);
    pub const OK: ValueType = ValueType(8);
    pub const TUPLE: ValueType = ValueType(9);
    pub const ERROR: ValueType = ValueType(10);
    pub const NULL: ValueType = ValueType(11);
    pub const INT: ValueType = ValueType(12);
    pub const BOOL: ValueType = ValueType(13);
    pub const STRING: ValueType = ValueType(14);
    pub const RUNE: ValueType = ValueType(15);
    pub const FLOAT: ValueType = ValueType(16);
    pub const TYPE: ValueType = ValueType(17);
    pub const FUNC: ValueType = ValueType(18);
    pub const PAIR: ValueType = ValueType(19);
    pub const LIST: ValueType = ValueType(20);
    pub const MAP: ValueType = ValueType(21);
    pub const SET: ValueType = ValueType(22);
    pub const LABEL: ValueType = ValueType(23);

    /// First id handed out to a user-declared type.
    pub const FIRST_USER: ValueType = ValueType(24);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Values of a single type occupy exactly one slot in a tuple.
    pub fn is_single(self) -> bool {
        self >= Self::INT
    }

    pub fn is_single_or_null(self) -> bool {
        self >= Self::NULL
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

const NATIVE_TYPE_NAMES: [&str; 24] = [
    "UNDEFINED VALUE",
    "INT ARRAY",
    "SNIPPET DATA",
    "THUNK",
    "bling",
    "UNSATISFIED CONDITIONAL",
    "REFERENCE VARIABLE",
    "iterator",
    "ok",
    "tuple",
    "error",
    "null",
    "int",
    "bool",
    "string",
    "rune",
    "float",
    "type",
    "func",
    "pair",
    "list",
    "map",
    "set",
    "label",
];

/// A set of concrete types, optionally carrying a varchar length bound.
///
/// The member list is kept sorted and free of duplicates, so two abstract
/// types are equal exactly when their members and bound agree.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbstractType {
    types: Vec<ValueType>,
    varchar: Option<u32>,
}

impl AbstractType {
    pub fn new(types: impl IntoIterator<Item = ValueType>) -> Self {
        let mut types: Vec<ValueType> = types.into_iter().collect();
        types.sort();
        types.dedup();
        Self { types, varchar: None }
    }

    pub fn single(ty: ValueType) -> Self {
        Self {
            types: vec![ty],
            varchar: None,
        }
    }

    /// A string type whose values are at most `limit` characters long.
    pub fn varchar(limit: u32) -> Self {
        Self {
            types: vec![ValueType::STRING],
            varchar: Some(limit),
        }
    }

    pub fn types(&self) -> &[ValueType] {
        &self.types
    }

    /// The varchar bound, which only has meaning when the type is exactly `{string}`.
    pub fn varchar_limit(&self) -> Option<u32> {
        if self.types == [ValueType::STRING] {
            self.varchar
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, ty: ValueType) -> bool {
        self.types.binary_search(&ty).is_ok()
    }

    /// The only member, if there is exactly one.
    pub fn only(&self) -> Option<ValueType> {
        match self.types.as_slice() {
            [ty] => Some(*ty),
            _ => None,
        }
    }

    /// Set union. The varchar bound survives only when the result is exactly
    /// `{string}` and every string-holding operand was bounded, in which case
    /// the looser bound wins.
    pub fn union(&self, other: &AbstractType) -> AbstractType {
        let mut merged = AbstractType::new(self.types.iter().chain(other.types.iter()).copied());
        if merged.types == [ValueType::STRING] {
            merged.varchar = match (self.string_bound(), other.string_bound()) {
                (Some(Some(a)), Some(Some(b))) => Some(a.max(b)),
                (Some(Some(a)), None) | (None, Some(Some(a))) => Some(a),
                _ => None,
            };
        }
        merged
    }

    /// Whether every member of `self` is a member of `other`, respecting bounds.
    pub fn is_subtype_of(&self, other: &AbstractType) -> bool {
        if !self.types.iter().all(|t| other.contains(*t)) {
            return false;
        }
        match (self.varchar_limit(), other.varchar_limit()) {
            (_, None) => true,
            (Some(mine), Some(theirs)) => mine <= theirs,
            (None, Some(_)) => false,
        }
    }

    // None: no string member. Some(None): unbounded string. Some(Some(n)): bounded.
    fn string_bound(&self) -> Option<Option<u32>> {
        if !self.contains(ValueType::STRING) {
            return None;
        }
        Some(self.varchar_limit())
    }
}

/// Whether type names are rendered with their namespace path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Default,
    Literal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeInfo {
    Native(NativeType),
    Enum(EnumType),
    Struct(StructType),
    Clone(CloneType),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeType {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub path: String,
    pub element_names: Vec<String>,
    pub private: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    pub path: String,
    pub label_numbers: Vec<usize>,
    pub field_types: Vec<AbstractType>,
    pub snippet: bool,
    pub private: bool,
    resolver: FieldResolver,
}

impl StructType {
    pub fn new(name: &str, path: &str, label_numbers: Vec<usize>, field_types: Vec<AbstractType>) -> Self {
        let resolver = FieldResolver::build(&label_numbers);
        Self {
            name: name.to_string(),
            path: path.to_string(),
            label_numbers,
            field_types,
            snippet: false,
            private: false,
            resolver,
        }
    }

    /// Field position of a label, if the struct has that field.
    pub fn resolve(&self, label: usize) -> Option<usize> {
        self.resolver.resolve(label)
    }

    pub fn len(&self) -> usize {
        self.label_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label_numbers.is_empty()
    }
}

const LINEAR_RESOLVE_LIMIT: usize = 8;

/// Maps a label number to a field position: a scan for narrow structs,
/// a hash lookup for wide ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum FieldResolver {
    Linear(Vec<usize>),
    Hashed(HashMap<usize, usize>),
}

impl FieldResolver {
    fn build(labels: &[usize]) -> Self {
        if labels.len() <= LINEAR_RESOLVE_LIMIT {
            FieldResolver::Linear(labels.to_vec())
        } else {
            FieldResolver::Hashed(labels.iter().enumerate().map(|(i, l)| (*l, i)).collect())
        }
    }

    fn resolve(&self, label: usize) -> Option<usize> {
        match self {
            FieldResolver::Linear(labels) => labels.iter().position(|l| *l == label),
            FieldResolver::Hashed(map) => map.get(&label).copied(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneType {
    pub name: String,
    pub path: String,
    pub parent: ValueType,
    pub private: bool,
    pub sliceable: bool,
    pub filterable: bool,
    pub mappable: bool,
}

impl CloneType {
    pub fn new(name: &str, parent: ValueType) -> Self {
        let container = matches!(parent, ValueType::LIST | ValueType::STRING | ValueType::MAP | ValueType::SET);
        Self {
            name: name.to_string(),
            path: String::new(),
            parent,
            private: false,
            sliceable: matches!(parent, ValueType::LIST | ValueType::STRING),
            filterable: container,
            mappable: container,
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }
}

impl TypeInfo {
    pub fn name(&self) -> &str {
        match self {
            TypeInfo::Native(t) => &t.name,
            TypeInfo::Enum(t) => &t.name,
            TypeInfo::Struct(t) => &t.name,
            TypeInfo::Clone(t) => &t.name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            TypeInfo::Native(t) => &t.path,
            TypeInfo::Enum(t) => &t.path,
            TypeInfo::Struct(t) => &t.path,
            TypeInfo::Clone(t) => &t.path,
        }
    }

    pub fn describe(&self, flavor: Flavor) -> String {
        match flavor {
            Flavor::Literal => format!("{}{}", self.path(), self.name()),
            Flavor::Default => self.name().to_string(),
        }
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, TypeInfo::Enum(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, TypeInfo::Struct(_))
    }

    pub fn is_snippet(&self) -> bool {
        matches!(self, TypeInfo::Struct(s) if s.snippet)
    }

    pub fn is_clone(&self) -> bool {
        matches!(self, TypeInfo::Clone(_))
    }

    pub fn is_private(&self) -> bool {
        match self {
            TypeInfo::Native(_) => false,
            TypeInfo::Enum(t) => t.private,
            TypeInfo::Struct(t) => t.private,
            TypeInfo::Clone(t) => t.private,
        }
    }
}

/// Table of every concrete type in a program, plus the interned field labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRegistry {
    concrete: Vec<TypeInfo>,
    labels: Vec<String>,
    label_lookup: HashMap<String, usize>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let concrete = NATIVE_TYPE_NAMES
            .iter()
            .map(|name| {
                TypeInfo::Native(NativeType {
                    name: name.to_string(),
                    path: String::new(),
                })
            })
            .collect();
        Self {
            concrete,
            labels: Vec::new(),
            label_lookup: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.concrete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concrete.is_empty()
    }

    pub fn get(&self, ty: ValueType) -> Option<&TypeInfo> {
        self.concrete.get(ty.index())
    }

    pub fn find(&self, name: &str) -> Option<ValueType> {
        self.concrete
            .iter()
            .position(|t| t.name() == name)
            .map(|i| ValueType(i as u32))
    }

    fn push(&mut self, info: TypeInfo) -> ValueType {
        self.concrete.push(info);
        ValueType(self.concrete.len() as u32 - 1)
    }

    pub fn add_enum(&mut self, name: &str, path: &str, elements: &[&str], private: bool) -> ValueType {
        self.push(TypeInfo::Enum(EnumType {
            name: name.to_string(),
            path: path.to_string(),
            element_names: elements.iter().map(|e| e.to_string()).collect(),
            private,
        }))
    }

    /// Declares a struct. Field labels are interned as a side effect.
    pub fn add_struct(&mut self, name: &str, path: &str, fields: &[(&str, AbstractType)], private: bool) -> ValueType {
        let labels = fields.iter().map(|(l, _)| self.intern_label(l)).collect();
        let types = fields.iter().map(|(_, t)| t.clone()).collect();
        let mut st = StructType::new(name, path, labels, types);
        st.private = private;
        self.push(TypeInfo::Struct(st))
    }

    /// Declares a snippet type: a struct holding the snippet's source text,
    /// its interpolated values, and its bindle.
    pub fn add_snippet(&mut self, name: &str, path: &str) -> ValueType {
        let fields = [
            ("text", AbstractType::single(ValueType::STRING)),
            ("values", AbstractType::single(ValueType::LIST)),
            ("data", AbstractType::single(ValueType::SNIPPET_DATA)),
        ];
        let labels = fields.iter().map(|(l, _)| self.intern_label(l)).collect();
        let types = fields.iter().map(|(_, t)| t.clone()).collect();
        let mut st = StructType::new(name, path, labels, types);
        st.snippet = true;
        self.push(TypeInfo::Struct(st))
    }

    pub fn add_clone(&mut self, clone: CloneType) -> ValueType {
        self.push(TypeInfo::Clone(clone))
    }

    pub fn intern_label(&mut self, name: &str) -> usize {
        if let Some(n) = self.label_lookup.get(name) {
            return *n;
        }
        self.labels.push(name.to_string());
        let n = self.labels.len() - 1;
        self.label_lookup.insert(name.to_string(), n);
        n
    }

    pub fn label_name(&self, label: usize) -> Option<&str> {
        self.labels.get(label).map(String::as_str)
    }

    pub fn label_number(&self, name: &str) -> Option<usize> {
        self.label_lookup.get(name).copied()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// The parent of a clone type, or the type itself.
    pub fn declone(&self, ty: ValueType) -> ValueType {
        match self.get(ty) {
            Some(TypeInfo::Clone(c)) => c.parent,
            _ => ty,
        }
    }

    pub fn is_enum(&self, ty: ValueType) -> bool {
        self.get(ty).is_some_and(TypeInfo::is_enum)
    }

    pub fn is_struct(&self, ty: ValueType) -> bool {
        self.get(ty).is_some_and(TypeInfo::is_struct)
    }

    pub fn is_snippet(&self, ty: ValueType) -> bool {
        self.get(ty).is_some_and(TypeInfo::is_snippet)
    }

    pub fn is_clone(&self, ty: ValueType) -> bool {
        self.get(ty).is_some_and(TypeInfo::is_clone)
    }

    pub fn struct_type(&self, ty: ValueType) -> Option<&StructType> {
        match self.get(ty) {
            Some(TypeInfo::Struct(s)) => Some(s),
            _ => None,
        }
    }

    pub fn enum_type(&self, ty: ValueType) -> Option<&EnumType> {
        match self.get(ty) {
            Some(TypeInfo::Enum(e)) => Some(e),
            _ => None,
        }
    }

    pub fn clone_type(&self, ty: ValueType) -> Option<&CloneType> {
        match self.get(ty) {
            Some(TypeInfo::Clone(c)) => Some(c),
            _ => None,
        }
    }

    /// Types whose values can be map keys, set members, or compared with `<`.
    pub fn is_orderable(&self, ty: ValueType) -> bool {
        (ValueType::NULL..ValueType::PAIR).contains(&ty) || self.is_enum(ty)
    }

    /// Whether a value of type `from` may be cast to `to`: identity, clone to
    /// parent, parent to clone, or between two clones of one parent.
    pub fn can_cast(&self, from: ValueType, to: ValueType) -> bool {
        if from == to {
            return true;
        }
        let from_parent = self.clone_type(from).map(|c| c.parent);
        let to_parent = self.clone_type(to).map(|c| c.parent);
        match (from_parent, to_parent) {
            (Some(p), Some(q)) => p == q,
            (Some(p), None) => p == to,
            (None, Some(q)) => q == from,
            (None, None) => false,
        }
    }

    pub fn describe_type(&self, ty: ValueType, flavor: Flavor) -> String {
        match self.get(ty) {
            Some(info) => info.describe(flavor),
            None => format!("unknown type {ty}"),
        }
    }

    /// Renders an abstract type as its members joined by `/`.
    pub fn describe_abstract(&self, at: &AbstractType, flavor: Flavor) -> String {
        if let Some(limit) = at.varchar_limit() {
            return format!("varchar({limit})");
        }
        if at.is_empty() {
            return "ø".to_string();
        }
        at.types()
            .iter()
            .map(|t| self.describe_type(*t, flavor))
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_ids_are_fixed() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.len(), ValueType::FIRST_USER.index());
        assert_eq!(reg.find("int"), Some(ValueType::INT));
        assert_eq!(reg.find("label"), Some(ValueType::LABEL));
        assert!(ValueType::INT.is_single());
        assert!(!ValueType::NULL.is_single());
        assert!(ValueType::NULL.is_single_or_null());
        assert!(!ValueType::TUPLE.is_single_or_null());
    }

    #[test]
    fn test_abstract_type_union_is_commutative() {
        let a = AbstractType::new([ValueType::INT, ValueType::STRING]);
        let b = AbstractType::new([ValueType::FLOAT, ValueType::INT]);
        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.union(&b).types(), &[ValueType::INT, ValueType::STRING, ValueType::FLOAT]);
    }

    #[test]
    fn test_varchar_union_keeps_looser_bound() {
        let short = AbstractType::varchar(4);
        let long = AbstractType::varchar(10);
        assert_eq!(short.union(&long).varchar_limit(), Some(10));
        assert_eq!(long.union(&short).varchar_limit(), Some(10));
        let unbounded = AbstractType::single(ValueType::STRING);
        assert_eq!(short.union(&unbounded).varchar_limit(), None);
        let mixed = short.union(&AbstractType::single(ValueType::INT));
        assert_eq!(mixed.varchar_limit(), None);
    }

    #[test]
    fn test_subtype_respects_varchar() {
        let short = AbstractType::varchar(4);
        let long = AbstractType::varchar(10);
        let string = AbstractType::single(ValueType::STRING);
        assert!(short.is_subtype_of(&long));
        assert!(!long.is_subtype_of(&short));
        assert!(short.is_subtype_of(&string));
        assert!(!string.is_subtype_of(&short));
    }

    #[test]
    fn test_field_resolver_narrow_and_wide() {
        let mut reg = TypeRegistry::new();
        let narrow = reg.add_struct(
            "Point",
            "",
            &[("x", AbstractType::single(ValueType::INT)), ("y", AbstractType::single(ValueType::INT))],
            false,
        );
        let y = reg.label_number("y").unwrap();
        assert_eq!(reg.struct_type(narrow).unwrap().resolve(y), Some(1));

        let names: Vec<String> = (0..12).map(|i| format!("f{i}")).collect();
        let fields: Vec<(&str, AbstractType)> = names
            .iter()
            .map(|n| (n.as_str(), AbstractType::single(ValueType::INT)))
            .collect();
        let wide = reg.add_struct("Wide", "", &fields, false);
        let f11 = reg.label_number("f11").unwrap();
        let st = reg.struct_type(wide).unwrap();
        assert_eq!(st.resolve(f11), Some(11));
        assert_eq!(st.resolve(reg.label_number("x").unwrap()), None);
    }

    #[test]
    fn test_can_cast_between_clones() {
        let mut reg = TypeRegistry::new();
        let meters = reg.add_clone(CloneType::new("Meters", ValueType::INT));
        let feet = reg.add_clone(CloneType::new("Feet", ValueType::INT));
        let name = reg.add_clone(CloneType::new("Name", ValueType::STRING));
        assert!(reg.can_cast(meters, ValueType::INT));
        assert!(reg.can_cast(ValueType::INT, meters));
        assert!(reg.can_cast(meters, feet));
        assert!(!reg.can_cast(meters, name));
        assert!(!reg.can_cast(ValueType::INT, ValueType::STRING));
        assert_eq!(reg.declone(feet), ValueType::INT);
    }

    #[test]
    fn test_orderable() {
        let mut reg = TypeRegistry::new();
        let color = reg.add_enum("Color", "", &["RED", "GREEN"], false);
        assert!(reg.is_orderable(ValueType::STRING));
        assert!(reg.is_orderable(ValueType::TYPE));
        assert!(reg.is_orderable(color));
        assert!(reg.is_orderable(ValueType::FUNC));
        assert!(reg.is_orderable(ValueType::NULL));
        assert!(!reg.is_orderable(ValueType::PAIR));
        assert!(!reg.is_orderable(ValueType::LIST));
        assert!(!reg.is_orderable(ValueType::ERROR));
    }

    #[test]
    fn test_describe_abstract() {
        let reg = TypeRegistry::new();
        let at = AbstractType::new([ValueType::NULL, ValueType::INT]);
        assert_eq!(reg.describe_abstract(&at, Flavor::Default), "null/int");
        assert_eq!(reg.describe_abstract(&AbstractType::varchar(8), Flavor::Default), "varchar(8)");
    }
}
