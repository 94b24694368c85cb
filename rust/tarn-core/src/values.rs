//! Tagged value representation for the Tarn VM.
//!
//! A [`Value`] pairs a concrete type id with a payload. Containers are
//! persistent (`im_rc`), so updates share structure with the original and
//! registers can be copied freely.

use crate::diagnostics::ErrorValue;
use crate::iterator::ValueIter;
use crate::program::SnippetBindle;
use crate::types::{AbstractType, ValueType};
use im_rc::{OrdMap, OrdSet, Vector};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// A payload did not have the shape its consumer expected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("expected {expected} payload, found {found} (type {ty})")]
pub struct PayloadError {
    pub expected: &'static str,
    pub found: &'static str,
    pub ty: ValueType,
}

#[derive(Debug, Clone)]
pub struct Value {
    pub ty: ValueType,
    pub payload: Payload,
}

#[derive(Debug, Clone)]
pub enum Payload {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Rune(char),
    Str(Rc<str>),
    Pair(Rc<(Value, Value)>),
    Tuple(Rc<Vec<Value>>),
    List(Vector<Value>),
    Map(OrdMap<Value, Value>),
    Set(OrdSet<Value>),
    Fields(Rc<Vec<Value>>),
    Enum(usize),
    Label(usize),
    Type(Rc<AbstractType>),
    Func(Rc<Lambda>),
    Iterator(Rc<RefCell<ValueIter>>),
    Thunk { result: u32, entry: u32 },
    Reference(u32),
    IntArray(Rc<Vec<u32>>),
    Snippet(Rc<SnippetBindle>),
    Error(Rc<ErrorValue>),
}

/// A closure: captured values are copied into `captures_start..captures_end`,
/// parameters into `captures_end..params_end`, and the body at `entry`
/// leaves its result in `result`.
#[derive(Debug, Clone)]
pub struct Lambda {
    pub captures_start: u32,
    pub captures_end: u32,
    pub params_end: u32,
    pub result: u32,
    pub entry: u32,
    pub captures: Vec<Value>,
    /// One constraint per parameter; `None` accepts anything.
    pub sig: Option<Vec<Option<AbstractType>>>,
    pub token: u32,
}

macro_rules! payload_getter {
    ($name:ident, $variant:ident, $out:ty, $label:literal) => {
        pub fn $name(&self) -> Result<$out, PayloadError> {
            match &self.payload {
                Payload::$variant(v) => Ok(v),
                _ => Err(self.mismatch($label)),
            }
        }
    };
}

impl Value {
    pub fn new(ty: ValueType, payload: Payload) -> Self {
        Self { ty, payload }
    }

    pub fn undefined() -> Self {
        Self::new(ValueType::UNDEFINED, Payload::Unit)
    }

    pub fn null() -> Self {
        Self::new(ValueType::NULL, Payload::Unit)
    }

    pub fn ok() -> Self {
        Self::new(ValueType::OK, Payload::Unit)
    }

    pub fn unsatisfied() -> Self {
        Self::new(ValueType::UNSATISFIED_CONDITIONAL, Payload::Unit)
    }

    pub fn int(i: i64) -> Self {
        Self::new(ValueType::INT, Payload::Int(i))
    }

    pub fn float(f: f64) -> Self {
        Self::new(ValueType::FLOAT, Payload::Float(f))
    }

    pub fn bool(b: bool) -> Self {
        Self::new(ValueType::BOOL, Payload::Bool(b))
    }

    pub fn rune(c: char) -> Self {
        Self::new(ValueType::RUNE, Payload::Rune(c))
    }

    pub fn string(s: &str) -> Self {
        Self::new(ValueType::STRING, Payload::Str(Rc::from(s)))
    }

    pub fn bling(s: &str) -> Self {
        Self::new(ValueType::BLING, Payload::Str(Rc::from(s)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Self::new(ValueType::TUPLE, Payload::Tuple(Rc::new(items)))
    }

    pub fn empty_tuple() -> Self {
        Self::tuple(Vec::new())
    }

    pub fn pair(left: Value, right: Value) -> Self {
        Self::new(ValueType::PAIR, Payload::Pair(Rc::new((left, right))))
    }

    pub fn list(items: Vector<Value>) -> Self {
        Self::new(ValueType::LIST, Payload::List(items))
    }

    pub fn map(entries: OrdMap<Value, Value>) -> Self {
        Self::new(ValueType::MAP, Payload::Map(entries))
    }

    pub fn set(items: OrdSet<Value>) -> Self {
        Self::new(ValueType::SET, Payload::Set(items))
    }

    pub fn label(n: usize) -> Self {
        Self::new(ValueType::LABEL, Payload::Label(n))
    }

    pub fn abstract_type(at: AbstractType) -> Self {
        Self::new(ValueType::TYPE, Payload::Type(Rc::new(at)))
    }

    pub fn enum_element(ty: ValueType, ordinal: usize) -> Self {
        Self::new(ty, Payload::Enum(ordinal))
    }

    pub fn fields(ty: ValueType, fields: Vec<Value>) -> Self {
        Self::new(ty, Payload::Fields(Rc::new(fields)))
    }

    pub fn func(lambda: Lambda) -> Self {
        Self::new(ValueType::FUNC, Payload::Func(Rc::new(lambda)))
    }

    pub fn thunk(result: u32, entry: u32) -> Self {
        Self::new(ValueType::THUNK, Payload::Thunk { result, entry })
    }

    pub fn iterator(it: ValueIter) -> Self {
        Self::new(ValueType::ITERATOR, Payload::Iterator(Rc::new(RefCell::new(it))))
    }

    pub fn reference(register: u32) -> Self {
        Self::new(ValueType::REFERENCE, Payload::Reference(register))
    }

    pub fn int_array(items: Vec<u32>) -> Self {
        Self::new(ValueType::INT_ARRAY, Payload::IntArray(Rc::new(items)))
    }

    pub fn error(err: ErrorValue) -> Self {
        Self::new(ValueType::ERROR, Payload::Error(Rc::new(err)))
    }

    /// The same payload under another concrete type, as produced by a cast.
    pub fn retyped(&self, ty: ValueType) -> Self {
        Self::new(ty, self.payload.clone())
    }

    pub fn is_error(&self) -> bool {
        self.ty == ValueType::ERROR
    }

    pub fn payload_name(&self) -> &'static str {
        match &self.payload {
            Payload::Unit => "unit",
            Payload::Bool(_) => "bool",
            Payload::Int(_) => "int",
            Payload::Float(_) => "float",
            Payload::Rune(_) => "rune",
            Payload::Str(_) => "string",
            Payload::Pair(_) => "pair",
            Payload::Tuple(_) => "tuple",
            Payload::List(_) => "list",
            Payload::Map(_) => "map",
            Payload::Set(_) => "set",
            Payload::Fields(_) => "struct",
            Payload::Enum(_) => "enum",
            Payload::Label(_) => "label",
            Payload::Type(_) => "type",
            Payload::Func(_) => "func",
            Payload::Iterator(_) => "iterator",
            Payload::Thunk { .. } => "thunk",
            Payload::Reference(_) => "reference",
            Payload::IntArray(_) => "int array",
            Payload::Snippet(_) => "snippet data",
            Payload::Error(_) => "error",
        }
    }

    fn mismatch(&self, expected: &'static str) -> PayloadError {
        PayloadError {
            expected,
            found: self.payload_name(),
            ty: self.ty,
        }
    }

    pub fn as_int(&self) -> Result<i64, PayloadError> {
        match self.payload {
            Payload::Int(i) => Ok(i),
            _ => Err(self.mismatch("int")),
        }
    }

    pub fn as_float(&self) -> Result<f64, PayloadError> {
        match self.payload {
            Payload::Float(f) => Ok(f),
            _ => Err(self.mismatch("float")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, PayloadError> {
        match self.payload {
            Payload::Bool(b) => Ok(b),
            _ => Err(self.mismatch("bool")),
        }
    }

    pub fn as_rune(&self) -> Result<char, PayloadError> {
        match self.payload {
            Payload::Rune(c) => Ok(c),
            _ => Err(self.mismatch("rune")),
        }
    }

    pub fn as_enum(&self) -> Result<usize, PayloadError> {
        match self.payload {
            Payload::Enum(i) => Ok(i),
            _ => Err(self.mismatch("enum")),
        }
    }

    pub fn as_label(&self) -> Result<usize, PayloadError> {
        match self.payload {
            Payload::Label(i) => Ok(i),
            _ => Err(self.mismatch("label")),
        }
    }

    pub fn as_reference(&self) -> Result<u32, PayloadError> {
        match self.payload {
            Payload::Reference(r) => Ok(r),
            _ => Err(self.mismatch("reference")),
        }
    }

    pub fn as_thunk(&self) -> Result<(u32, u32), PayloadError> {
        match self.payload {
            Payload::Thunk { result, entry } => Ok((result, entry)),
            _ => Err(self.mismatch("thunk")),
        }
    }

    pub fn as_str(&self) -> Result<&str, PayloadError> {
        match &self.payload {
            Payload::Str(s) => Ok(s),
            _ => Err(self.mismatch("string")),
        }
    }

    pub fn as_pair(&self) -> Result<(&Value, &Value), PayloadError> {
        match &self.payload {
            Payload::Pair(p) => Ok((&p.0, &p.1)),
            _ => Err(self.mismatch("pair")),
        }
    }

    payload_getter!(as_tuple, Tuple, &Rc<Vec<Value>>, "tuple");
    payload_getter!(as_list, List, &Vector<Value>, "list");
    payload_getter!(as_map, Map, &OrdMap<Value, Value>, "map");
    payload_getter!(as_set, Set, &OrdSet<Value>, "set");
    payload_getter!(as_fields, Fields, &Rc<Vec<Value>>, "struct");
    payload_getter!(as_type, Type, &Rc<AbstractType>, "type");
    payload_getter!(as_func, Func, &Rc<Lambda>, "func");
    payload_getter!(as_iterator, Iterator, &Rc<RefCell<ValueIter>>, "iterator");
    payload_getter!(as_int_array, IntArray, &Rc<Vec<u32>>, "int array");
    payload_getter!(as_snippet, Snippet, &Rc<SnippetBindle>, "snippet data");
    payload_getter!(as_error, Error, &Rc<ErrorValue>, "error");

    /// The elements of a tuple, or the value itself as a one-element slice.
    pub fn tuple_items(&self) -> Vec<Value> {
        match &self.payload {
            Payload::Tuple(items) if self.ty == ValueType::TUPLE => items.as_ref().clone(),
            _ => vec![self.clone()],
        }
    }
}

impl AbstractType {
    /// Whether a value's type is a member, and a bounded string fits the bound.
    pub fn accepts(&self, v: &Value) -> bool {
        if !self.contains(v.ty) {
            return false;
        }
        match (self.varchar_limit(), &v.payload) {
            (Some(limit), Payload::Str(s)) => s.chars().count() <= limit as usize,
            _ => true,
        }
    }
}

impl Payload {
    fn rank(&self) -> u8 {
        match self {
            Payload::Unit => 0,
            Payload::Bool(_) => 1,
            Payload::Int(_) => 2,
            Payload::Float(_) => 3,
            Payload::Rune(_) => 4,
            Payload::Str(_) => 5,
            Payload::Pair(_) => 6,
            Payload::Tuple(_) => 7,
            Payload::List(_) => 8,
            Payload::Map(_) => 9,
            Payload::Set(_) => 10,
            Payload::Fields(_) => 11,
            Payload::Enum(_) => 12,
            Payload::Label(_) => 13,
            Payload::Type(_) => 14,
            Payload::Func(_) => 15,
            Payload::Iterator(_) => 16,
            Payload::Thunk { .. } => 17,
            Payload::Reference(_) => 18,
            Payload::IntArray(_) => 19,
            Payload::Snippet(_) => 20,
            Payload::Error(_) => 21,
        }
    }
}

// Total order: type id first, then payload. Identity-only payloads
// (functions, iterators, snippets, errors) compare by address.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ty
            .cmp(&other.ty)
            .then_with(|| compare_payloads(&self.payload, &other.payload))
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

fn compare_payloads(a: &Payload, b: &Payload) -> Ordering {
    match (a, b) {
        (Payload::Unit, Payload::Unit) => Ordering::Equal,
        (Payload::Bool(x), Payload::Bool(y)) => x.cmp(y),
        (Payload::Int(x), Payload::Int(y)) => x.cmp(y),
        (Payload::Float(x), Payload::Float(y)) => x.total_cmp(y),
        (Payload::Rune(x), Payload::Rune(y)) => x.cmp(y),
        (Payload::Str(x), Payload::Str(y)) => x.cmp(y),
        (Payload::Pair(x), Payload::Pair(y)) => x.0.cmp(&y.0).then_with(|| x.1.cmp(&y.1)),
        (Payload::Tuple(x), Payload::Tuple(y)) => x.iter().cmp(y.iter()),
        (Payload::List(x), Payload::List(y)) => x.iter().cmp(y.iter()),
        (Payload::Map(x), Payload::Map(y)) => x.iter().cmp(y.iter()),
        (Payload::Set(x), Payload::Set(y)) => x.iter().cmp(y.iter()),
        (Payload::Fields(x), Payload::Fields(y)) => x.iter().cmp(y.iter()),
        (Payload::Enum(x), Payload::Enum(y)) => x.cmp(y),
        (Payload::Label(x), Payload::Label(y)) => x.cmp(y),
        (Payload::Type(x), Payload::Type(y)) => x.cmp(y),
        (Payload::Thunk { result: r1, entry: e1 }, Payload::Thunk { result: r2, entry: e2 }) => {
            (r1, e1).cmp(&(r2, e2))
        }
        (Payload::Reference(x), Payload::Reference(y)) => x.cmp(y),
        (Payload::IntArray(x), Payload::IntArray(y)) => x.cmp(y),
        (Payload::Func(x), Payload::Func(y)) => Rc::as_ptr(x).cmp(&Rc::as_ptr(y)),
        (Payload::Iterator(x), Payload::Iterator(y)) => Rc::as_ptr(x).cmp(&Rc::as_ptr(y)),
        (Payload::Snippet(x), Payload::Snippet(y)) => Rc::as_ptr(x).cmp(&Rc::as_ptr(y)),
        (Payload::Error(x), Payload::Error(y)) => Rc::as_ptr(x).cmp(&Rc::as_ptr(y)),
        _ => a.rank().cmp(&b.rank()),
    }
}

/// Rendering without access to the type registry, used in error arguments.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Unit => match self.ty {
                ValueType::NULL => write!(f, "NULL"),
                ValueType::OK => write!(f, "OK"),
                _ => write!(f, "UNDEFINED VALUE"),
            },
            Payload::Bool(b) => write!(f, "{b}"),
            Payload::Int(i) => write!(f, "{i}"),
            Payload::Float(x) => write!(f, "{x:?}"),
            Payload::Rune(c) => write!(f, "{c:?}"),
            Payload::Str(s) if self.ty == ValueType::BLING => write!(f, "{s}"),
            Payload::Str(s) => write!(f, "{s:?}"),
            Payload::Pair(p) => write!(f, "{}::{}", p.0, p.1),
            Payload::Tuple(items) => {
                write!(f, "tuple(")?;
                write_joined(f, items.iter())?;
                write!(f, ")")
            }
            Payload::List(items) => {
                write!(f, "[")?;
                write_joined(f, items.iter())?;
                write!(f, "]")
            }
            Payload::Set(items) => {
                write!(f, "set(")?;
                write_joined(f, items.iter())?;
                write!(f, ")")
            }
            Payload::Map(entries) => {
                write!(f, "map(")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}::{v}")?;
                }
                write!(f, ")")
            }
            Payload::Fields(items) => {
                write!(f, "{}(", self.ty)?;
                write_joined(f, items.iter())?;
                write!(f, ")")
            }
            Payload::Enum(i) => write!(f, "{}[{i}]", self.ty),
            Payload::Label(i) => write!(f, "label {i}"),
            Payload::Type(_) => write!(f, "type"),
            Payload::Func(_) => write!(f, "func"),
            Payload::Iterator(_) => write!(f, "iterator"),
            Payload::Thunk { entry, .. } => write!(f, "thunk @{entry}"),
            Payload::Reference(r) => write!(f, "reference m{r}"),
            Payload::IntArray(items) => write!(f, "{items:?}"),
            Payload::Snippet(_) => write!(f, "snippet data"),
            Payload::Error(e) => write!(f, "error {:?}", e.message),
        }
    }
}

fn write_joined<'a>(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = &'a Value>) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_type_then_payload() {
        assert!(Value::int(5) < Value::int(7));
        assert!(Value::int(100) < Value::string("a"));
        assert!(Value::float(-0.5) < Value::float(0.25));
        assert!(Value::null() < Value::int(0));
    }

    #[test]
    fn test_float_nan_has_a_place() {
        let nan = Value::float(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert!(Value::float(1.0) < nan);
    }

    #[test]
    fn test_checked_accessors() {
        assert_eq!(Value::int(3).as_int(), Ok(3));
        let err = Value::string("x").as_int().unwrap_err();
        assert_eq!(err.expected, "int");
        assert_eq!(err.found, "string");
        assert_eq!(err.ty, ValueType::STRING);
    }

    #[test]
    fn test_persistent_list_shares_original() {
        let original: Vector<Value> = (1..=3).map(Value::int).collect();
        let v = Value::list(original.clone());
        let updated = v.as_list().unwrap().update(0, Value::int(9));
        assert_eq!(original[0], Value::int(1));
        assert_eq!(updated[0], Value::int(9));
    }

    #[test]
    fn test_accepts_checks_varchar() {
        let vc = AbstractType::varchar(3);
        assert!(vc.accepts(&Value::string("héé")));
        assert!(!vc.accepts(&Value::string("four")));
        assert!(!vc.accepts(&Value::int(1)));
    }

    #[test]
    fn test_display() {
        let v = Value::list([Value::int(1), Value::string("a")].into_iter().collect());
        assert_eq!(v.to_string(), "[1, \"a\"]");
        assert_eq!(Value::pair(Value::int(1), Value::bool(true)).to_string(), "1::true");
        assert_eq!(Value::float(2.0).to_string(), "2.0");
    }
}
