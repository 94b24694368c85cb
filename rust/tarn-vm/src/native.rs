//! Marshalling between VM values and host-side native functions.
//!
//! A native function receives its arguments as [`Native`]s and returns one.
//! Host objects the VM has no built-in shape for travel as [`Native::Host`]
//! and are mapped back to struct, enum or clone values by the recognizers
//! attached to the function.

use crate::describe::literal;
use crate::vm::Vm;
use std::any::Any;
use std::fmt;
use std::rc::Rc;
use tarn_core::diagnostics::{ErrorArg, ErrorValue, Token};
use tarn_core::types::{TypeRegistry, ValueType};
use tarn_core::values::{Payload, Value};

#[derive(Clone)]
pub enum Native {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Rune(char),
    Str(String),
    /// An ordered host sequence; becomes a list.
    Seq(Vec<Native>),
    /// Several results; becomes a tuple.
    Multiple(Vec<Native>),
    /// Passed through unchanged.
    Value(Value),
    /// The function failed with this message.
    Failure(String),
    Host(Rc<dyn Any>),
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Native::Nil => write!(f, "Nil"),
            Native::Bool(b) => write!(f, "Bool({b})"),
            Native::Int(i) => write!(f, "Int({i})"),
            Native::Float(x) => write!(f, "Float({x})"),
            Native::Rune(c) => write!(f, "Rune({c:?})"),
            Native::Str(s) => write!(f, "Str({s:?})"),
            Native::Seq(items) => f.debug_tuple("Seq").field(items).finish(),
            Native::Multiple(items) => f.debug_tuple("Multiple").field(items).finish(),
            Native::Value(v) => write!(f, "Value({v})"),
            Native::Failure(msg) => write!(f, "Failure({msg:?})"),
            Native::Host(_) => write!(f, "Host(..)"),
        }
    }
}

impl PartialEq for Native {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Native::Nil, Native::Nil) => true,
            (Native::Bool(a), Native::Bool(b)) => a == b,
            (Native::Int(a), Native::Int(b)) => a == b,
            (Native::Float(a), Native::Float(b)) => a == b,
            (Native::Rune(a), Native::Rune(b)) => a == b,
            (Native::Str(a), Native::Str(b)) => a == b,
            (Native::Seq(a), Native::Seq(b)) | (Native::Multiple(a), Native::Multiple(b)) => a == b,
            (Native::Value(a), Native::Value(b)) => a == b,
            (Native::Failure(a), Native::Failure(b)) => a == b,
            (Native::Host(a), Native::Host(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

pub type NativeCode = Rc<dyn Fn(&mut Vm, Vec<Native>) -> Native>;
/// Maps a host object to a struct type and its field values.
pub type StructRecognizer = Rc<dyn Fn(&dyn Any) -> Option<(ValueType, Vec<Native>)>>;
/// Maps a host object to an enum type and ordinal.
pub type EnumRecognizer = Rc<dyn Fn(&dyn Any) -> Option<(ValueType, usize)>>;
/// Maps a host object to a clone type and the parent-typed contents.
pub type CloneRecognizer = Rc<dyn Fn(&dyn Any) -> Option<(ValueType, Native)>>;

#[derive(Clone)]
pub struct NativeFn {
    pub name: String,
    pub code: NativeCode,
    pub structs: Option<StructRecognizer>,
    pub enums: Option<EnumRecognizer>,
    pub clones: Option<CloneRecognizer>,
    /// Per argument: pass the value itself rather than converting it.
    pub raw: Vec<bool>,
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("name", &self.name)
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

impl NativeFn {
    pub fn new(name: &str, code: impl Fn(&mut Vm, Vec<Native>) -> Native + 'static) -> Self {
        Self {
            name: name.to_string(),
            code: Rc::new(code),
            structs: None,
            enums: None,
            clones: None,
            raw: Vec::new(),
        }
    }

    pub fn with_structs(mut self, r: impl Fn(&dyn Any) -> Option<(ValueType, Vec<Native>)> + 'static) -> Self {
        self.structs = Some(Rc::new(r));
        self
    }

    pub fn with_enums(mut self, r: impl Fn(&dyn Any) -> Option<(ValueType, usize)> + 'static) -> Self {
        self.enums = Some(Rc::new(r));
        self
    }

    pub fn with_clones(mut self, r: impl Fn(&dyn Any) -> Option<(ValueType, Native)> + 'static) -> Self {
        self.clones = Some(Rc::new(r));
        self
    }

    pub fn with_raw(mut self, raw: &[bool]) -> Self {
        self.raw = raw.to_vec();
        self
    }

    fn is_raw(&self, i: usize) -> bool {
        self.raw.get(i).copied().unwrap_or(false)
    }

    /// Converts the call's arguments, or returns the first value that has
    /// no native form.
    pub fn marshal_args(&self, args: &[Value]) -> Result<Vec<Native>, Value> {
        args.iter()
            .enumerate()
            .map(|(i, v)| {
                if self.is_raw(i) {
                    Ok(Native::Value(v.clone()))
                } else {
                    value_to_native(v)
                }
            })
            .collect()
    }
}

/// Primitives convert directly, structs to a sequence of their fields and
/// enums to their ordinal. Anything else is returned as the culprit.
pub fn value_to_native(v: &Value) -> Result<Native, Value> {
    match &v.payload {
        Payload::Unit if v.ty == ValueType::NULL => Ok(Native::Nil),
        Payload::Bool(b) => Ok(Native::Bool(*b)),
        Payload::Int(i) => Ok(Native::Int(*i)),
        Payload::Float(x) => Ok(Native::Float(*x)),
        Payload::Rune(c) => Ok(Native::Rune(*c)),
        Payload::Str(s) if v.ty != ValueType::BLING => Ok(Native::Str(s.to_string())),
        Payload::Fields(fields) => fields.iter().map(value_to_native).collect::<Result<Vec<_>, _>>().map(Native::Seq),
        Payload::Enum(ordinal) => Ok(Native::Int(*ordinal as i64)),
        _ => Err(v.clone()),
    }
}

/// Converts a native result back into a value. Failures become error values
/// located at `tok`.
pub fn native_to_value(types: &TypeRegistry, n: Native, f: &NativeFn, tok: &Token) -> Value {
    let fail = |id: &str, args: Vec<ErrorArg>| Value::error(ErrorValue::new(id, tok.clone(), args));
    match n {
        Native::Nil => Value::null(),
        Native::Bool(b) => Value::bool(b),
        Native::Int(i) => Value::int(i),
        Native::Float(x) => Value::float(x),
        Native::Rune(c) => Value::rune(c),
        Native::Str(s) => Value::string(&s),
        Native::Value(v) => v,
        Native::Failure(msg) => fail("vm/native/runtime", vec![f.name.as_str().into(), msg.into()]),
        Native::Seq(items) => match convert_all(types, items, f, tok) {
            Ok(values) => Value::list(values.into_iter().collect()),
            Err(e) => e,
        },
        Native::Multiple(items) => match convert_all(types, items, f, tok) {
            Ok(values) => Value::tuple(values),
            Err(e) => e,
        },
        Native::Host(obj) => recognize(types, obj.as_ref(), f, tok)
            .unwrap_or_else(|| fail("vm/native/type", vec![f.name.as_str().into()])),
    }
}

fn convert_all(types: &TypeRegistry, items: Vec<Native>, f: &NativeFn, tok: &Token) -> Result<Vec<Value>, Value> {
    items
        .into_iter()
        .map(|n| {
            let v = native_to_value(types, n, f, tok);
            if v.is_error() {
                Err(v)
            } else {
                Ok(v)
            }
        })
        .collect()
}

fn recognize(types: &TypeRegistry, obj: &dyn Any, f: &NativeFn, tok: &Token) -> Option<Value> {
    if let Some((ty, fields)) = f.structs.as_ref().and_then(|r| r(obj)) {
        return Some(match convert_all(types, fields, f, tok) {
            Ok(values) => Value::fields(ty, values),
            Err(e) => e,
        });
    }
    if let Some((ty, ordinal)) = f.enums.as_ref().and_then(|r| r(obj)) {
        return Some(Value::enum_element(ty, ordinal));
    }
    let (ty, inner) = f.clones.as_ref().and_then(|r| r(obj))?;
    let parent = types.clone_type(ty)?.parent;
    clone_payload(types, parent, inner, f, tok).map(|v| v.retyped(ty))
}

// The parent kind decides which native shapes are acceptable.
fn clone_payload(types: &TypeRegistry, parent: ValueType, inner: Native, f: &NativeFn, tok: &Token) -> Option<Value> {
    match (parent, inner) {
        (ValueType::INT, Native::Int(i)) => Some(Value::int(i)),
        (ValueType::FLOAT, Native::Float(x)) => Some(Value::float(x)),
        (ValueType::STRING, Native::Str(s)) => Some(Value::string(&s)),
        (ValueType::LIST, Native::Seq(items)) => convert_all(types, items, f, tok)
            .ok()
            .map(|values| Value::list(values.into_iter().collect())),
        (ValueType::PAIR, Native::Seq(items)) if items.len() == 2 => {
            let mut values = convert_all(types, items, f, tok).ok()?;
            let right = values.pop()?;
            let left = values.pop()?;
            Some(Value::pair(left, right))
        }
        (ValueType::SET, Native::Seq(items)) => {
            let values = convert_all(types, items, f, tok).ok()?;
            if values.iter().all(|v| types.is_orderable(v.ty)) {
                Some(Value::set(values.into_iter().collect()))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// The error stored when an argument has no native form.
pub(crate) fn conversion_error(types: &TypeRegistry, culprit: &Value, tok: &Token) -> Value {
    Value::error(ErrorValue::new(
        "vm/native/convert",
        tok.clone(),
        vec![literal(types, culprit).into()],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_core::types::{AbstractType, CloneType};

    struct Point(i64, i64);
    struct Weekday(usize);
    struct Tags(Vec<&'static str>);
    struct Span(i64, i64, i64);

    fn tok() -> Token {
        Token::new("f", 1, 1, "test")
    }

    fn registry() -> (TypeRegistry, ValueType, ValueType, ValueType, ValueType) {
        let mut reg = TypeRegistry::new();
        let point = reg.add_struct(
            "Point",
            "",
            &[
                ("x", AbstractType::single(ValueType::INT)),
                ("y", AbstractType::single(ValueType::INT)),
            ],
            false,
        );
        let day = reg.add_enum("Day", "", &["MON", "TUE"], false);
        let tags = reg.add_clone(CloneType::new("Tags", ValueType::SET));
        let span = reg.add_clone(CloneType::new("Span", ValueType::PAIR));
        (reg, point, day, tags, span)
    }

    fn recognizing(point: ValueType, day: ValueType, tags: ValueType, span: ValueType) -> NativeFn {
        NativeFn::new("host", |_, _| Native::Nil)
            .with_structs(move |obj| {
                obj.downcast_ref::<Point>()
                    .map(|p| (point, vec![Native::Int(p.0), Native::Int(p.1)]))
            })
            .with_enums(move |obj| obj.downcast_ref::<Weekday>().map(|d| (day, d.0)))
            .with_clones(move |obj| {
                if let Some(t) = obj.downcast_ref::<Tags>() {
                    let items = t.0.iter().map(|s| Native::Str(s.to_string())).collect();
                    return Some((tags, Native::Seq(items)));
                }
                obj.downcast_ref::<Span>()
                    .map(|s| (span, Native::Seq(vec![Native::Int(s.0), Native::Int(s.1), Native::Int(s.2)])))
            })
    }

    #[test]
    fn test_value_to_native_unwraps_structs_and_enums() {
        let (_, point, day, _, _) = registry();
        let p = Value::fields(point, vec![Value::int(1), Value::int(2)]);
        assert_eq!(value_to_native(&p), Ok(Native::Seq(vec![Native::Int(1), Native::Int(2)])));
        assert_eq!(value_to_native(&Value::enum_element(day, 1)), Ok(Native::Int(1)));
        assert_eq!(value_to_native(&Value::null()), Ok(Native::Nil));
    }

    #[test]
    fn test_value_to_native_reports_culprit() {
        let (_, point, _, _, _) = registry();
        let inner = Value::list(Default::default());
        let p = Value::fields(point, vec![Value::int(1), inner.clone()]);
        assert_eq!(value_to_native(&p), Err(inner));
        assert!(value_to_native(&Value::bling("to")).is_err());
    }

    #[test]
    fn test_native_to_value_primitives_and_multiple() {
        let (reg, ..) = registry();
        let f = NativeFn::new("f", |_, _| Native::Nil);
        let v = native_to_value(&reg, Native::Multiple(vec![Native::Int(1), Native::Str("a".into())]), &f, &tok());
        assert_eq!(v, Value::tuple(vec![Value::int(1), Value::string("a")]));
        let seq = native_to_value(&reg, Native::Seq(vec![Native::Bool(true)]), &f, &tok());
        assert_eq!(seq, Value::list([Value::bool(true)].into_iter().collect()));
        let passthrough = native_to_value(&reg, Native::Value(Value::ok()), &f, &tok());
        assert_eq!(passthrough, Value::ok());
    }

    #[test]
    fn test_failure_becomes_runtime_error() {
        let (reg, ..) = registry();
        let f = NativeFn::new("open", |_, _| Native::Nil);
        let v = native_to_value(&reg, Native::Failure("no such file".into()), &f, &tok());
        let err = v.as_error().unwrap();
        assert_eq!(err.id, "vm/native/runtime");
        assert!(err.message.contains("no such file"));
    }

    #[test]
    fn test_recognizers_in_order() {
        let (reg, point, day, tags, span) = registry();
        let f = recognizing(point, day, tags, span);
        let p = native_to_value(&reg, Native::Host(Rc::new(Point(3, 4))), &f, &tok());
        assert_eq!(p, Value::fields(point, vec![Value::int(3), Value::int(4)]));
        let d = native_to_value(&reg, Native::Host(Rc::new(Weekday(0))), &f, &tok());
        assert_eq!(d, Value::enum_element(day, 0));
        let t = native_to_value(&reg, Native::Host(Rc::new(Tags(vec!["b", "a"]))), &f, &tok());
        assert_eq!(t.ty, tags);
        assert_eq!(t.as_set().unwrap().len(), 2);
    }

    #[test]
    fn test_bad_clone_and_unknown_host_are_type_errors() {
        let (reg, point, day, tags, span) = registry();
        let f = recognizing(point, day, tags, span);
        let three = native_to_value(&reg, Native::Host(Rc::new(Span(1, 2, 3))), &f, &tok());
        assert_eq!(three.as_error().unwrap().id, "vm/native/type");
        let unknown = native_to_value(&reg, Native::Host(Rc::new(42u8)), &f, &tok());
        assert_eq!(unknown.as_error().unwrap().id, "vm/native/type");
    }
}
