//! Rendering values as source literals and as user-facing descriptions.

use std::fmt::Write as _;
use tarn_core::types::{Flavor, TypeInfo, TypeRegistry, ValueType};
use tarn_core::values::{Payload, Value};

/// Renders a value as source text that would reproduce it.
pub fn literal(types: &TypeRegistry, v: &Value) -> String {
    let mut out = String::new();
    write_literal(&mut out, types, v);
    out
}

/// Like [`literal`], except that a top-level string or rune is shown bare.
pub fn default_description(types: &TypeRegistry, v: &Value) -> String {
    match (&v.payload, types.get(v.ty)) {
        (Payload::Str(s), Some(TypeInfo::Native(_))) if v.ty == ValueType::STRING => s.to_string(),
        (Payload::Rune(c), Some(TypeInfo::Native(_))) => c.to_string(),
        _ => literal(types, v),
    }
}

fn float_literal(x: f64) -> String {
    let s = x.to_string();
    if x.is_finite() && !s.contains('.') {
        format!("{s}.0")
    } else {
        s
    }
}

fn write_joined<'a>(out: &mut String, types: &TypeRegistry, items: impl Iterator<Item = &'a Value>) {
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_literal(out, types, item);
    }
}

fn write_literal(out: &mut String, types: &TypeRegistry, v: &Value) {
    if let Some(TypeInfo::Clone(c)) = types.get(v.ty) {
        let _ = write!(out, "{}{}(", c.path, c.name);
        write_literal(out, types, &v.retyped(c.parent));
        out.push(')');
        return;
    }
    match &v.payload {
        Payload::Unit => out.push_str(match v.ty {
            ValueType::NULL => "NULL",
            ValueType::OK => "OK",
            ValueType::UNSATISFIED_CONDITIONAL => "UNSATISFIED CONDITIONAL",
            _ => "UNDEFINED VALUE",
        }),
        Payload::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Payload::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Payload::Float(x) => out.push_str(&float_literal(*x)),
        Payload::Rune(c) => {
            let _ = write!(out, "{c:?}");
        }
        Payload::Str(s) if v.ty == ValueType::BLING => out.push_str(s),
        Payload::Str(s) => {
            let _ = write!(out, "{s:?}");
        }
        Payload::Pair(p) => {
            write_literal(out, types, &p.0);
            out.push_str("::");
            write_literal(out, types, &p.1);
        }
        Payload::Tuple(items) => {
            out.push_str("tuple(");
            write_joined(out, types, items.iter());
            out.push(')');
        }
        Payload::List(items) => {
            out.push('[');
            write_joined(out, types, items.iter());
            out.push(']');
        }
        Payload::Set(items) => {
            out.push_str("set(");
            write_joined(out, types, items.iter());
            out.push(')');
        }
        Payload::Map(entries) => {
            out.push_str("map(");
            for (i, (k, val)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_literal(out, types, k);
                out.push_str("::");
                write_literal(out, types, val);
            }
            out.push(')');
        }
        Payload::Fields(fields) => {
            out.push_str(&types.describe_type(v.ty, Flavor::Literal));
            out.push_str(" with (");
            let labels = types.struct_type(v.ty).map(|s| s.label_numbers.as_slice()).unwrap_or(&[]);
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let name = labels.get(i).and_then(|l| types.label_name(*l)).unwrap_or("?");
                let _ = write!(out, "{name}::");
                write_literal(out, types, field);
            }
            out.push(')');
        }
        Payload::Enum(ordinal) => match types.enum_type(v.ty) {
            Some(e) => {
                let element = e.element_names.get(*ordinal).map(String::as_str).unwrap_or("?");
                let _ = write!(out, "{}{element}", e.path);
            }
            None => {
                let _ = write!(out, "{v}");
            }
        },
        Payload::Label(l) => out.push_str(types.label_name(*l).unwrap_or("?")),
        Payload::Type(at) => out.push_str(&types.describe_abstract(at, Flavor::Literal)),
        Payload::Error(e) => {
            let _ = write!(out, "error {:?}", e.message);
        }
        Payload::Func(_)
        | Payload::Iterator(_)
        | Payload::Thunk { .. }
        | Payload::Reference(_)
        | Payload::IntArray(_)
        | Payload::Snippet(_) => {
            let _ = write!(out, "{v}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_core::types::{AbstractType, CloneType};

    #[test]
    fn test_primitives() {
        let reg = TypeRegistry::new();
        assert_eq!(literal(&reg, &Value::float(3.0)), "3.0");
        assert_eq!(literal(&reg, &Value::float(0.5)), "0.5");
        assert_eq!(literal(&reg, &Value::string("a\"b")), "\"a\\\"b\"");
        assert_eq!(literal(&reg, &Value::rune('x')), "'x'");
        assert_eq!(literal(&reg, &Value::null()), "NULL");
        assert_eq!(literal(&reg, &Value::bling("to")), "to");
    }

    #[test]
    fn test_description_unquotes_top_level_only() {
        let reg = TypeRegistry::new();
        assert_eq!(default_description(&reg, &Value::string("hi")), "hi");
        assert_eq!(default_description(&reg, &Value::rune('q')), "q");
        let pair = Value::pair(Value::string("k"), Value::int(1));
        assert_eq!(default_description(&reg, &pair), "\"k\"::1");
    }

    #[test]
    fn test_containers() {
        let reg = TypeRegistry::new();
        let list = Value::list([Value::int(1), Value::int(2)].into_iter().collect());
        assert_eq!(literal(&reg, &list), "[1, 2]");
        let set = Value::set([Value::int(2), Value::int(1)].into_iter().collect());
        assert_eq!(literal(&reg, &set), "set(1, 2)");
        let map = Value::map([(Value::string("a"), Value::bool(true))].into_iter().collect());
        assert_eq!(literal(&reg, &map), "map(\"a\"::true)");
        let tup = Value::tuple(vec![Value::int(1), Value::float(2.5)]);
        assert_eq!(literal(&reg, &tup), "tuple(1, 2.5)");
    }

    #[test]
    fn test_user_types() {
        let mut reg = TypeRegistry::new();
        let color = reg.add_enum("Color", "", &["RED", "GREEN"], false);
        let person = reg.add_struct(
            "Person",
            "",
            &[
                ("name", AbstractType::single(ValueType::STRING)),
                ("age", AbstractType::single(ValueType::INT)),
            ],
            false,
        );
        let meters = reg.add_clone(CloneType::new("Meters", ValueType::INT));
        assert_eq!(literal(&reg, &Value::enum_element(color, 1)), "GREEN");
        let p = Value::fields(person, vec![Value::string("Ann"), Value::int(30)]);
        assert_eq!(literal(&reg, &p), "Person with (name::\"Ann\", age::30)");
        assert_eq!(literal(&reg, &Value::int(5).retyped(meters)), "Meters(5)");
        let at = Value::abstract_type(AbstractType::new([ValueType::INT, ValueType::STRING]));
        assert_eq!(literal(&reg, &at), "int/string");
        assert_eq!(literal(&reg, &Value::label(reg.label_number("age").unwrap())), "age");
    }
}
