//! Arithmetic, equality, casts and container construction.

use super::{Vm, VmError};
use im_rc::{OrdMap, OrdSet, Vector};
use std::rc::Rc;
use tarn_core::program::Opcode;
use tarn_core::types::ValueType;
use tarn_core::values::{Payload, PayloadError, Value};

/// Equality between two values of one concrete type. Floats follow IEEE
/// comparison and functions are never equal.
pub(super) fn equals(x: &Value, y: &Value) -> bool {
    match (&x.payload, &y.payload) {
        (Payload::Float(a), Payload::Float(b)) => a == b,
        (Payload::Func(_), Payload::Func(_)) => false,
        _ => x == y,
    }
}

/// Whether `v` is a string of at most `limit` characters.
pub(super) fn within_varchar(v: &Value, limit: u32) -> bool {
    match (&v.payload, v.ty) {
        (Payload::Str(s), ValueType::STRING) => s.chars().count() <= limit as usize,
        _ => false,
    }
}

pub(super) fn concat_tuples(opcode: Opcode, x: &Value, y: &Value) -> Result<Value, PayloadError> {
    let items = match opcode {
        Opcode::Cc11 => vec![x.clone(), y.clone()],
        Opcode::Cc1T => {
            let mut items = vec![x.clone()];
            items.extend(y.as_tuple()?.iter().cloned());
            items
        }
        Opcode::CcT1 => {
            let mut items = x.as_tuple()?.as_ref().clone();
            items.push(y.clone());
            items
        }
        Opcode::CcTT => {
            let mut items = x.as_tuple()?.as_ref().clone();
            items.extend(y.as_tuple()?.iter().cloned());
            items
        }
        _ => {
            let mut items = x.tuple_items();
            items.extend(y.tuple_items());
            items
        }
    };
    Ok(Value::tuple(items))
}

impl Vm {
    /// Integer arithmetic keeps the left operand's type, so clones of `int`
    /// stay clones.
    pub(super) fn int_op(&mut self, a: &[u32], f: impl Fn(i64, i64) -> i64) -> Result<(), VmError> {
        let x = self.reg(a[1])?;
        let v = Value::new(x.ty, Payload::Int(f(x.as_int()?, self.int(a[2])?)));
        self.set(a[0], v);
        Ok(())
    }

    pub(super) fn float_op(&mut self, a: &[u32], f: impl Fn(f64, f64) -> f64) -> Result<(), VmError> {
        let x = self.reg(a[1])?;
        let v = Value::new(x.ty, Payload::Float(f(x.as_float()?, self.float(a[2])?)));
        self.set(a[0], v);
        Ok(())
    }

    /// Stores the quotient, or the error `id` located at token `a[3]` when
    /// the divisor is zero.
    pub(super) fn divide(
        &mut self,
        a: &[u32],
        by_zero: bool,
        id: &str,
        quotient: impl FnOnce() -> Value,
    ) -> Result<(), VmError> {
        let v = if by_zero {
            self.error(id, a[3], Vec::new())?
        } else {
            quotient()
        };
        self.set(a[0], v);
        Ok(())
    }

    pub(super) fn concatenate(&mut self, opcode: Opcode, a: &[u32]) -> Result<(), VmError> {
        let (x, y) = (self.reg(a[1])?, self.reg(a[2])?);
        let v = match opcode {
            Opcode::AddL => {
                let mut items = x.as_list()?.clone();
                items.append(y.as_list()?.clone());
                Value::list(items)
            }
            Opcode::AddS => Value::set(x.as_set()?.clone().union(y.as_set()?.clone())),
            Opcode::Adrr => Value::string(&format!("{}{}", x.as_rune()?, y.as_rune()?)),
            Opcode::Adrs => Value::string(&format!("{}{}", x.as_rune()?, y.as_str()?)),
            Opcode::Adsr => Value::string(&format!("{}{}", x.as_str()?, y.as_rune()?)),
            _ => Value::string(&format!("{}{}", x.as_str()?, y.as_str()?)),
        };
        self.set(a[0], v);
        Ok(())
    }

    /// `Casx`: the target must name exactly one concrete type reachable
    /// through the clone relation.
    pub(super) fn cast(&mut self, a: &[u32]) -> Result<(), VmError> {
        let (v, target) = (self.reg(a[1])?, self.reg(a[2])?.as_type()?);
        let result = match target.only() {
            None => self.error("vm/cast/a", a[3], vec![self.describe_abstract(target).into()])?,
            Some(ty) if self.types.can_cast(v.ty, ty) => v.retyped(ty),
            Some(ty) => self.error(
                "vm/cast/b",
                a[3],
                vec![self.describe_type(v.ty).into(), self.describe_type(ty).into()],
            )?,
        };
        self.set(a[0], result);
        Ok(())
    }

    pub(super) fn make_map(&mut self, a: &[u32]) -> Result<(), VmError> {
        let mut map = OrdMap::new();
        let mut failure = None;
        for item in self.reg(a[1])?.tuple_items() {
            let Ok((k, v)) = item.as_pair() else {
                failure = Some(self.error("vm/map/pair", a[2], vec![self.describe_type(item.ty).into()])?);
                break;
            };
            if !self.types.is_orderable(k.ty) {
                failure = Some(self.error("vm/map/key", a[2], vec![self.describe_type(k.ty).into()])?);
                break;
            }
            map.insert(k.clone(), v.clone());
        }
        self.set(a[0], failure.unwrap_or_else(|| Value::map(map)));
        Ok(())
    }

    pub(super) fn make_set(&mut self, a: &[u32]) -> Result<(), VmError> {
        let mut set = OrdSet::new();
        let mut failure = None;
        for item in self.reg(a[1])?.tuple_items() {
            if !self.types.is_orderable(item.ty) {
                failure = Some(self.error("vm/set", a[2], vec![self.describe_type(item.ty).into()])?);
                break;
            }
            set.insert(item);
        }
        self.set(a[0], failure.unwrap_or_else(|| Value::set(set)));
        Ok(())
    }

    /// A snippet value carries its source text, the current values of its
    /// interpolated registers and its bindle.
    pub(super) fn make_snippet(&mut self, a: &[u32]) -> Result<(), VmError> {
        let factory = self
            .snippet_factories
            .get(a[1] as usize)
            .ok_or(VmError::UnknownSnippetFactory(a[1]))?;
        let values: Vector<Value> = factory
            .bindle
            .value_locs
            .iter()
            .map(|r| self.reg(*r).cloned())
            .collect::<Result<_, VmError>>()?;
        let data = Value::new(ValueType::SNIPPET_DATA, Payload::Snippet(Rc::new(factory.bindle.clone())));
        let v = Value::fields(
            factory.snippet_type,
            vec![Value::string(&factory.source), Value::list(values), data],
        );
        self.set(a[0], v);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equals_floats_and_funcs() {
        assert!(equals(&Value::float(0.0), &Value::float(-0.0)));
        assert!(!equals(&Value::float(f64::NAN), &Value::float(f64::NAN)));
        assert!(equals(&Value::string("a"), &Value::string("a")));
    }

    #[test]
    fn test_within_varchar_counts_chars() {
        assert!(within_varchar(&Value::string("héé"), 3));
        assert!(!within_varchar(&Value::string("four"), 3));
        assert!(!within_varchar(&Value::int(1), 3));
    }

    #[test]
    fn test_concat_flattens_mixed() {
        let t = Value::tuple(vec![Value::int(1), Value::int(2)]);
        let v = concat_tuples(Opcode::Ccxx, &t, &Value::int(3)).unwrap();
        assert_eq!(v.tuple_items(), vec![Value::int(1), Value::int(2), Value::int(3)]);
        let v = concat_tuples(Opcode::Cc11, &t, &Value::int(3)).unwrap();
        assert_eq!(v.as_tuple().unwrap().len(), 2);
        assert!(concat_tuples(Opcode::CcTT, &Value::int(1), &t).is_err());
    }
}
