//! Indexing and slicing. Out-of-range and ill-typed indices produce error
//! values; only malformed constant operands are fatal.

use super::{Vm, VmError};
use tarn_core::diagnostics::ErrorArg;
use tarn_core::program::Opcode;
use tarn_core::types::ValueType;
use tarn_core::values::{Payload, Value};

/// Position `i` in a container of length `len`, if in range.
fn position(i: i64, len: usize) -> Option<usize> {
    usize::try_from(i).ok().filter(|ix| *ix < len)
}

enum Bounds {
    Valid(usize, usize),
    /// The violated clause, as the error id's final letter, and its args.
    Invalid(&'static str, Vec<ErrorArg>),
}

fn substring(s: &str, lo: usize, hi: usize) -> String {
    s.chars().skip(lo).take(hi - lo).collect()
}

impl Vm {
    pub(super) fn label_text(&self, label: usize) -> String {
        self.types
            .label_name(label)
            .map_or_else(|| format!("label {label}"), str::to_string)
    }

    fn struct_name(&self, ty: ValueType) -> String {
        self.types.get(ty).map_or_else(|| ty.to_string(), |info| info.name().to_string())
    }

    /// A slice is valid iff `0 <= lo <= hi <= len`.
    fn slice_bounds(&self, range: &Value, len: usize) -> Result<Bounds, VmError> {
        let (lo, hi) = range.as_pair()?;
        let Ok(l) = lo.as_int() else {
            return Ok(Bounds::Invalid("a", vec![self.describe_type(lo.ty).into()]));
        };
        let Ok(h) = hi.as_int() else {
            return Ok(Bounds::Invalid("b", vec![self.describe_type(hi.ty).into()]));
        };
        if l < 0 {
            return Ok(Bounds::Invalid("c", vec![l.into()]));
        }
        if h < l {
            return Ok(Bounds::Invalid("d", vec![l.into(), h.into()]));
        }
        if h as u64 > len as u64 {
            return Ok(Bounds::Invalid("e", vec![h.into(), len.into()]));
        }
        Ok(Bounds::Valid(l as usize, h as usize))
    }

    pub(super) fn index_list(&mut self, a: &[u32]) -> Result<(), VmError> {
        let items = self.reg(a[1])?.as_list()?;
        let i = self.int(a[2])?;
        let v = match position(i, items.len()) {
            Some(ix) => items[ix].clone(),
            None => self.error("vm/index/list", a[3], vec![i.into(), items.len().into()])?,
        };
        self.set(a[0], v);
        Ok(())
    }

    pub(super) fn index_pair(&mut self, a: &[u32]) -> Result<(), VmError> {
        let (left, right) = self.reg(a[1])?.as_pair()?;
        let v = match self.int(a[2])? {
            0 => left.clone(),
            1 => right.clone(),
            i => self.error("vm/index/pair", a[3], vec![i.into()])?,
        };
        self.set(a[0], v);
        Ok(())
    }

    pub(super) fn index_string(&mut self, a: &[u32]) -> Result<(), VmError> {
        let s = self.text(a[1])?;
        let i = self.int(a[2])?;
        let v = match usize::try_from(i).ok().and_then(|ix| s.chars().nth(ix)) {
            Some(c) => Value::rune(c),
            None => self.error("vm/index/string", a[3], vec![i.into(), s.chars().count().into()])?,
        };
        self.set(a[0], v);
        Ok(())
    }

    pub(super) fn index_type(&mut self, a: &[u32]) -> Result<(), VmError> {
        let at = self.reg(a[1])?.as_type()?;
        let i = self.int(a[2])?;
        let v = match at.only().and_then(|ty| self.types.enum_type(ty).map(|e| (ty, e))) {
            None => self.error("vm/index/type/a", a[3], vec![self.describe_abstract(at).into()])?,
            Some((ty, e)) => match position(i, e.element_names.len()) {
                Some(ix) => Value::enum_element(ty, ix),
                None => self.error("vm/index/type/b", a[3], vec![e.name.as_str().into(), i.into()])?,
            },
        };
        self.set(a[0], v);
        Ok(())
    }

    pub(super) fn index_tuple(&mut self, a: &[u32]) -> Result<(), VmError> {
        let items = self.reg(a[1])?.as_tuple()?;
        let i = self.int(a[2])?;
        let v = match position(i, items.len()) {
            Some(ix) => items[ix].clone(),
            None => self.error("vm/index/tuple", a[3], vec![i.into(), items.len().into()])?,
        };
        self.set(a[0], v);
        Ok(())
    }

    pub(super) fn index_tuple_constant(&mut self, a: &[u32]) -> Result<(), VmError> {
        let items = self.reg(a[1])?.as_tuple()?;
        let v = items.get(a[2] as usize).cloned().ok_or(VmError::ConstantIndex {
            index: a[2],
            len: items.len(),
        })?;
        self.set(a[0], v);
        Ok(())
    }

    pub(super) fn index_struct_constant(&mut self, a: &[u32]) -> Result<(), VmError> {
        let fields = self.reg(a[1])?.as_fields()?;
        let v = fields.get(a[2] as usize).cloned().ok_or(VmError::ConstantIndex {
            index: a[2],
            len: fields.len(),
        })?;
        self.set(a[0], v);
        Ok(())
    }

    pub(super) fn index_struct_label(&mut self, a: &[u32]) -> Result<(), VmError> {
        let v = self.struct_field(self.reg(a[1])?, self.reg(a[2])?.as_label()?, a[3])?;
        self.set(a[0], v);
        Ok(())
    }

    fn struct_field(&self, s: &Value, label: usize, tok: u32) -> Result<Value, VmError> {
        let fields = s.as_fields()?;
        let found = self
            .types
            .struct_type(s.ty)
            .and_then(|st| st.resolve(label))
            .and_then(|ix| fields.get(ix));
        match found {
            Some(v) => Ok(v.clone()),
            None => self.error(
                "vm/index/r",
                tok,
                vec![self.struct_name(s.ty).into(), self.label_text(label).into()],
            ),
        }
    }

    pub(super) fn slice(&mut self, opcode: Opcode, a: &[u32]) -> Result<(), VmError> {
        let (container, range) = (self.reg(a[1])?, self.reg(a[2])?);
        let kind = match opcode {
            Opcode::SliL => "list",
            Opcode::Slis => "string",
            _ => "tuple",
        };
        let len = match opcode {
            Opcode::SliL => container.as_list()?.len(),
            Opcode::Slis => container.as_str()?.chars().count(),
            _ => container.as_tuple()?.len(),
        };
        let v = match self.slice_bounds(range, len)? {
            Bounds::Invalid(clause, args) => self.error(&format!("vm/slice/{kind}/{clause}"), a[3], args)?,
            Bounds::Valid(lo, hi) => sliced(container, lo, hi)?,
        };
        self.set(a[0], v);
        Ok(())
    }

    pub(super) fn slice_tuple_constant(&mut self, a: &[u32]) -> Result<(), VmError> {
        let items = self.reg(a[1])?.as_tuple()?;
        let rest = items.get(a[2] as usize..).ok_or(VmError::ConstantIndex {
            index: a[2],
            len: items.len(),
        })?;
        let v = Value::tuple(rest.to_vec());
        self.set(a[0], v);
        Ok(())
    }

    /// `IxXx`: indexing whose container kind is only known at runtime. A
    /// pair index slices.
    pub(super) fn index_any(&mut self, a: &[u32]) -> Result<(), VmError> {
        let v = self.index_value(self.reg(a[1])?, self.reg(a[2])?, a[3])?;
        self.set(a[0], v);
        Ok(())
    }

    fn index_value(&self, container: &Value, index: &Value, tok: u32) -> Result<Value, VmError> {
        if let Payload::Pair(_) = index.payload {
            let len = match &container.payload {
                Payload::List(items) => items.len(),
                Payload::Str(s) if container.ty != ValueType::BLING => s.chars().count(),
                Payload::Tuple(items) => items.len(),
                _ => return self.error("vm/index/g", tok, vec![self.describe_type(container.ty).into()]),
            };
            return match self.slice_bounds(index, len)? {
                Bounds::Valid(lo, hi) => Ok(sliced(container, lo, hi)?),
                Bounds::Invalid("e", args) if !matches!(container.payload, Payload::List(_)) => {
                    self.error("vm/index/f", tok, args)
                }
                Bounds::Invalid(clause, args) => self.error(&format!("vm/index/{clause}"), tok, args),
            };
        }
        let mismatch = || {
            self.error(
                "vm/index/i",
                tok,
                vec![self.describe_type(container.ty).into(), self.describe_type(index.ty).into()],
            )
        };
        match &container.payload {
            Payload::Map(map) => match map.get(index) {
                Some(v) => Ok(v.clone()),
                None => self.error("vm/index/h", tok, vec![self.literal(index).into()]),
            },
            Payload::Fields(_) => match index.as_label() {
                Ok(label) => self.struct_field(container, label, tok),
                Err(_) => mismatch(),
            },
            Payload::Type(at) => {
                let Ok(i) = index.as_int() else {
                    return mismatch();
                };
                let Some(ty) = at.only() else {
                    return self.error("vm/index/n", tok, vec![self.describe_abstract(at).into()]);
                };
                let Some(e) = self.types.enum_type(ty) else {
                    return self.error("vm/index/o", tok, vec![self.describe_type(ty).into()]);
                };
                match position(i, e.element_names.len()) {
                    Some(ix) => Ok(Value::enum_element(ty, ix)),
                    None => self.error("vm/index/p", tok, vec![e.name.as_str().into(), i.into()]),
                }
            }
            Payload::List(_) | Payload::Pair(_) | Payload::Str(_) | Payload::Tuple(_)
                if container.ty != ValueType::BLING =>
            {
                let Ok(i) = index.as_int() else {
                    return mismatch();
                };
                match &container.payload {
                    Payload::List(items) => match position(i, items.len()) {
                        Some(ix) => Ok(items[ix].clone()),
                        None => self.error("vm/index/j", tok, vec![i.into(), items.len().into()]),
                    },
                    Payload::Pair(p) => match i {
                        0 => Ok(p.0.clone()),
                        1 => Ok(p.1.clone()),
                        _ => self.error("vm/index/k", tok, vec![i.into()]),
                    },
                    Payload::Str(s) => match usize::try_from(i).ok().and_then(|ix| s.chars().nth(ix)) {
                        Some(c) => Ok(Value::rune(c)),
                        None => self.error("vm/index/l", tok, vec![i.into(), s.chars().count().into()]),
                    },
                    Payload::Tuple(items) => match position(i, items.len()) {
                        Some(ix) => Ok(items[ix].clone()),
                        None => self.error("vm/index/m", tok, vec![i.into(), items.len().into()]),
                    },
                    _ => mismatch(),
                }
            }
            _ => self.error("vm/index/q", tok, vec![self.describe_type(container.ty).into()]),
        }
    }
}

/// The `lo..hi` slice of a list, string or tuple, keeping the container's
/// concrete type.
fn sliced(container: &Value, lo: usize, hi: usize) -> Result<Value, VmError> {
    let payload = match &container.payload {
        Payload::List(items) => Payload::List(items.clone().slice(lo..hi)),
        Payload::Str(s) => Payload::Str(substring(s, lo, hi).into()),
        _ => {
            let items = container.as_tuple()?;
            return Ok(Value::new(container.ty, Payload::Tuple(items[lo..hi].to_vec().into())));
        }
    };
    Ok(Value::new(container.ty, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_rejects_negative_and_overflow() {
        assert_eq!(position(0, 3), Some(0));
        assert_eq!(position(2, 3), Some(2));
        assert_eq!(position(3, 3), None);
        assert_eq!(position(-1, 3), None);
    }

    #[test]
    fn test_substring_counts_chars() {
        assert_eq!(substring("héllo", 1, 3), "él");
        assert_eq!(substring("abc", 3, 3), "");
    }

    #[test]
    fn test_sliced_keeps_type() {
        let list = Value::list((1..=5).map(Value::int).collect());
        let v = sliced(&list, 1, 3).unwrap();
        assert_eq!(v.as_list().unwrap().len(), 2);
        assert_eq!(v.as_list().unwrap()[0], Value::int(2));
        let t = Value::tuple(vec![Value::int(1), Value::int(2)]);
        assert_eq!(sliced(&t, 0, 1).unwrap().tuple_items(), vec![Value::int(1)]);
    }
}
