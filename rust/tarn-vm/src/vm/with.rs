//! `with` and `without`: functional update of lists, maps and structs
//! along key paths, and struct construction from label::value pairs.

use super::{Vm, VmError};
use tarn_core::types::ValueType;
use tarn_core::values::{Payload, Value};

impl Vm {
    /// Applies each `key::value` pair of `m2` to `m1` in order. A list key
    /// is a path into nested containers.
    pub(super) fn with_pairs(&mut self, a: &[u32], kind: &str) -> Result<(), VmError> {
        let mut result = self.reg(a[1])?.clone();
        for item in self.reg(a[2])?.tuple_items() {
            let Ok((key, value)) = item.as_pair() else {
                result = self.error(&format!("vm/with/{kind}/a"), a[3], vec![self.describe_type(item.ty).into()])?;
                break;
            };
            let path: Vec<Value> = match key.as_list() {
                Ok(keys) => keys.iter().cloned().collect(),
                Err(_) => vec![key.clone()],
            };
            if path.is_empty() {
                result = self.error(&format!("vm/with/{kind}/b"), a[3], Vec::new())?;
                break;
            }
            result = self.with_path(&result, &path, value, a[3])?;
            if result.is_error() {
                break;
            }
        }
        self.set(a[0], result);
        Ok(())
    }

    /// `container` with the element at `path` replaced by `value`. Errors
    /// from deeper levels are returned unchanged.
    fn with_path(&self, container: &Value, path: &[Value], value: &Value, tok: u32) -> Result<Value, VmError> {
        let Some((key, rest)) = path.split_first() else {
            return Ok(value.clone());
        };
        match &container.payload {
            Payload::List(items) => {
                let Ok(i) = key.as_int() else {
                    return self.error("vm/with/a", tok, vec![self.describe_type(key.ty).into()]);
                };
                let Some(ix) = usize::try_from(i).ok().filter(|ix| *ix < items.len()) else {
                    return self.error("vm/with/b", tok, vec![i.into(), items.len().into()]);
                };
                let element = self.with_path(&items[ix], rest, value, tok)?;
                if element.is_error() {
                    return Ok(element);
                }
                Ok(Value::new(container.ty, Payload::List(items.update(ix, element))))
            }
            Payload::Map(map) => {
                if !self.types.is_orderable(key.ty) {
                    return self.error("vm/with/c", tok, vec![self.describe_type(key.ty).into()]);
                }
                let element = if rest.is_empty() {
                    value.clone()
                } else {
                    let Some(existing) = map.get(key) else {
                        return self.error("vm/index/h", tok, vec![self.literal(key).into()]);
                    };
                    self.with_path(existing, rest, value, tok)?
                };
                if element.is_error() {
                    return Ok(element);
                }
                Ok(Value::new(container.ty, Payload::Map(map.update(key.clone(), element))))
            }
            Payload::Fields(fields) => {
                let Ok(label) = key.as_label() else {
                    return self.error("vm/with/d", tok, vec![self.describe_type(key.ty).into()]);
                };
                let st = self.types.struct_type(container.ty).ok_or(VmError::UnknownType(container.ty))?;
                let Some(ix) = st.resolve(label).filter(|ix| *ix < fields.len()) else {
                    return self.error(
                        "vm/with/e",
                        tok,
                        vec![self.label_text(label).into(), st.name.as_str().into()],
                    );
                };
                let element = self.with_path(&fields[ix], rest, value, tok)?;
                if element.is_error() {
                    return Ok(element);
                }
                if !st.field_types[ix].accepts(&element) {
                    return self.error(
                        "vm/with/f",
                        tok,
                        vec![
                            self.describe_type(element.ty).into(),
                            self.label_text(label).into(),
                            st.name.as_str().into(),
                            self.describe_abstract(&st.field_types[ix]).into(),
                        ],
                    );
                }
                let mut updated = fields.as_ref().clone();
                updated[ix] = element;
                Ok(Value::fields(container.ty, updated))
            }
            _ => self.error("vm/with/g", tok, vec![self.describe_type(container.ty).into()]),
        }
    }

    /// `Wtht`: builds a struct of type `m1` from label::value pairs. Fields
    /// left unset become null if their type admits it.
    pub(super) fn construct_struct(&mut self, a: &[u32]) -> Result<(), VmError> {
        let v = self.build_struct(self.reg(a[1])?, &self.reg(a[2])?.tuple_items(), a[3])?;
        self.set(a[0], v);
        Ok(())
    }

    fn build_struct(&self, target: &Value, pairs: &[Value], tok: u32) -> Result<Value, VmError> {
        let at = target.as_type()?;
        let Some(ty) = at.only() else {
            return self.error("vm/with/type/a", tok, vec![self.describe_abstract(at).into()]);
        };
        let Some(st) = self.types.struct_type(ty) else {
            return self.error("vm/with/type/b", tok, vec![self.describe_type(ty).into()]);
        };
        let mut slots: Vec<Option<Value>> = vec![None; st.len()];
        for item in pairs {
            let Ok((key, value)) = item.as_pair() else {
                return self.error("vm/with/type/c", tok, vec![self.describe_type(item.ty).into()]);
            };
            let Ok(label) = key.as_label() else {
                return self.error("vm/with/type/d", tok, vec![self.describe_type(key.ty).into()]);
            };
            let Some(ix) = st.resolve(label) else {
                return self.error(
                    "vm/with/type/e",
                    tok,
                    vec![self.label_text(label).into(), st.name.as_str().into()],
                );
            };
            if slots[ix].is_some() {
                return self.error("vm/with/type/f", tok, vec![self.label_text(label).into()]);
            }
            if !st.field_types[ix].accepts(value) {
                return self.error(
                    "vm/with/type/h",
                    tok,
                    vec![
                        self.describe_type(value.ty).into(),
                        self.label_text(label).into(),
                        st.name.as_str().into(),
                        self.describe_abstract(&st.field_types[ix]).into(),
                    ],
                );
            }
            slots[ix] = Some(value.clone());
        }
        let mut fields = Vec::with_capacity(slots.len());
        for (ix, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(v) => fields.push(v),
                None if st.field_types[ix].contains(ValueType::NULL) => fields.push(Value::null()),
                None => {
                    return self.error("vm/with/type/g", tok, vec![self.label_text(st.label_numbers[ix]).into()]);
                }
            }
        }
        Ok(Value::fields(ty, fields))
    }

    pub(super) fn without(&mut self, a: &[u32]) -> Result<(), VmError> {
        let container = self.reg(a[1])?;
        let v = match &container.payload {
            Payload::Map(map) => {
                let mut map = map.clone();
                for key in self.reg(a[2])?.tuple_items() {
                    map.remove(&key);
                }
                Value::new(container.ty, Payload::Map(map))
            }
            _ => self.error("vm/without", a[3], vec![self.describe_type(container.ty).into()])?,
        };
        self.set(a[0], v);
        Ok(())
    }
}
