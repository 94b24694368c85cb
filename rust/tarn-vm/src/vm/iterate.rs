use super::{Vm, VmError};
use tarn_core::iterator::ValueIter;
use tarn_core::types::ValueType;
use tarn_core::values::{Payload, Value};

impl Vm {
    /// `Mkit`: an iterator over `m1`. With `k2 == 1` only keys are wanted,
    /// so sequences iterate their indices.
    pub(super) fn make_iterator(&mut self, a: &[u32]) -> Result<(), VmError> {
        let v = self.iterator_over(self.reg(a[1])?, a[2] == 1, a[3])?;
        self.set(a[0], v);
        Ok(())
    }

    fn iterator_over(&self, v: &Value, keys_only: bool, tok: u32) -> Result<Value, VmError> {
        let it = match &v.payload {
            // `for i in n` counts 0..n, so a negative count runs no iterations.
            Payload::Int(n) => ValueIter::keys(usize::try_from(*n).unwrap_or(0)),
            Payload::List(items) if keys_only => ValueIter::keys(items.len()),
            Payload::List(items) => ValueIter::list(items.clone()),
            Payload::Str(s) if v.ty != ValueType::BLING => {
                if keys_only {
                    ValueIter::keys(s.chars().count())
                } else {
                    ValueIter::string(s)
                }
            }
            Payload::Tuple(items) if keys_only => ValueIter::keys(items.len()),
            Payload::Tuple(items) => ValueIter::tuple(items.clone()),
            Payload::Map(map) => ValueIter::map(map.iter()),
            Payload::Set(set) => ValueIter::set(set.iter()),
            Payload::Pair(p) => match (p.0.as_int(), p.1.as_int()) {
                (Ok(left), Ok(right)) => ValueIter::range(left, right),
                _ => return self.error("vm/for/pair", tok, Vec::new()),
            },
            Payload::Type(at) => {
                let Some(ty) = at.only() else {
                    return self.error("vm/for/type/a", tok, vec![self.describe_abstract(at).into()]);
                };
                let Some(e) = self.types.enum_type(ty) else {
                    return self.error("vm/for/type/b", tok, vec![self.describe_type(ty).into()]);
                };
                if keys_only {
                    ValueIter::keys(e.element_names.len())
                } else {
                    ValueIter::enumeration(ty, e.element_names.len())
                }
            }
            _ => return self.error("vm/for/type", tok, vec![self.describe_type(v.ty).into()]),
        };
        Ok(Value::iterator(it))
    }
}
