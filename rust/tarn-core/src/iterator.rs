//! Iterator protocol for `for` loops.
//!
//! Peeking (`key`, `value`, `key_value`) never moves the cursor; only
//! [`ValueIter::advance`] does.

use crate::types::ValueType;
use crate::values::Value;
use im_rc::Vector;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum ValueIter {
    /// Index-only walk of `0..max`.
    KeyInc { max: i64, val: i64 },
    /// Ascending inclusive range. `done` is set on stepping past `max`,
    /// so `val` never leaves the range.
    Inc { start: i64, max: i64, val: i64, done: bool },
    /// Descending inclusive range, finished once `min` has been consumed.
    Dec { start: i64, min: i64, val: i64, done: bool },
    List { items: Vector<Value>, pos: usize },
    Str { chars: Rc<[char]>, pos: usize },
    Map { entries: Rc<[(Value, Value)]>, pos: usize },
    Set { items: Rc<[Value]>, pos: usize },
    Tuple { items: Rc<Vec<Value>>, pos: usize },
    Enum { ty: ValueType, max: usize, pos: usize },
}

impl ValueIter {
    /// An inclusive integer range walked from `left` towards `right`.
    pub fn range(left: i64, right: i64) -> Self {
        if left <= right {
            ValueIter::Inc {
                start: left,
                max: right,
                val: left,
                done: false,
            }
        } else {
            ValueIter::Dec {
                start: left,
                min: right,
                val: left,
                done: false,
            }
        }
    }

    pub fn keys(max: usize) -> Self {
        ValueIter::KeyInc {
            max: max as i64,
            val: 0,
        }
    }

    pub fn list(items: Vector<Value>) -> Self {
        ValueIter::List { items, pos: 0 }
    }

    pub fn string(s: &str) -> Self {
        ValueIter::Str {
            chars: s.chars().collect(),
            pos: 0,
        }
    }

    pub fn map<'a>(entries: impl Iterator<Item = (&'a Value, &'a Value)>) -> Self {
        ValueIter::Map {
            entries: entries.map(|(k, v)| (k.clone(), v.clone())).collect(),
            pos: 0,
        }
    }

    pub fn set<'a>(items: impl Iterator<Item = &'a Value>) -> Self {
        ValueIter::Set {
            items: items.cloned().collect(),
            pos: 0,
        }
    }

    pub fn tuple(items: Rc<Vec<Value>>) -> Self {
        ValueIter::Tuple { items, pos: 0 }
    }

    pub fn enumeration(ty: ValueType, max: usize) -> Self {
        ValueIter::Enum { ty, max, pos: 0 }
    }

    pub fn unfinished(&self) -> bool {
        match self {
            ValueIter::KeyInc { max, val } => val < max,
            ValueIter::Inc { done, .. } | ValueIter::Dec { done, .. } => !done,
            ValueIter::List { items, pos } => *pos < items.len(),
            ValueIter::Str { chars, pos } => *pos < chars.len(),
            ValueIter::Map { entries, pos } => *pos < entries.len(),
            ValueIter::Set { items, pos } => *pos < items.len(),
            ValueIter::Tuple { items, pos } => *pos < items.len(),
            ValueIter::Enum { max, pos, .. } => pos < max,
        }
    }

    /// The current key: an index for sequences, the entry key for maps,
    /// the element itself for sets.
    pub fn key(&self) -> Value {
        if !self.unfinished() {
            return Value::undefined();
        }
        match self {
            ValueIter::KeyInc { val, .. } => Value::int(*val),
            ValueIter::Inc { start, val, .. } => Value::int(val.wrapping_sub(*start)),
            ValueIter::Dec { start, val, .. } => Value::int(start.wrapping_sub(*val)),
            ValueIter::Map { entries, pos } => entries[*pos].0.clone(),
            ValueIter::Set { items, pos } => items[*pos].clone(),
            ValueIter::List { pos, .. }
            | ValueIter::Str { pos, .. }
            | ValueIter::Tuple { pos, .. }
            | ValueIter::Enum { pos, .. } => Value::int(*pos as i64),
        }
    }

    pub fn value(&self) -> Value {
        if !self.unfinished() {
            return Value::undefined();
        }
        match self {
            ValueIter::KeyInc { val, .. } | ValueIter::Inc { val, .. } | ValueIter::Dec { val, .. } => {
                Value::int(*val)
            }
            ValueIter::List { items, pos } => items[*pos].clone(),
            ValueIter::Str { chars, pos } => Value::rune(chars[*pos]),
            ValueIter::Map { entries, pos } => entries[*pos].1.clone(),
            ValueIter::Set { items, pos } => items[*pos].clone(),
            ValueIter::Tuple { items, pos } => items[*pos].clone(),
            ValueIter::Enum { ty, pos, .. } => Value::enum_element(*ty, *pos),
        }
    }

    pub fn key_value(&self) -> (Value, Value) {
        (self.key(), self.value())
    }

    pub fn advance(&mut self) {
        match self {
            ValueIter::KeyInc { val, .. } => *val += 1,
            ValueIter::Inc { max, val, done, .. } => match val.checked_add(1) {
                Some(next) if next <= *max => *val = next,
                _ => *done = true,
            },
            ValueIter::Dec { min, val, done, .. } => match val.checked_sub(1) {
                Some(next) if next >= *min => *val = next,
                _ => *done = true,
            },
            ValueIter::List { pos, .. }
            | ValueIter::Str { pos, .. }
            | ValueIter::Map { pos, .. }
            | ValueIter::Set { pos, .. }
            | ValueIter::Tuple { pos, .. }
            | ValueIter::Enum { pos, .. } => *pos += 1,
        }
    }

    pub fn reset(&mut self) {
        match self {
            ValueIter::KeyInc { val, .. } => *val = 0,
            ValueIter::Inc { start, val, done, .. } | ValueIter::Dec { start, val, done, .. } => {
                *val = *start;
                *done = false;
            }
            ValueIter::List { pos, .. }
            | ValueIter::Str { pos, .. }
            | ValueIter::Map { pos, .. }
            | ValueIter::Set { pos, .. }
            | ValueIter::Tuple { pos, .. }
            | ValueIter::Enum { pos, .. } => *pos = 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut it: ValueIter) -> Vec<(Value, Value)> {
        let mut out = Vec::new();
        while it.unfinished() {
            out.push(it.key_value());
            it.advance();
        }
        out
    }

    fn ints(pairs: &[(Value, Value)]) -> Vec<i64> {
        pairs.iter().map(|(_, v)| v.as_int().unwrap()).collect()
    }

    #[test]
    fn test_ascending_range_is_inclusive() {
        let got = drain(ValueIter::range(2, 5));
        assert_eq!(ints(&got), vec![2, 3, 4, 5]);
        assert_eq!(got[0].0, Value::int(0));
        assert_eq!(got[3].0, Value::int(3));
    }

    #[test]
    fn test_descending_range_is_inclusive() {
        let got = drain(ValueIter::range(5, 2));
        assert_eq!(ints(&got), vec![5, 4, 3, 2]);
        let keys: Vec<i64> = got.iter().map(|(k, _)| k.as_int().unwrap()).collect();
        assert_eq!(keys, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_range_ending_at_int_max() {
        let got = drain(ValueIter::range(i64::MAX - 1, i64::MAX));
        assert_eq!(ints(&got), vec![i64::MAX - 1, i64::MAX]);
        let whole = ValueIter::range(i64::MIN, i64::MAX);
        assert_eq!(whole.key(), Value::int(0));
    }

    #[test]
    fn test_range_ending_at_int_min() {
        let it = ValueIter::range(0, i64::MIN);
        assert!(it.unfinished());
        let got = drain(ValueIter::range(i64::MIN + 1, i64::MIN));
        assert_eq!(ints(&got), vec![i64::MIN + 1, i64::MIN]);
    }

    #[test]
    fn test_exhausted_range_stays_finished() {
        let mut it = ValueIter::range(1, 2);
        for _ in 0..4 {
            it.advance();
        }
        assert!(!it.unfinished());
        assert_eq!(it.value().ty, ValueType::UNDEFINED);
        it.reset();
        assert_eq!(it.value(), Value::int(1));
    }

    #[test]
    fn test_single_point_range() {
        assert_eq!(ints(&drain(ValueIter::range(7, 7))), vec![7]);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let it = ValueIter::string("héllo");
        assert_eq!(it.value(), Value::rune('h'));
        assert_eq!(it.value(), Value::rune('h'));
        let got = drain(it);
        assert_eq!(got.len(), 5);
        assert_eq!(got[1].1, Value::rune('é'));
    }

    #[test]
    fn test_set_key_is_element() {
        let items = [Value::int(3), Value::int(1)];
        let got = drain(ValueIter::set(items.iter()));
        assert_eq!(got[0].0, got[0].1);
    }

    #[test]
    fn test_reset_rewinds() {
        let mut it = ValueIter::range(5, 2);
        it.advance();
        it.advance();
        it.reset();
        assert_eq!(it.value(), Value::int(5));
    }

    #[test]
    fn test_exhausted_peek_is_undefined() {
        let mut it = ValueIter::keys(1);
        it.advance();
        assert!(!it.unfinished());
        assert_eq!(it.key().ty, ValueType::UNDEFINED);
    }
}
