//! Structured error values and ordered error lists.
//!
//! User-domain failures are ordinary values: an [`ErrorValue`] carries an
//! id, a rendered message, the arguments it was rendered from, the position
//! it was raised at, and a trace of the positions it has propagated through.

use crate::values::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A source position, with the literal text found there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub literal: String,
    pub line: u32,
    pub col: u32,
    pub source: String,
}

impl Token {
    pub fn new(literal: &str, line: u32, col: u32, source: &str) -> Self {
        Self {
            literal: literal.to_string(),
            line,
            col,
            source: source.to_string(),
        }
    }

    fn position(&self) -> (u32, u32) {
        (self.line, self.col)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            write!(f, "line {}:{}", self.line, self.col)
        } else {
            write!(f, "{}:{}:{}", self.source, self.line, self.col)
        }
    }
}

#[derive(Debug, Clone)]
pub enum ErrorArg {
    Int(i64),
    Str(String),
    Value(Value),
}

impl fmt::Display for ErrorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorArg::Int(i) => write!(f, "{i}"),
            ErrorArg::Str(s) => write!(f, "{s}"),
            ErrorArg::Value(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ErrorArg {
    fn from(i: i64) -> Self {
        ErrorArg::Int(i)
    }
}

impl From<usize> for ErrorArg {
    fn from(i: usize) -> Self {
        ErrorArg::Int(i as i64)
    }
}

impl From<&str> for ErrorArg {
    fn from(s: &str) -> Self {
        ErrorArg::Str(s.to_string())
    }
}

impl From<String> for ErrorArg {
    fn from(s: String) -> Self {
        ErrorArg::Str(s)
    }
}

impl From<Value> for ErrorArg {
    fn from(v: Value) -> Self {
        ErrorArg::Value(v)
    }
}

#[derive(Debug, Clone)]
pub struct ErrorValue {
    pub id: String,
    pub message: String,
    pub args: Vec<ErrorArg>,
    pub token: Token,
    pub trace: Vec<Token>,
}

impl ErrorValue {
    /// Builds an error and renders its message. An id with no message
    /// becomes an `err/misdirect` error naming that id.
    pub fn new(id: &str, token: Token, args: Vec<ErrorArg>) -> Self {
        match message_for(id, &args) {
            Some(message) => Self {
                id: id.to_string(),
                message,
                args,
                trace: vec![token.clone()],
                token,
            },
            None => {
                let args = vec![ErrorArg::Str(id.to_string())];
                let message = message_for("err/misdirect", &args).unwrap_or_default();
                Self {
                    id: "err/misdirect".to_string(),
                    message,
                    args,
                    trace: vec![token.clone()],
                    token,
                }
            }
        }
    }

    /// An error raised by user code with a message of its own.
    pub fn user(message: &str, token: Token) -> Self {
        Self::new("eval/user", token, vec![ErrorArg::Str(message.to_string())])
    }

    pub fn add_to_trace(&mut self, token: Token) {
        self.trace.push(token);
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} at {}", self.id, self.message, self.token)
    }
}

fn arg(args: &[ErrorArg], i: usize) -> String {
    args.get(i).map(ToString::to_string).unwrap_or_default()
}

/// Renders the message for an error id, or `None` if the id is unknown.
pub fn message_for(id: &str, args: &[ErrorArg]) -> Option<String> {
    let a = |i| arg(args, i);
    let msg = match id {
        "err/misdirect" => format!("error id '{}' has no message", a(0)),
        "eval/user" => a(0),

        "vm/div/int" | "vm/div/float" => "division by zero".to_string(),
        "vm/mod/int" => "taking the remainder of division by zero".to_string(),

        "vm/cast/a" => format!("can't cast to '{}', which is not a single concrete type", a(0)),
        "vm/cast/b" => format!("can't cast a value of type '{}' to type '{}'", a(0), a(1)),
        "vm/conv/float" => format!("can't convert '{}' to a float", a(0)),
        "vm/conv/int" => format!("can't convert '{}' to an int", a(0)),

        "vm/func/types" => format!("argument {} of type '{}' doesn't fit the function's signature", a(0), a(1)),

        "vm/index/list" => format!("index {} is out of range for a list of length {}", a(0), a(1)),
        "vm/index/pair" => format!("index {} is out of range for a pair", a(0)),
        "vm/index/string" => format!("index {} is out of range for a string of length {}", a(0), a(1)),
        "vm/index/tuple" => format!("index {} is out of range for a tuple of length {}", a(0), a(1)),
        "vm/index/type/a" => format!("can't index type '{}', which is not an enum", a(0)),
        "vm/index/type/b" => format!("index {} is out of range for enum '{}'", a(1), a(0)),
        "vm/index/a" => format!("slice start must be an int, not '{}'", a(0)),
        "vm/index/b" => format!("slice end must be an int, not '{}'", a(0)),
        "vm/index/c" => format!("slice start {} is negative", a(0)),
        "vm/index/d" => format!("slice end {} is before slice start {}", a(1), a(0)),
        "vm/index/e" => format!("slice end {} is out of range for a list of length {}", a(0), a(1)),
        "vm/index/f" => format!("slice end {} is out of range for a container of length {}", a(0), a(1)),
        "vm/index/g" => format!("values of type '{}' can't be sliced", a(0)),
        "vm/index/h" => format!("key {} is not in the map", a(0)),
        "vm/index/i" => format!("can't index a value of type '{}' by a value of type '{}'", a(0), a(1)),
        "vm/index/j" => format!("index {} is out of range for a list of length {}", a(0), a(1)),
        "vm/index/k" => format!("index {} is out of range for a pair", a(0)),
        "vm/index/l" => format!("index {} is out of range for a string of length {}", a(0), a(1)),
        "vm/index/m" => format!("index {} is out of range for a tuple of length {}", a(0), a(1)),
        "vm/index/n" => format!("can't index type '{}', which is not a single concrete type", a(0)),
        "vm/index/o" => format!("can't index type '{}', which is not an enum", a(0)),
        "vm/index/p" => format!("index {} is out of range for enum '{}'", a(1), a(0)),
        "vm/index/q" => format!("values of type '{}' can't be indexed", a(0)),
        "vm/index/r" => format!("struct type '{}' has no field '{}'", a(0), a(1)),

        "vm/slice/list/a" | "vm/slice/string/a" | "vm/slice/tuple/a" => {
            format!("slice start must be an int, not '{}'", a(0))
        }
        "vm/slice/list/b" | "vm/slice/string/b" | "vm/slice/tuple/b" => {
            format!("slice end must be an int, not '{}'", a(0))
        }
        "vm/slice/list/c" | "vm/slice/string/c" | "vm/slice/tuple/c" => {
            format!("slice start {} is negative", a(0))
        }
        "vm/slice/list/d" | "vm/slice/string/d" | "vm/slice/tuple/d" => {
            format!("slice end {} is before slice start {}", a(1), a(0))
        }
        "vm/slice/list/e" | "vm/slice/string/e" | "vm/slice/tuple/e" => {
            format!("slice end {} is out of range for length {}", a(0), a(1))
        }

        "vm/label/exist" => format!("no field label named '{}'", a(0)),
        "vm/map/pair" => format!("a map must be made of key::value pairs, not values of type '{}'", a(0)),
        "vm/map/key" => format!("values of type '{}' can't be map keys", a(0)),
        "vm/set" => format!("values of type '{}' can't be set elements", a(0)),

        "vm/for/pair" => "a range to iterate over must be a pair of ints".to_string(),
        "vm/for/type/a" => format!("can't iterate over type '{}', which is not a single concrete type", a(0)),
        "vm/for/type/b" => format!("can't iterate over type '{}', which is not an enum", a(0)),
        "vm/for/type" => format!("can't iterate over a value of type '{}'", a(0)),

        "vm/native/convert" => format!("can't pass {} to a native function", a(0)),
        "vm/native/type" => format!("native function '{}' returned a value with no corresponding type", a(0)),
        "vm/native/runtime" => format!("native function '{}' failed: {}", a(0), a(1)),

        "vm/tup/first" => "can't take the first element of an empty tuple".to_string(),
        "vm/tup/last" => "can't take the last element of an empty tuple".to_string(),
        "vm/unwrap" => format!("can't unwrap a value of type '{}', which is not an error", a(0)),
        "vm/splat/type" => format!("can only splat a list, not a value of type '{}'", a(0)),
        "vm/varchar" => format!("varchar bound must be a non-negative int, not {}", a(0)),
        "vm/without" => format!("can't remove keys from a value of type '{}'", a(0)),

        "vm/with/a" => format!("a list must be indexed by an int, not '{}'", a(0)),
        "vm/with/b" => format!("index {} is out of range for a list of length {}", a(0), a(1)),
        "vm/with/c" => format!("values of type '{}' can't be map keys", a(0)),
        "vm/with/d" => format!("a struct must be indexed by a label, not '{}'", a(0)),
        "vm/with/e" => format!("struct type '{}' has no field '{}'", a(1), a(0)),
        "vm/with/f" => format!(
            "can't give field '{}' of struct type '{}' a value of type '{}', expected '{}'",
            a(1),
            a(2),
            a(0),
            a(3)
        ),
        "vm/with/g" => format!("can't use 'with' on a value of type '{}'", a(0)),
        "vm/with/list/a" | "vm/with/map/a" | "vm/with/struct/a" => {
            format!("'with' needs key::value pairs, not a value of type '{}'", a(0))
        }
        "vm/with/list/b" | "vm/with/map/b" | "vm/with/struct/b" => {
            "an empty list can't be a path of keys".to_string()
        }

        "vm/with/type/a" => format!("can't construct type '{}', which is not a single concrete type", a(0)),
        "vm/with/type/b" => format!("can't construct type '{}', which is not a struct type", a(0)),
        "vm/with/type/c" => format!("'with' needs label::value pairs, not a value of type '{}'", a(0)),
        "vm/with/type/d" => format!("a struct field must be named by a label, not '{}'", a(0)),
        "vm/with/type/e" => format!("struct type '{}' has no field '{}'", a(1), a(0)),
        "vm/with/type/f" => format!("field '{}' is given more than once", a(0)),
        "vm/with/type/g" => format!("field '{}' can't be left unset", a(0)),
        "vm/with/type/h" => format!(
            "can't give field '{}' of struct type '{}' a value of type '{}', expected '{}'",
            a(1),
            a(2),
            a(0),
            a(3)
        ),

        _ => return None,
    };
    Some(msg)
}

/// An error list ordered by position, with at most one entry per position.
#[derive(Debug, Clone, Default)]
pub struct Errors {
    items: Vec<ErrorValue>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorValue> {
        self.items.iter()
    }

    /// Adds an error unless one is already recorded at the same position.
    pub fn put(&mut self, err: ErrorValue) -> bool {
        let pos = err.token.position();
        match self.items.binary_search_by(|e| e.token.position().cmp(&pos)) {
            Ok(_) => false,
            Err(at) => {
                self.items.insert(at, err);
                true
            }
        }
    }

    pub fn throw(&mut self, id: &str, token: Token, args: Vec<ErrorArg>) -> bool {
        self.put(ErrorValue::new(id, token, args))
    }

    /// Stable position-ordered merge. When both lists hold an error at the
    /// same position, the one from `self` is kept.
    pub fn merge(self, other: Errors) -> Errors {
        let mut out = Vec::with_capacity(self.items.len() + other.items.len());
        let mut left = self.items.into_iter().peekable();
        let mut right = other.items.into_iter().peekable();
        loop {
            let take_left = match (left.peek(), right.peek()) {
                (Some(l), Some(r)) => match l.token.position().cmp(&r.token.position()) {
                    std::cmp::Ordering::Less => true,
                    std::cmp::Ordering::Greater => false,
                    std::cmp::Ordering::Equal => {
                        right.next();
                        true
                    }
                },
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_left { left.next() } else { right.next() };
            if let Some(e) = next {
                out.push(e);
            }
        }
        Errors { items: out }
    }

    /// Numbered, one error per line.
    pub fn render(&self) -> String {
        self.items
            .iter()
            .enumerate()
            .map(|(i, e)| format!("{}. {}\n", i + 1, e))
            .collect()
    }
}

impl From<ErrorValue> for Errors {
    fn from(err: ErrorValue) -> Self {
        Errors { items: vec![err] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(line: u32, col: u32) -> Token {
        Token::new("x", line, col, "main.tn")
    }

    #[test]
    fn test_new_error_trace_has_creation_position() {
        let e = ErrorValue::new("vm/div/int", tok(3, 7), vec![]);
        assert_eq!(e.message, "division by zero");
        assert_eq!(e.trace.len(), 1);
        assert_eq!(e.trace[0], tok(3, 7));
    }

    #[test]
    fn test_unknown_id_misdirects() {
        let e = ErrorValue::new("vm/no/such", tok(1, 1), vec![]);
        assert_eq!(e.id, "err/misdirect");
        assert!(e.message.contains("vm/no/such"));
    }

    #[test]
    fn test_message_arguments() {
        let e = ErrorValue::new("vm/index/j", tok(1, 1), vec![5usize.into(), 3usize.into()]);
        assert_eq!(e.message, "index 5 is out of range for a list of length 3");
    }

    #[test]
    fn test_put_skips_duplicate_position() {
        let mut errs = Errors::new();
        assert!(errs.put(ErrorValue::user("first", tok(2, 1))));
        assert!(!errs.put(ErrorValue::user("second", tok(2, 1))));
        assert!(errs.put(ErrorValue::user("earlier", tok(1, 5))));
        let msgs: Vec<&str> = errs.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["earlier", "first"]);
    }

    #[test]
    fn test_merge_is_ordered_and_keeps_first() {
        let mut a = Errors::new();
        a.put(ErrorValue::user("a1", tok(1, 1)));
        a.put(ErrorValue::user("a3", tok(3, 1)));
        let mut b = Errors::new();
        b.put(ErrorValue::user("b2", tok(2, 1)));
        b.put(ErrorValue::user("b3", tok(3, 1)));
        b.put(ErrorValue::user("b4", tok(4, 1)));
        let merged = a.merge(b);
        let msgs: Vec<&str> = merged.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["a1", "b2", "a3", "b4"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut a = Errors::new();
        a.put(ErrorValue::user("a1", tok(1, 1)));
        a.put(ErrorValue::user("a2", tok(2, 4)));
        let mut b = Errors::new();
        b.put(ErrorValue::user("b1", tok(1, 1)));
        b.put(ErrorValue::user("b2", tok(2, 2)));
        b.put(ErrorValue::user("b5", tok(5, 1)));
        let once = a.merge(b.clone());
        let twice = once.clone().merge(b);
        let summary = |errs: &Errors| -> Vec<(u32, u32, String)> {
            errs.iter().map(|e| (e.token.line, e.token.col, e.message.clone())).collect()
        };
        assert_eq!(summary(&once), summary(&twice));
        let positions: Vec<(u32, u32)> = twice.iter().map(|e| (e.token.line, e.token.col)).collect();
        let mut unique = positions.clone();
        unique.dedup();
        assert_eq!(positions, unique);
        assert_eq!(twice.len(), 4);
    }

    #[test]
    fn test_render_numbers_lines() {
        let mut errs = Errors::new();
        errs.throw("vm/div/int", tok(1, 2), vec![]);
        assert_eq!(errs.render(), "1. [vm/div/int] division by zero at main.tn:1:2\n");
    }
}
