//! Compiled program format: opcodes, operations, constants, tokens and
//! lambda/snippet factories.

use crate::diagnostics::Token;
use crate::types::{AbstractType, TypeRegistry, ValueType};
use crate::values::{Lambda, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgramError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
}

/// Interpreter opcodes. Operand letters name argument positions; `m` is a
/// register, `k` an inline constant, `@` a code address, `tok` a token index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Addf = 0,   // m0 = m1 + m2 (float)
    Addi = 1,   // m0 = m1 + m2 (int)
    AddL = 2,   // m0 = list m1 ++ list m2
    AddS = 3,   // m0 = set m1 ∪ set m2
    Adds = 4,   // m0 = string m1 ++ string m2
    Adrr = 5,   // m0 = rune m1 ++ rune m2
    Adrs = 6,   // m0 = rune m1 ++ string m2
    Adsr = 7,   // m0 = string m1 ++ rune m2
    Adtk = 8,   // m0 = error m1 with tok2 appended to its trace
    Andb = 9,   // m0 = m1 and m2
    Aref = 10,  // mem[ref m0] = m1
    Asgm = 11,  // m0 = m1
    Call = 12,  // @0, param start k1, param end k2, args m3..
    CalT = 13,  // @0, param start k1, param end k2, flags m3, args m4..
    Cast = 14,  // m0 = m1 retyped as k2
    Casx = 15,  // m0 = m1 cast to type m2, tok3
    Cc11 = 16,  // m0 = tuple(m1, m2)
    Cc1T = 17,  // m0 = tuple(m1, m2...)
    CcT1 = 18,  // m0 = tuple(m1..., m2)
    CcTT = 19,  // m0 = tuple(m1..., m2...)
    Ccxx = 20,  // m0 = m1 , m2 for any mix of singles and tuples
    Cpnt = 21,  // m0 = codepoint of rune m1
    Cv1T = 22,  // m0 = tuple(m1)
    CvTT = 23,  // m0 = tuple(m1, m2, ...)
    Divf = 24,  // m0 = m1 / m2 (float), tok3
    Divi = 25,  // m0 = m1 / m2 (int), tok3
    Dofn = 26,  // m0 = lambda m1 applied to m2..
    Dref = 27,  // m0 = mem[ref m1]
    Dvfi = 28,  // m0 = float m1 / int m2, tok3
    Dvif = 29,  // m0 = int m1 / float m2, tok3
    Equb = 30,  // m0 = m1 == m2 (bool)
    Equf = 31,  // m0 = m1 == m2 (float)
    Equi = 32,  // m0 = m1 == m2 (int)
    Equs = 33,  // m0 = m1 == m2 (string)
    Equt = 34,  // m0 = m1 == m2 (type)
    Eqxx = 35,  // m0 = m1 == m2, or m3 if their types differ
    Extn = 36,  // m0 = external k1 called with operator placement k2, namespace m3, name m4, args m5..
    Flti = 37,  // m0 = float of int m1
    Flts = 38,  // m0 = float parsed from string m1, tok2
    Gofn = 39,  // m0 = native k1 called with m3.., tok2
    Gtef = 40,  // m0 = m1 >= m2 (float)
    Gtei = 41,  // m0 = m1 >= m2 (int)
    Gthf = 42,  // m0 = m1 > m2 (float)
    Gthi = 43,  // m0 = m1 > m2 (int)
    IdxL = 44,  // m0 = list m1[m2], tok3
    Idxp = 45,  // m0 = pair m1[m2], tok3
    Idxs = 46,  // m0 = string m1[m2], tok3
    Idxt = 47,  // m0 = enum type m1[m2], tok3
    IdxT = 48,  // m0 = tuple m1[m2], tok3
    Inpt = 49,  // m0 = line read after prompt m1
    Inte = 50,  // m0 = ordinal of enum m1
    Intf = 51,  // m0 = int of float m1
    Ints = 52,  // m0 = int parsed from string m1, tok2
    InxL = 53,  // m0 = m1 in list m2
    InxS = 54,  // m0 = m1 in set m2
    InxT = 55,  // m0 = m1 in tuple m2
    Inxt = 56,  // m0 = m1 in type m2
    Itgk = 57,  // m0 = key of iterator m1
    Itgv = 58,  // m0 = value of iterator m1
    Itkv = 59,  // m0, m1 = key and value of iterator m2
    Itor = 60,  // m0 = rune with codepoint m1
    IxTn = 61,  // m0 = tuple m1[k2]
    IxXx = 62,  // m0 = m1[m2] for any indexable m1, tok3
    IxZl = 63,  // m0 = struct m1 field with label m2, tok3
    IxZn = 64,  // m0 = struct m1 field k2
    Jmp = 65,   // goto @0
    Jsr = 66,   // call subroutine @0
    KeyM = 67,  // m0 = keys of map m1
    KeyZ = 68,  // m0 = labels of struct m1
    Lbls = 69,  // m0 = label named by string m1, tok2
    LenL = 70,  // m0 = len list m1
    LenM = 71,  // m0 = len map m1
    Lens = 72,  // m0 = len string m1
    LenS = 73,  // m0 = len set m1
    LenT = 74,  // m0 = len tuple m1
    List = 75,  // m0 = list of tuple m1
    Litx = 76,  // m0 = literal m1
    Log = 77,   // log string m0
    Logn = 78,  // logging off
    Logy = 79,  // logging on
    Mker = 80,  // m0 = user error with message m1, tok2
    Mkfn = 81,  // m0 = lambda from factory k1
    Mkit = 82,  // m0 = iterator over m1, keys only if k2 == 1, tok3
    Mkmp = 83,  // m0 = map from tuple of pairs m1, tok2
    Mkpr = 84,  // m0 = m1::m2
    Mkst = 85,  // m0 = set from tuple m1, tok2
    MkSn = 86,  // m0 = snippet from factory k1
    Mlfi = 87,  // m0 = float m1 * int m2
    Modi = 88,  // m0 = m1 % m2 (int), tok3
    Mulf = 89,  // m0 = m1 * m2 (float)
    Muli = 90,  // m0 = m1 * m2 (int)
    Negf = 91,  // m0 = -m1 (float)
    Negi = 92,  // m0 = -m1 (int)
    Notb = 93,  // m0 = not m1
    Nxit = 94,  // advance iterator m0
    Orb = 95,   // m0 = m1 or m2
    Outp = 96,  // output description of m0
    Outt = 97,  // output literal of m0
    Qabt = 98,  // m0 in types k2.. with varchar bound k1, else goto last
    Qfls = 99,  // if m0 goto @1
    Qitr = 100, // if iterator m0 unfinished goto @1
    QleT = 101, // len tuple m0 <= k1, else goto @2
    QlnT = 102, // len tuple m0 == k1, else goto @2
    Qlog = 103, // logging on, else goto @0
    Qntp = 104, // type m0 != k1, else goto @2
    Qnvh = 105, // m0 is not string within bound k1, else goto @2
    Qnvq = 106, // m0 is not null or string within bound k1, else goto @2
    Qsat = 107, // m0 is satisfied, else goto @1
    Qsng = 108, // m0 is single, else goto @1
    Qsnq = 109, // m0 is single or null, else goto @1
    Qspt = 110, // m0 is snippet, else goto @1
    Qspq = 111, // m0 is snippet or null, else goto @1
    Qstr = 112, // m0 is struct, else goto @1
    Qstq = 113, // m0 is struct or null, else goto @1
    Qtpt = 114, // tuple m0 from k1 has types k2.., else goto last
    Qtru = 115, // if m0 fall through, else goto @1
    Qtyp = 116, // type m0 == k1, else goto @2
    Qvch = 117, // m0 is string within bound k1, else goto @2
    Qvcq = 118, // m0 is null or string within bound k1, else goto @2
    Ret = 119,  // return
    Rpop = 120, // restore saved register range
    Rpsh = 121, // save registers k0..k1
    Rsit = 122, // reset iterator m0
    SliL = 123, // m0 = list m1[pair m2], tok3
    Slis = 124, // m0 = string m1[pair m2], tok3
    SliT = 125, // m0 = tuple m1[pair m2], tok3
    SlTn = 126, // m0 = tuple m1[k2:]
    Strc = 127, // m0 = struct of type k1 with fields m2..
    Strx = 128, // m0 = description of m1
    Subf = 129, // m0 = m1 - m2 (float)
    Subi = 130, // m0 = m1 - m2 (int)
    Thnk = 131, // m0 = thunk with result m1 and entry @2
    Tplf = 132, // m0 = first of tuple m1, tok2
    Tpll = 133, // m0 = last of tuple m1, tok2
    TuLx = 134, // m0 = tuple of list m1, tok2
    TupL = 135, // m0 = list of tuple m1
    Typs = 136, // m0 = set of the concrete types of type m1
    Typu = 137, // m0 = type m1 / type m2
    Typx = 138, // m0 = type of m1
    Untk = 139, // force thunk m0 in place
    Uwrp = 140, // m0 = Error struct from error m1, tok2
    Varc = 141, // m0 = varchar(m1), tok2
    Vlid = 142, // m0 = m1 is not an error
    WthL = 143, // m0 = list m1 with pairs m2, tok3
    WthM = 144, // m0 = map m1 with pairs m2, tok3
    Wtht = 145, // m0 = struct type m1 with pairs m2, tok3
    WthZ = 146, // m0 = struct m1 with pairs m2, tok3
    WtoM = 147, // m0 = map m1 without keys m2, tok3
}

const ALL_OPCODES: [Opcode; 148] = {
    use Opcode::*;
    [
        Addf, Addi, AddL, AddS, Adds, Adrr, Adrs, Adsr, Adtk, Andb, Aref, Asgm, Call, CalT, Cast, Casx, Cc11,
        Cc1T, CcT1, CcTT, Ccxx, Cpnt, Cv1T, CvTT, Divf, Divi, Dofn, Dref, Dvfi, Dvif, Equb, Equf, Equi, Equs,
        Equt, Eqxx, Extn, Flti, Flts, Gofn, Gtef, Gtei, Gthf, Gthi, IdxL, Idxp, Idxs, Idxt, IdxT, Inpt, Inte,
        Intf, Ints, InxL, InxS, InxT, Inxt, Itgk, Itgv, Itkv, Itor, IxTn, IxXx, IxZl, IxZn, Jmp, Jsr, KeyM,
        KeyZ, Lbls, LenL, LenM, Lens, LenS, LenT, List, Litx, Log, Logn, Logy, Mker, Mkfn, Mkit, Mkmp, Mkpr,
        Mkst, MkSn, Mlfi, Modi, Mulf, Muli, Negf, Negi, Notb, Nxit, Orb, Outp, Outt, Qabt, Qfls, Qitr, QleT,
        QlnT, Qlog, Qntp, Qnvh, Qnvq, Qsat, Qsng, Qsnq, Qspt, Qspq, Qstr, Qstq, Qtpt, Qtru, Qtyp, Qvch, Qvcq,
        Ret, Rpop, Rpsh, Rsit, SliL, Slis, SliT, SlTn, Strc, Strx, Subf, Subi, Thnk, Tplf, Tpll, TuLx, TupL,
        Typs, Typu, Typx, Untk, Uwrp, Varc, Vlid, WthL, WthM, Wtht, WthZ, WtoM,
    ]
};

impl TryFrom<u8> for Opcode {
    type Error = ProgramError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        ALL_OPCODES
            .get(byte as usize)
            .copied()
            .ok_or(ProgramError::UnknownOpcode(byte))
    }
}

impl Opcode {
    /// Fewest operands an operation with this opcode may carry.
    pub fn min_operands(self) -> usize {
        use Opcode::*;
        match self {
            Logn | Logy | Ret | Rpop => 0,
            Jmp | Jsr | Log | Nxit | Outp | Outt | Qlog | Rsit | Untk | CvTT => 1,
            Aref | Cpnt | Cv1T | Dofn | Dref | Flti | Inpt | Inte | Intf | Itgk | Itgv | Itor | KeyM | KeyZ | LenL
            | LenM | Lens | LenS | LenT | List | Litx | Mkfn | MkSn | Negf | Negi | Notb | Qfls | Qitr | Qsat
            | Qsng | Qsnq | Qspt | Qspq | Qstr | Qstq | Qtru | Strc | Rpsh | Strx | TupL | Typs | Typx | Vlid | Asgm => 2,
            Addf | Addi | AddL | AddS | Adds | Adrr | Adrs | Adsr | Adtk | Andb | Call | Cast | Cc11 | Cc1T | CcT1
            | CcTT | Ccxx | Equb | Equf | Equi | Equs | Equt | Flts | Gofn | Gtef | Gtei | Gthf | Gthi | Ints
            | InxL | InxS | InxT | Inxt | Itkv | IxTn | IxZn | Lbls | Mker | Mkmp | Mkpr | Mkst | Mlfi | Mulf
            | Muli | Orb | Qabt | QleT | QlnT | Qntp | Qnvh | Qnvq | Qtpt | Qtyp | Qvch | Qvcq | SlTn
            | Subf | Subi | Thnk | Tplf | Tpll | TuLx | Typu | Uwrp | Varc => 3,
            CalT | Casx | Divf | Divi | Dvfi | Dvif | Eqxx | IdxL | Idxp | Idxs | Idxt | IdxT | IxXx | IxZl
            | Mkit | Modi | SliL | Slis | SliT | WthL | WthM | Wtht | WthZ | WtoM => 4,
            Extn => 5,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub opcode: Opcode,
    pub args: Vec<u32>,
}

impl Operation {
    pub fn new(opcode: Opcode, args: &[u32]) -> Self {
        Self {
            opcode,
            args: args.to_vec(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// Fixed registers present in every program.
pub mod sentinel {
    pub const UNDEFINED: u32 = 0;
    pub const FALSE: u32 = 1;
    pub const TRUE: u32 = 2;
    pub const EMPTY_TUPLE: u32 = 3;
    pub const ONE: u32 = 4;
    pub const BLING: u32 = 5;
    pub const OK: u32 = 6;
    pub const EMPTY_STRING: u32 = 7;
    pub const COUNT: u32 = 8;
}

pub fn sentinel_values() -> Vec<Value> {
    vec![
        Value::undefined(),
        Value::bool(false),
        Value::bool(true),
        Value::empty_tuple(),
        Value::int(1),
        Value::bling(""),
        Value::ok(),
        Value::string(""),
    ]
}

/// A value baked into the initial register file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Undefined,
    Null,
    Ok,
    Unsatisfied,
    Bool(bool),
    Int(i64),
    Float(f64),
    Rune(char),
    Str(String),
    Bling(String),
    Label(usize),
    Type(AbstractType),
    Enum { ty: ValueType, ordinal: usize },
    IntArray(Vec<u32>),
    Tuple(Vec<Constant>),
    Reference(u32),
}

impl Constant {
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Undefined => Value::undefined(),
            Constant::Null => Value::null(),
            Constant::Ok => Value::ok(),
            Constant::Unsatisfied => Value::unsatisfied(),
            Constant::Bool(b) => Value::bool(*b),
            Constant::Int(i) => Value::int(*i),
            Constant::Float(x) => Value::float(*x),
            Constant::Rune(c) => Value::rune(*c),
            Constant::Str(s) => Value::string(s),
            Constant::Bling(s) => Value::bling(s),
            Constant::Label(l) => Value::label(*l),
            Constant::Type(t) => Value::abstract_type(t.clone()),
            Constant::Enum { ty, ordinal } => Value::enum_element(*ty, *ordinal),
            Constant::IntArray(items) => Value::int_array(items.clone()),
            Constant::Tuple(items) => Value::tuple(items.iter().map(Constant::to_value).collect()),
            Constant::Reference(r) => Value::reference(*r),
        }
    }
}

/// Template for a closure, plus the registers its captures are copied from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaFactory {
    pub captures_start: u32,
    pub captures_end: u32,
    pub params_end: u32,
    pub result: u32,
    pub entry: u32,
    pub capture_locations: Vec<u32>,
    pub sig: Option<Vec<Option<AbstractType>>>,
    pub token: u32,
}

impl LambdaFactory {
    pub fn materialize(&self, captures: Vec<Value>) -> Lambda {
        Lambda {
            captures_start: self.captures_start,
            captures_end: self.captures_end,
            params_end: self.params_end,
            result: self.result,
            entry: self.entry,
            captures,
            sig: self.sig.clone(),
            token: self.token,
        }
    }
}

/// Where a snippet's rendering code, rendered object string and
/// interpolated values live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetBindle {
    pub code_loc: u32,
    pub object_string_loc: u32,
    pub value_locs: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetFactory {
    pub snippet_type: ValueType,
    pub source: String,
    pub bindle: SnippetBindle,
}

/// Everything the interpreter needs to run compiled code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub code: Vec<Operation>,
    pub register_count: u32,
    pub constants: Vec<(u32, Constant)>,
    pub tokens: Vec<Token>,
    pub lambda_factories: Vec<LambdaFactory>,
    pub snippet_factories: Vec<SnippetFactory>,
    pub types: TypeRegistry,
}

impl Program {
    /// The register file at start-up: sentinels, then constants, with
    /// every other register undefined.
    pub fn initial_memory(&self) -> Vec<Value> {
        let mut mem = sentinel_values();
        let highest = self
            .constants
            .iter()
            .map(|(r, _)| *r + 1)
            .max()
            .unwrap_or(0)
            .max(self.register_count)
            .max(sentinel::COUNT);
        mem.resize(highest as usize, Value::undefined());
        for (reg, c) in &self.constants {
            mem[*reg as usize] = c.to_value();
        }
        mem
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
