//! Register VM dispatch loop for executing compiled Tarn programs.

mod calls;
mod index;
mod iterate;
mod ops;
mod with;

use crate::describe::{default_description, literal};
use crate::external::ExternalService;
use crate::io::{IoHandle, StdIo};
use crate::native::NativeFn;
use crate::settings::VmSettings;
use std::rc::Rc;
use tarn_core::diagnostics::{ErrorArg, ErrorValue, Token};
use tarn_core::program::{LambdaFactory, Opcode, Operation, Program, ProgramError, SnippetFactory};
use tarn_core::types::{AbstractType, Flavor, TypeRegistry, ValueType};
use tarn_core::values::{Payload, PayloadError, Value};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Nested `run` invocations allowed before giving up, so that lambda and
/// thunk evaluation cannot exhaust the host stack.
const MAX_NESTED_RUNS: usize = 256;

/// Type alias for debug callback to simplify type signatures
pub type DebugCallback = Option<Box<dyn FnMut(&DebugEvent)>>;

/// Debug events emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    /// About to execute the operation at `loc`.
    Step { loc: u32, opcode: Opcode },
    /// Entered code at `entry` with `depth` return addresses on the call stack.
    CallEnter { entry: u32, depth: usize },
    /// A `Ret` unwound to `depth`.
    Return { depth: usize },
    NativeCall { name: String },
    ExternalCall { service: String, call: String },
}

/// Fatal conditions. User-level failures are error values in registers and
/// never appear here.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("payload mismatch: {0}")]
    Payload(#[from] PayloadError),
    #[error("{opcode} at @{loc} needs {needed} operands, found {found}")]
    MissingOperand {
        opcode: Opcode,
        loc: u32,
        needed: usize,
        found: usize,
    },
    #[error("register out of bounds: m{0}")]
    RegisterOutOfBounds(u32),
    #[error("code address out of bounds: @{0}")]
    CodeOutOfBounds(u32),
    #[error("return with an empty call stack")]
    EmptyCallStack,
    #[error("recursion stack underflow")]
    RecursionUnderflow,
    #[error("unknown native function {0}")]
    UnknownNative(u32),
    #[error("unknown lambda factory {0}")]
    UnknownLambdaFactory(u32),
    #[error("unknown snippet factory {0}")]
    UnknownSnippetFactory(u32),
    #[error("unknown external service {0}")]
    UnknownExternal(u32),
    #[error("invalid operator placement {0}")]
    BadPlacement(u32),
    #[error("unknown token {0}")]
    UnknownToken(u32),
    #[error("type {0} is not of the expected kind")]
    UnknownType(ValueType),
    #[error("constant operand {index} out of range for length {len}")]
    ConstantIndex { index: u32, len: usize },
    #[error("stack overflow: call depth exceeded {0}")]
    CallDepthExceeded(usize),
    #[error("malformed program: {0}")]
    MalformedProgram(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Settings(#[from] toml::de::Error),
}

impl From<ProgramError> for VmError {
    fn from(e: ProgramError) -> Self {
        match e {
            ProgramError::UnknownOpcode(byte) => VmError::UnknownOpcode(byte),
        }
    }
}

/// Where a conditional jump goes: the next operation, or `target`.
fn branch(loc: u32, fall_through: bool, target: u32) -> u32 {
    if fall_through {
        loc + 1
    } else {
        target
    }
}

pub struct Vm {
    /// The register file.
    pub mem: Vec<Value>,
    code: Rc<[Operation]>,
    callstack: Vec<u32>,
    recursion_stack: Vec<(u32, Vec<Value>)>,
    logging: bool,
    types: TypeRegistry,
    tokens: Vec<Token>,
    lambda_factories: Vec<LambdaFactory>,
    snippet_factories: Vec<SnippetFactory>,
    natives: Vec<NativeFn>,
    externals: Vec<Box<dyn ExternalService>>,
    io: Box<dyn IoHandle>,
    settings: VmSettings,
    pub debug_callback: DebugCallback,
    nesting: usize,
    error_struct: ValueType,
}

impl Vm {
    pub fn new(program: Program) -> Self {
        Self::with_settings(program, VmSettings::default())
    }

    pub fn with_settings(program: Program, settings: VmSettings) -> Self {
        let mem = program.initial_memory();
        let mut types = program.types;
        let error_struct = match types.find("Error") {
            Some(ty) if types.is_struct(ty) => ty,
            _ => types.add_struct(
                "Error",
                "",
                &[
                    ("errorId", AbstractType::single(ValueType::STRING)),
                    ("message", AbstractType::single(ValueType::STRING)),
                ],
                false,
            ),
        };
        Self {
            mem,
            code: Rc::from(program.code),
            callstack: Vec::new(),
            recursion_stack: Vec::new(),
            logging: settings.logging,
            types,
            tokens: program.tokens,
            lambda_factories: program.lambda_factories,
            snippet_factories: program.snippet_factories,
            natives: Vec::new(),
            externals: Vec::new(),
            io: Box::new(StdIo),
            settings,
            debug_callback: None,
            nesting: 0,
            error_struct,
        }
    }

    /// Loads a program serialized with [`Program::to_json`].
    pub fn from_json(text: &str) -> Result<Self, VmError> {
        Ok(Self::new(Program::from_json(text)?))
    }

    pub fn with_io(mut self, io: impl IoHandle + 'static) -> Self {
        self.io = Box::new(io);
        self
    }

    /// Registers a native function; `Gofn` refers to it by the returned index.
    pub fn add_native(&mut self, f: NativeFn) -> u32 {
        self.natives.push(f);
        self.natives.len() as u32 - 1
    }

    /// Registers an external service; `Extn` refers to it by the returned index.
    pub fn add_external(&mut self, service: impl ExternalService + 'static) -> u32 {
        self.externals.push(Box::new(service));
        self.externals.len() as u32 - 1
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn settings(&self) -> &VmSettings {
        &self.settings
    }

    pub fn logging(&self) -> bool {
        self.logging
    }

    pub fn call_depth(&self) -> usize {
        self.callstack.len()
    }

    /// The concrete type used for unwrapped errors.
    pub fn error_struct_type(&self) -> ValueType {
        self.error_struct
    }

    pub fn reg(&self, r: u32) -> Result<&Value, VmError> {
        self.mem.get(r as usize).ok_or(VmError::RegisterOutOfBounds(r))
    }

    /// Stores into a register, growing the register file if needed.
    pub fn set(&mut self, r: u32, v: Value) {
        let ix = r as usize;
        if ix >= self.mem.len() {
            self.mem.resize(ix + 1, Value::undefined());
        }
        self.mem[ix] = v;
    }

    pub fn literal(&self, v: &Value) -> String {
        literal(&self.types, v)
    }

    pub fn description(&self, v: &Value) -> String {
        default_description(&self.types, v)
    }

    fn int(&self, r: u32) -> Result<i64, VmError> {
        Ok(self.reg(r)?.as_int()?)
    }

    fn float(&self, r: u32) -> Result<f64, VmError> {
        Ok(self.reg(r)?.as_float()?)
    }

    fn boolean(&self, r: u32) -> Result<bool, VmError> {
        Ok(self.reg(r)?.as_bool()?)
    }

    fn text(&self, r: u32) -> Result<&str, VmError> {
        Ok(self.reg(r)?.as_str()?)
    }

    fn regs(&self, rs: &[u32]) -> Result<Vec<Value>, VmError> {
        rs.iter().map(|r| self.reg(*r).cloned()).collect()
    }

    fn token(&self, t: u32) -> Result<Token, VmError> {
        self.tokens.get(t as usize).cloned().ok_or(VmError::UnknownToken(t))
    }

    /// A user-domain error value raised at token `tok`.
    fn error(&self, id: &str, tok: u32, args: Vec<ErrorArg>) -> Result<Value, VmError> {
        Ok(Value::error(ErrorValue::new(id, self.token(tok)?, args)))
    }

    fn describe_type(&self, ty: ValueType) -> String {
        self.types.describe_type(ty, Flavor::Literal)
    }

    fn describe_abstract(&self, at: &AbstractType) -> String {
        self.types.describe_abstract(at, Flavor::Literal)
    }

    fn emit_debug_event(&mut self, event: DebugEvent) {
        if let Some(ref mut cb) = self.debug_callback {
            cb(&event);
        }
    }

    fn push_return(&mut self, loc: u32) -> Result<(), VmError> {
        if self.callstack.len() >= self.settings.max_call_depth {
            return Err(VmError::CallDepthExceeded(self.settings.max_call_depth));
        }
        self.callstack.push(loc);
        Ok(())
    }

    fn validate_operands(op: &Operation, loc: u32) -> Result<(), VmError> {
        let needed = op.opcode.min_operands();
        if op.args.len() < needed {
            return Err(VmError::MissingOperand {
                opcode: op.opcode,
                loc,
                needed,
                found: op.args.len(),
            });
        }
        Ok(())
    }

    fn trace_step(&self, loc: u32, op: &Operation) {
        if self.settings.show_runtime_values {
            let operands: Vec<String> = op
                .args
                .iter()
                .filter_map(|r| self.mem.get(*r as usize).map(|v| format!("m{r}={v}")))
                .collect();
            trace!(loc, op = %op, operands = %operands.join(" "), "step");
        } else {
            trace!(loc, op = %op, "step");
        }
    }

    /// Executes from `loc` until a `Ret` at the call depth this invocation
    /// started at. Native functions and lambda calls may re-enter.
    pub fn run(&mut self, loc: u32) -> Result<(), VmError> {
        if self.nesting >= MAX_NESTED_RUNS {
            return Err(VmError::CallDepthExceeded(MAX_NESTED_RUNS));
        }
        self.nesting += 1;
        debug!(loc, nesting = self.nesting, "run");
        let result = self.run_loop(loc);
        self.nesting -= 1;
        if let Err(e) = &result {
            if self.nesting == 0 {
                warn!(error = %e, "interpreter stopped");
            }
        }
        result
    }

    fn run_loop(&mut self, mut loc: u32) -> Result<(), VmError> {
        let base = self.callstack.len();
        let code = Rc::clone(&self.code);
        loop {
            let op = code.get(loc as usize).ok_or(VmError::CodeOutOfBounds(loc))?;
            Self::validate_operands(op, loc)?;
            self.emit_debug_event(DebugEvent::Step { loc, opcode: op.opcode });
            if self.settings.show_runtime {
                self.trace_step(loc, op);
            }
            let a = op.args.as_slice();
            match op.opcode {
                // Arithmetic
                Opcode::Addf => self.float_op(a, |x, y| x + y)?,
                Opcode::Subf => self.float_op(a, |x, y| x - y)?,
                Opcode::Mulf => self.float_op(a, |x, y| x * y)?,
                Opcode::Addi => self.int_op(a, i64::wrapping_add)?,
                Opcode::Subi => self.int_op(a, i64::wrapping_sub)?,
                Opcode::Muli => self.int_op(a, i64::wrapping_mul)?,
                Opcode::Divf => {
                    let (x, y) = (self.float(a[1])?, self.float(a[2])?);
                    self.divide(a, y == 0.0, "vm/div/float", || Value::float(x / y))?;
                }
                Opcode::Divi => {
                    let (x, y) = (self.int(a[1])?, self.int(a[2])?);
                    self.divide(a, y == 0, "vm/div/int", || Value::int(x.wrapping_div(y)))?;
                }
                Opcode::Dvfi => {
                    let (x, y) = (self.float(a[1])?, self.int(a[2])?);
                    self.divide(a, y == 0, "vm/div/float", || Value::float(x / y as f64))?;
                }
                Opcode::Dvif => {
                    let (x, y) = (self.int(a[1])?, self.float(a[2])?);
                    self.divide(a, y == 0.0, "vm/div/float", || Value::float(x as f64 / y))?;
                }
                Opcode::Modi => {
                    let (x, y) = (self.int(a[1])?, self.int(a[2])?);
                    let ty = self.reg(a[1])?.ty;
                    self.divide(a, y == 0, "vm/mod/int", || Value::new(ty, Payload::Int(x.wrapping_rem(y))))?;
                }
                Opcode::Mlfi => {
                    let v = Value::float(self.float(a[1])? * self.int(a[2])? as f64);
                    self.set(a[0], v);
                }
                Opcode::Negf => {
                    let v = self.reg(a[1])?;
                    let neg = Value::new(v.ty, Payload::Float(-v.as_float()?));
                    self.set(a[0], neg);
                }
                Opcode::Negi => {
                    let v = self.reg(a[1])?;
                    let neg = Value::new(v.ty, Payload::Int(v.as_int()?.wrapping_neg()));
                    self.set(a[0], neg);
                }
                Opcode::AddL | Opcode::AddS | Opcode::Adds | Opcode::Adrr | Opcode::Adrs | Opcode::Adsr => {
                    self.concatenate(op.opcode, a)?
                }

                // Booleans and comparison
                Opcode::Andb => {
                    let v = self.boolean(a[1])? && self.boolean(a[2])?;
                    self.set(a[0], Value::bool(v));
                }
                Opcode::Orb => {
                    let v = self.boolean(a[1])? || self.boolean(a[2])?;
                    self.set(a[0], Value::bool(v));
                }
                Opcode::Notb => {
                    let v = !self.boolean(a[1])?;
                    self.set(a[0], Value::bool(v));
                }
                Opcode::Equb => {
                    let v = self.boolean(a[1])? == self.boolean(a[2])?;
                    self.set(a[0], Value::bool(v));
                }
                Opcode::Equf => {
                    let v = self.float(a[1])? == self.float(a[2])?;
                    self.set(a[0], Value::bool(v));
                }
                Opcode::Equi => {
                    let v = self.int(a[1])? == self.int(a[2])?;
                    self.set(a[0], Value::bool(v));
                }
                Opcode::Equs => {
                    let v = self.text(a[1])? == self.text(a[2])?;
                    self.set(a[0], Value::bool(v));
                }
                Opcode::Equt => {
                    let v = self.reg(a[1])?.as_type()? == self.reg(a[2])?.as_type()?;
                    self.set(a[0], Value::bool(v));
                }
                Opcode::Eqxx => {
                    let (x, y) = (self.reg(a[1])?, self.reg(a[2])?);
                    let v = if x.ty != y.ty {
                        self.reg(a[3])?.clone()
                    } else {
                        Value::bool(ops::equals(x, y))
                    };
                    self.set(a[0], v);
                }
                Opcode::Gtef => {
                    let v = self.float(a[1])? >= self.float(a[2])?;
                    self.set(a[0], Value::bool(v));
                }
                Opcode::Gtei => {
                    let v = self.int(a[1])? >= self.int(a[2])?;
                    self.set(a[0], Value::bool(v));
                }
                Opcode::Gthf => {
                    let v = self.float(a[1])? > self.float(a[2])?;
                    self.set(a[0], Value::bool(v));
                }
                Opcode::Gthi => {
                    let v = self.int(a[1])? > self.int(a[2])?;
                    self.set(a[0], Value::bool(v));
                }

                // Registers and references
                Opcode::Asgm => {
                    let v = self.reg(a[1])?.clone();
                    self.set(a[0], v);
                }
                Opcode::Aref => {
                    let target = self.reg(a[0])?.as_reference()?;
                    let v = self.reg(a[1])?.clone();
                    self.set(target, v);
                }
                Opcode::Dref => {
                    let source = self.reg(a[1])?.as_reference()?;
                    let v = self.reg(source)?.clone();
                    self.set(a[0], v);
                }
                Opcode::Rpsh => {
                    let (lo, hi) = (a[0] as usize, a[1] as usize);
                    let saved = self
                        .mem
                        .get(lo..hi)
                        .ok_or(VmError::RegisterOutOfBounds(a[1]))?
                        .to_vec();
                    self.recursion_stack.push((a[0], saved));
                }
                Opcode::Rpop => {
                    let (lo, saved) = self.recursion_stack.pop().ok_or(VmError::RecursionUnderflow)?;
                    for (i, v) in saved.into_iter().enumerate() {
                        self.set(lo + i as u32, v);
                    }
                }

                // Conversions
                Opcode::Cast => {
                    let v = self.reg(a[1])?.retyped(ValueType(a[2]));
                    self.set(a[0], v);
                }
                Opcode::Casx => self.cast(a)?,
                Opcode::Cpnt => {
                    let v = Value::int(self.reg(a[1])?.as_rune()? as i64);
                    self.set(a[0], v);
                }
                Opcode::Itor => {
                    let i = self.int(a[1])?;
                    let c = u32::try_from(i)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or(char::REPLACEMENT_CHARACTER);
                    self.set(a[0], Value::rune(c));
                }
                Opcode::Flti => {
                    let v = Value::float(self.int(a[1])? as f64);
                    self.set(a[0], v);
                }
                Opcode::Intf => {
                    let v = Value::int(self.float(a[1])? as i64);
                    self.set(a[0], v);
                }
                Opcode::Inte => {
                    let v = Value::int(self.reg(a[1])?.as_enum()? as i64);
                    self.set(a[0], v);
                }
                Opcode::Flts => {
                    let s = self.text(a[1])?;
                    let v = match s.trim().parse::<f64>() {
                        Ok(x) => Value::float(x),
                        Err(_) => self.error("vm/conv/float", a[2], vec![s.into()])?,
                    };
                    self.set(a[0], v);
                }
                Opcode::Ints => {
                    let s = self.text(a[1])?;
                    let v = match s.trim().parse::<i64>() {
                        Ok(i) => Value::int(i),
                        Err(_) => self.error("vm/conv/int", a[2], vec![s.into()])?,
                    };
                    self.set(a[0], v);
                }
                Opcode::Strx => {
                    let v = Value::string(&self.description(self.reg(a[1])?));
                    self.set(a[0], v);
                }
                Opcode::Litx => {
                    let v = Value::string(&self.literal(self.reg(a[1])?));
                    self.set(a[0], v);
                }
                Opcode::Lbls => {
                    let name = self.text(a[1])?;
                    let v = match self.types.label_number(name) {
                        Some(label) => Value::label(label),
                        None => self.error("vm/label/exist", a[2], vec![name.into()])?,
                    };
                    self.set(a[0], v);
                }

                // Tuples
                Opcode::Cc11 | Opcode::Cc1T | Opcode::CcT1 | Opcode::CcTT | Opcode::Ccxx => {
                    let v = ops::concat_tuples(op.opcode, self.reg(a[1])?, self.reg(a[2])?)?;
                    self.set(a[0], v);
                }
                Opcode::Cv1T => {
                    let v = Value::tuple(vec![self.reg(a[1])?.clone()]);
                    self.set(a[0], v);
                }
                Opcode::CvTT => {
                    let v = Value::tuple(self.regs(&a[1..])?);
                    self.set(a[0], v);
                }
                Opcode::Tplf | Opcode::Tpll => {
                    let items = self.reg(a[1])?.as_tuple()?;
                    let (picked, id) = if op.opcode == Opcode::Tplf {
                        (items.first(), "vm/tup/first")
                    } else {
                        (items.last(), "vm/tup/last")
                    };
                    let v = match picked {
                        Some(v) => v.clone(),
                        None => self.error(id, a[2], Vec::new())?,
                    };
                    self.set(a[0], v);
                }
                Opcode::TupL => {
                    let v = Value::list(self.reg(a[1])?.as_tuple()?.iter().cloned().collect());
                    self.set(a[0], v);
                }
                Opcode::TuLx => {
                    let src = self.reg(a[1])?;
                    let v = match src.as_list() {
                        Ok(items) => Value::tuple(items.iter().cloned().collect()),
                        Err(_) => self.error("vm/splat/type", a[2], vec![self.describe_type(src.ty).into()])?,
                    };
                    self.set(a[0], v);
                }
                Opcode::List => {
                    let v = Value::list(self.reg(a[1])?.tuple_items().into_iter().collect());
                    self.set(a[0], v);
                }

                // Containers
                Opcode::LenL => {
                    let n = self.reg(a[1])?.as_list()?.len();
                    self.set(a[0], Value::int(n as i64));
                }
                Opcode::LenM => {
                    let n = self.reg(a[1])?.as_map()?.len();
                    self.set(a[0], Value::int(n as i64));
                }
                Opcode::Lens => {
                    let n = self.text(a[1])?.chars().count();
                    self.set(a[0], Value::int(n as i64));
                }
                Opcode::LenS => {
                    let n = self.reg(a[1])?.as_set()?.len();
                    self.set(a[0], Value::int(n as i64));
                }
                Opcode::LenT => {
                    let n = self.reg(a[1])?.as_tuple()?.len();
                    self.set(a[0], Value::int(n as i64));
                }
                Opcode::InxL => {
                    let x = self.reg(a[1])?;
                    let found = self.reg(a[2])?.as_list()?.iter().any(|el| el.ty == x.ty && ops::equals(x, el));
                    self.set(a[0], Value::bool(found));
                }
                Opcode::InxS => {
                    let found = self.reg(a[2])?.as_set()?.contains(self.reg(a[1])?);
                    self.set(a[0], Value::bool(found));
                }
                Opcode::InxT => {
                    let x = self.reg(a[1])?;
                    let found = self.reg(a[2])?.as_tuple()?.iter().any(|el| el.ty == x.ty && ops::equals(x, el));
                    self.set(a[0], Value::bool(found));
                }
                Opcode::Inxt => {
                    let found = self.reg(a[2])?.as_type()?.contains(self.reg(a[1])?.ty);
                    self.set(a[0], Value::bool(found));
                }
                Opcode::KeyM => {
                    let keys = self.reg(a[1])?.as_map()?.keys().cloned().collect();
                    self.set(a[0], Value::list(keys));
                }
                Opcode::KeyZ => {
                    let ty = self.reg(a[1])?.ty;
                    let st = self.types.struct_type(ty).ok_or(VmError::UnknownType(ty))?;
                    let labels = st.label_numbers.iter().map(|l| Value::label(*l)).collect();
                    self.set(a[0], Value::list(labels));
                }
                Opcode::Mkpr => {
                    let v = Value::pair(self.reg(a[1])?.clone(), self.reg(a[2])?.clone());
                    self.set(a[0], v);
                }
                Opcode::Mkmp => self.make_map(a)?,
                Opcode::Mkst => self.make_set(a)?,
                Opcode::Strc => {
                    let v = Value::fields(ValueType(a[1]), self.regs(&a[2..])?);
                    self.set(a[0], v);
                }
                Opcode::MkSn => self.make_snippet(a)?,
                Opcode::WthL => self.with_pairs(a, "list")?,
                Opcode::WthM => self.with_pairs(a, "map")?,
                Opcode::WthZ => self.with_pairs(a, "struct")?,
                Opcode::Wtht => self.construct_struct(a)?,
                Opcode::WtoM => self.without(a)?,

                // Indexing
                Opcode::IdxL => self.index_list(a)?,
                Opcode::Idxp => self.index_pair(a)?,
                Opcode::Idxs => self.index_string(a)?,
                Opcode::Idxt => self.index_type(a)?,
                Opcode::IdxT => self.index_tuple(a)?,
                Opcode::IxTn => self.index_tuple_constant(a)?,
                Opcode::IxXx => self.index_any(a)?,
                Opcode::IxZl => self.index_struct_label(a)?,
                Opcode::IxZn => self.index_struct_constant(a)?,
                Opcode::SliL | Opcode::Slis | Opcode::SliT => self.slice(op.opcode, a)?,
                Opcode::SlTn => self.slice_tuple_constant(a)?,

                // Types
                Opcode::Typx => {
                    let v = Value::abstract_type(AbstractType::single(self.reg(a[1])?.ty));
                    self.set(a[0], v);
                }
                Opcode::Typu => {
                    let v = Value::abstract_type(self.reg(a[1])?.as_type()?.union(self.reg(a[2])?.as_type()?));
                    self.set(a[0], v);
                }
                Opcode::Typs => {
                    let at = self.reg(a[1])?.as_type()?;
                    let members = at
                        .types()
                        .iter()
                        .map(|t| match at.varchar_limit() {
                            Some(limit) if *t == ValueType::STRING => Value::abstract_type(AbstractType::varchar(limit)),
                            _ => Value::abstract_type(AbstractType::single(*t)),
                        })
                        .collect();
                    self.set(a[0], Value::set(members));
                }
                Opcode::Varc => {
                    let n = self.int(a[1])?;
                    let v = match u32::try_from(n) {
                        Ok(limit) => Value::abstract_type(AbstractType::varchar(limit)),
                        Err(_) => self.error("vm/varchar", a[2], vec![n.into()])?,
                    };
                    self.set(a[0], v);
                }

                // Errors
                Opcode::Mker => {
                    let e = ErrorValue::user(self.text(a[1])?, self.token(a[2])?);
                    self.set(a[0], Value::error(e));
                }
                Opcode::Adtk => {
                    let mut e = self.reg(a[1])?.as_error()?.as_ref().clone();
                    e.add_to_trace(self.token(a[2])?);
                    self.set(a[0], Value::error(e));
                }
                Opcode::Uwrp => {
                    let src = self.reg(a[1])?;
                    let v = match src.as_error() {
                        Ok(e) => Value::fields(
                            self.error_struct,
                            vec![Value::string(&e.id), Value::string(&e.message)],
                        ),
                        Err(_) => self.error("vm/unwrap", a[2], vec![self.describe_type(src.ty).into()])?,
                    };
                    self.set(a[0], v);
                }
                Opcode::Vlid => {
                    let v = !self.reg(a[1])?.is_error();
                    self.set(a[0], Value::bool(v));
                }

                // Iteration
                Opcode::Mkit => self.make_iterator(a)?,
                Opcode::Itgk => {
                    let v = self.reg(a[1])?.as_iterator()?.borrow().key();
                    self.set(a[0], v);
                }
                Opcode::Itgv => {
                    let v = self.reg(a[1])?.as_iterator()?.borrow().value();
                    self.set(a[0], v);
                }
                Opcode::Itkv => {
                    let (k, v) = self.reg(a[2])?.as_iterator()?.borrow().key_value();
                    self.set(a[0], k);
                    self.set(a[1], v);
                }
                Opcode::Nxit => self.reg(a[0])?.as_iterator()?.borrow_mut().advance(),
                Opcode::Rsit => self.reg(a[0])?.as_iterator()?.borrow_mut().reset(),

                // Calls, closures and thunks
                Opcode::Call => {
                    loc = self.call(loc, a)?;
                    continue;
                }
                Opcode::CalT => {
                    loc = self.call_tuple(loc, a)?;
                    continue;
                }
                Opcode::Dofn => self.apply_lambda(a)?,
                Opcode::Mkfn => self.make_lambda(a)?,
                Opcode::Thnk => self.set(a[0], Value::thunk(a[1], a[2])),
                Opcode::Untk => {
                    self.force(a[0])?;
                }
                Opcode::Gofn => self.call_native(a)?,
                Opcode::Extn => self.call_external(a)?,

                // Control flow
                Opcode::Jmp => {
                    loc = a[0];
                    continue;
                }
                Opcode::Jsr => {
                    self.push_return(loc)?;
                    self.emit_debug_event(DebugEvent::CallEnter {
                        entry: a[0],
                        depth: self.callstack.len(),
                    });
                    loc = a[0];
                    continue;
                }
                Opcode::Ret => {
                    if self.callstack.len() == base {
                        self.emit_debug_event(DebugEvent::Return { depth: base });
                        return Ok(());
                    }
                    loc = self.callstack.pop().ok_or(VmError::EmptyCallStack)?;
                    self.emit_debug_event(DebugEvent::Return {
                        depth: self.callstack.len(),
                    });
                }
                Opcode::Qtru => {
                    loc = branch(loc, self.boolean(a[0])?, a[1]);
                    continue;
                }
                Opcode::Qfls => {
                    loc = branch(loc, !self.boolean(a[0])?, a[1]);
                    continue;
                }
                Opcode::Qitr => {
                    let unfinished = self.reg(a[0])?.as_iterator()?.borrow().unfinished();
                    loc = branch(loc, !unfinished, a[1]);
                    continue;
                }
                Opcode::Qlog => {
                    loc = branch(loc, self.logging, a[0]);
                    continue;
                }
                Opcode::Qtyp => {
                    loc = branch(loc, self.reg(a[0])?.ty == ValueType(a[1]), a[2]);
                    continue;
                }
                Opcode::Qntp => {
                    loc = branch(loc, self.reg(a[0])?.ty != ValueType(a[1]), a[2]);
                    continue;
                }
                Opcode::QleT => {
                    let n = self.reg(a[0])?.as_tuple()?.len();
                    loc = branch(loc, n <= a[1] as usize, a[2]);
                    continue;
                }
                Opcode::QlnT => {
                    let n = self.reg(a[0])?.as_tuple()?.len();
                    loc = branch(loc, n == a[1] as usize, a[2]);
                    continue;
                }
                Opcode::Qvch => {
                    let ok = ops::within_varchar(self.reg(a[0])?, a[1]);
                    loc = branch(loc, ok, a[2]);
                    continue;
                }
                Opcode::Qvcq => {
                    let v = self.reg(a[0])?;
                    let ok = v.ty == ValueType::NULL || ops::within_varchar(v, a[1]);
                    loc = branch(loc, ok, a[2]);
                    continue;
                }
                Opcode::Qnvh => {
                    let ok = ops::within_varchar(self.reg(a[0])?, a[1]);
                    loc = branch(loc, !ok, a[2]);
                    continue;
                }
                Opcode::Qnvq => {
                    let v = self.reg(a[0])?;
                    let ok = v.ty == ValueType::NULL || ops::within_varchar(v, a[1]);
                    loc = branch(loc, !ok, a[2]);
                    continue;
                }
                Opcode::Qabt => {
                    let (types, target) = (&a[2..a.len() - 1], a[a.len() - 1]);
                    let v = self.reg(a[0])?;
                    let ok = types.iter().any(|t| {
                        v.ty == ValueType(*t) && (v.ty != ValueType::STRING || ops::within_varchar(v, a[1]))
                    });
                    loc = branch(loc, ok, target);
                    continue;
                }
                Opcode::Qtpt => {
                    let (types, target) = (&a[2..a.len() - 1], a[a.len() - 1]);
                    let items = self.reg(a[0])?.as_tuple()?;
                    let rest = items.get(a[1] as usize..).unwrap_or(&[]);
                    let ok = rest.iter().all(|v| types.contains(&v.ty.0));
                    loc = branch(loc, ok, target);
                    continue;
                }
                Opcode::Qsat => {
                    let ok = self.reg(a[0])?.ty != ValueType::UNSATISFIED_CONDITIONAL;
                    loc = branch(loc, ok, a[1]);
                    continue;
                }
                Opcode::Qsng => {
                    loc = branch(loc, self.reg(a[0])?.ty.is_single(), a[1]);
                    continue;
                }
                Opcode::Qsnq => {
                    loc = branch(loc, self.reg(a[0])?.ty.is_single_or_null(), a[1]);
                    continue;
                }
                Opcode::Qstr | Opcode::Qstq | Opcode::Qspt | Opcode::Qspq => {
                    let ty = self.reg(a[0])?.ty;
                    let ok = match op.opcode {
                        Opcode::Qstr => self.types.is_struct(ty),
                        Opcode::Qstq => ty == ValueType::NULL || self.types.is_struct(ty),
                        Opcode::Qspt => self.types.is_snippet(ty),
                        _ => ty == ValueType::NULL || self.types.is_snippet(ty),
                    };
                    loc = branch(loc, ok, a[1]);
                    continue;
                }

                // I/O and logging
                Opcode::Outp => {
                    let text = self.description(self.reg(a[0])?);
                    self.io.output(&text);
                }
                Opcode::Outt => {
                    let text = self.literal(self.reg(a[0])?);
                    self.io.output(&text);
                }
                Opcode::Inpt => {
                    let prompt = match self.reg(a[1])?.tuple_items().first() {
                        Some(p) => self.description(p),
                        None => String::new(),
                    };
                    let line = self.io.input(&prompt);
                    self.set(a[0], Value::string(&line));
                }
                Opcode::Log => {
                    let text = self.text(a[0])?.to_string();
                    self.io.output(&text);
                }
                Opcode::Logn => self.logging = false,
                Opcode::Logy => self.logging = true,
            }
            loc += 1;
        }
    }
}
