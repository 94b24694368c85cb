//! Calls: compiled functions, lambdas, thunks, native functions and
//! external services.

use super::{DebugEvent, Vm, VmError};
use crate::external::{render_call, OperatorPlacement};
use crate::native::{conversion_error, native_to_value};
use std::collections::VecDeque;
use std::rc::Rc;
use tarn_core::types::ValueType;
use tarn_core::values::Value;
use tracing::trace;

/// Per-parameter flags carried by `CalT`.
const FLAG_VARARGS: u32 = 1;
const FLAG_TUPLE: u32 = 2;

impl Vm {
    fn enter(&mut self, loc: u32, entry: u32) -> Result<u32, VmError> {
        self.push_return(loc)?;
        self.emit_debug_event(DebugEvent::CallEnter {
            entry,
            depth: self.callstack.len(),
        });
        Ok(entry)
    }

    /// `Call`: tuple arguments spread over consecutive parameters. Returns
    /// the address to continue at.
    pub(super) fn call(&mut self, loc: u32, a: &[u32]) -> Result<u32, VmError> {
        let (entry, start, end) = (a[0], a[1], a[2]);
        let mut values = Vec::new();
        for r in &a[3..] {
            values.extend(self.reg(*r)?.tuple_items());
        }
        for (param, v) in (start..end).zip(values) {
            self.set(param, v);
        }
        self.enter(loc, entry)
    }

    /// `CalT`: like `Call`, but parameters flagged as varargs gather every
    /// argument up to the next bling into one tuple, and tuple parameters
    /// take their argument whole.
    pub(super) fn call_tuple(&mut self, loc: u32, a: &[u32]) -> Result<u32, VmError> {
        let (entry, start, end) = (a[0], a[1], a[2]);
        let flags = Rc::clone(self.reg(a[3])?.as_int_array()?);
        let mut args: VecDeque<Value> = self.regs(&a[4..])?.into();
        let mut pending: VecDeque<Value> = VecDeque::new();
        for (i, param) in (start..end).enumerate() {
            let v = match flags.get(i).copied().unwrap_or(0) {
                FLAG_VARARGS => {
                    let mut items: Vec<Value> = pending.drain(..).collect();
                    while args.front().is_some_and(|v| v.ty != ValueType::BLING) {
                        if let Some(v) = args.pop_front() {
                            items.extend(v.tuple_items());
                        }
                    }
                    Value::tuple(items)
                }
                FLAG_TUPLE => match pending.pop_front().or_else(|| args.pop_front()) {
                    Some(v) if v.ty == ValueType::TUPLE => v,
                    Some(v) => Value::tuple(vec![v]),
                    None => break,
                },
                _ => {
                    if pending.is_empty() {
                        match args.pop_front() {
                            Some(v) if v.ty == ValueType::TUPLE => pending.extend(v.tuple_items()),
                            Some(v) => pending.push_back(v),
                            None => break,
                        }
                    }
                    match pending.pop_front() {
                        Some(v) => v,
                        None => break,
                    }
                }
            };
            self.set(param, v);
        }
        self.enter(loc, entry)
    }

    /// Calls a lambda value with `args` and returns its result. Native
    /// functions may use this to call back into Tarn code.
    pub fn apply(&mut self, func: &Value, args: &[Value]) -> Result<Value, VmError> {
        let lambda = Rc::clone(func.as_func()?);
        if let Some(sig) = &lambda.sig {
            for (i, (v, constraint)) in args.iter().zip(sig).enumerate() {
                if constraint.as_ref().is_some_and(|at| !at.accepts(v)) {
                    return self.error("vm/func/types", lambda.token, vec![(i + 1).into(), self.describe_type(v.ty).into()]);
                }
            }
        }
        for (i, v) in lambda.captures.iter().enumerate() {
            self.set(lambda.captures_start + i as u32, v.clone());
        }
        for (param, v) in (lambda.captures_end..lambda.params_end).zip(args) {
            self.set(param, v.clone());
        }
        self.emit_debug_event(DebugEvent::CallEnter {
            entry: lambda.entry,
            depth: self.callstack.len(),
        });
        self.run(lambda.entry)?;
        Ok(self.reg(lambda.result)?.clone())
    }

    pub(super) fn apply_lambda(&mut self, a: &[u32]) -> Result<(), VmError> {
        let func = self.reg(a[1])?.clone();
        let mut args = Vec::new();
        for r in &a[2..] {
            args.extend(self.reg(*r)?.tuple_items());
        }
        let v = self.apply(&func, &args)?;
        self.set(a[0], v);
        Ok(())
    }

    /// Captures are taken by value, forcing any thunks first.
    pub(super) fn make_lambda(&mut self, a: &[u32]) -> Result<(), VmError> {
        let factory = self
            .lambda_factories
            .get(a[1] as usize)
            .cloned()
            .ok_or(VmError::UnknownLambdaFactory(a[1]))?;
        let captures = factory
            .capture_locations
            .iter()
            .map(|r| self.force(*r))
            .collect::<Result<Vec<_>, _>>()?;
        self.set(a[0], Value::func(factory.materialize(captures)));
        Ok(())
    }

    /// Evaluates a thunk held in register `r`, replacing it with its result.
    pub(super) fn force(&mut self, r: u32) -> Result<Value, VmError> {
        let v = self.reg(r)?;
        if v.ty == ValueType::THUNK {
            let (result, entry) = v.as_thunk()?;
            self.run(entry)?;
            let forced = self.reg(result)?.clone();
            self.set(r, forced);
        }
        Ok(self.reg(r)?.clone())
    }

    pub(super) fn call_native(&mut self, a: &[u32]) -> Result<(), VmError> {
        let f = self
            .natives
            .get(a[1] as usize)
            .cloned()
            .ok_or(VmError::UnknownNative(a[1]))?;
        let tok = self.token(a[2])?;
        let args = self.regs(&a[3..])?;
        let v = match f.marshal_args(&args) {
            Err(culprit) => conversion_error(&self.types, &culprit, &tok),
            Ok(natives) => {
                trace!(name = %f.name, args = natives.len(), "native call");
                self.emit_debug_event(DebugEvent::NativeCall { name: f.name.clone() });
                let result = (f.code)(self, natives);
                native_to_value(&self.types, result, &f, &tok)
            }
        };
        self.set(a[0], v);
        Ok(())
    }

    pub(super) fn call_external(&mut self, a: &[u32]) -> Result<(), VmError> {
        let placement = OperatorPlacement::from_operand(a[2]).ok_or(VmError::BadPlacement(a[2]))?;
        let call = render_call(
            &self.types,
            self.text(a[3])?,
            self.text(a[4])?,
            placement,
            &self.regs(&a[5..])?,
        );
        let service = self
            .externals
            .get(a[1] as usize)
            .ok_or(VmError::UnknownExternal(a[1]))?
            .name()
            .to_string();
        trace!(service = %service, call = %call, "external call");
        self.emit_debug_event(DebugEvent::ExternalCall { service, call: call.clone() });
        let v = match self.externals.get_mut(a[1] as usize) {
            Some(ext) => ext.evaluate(&call),
            None => return Err(VmError::UnknownExternal(a[1])),
        };
        self.set(a[0], v);
        Ok(())
    }
}
