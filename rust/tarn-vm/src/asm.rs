//! A small assembler for building [`Program`]s by hand: register and
//! constant allocation, token interning and jump patching.

use tarn_core::diagnostics::Token;
use tarn_core::program::{sentinel, Constant, LambdaFactory, Opcode, Operation, Program, SnippetFactory};
use tarn_core::types::TypeRegistry;

#[derive(Debug, Default)]
pub struct Assembler {
    code: Vec<Operation>,
    next_register: u32,
    constants: Vec<(u32, Constant)>,
    tokens: Vec<Token>,
    lambda_factories: Vec<LambdaFactory>,
    snippet_factories: Vec<SnippetFactory>,
    types: TypeRegistry,
}

impl Assembler {
    pub fn new() -> Self {
        Self::with_types(TypeRegistry::new())
    }

    pub fn with_types(types: TypeRegistry) -> Self {
        Self {
            next_register: sentinel::COUNT,
            types,
            ..Self::default()
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    /// A fresh register holding `c` at start-up.
    pub fn reserve(&mut self, c: Constant) -> u32 {
        let reg = self.alloc();
        self.constants.push((reg, c));
        reg
    }

    /// A fresh register, initially undefined.
    pub fn alloc(&mut self) -> u32 {
        let reg = self.next_register;
        self.next_register += 1;
        reg
    }

    /// `n` consecutive fresh registers; returns the first.
    pub fn alloc_range(&mut self, n: u32) -> u32 {
        let first = self.next_register;
        self.next_register += n;
        first
    }

    pub fn token(&mut self, literal: &str, line: u32, col: u32) -> u32 {
        self.tokens.push(Token::new(literal, line, col, ""));
        self.tokens.len() as u32 - 1
    }

    /// Appends an operation and returns its address.
    pub fn emit(&mut self, opcode: Opcode, args: &[u32]) -> u32 {
        self.code.push(Operation::new(opcode, args));
        self.code_top() - 1
    }

    /// The address the next emitted operation will have.
    pub fn code_top(&self) -> u32 {
        self.code.len() as u32
    }

    /// Overwrites one operand of an already emitted operation, typically a
    /// forward jump target.
    pub fn patch(&mut self, at: u32, arg: usize, value: u32) {
        if let Some(slot) = self.code.get_mut(at as usize).and_then(|op| op.args.get_mut(arg)) {
            *slot = value;
        }
    }

    pub fn add_lambda_factory(&mut self, factory: LambdaFactory) -> u32 {
        self.lambda_factories.push(factory);
        self.lambda_factories.len() as u32 - 1
    }

    pub fn add_snippet_factory(&mut self, factory: SnippetFactory) -> u32 {
        self.snippet_factories.push(factory);
        self.snippet_factories.len() as u32 - 1
    }

    pub fn finish(self) -> Program {
        Program {
            code: self.code,
            register_count: self.next_register,
            constants: self.constants,
            tokens: self.tokens,
            lambda_factories: self.lambda_factories,
            snippet_factories: self.snippet_factories,
            types: self.types,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_core::values::Value;

    #[test]
    fn test_registers_start_after_sentinels() {
        let mut asm = Assembler::new();
        assert_eq!(asm.alloc(), sentinel::COUNT);
        let k = asm.reserve(Constant::Int(7));
        let program = asm.finish();
        assert_eq!(program.initial_memory()[k as usize], Value::int(7));
        assert_eq!(program.register_count, k + 1);
    }

    #[test]
    fn test_patch_forward_jump() {
        let mut asm = Assembler::new();
        let jump = asm.emit(Opcode::Jmp, &[0]);
        asm.emit(Opcode::Ret, &[]);
        let target = asm.code_top();
        asm.patch(jump, 0, target);
        asm.emit(Opcode::Ret, &[]);
        let program = asm.finish();
        assert_eq!(program.code[0].args, vec![2]);
    }
}
