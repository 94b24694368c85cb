//! Criterion benchmarks for the Tarn interpreter loop.
//!
//! Measures dispatch overhead on a counting loop and on recursive calls
//! through the call stack.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tarn_core::program::{sentinel, Constant, Opcode, Program};
use tarn_vm::{Assembler, Vm};

/// `total = 0; for i in 0..n { total += i }`
fn counting_loop(n: i64) -> Program {
    let mut asm = Assembler::new();
    let limit = asm.reserve(Constant::Int(n));
    let zero = asm.reserve(Constant::Int(0));
    let (it, i, total) = (asm.alloc(), asm.alloc(), asm.alloc());
    let tok = asm.token("for", 1, 1);
    asm.emit(Opcode::Asgm, &[total, zero]);
    asm.emit(Opcode::Mkit, &[it, limit, 0, tok]);
    let test = asm.emit(Opcode::Qitr, &[it, 0]);
    asm.emit(Opcode::Ret, &[]);
    let body = asm.emit(Opcode::Itgv, &[i, it]);
    asm.emit(Opcode::Addi, &[total, total, i]);
    asm.emit(Opcode::Nxit, &[it]);
    asm.emit(Opcode::Jmp, &[test]);
    asm.patch(test, 1, body);
    asm.finish()
}

/// Naive recursive Fibonacci. The parameter and the first partial result
/// sit in adjacent registers so one `Rpsh` saves both.
fn fibonacci(n: i64) -> Program {
    let mut asm = Assembler::new();
    let arg = asm.reserve(Constant::Int(n));
    let two = asm.reserve(Constant::Int(2));
    let (param, left) = (asm.alloc(), asm.alloc());
    let (result, cond, tmp) = (asm.alloc(), asm.alloc(), asm.alloc());
    asm.emit(Opcode::Call, &[0, param, param + 1, arg]);
    asm.emit(Opcode::Ret, &[]);
    let f = asm.emit(Opcode::Gthi, &[cond, two, param]);
    asm.emit(Opcode::Qtru, &[cond, f + 4]);
    asm.emit(Opcode::Asgm, &[result, param]);
    asm.emit(Opcode::Ret, &[]);
    asm.emit(Opcode::Rpsh, &[param, left + 1]);
    asm.emit(Opcode::Subi, &[tmp, param, sentinel::ONE]);
    asm.emit(Opcode::Call, &[f, param, param + 1, tmp]);
    asm.emit(Opcode::Rpop, &[]);
    asm.emit(Opcode::Asgm, &[left, result]);
    asm.emit(Opcode::Rpsh, &[param, left + 1]);
    asm.emit(Opcode::Subi, &[tmp, param, two]);
    asm.emit(Opcode::Call, &[f, param, param + 1, tmp]);
    asm.emit(Opcode::Rpop, &[]);
    asm.emit(Opcode::Addi, &[result, result, left]);
    asm.emit(Opcode::Ret, &[]);
    asm.patch(0, 0, f);
    asm.finish()
}

fn bench_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("counting_loop");
    for n in [1_000i64, 10_000, 100_000] {
        let program = counting_loop(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &program, |b, program| {
            b.iter(|| {
                let mut vm = Vm::new(program.clone());
                vm.run(0).expect("loop should run");
                black_box(vm.mem.len())
            })
        });
    }
    group.finish();
}

fn bench_fibonacci(c: &mut Criterion) {
    let mut group = c.benchmark_group("fibonacci");
    for n in [10i64, 15, 20] {
        let program = fibonacci(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &program, |b, program| {
            b.iter(|| {
                let mut vm = Vm::new(program.clone());
                vm.run(0).expect("fibonacci should run");
                black_box(vm.mem.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_loop, bench_fibonacci);
criterion_main!(benches);
