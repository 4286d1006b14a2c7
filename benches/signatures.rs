//! Benchmarks for signature synthesis.
//!
//! Tests encoding and patching performance for the instrumentation call shapes:
//! - Open begin/end members of every arity
//! - Per call-site instantiations
//! - Local variable signature patching
//! - Full instrumentation of one method against an in-memory store

extern crate dotinject;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dotinject::{calltarget::MAX_BEGIN_ARITY, prelude::*};
use std::hint::black_box;

const STATE: Token = Token(0x0100_0007);
const EXCEPTION: Token = Token(0x0100_0002);
const RETURN: Token = Token(0x0100_0009);

fn corlib() -> AssemblyIdentity {
    AssemblyIdentity::new("System.Private.CoreLib", AssemblyVersion::new(8, 0, 0, 0))
}

/// Benchmark the open begin member for arities 0 to 6.
/// Signature: GENERIC (n+2) (n+1) VALUETYPE <State> MVAR 1 .. MVAR n+1
fn bench_begin_method(c: &mut Criterion) {
    let mut group = c.benchmark_group("sig_begin_method");
    for arity in 0..=MAX_BEGIN_ARITY {
        group.bench_with_input(BenchmarkId::from_parameter(arity), &arity, |b, &arity| {
            b.iter(|| {
                let blob = encode_begin_method(black_box(STATE), arity).unwrap();
                black_box(blob)
            });
        });
    }
    group.finish();
}

/// Benchmark the open end member of a method returning a value.
fn bench_end_method_return(c: &mut Criterion) {
    c.bench_function("sig_end_method_return", |b| {
        b.iter(|| {
            let blob =
                encode_end_method_return(black_box(RETURN), black_box(EXCEPTION), black_box(STATE))
                    .unwrap();
            black_box(blob)
        });
    });
}

/// Benchmark a call-site instantiation with six argument descriptors.
/// Signature: GENERICINST 8 CLASS <integration> CLASS <instance> <arg>*6
fn bench_call_target_instantiation(c: &mut Criterion) {
    let args: [&[u8]; 6] = [
        &[0x08],
        &[0x0E],
        &[0x1D, 0x05],
        &[0x15, 0x12, 0x49, 0x01, 0x0E],
        &[0x11, 0x49],
        &[0x1E, 0x00],
    ];

    c.bench_function("sig_call_target_instantiation", |b| {
        b.iter(|| {
            let blob = encode_call_target_instantiation(
                black_box(Token::new(0x0200_0003)),
                black_box(Token::new(0x0200_0007)),
                false,
                black_box(&args),
            )
            .unwrap();
            black_box(blob)
        });
    });
}

/// Benchmark patching a local signature with 64 existing locals.
fn bench_patched_locals(c: &mut Criterion) {
    let existing: Vec<u8> = (0..64).map(|i| if i % 2 == 0 { 0x08 } else { 0x0E }).collect();
    let return_type: [u8; 2] = [0x11, 0x49];
    let wrapper: [u8; 6] = [0x15, 0x11, 0x25, 0x01, 0x11, 0x49];

    c.bench_function("sig_patched_locals", |b| {
        b.iter(|| {
            let blob = encode_patched_locals(
                68,
                black_box(&existing),
                Some(&return_type[..]),
                EXCEPTION,
                CallReturnLocal::Generic(&wrapper),
                STATE,
            )
            .unwrap();
            black_box(blob)
        });
    });
}

/// Benchmark instrumenting one non-void method with two arguments from a fresh module.
fn bench_instrument_method(c: &mut Criterion) {
    let method = MethodSignature::parse(&[0x20, 0x02, 0x08, 0x0E, 0x11, 0x49]).unwrap();
    let instance = InstanceType::new(Token::new(0x0200_0007));
    let integration = Token::new(0x0200_0003);

    c.bench_function("instrument_method", |b| {
        b.iter(|| {
            let mut tokens = CallTargetTokens::new(MemoryStore::new(), corlib());
            let mut body = InstructionList::new(Token::NIL);

            let (slots, _) = tokens
                .modify_local_sig_and_initialize(&mut body, &method.return_value)
                .unwrap();
            tokens
                .write_begin_method(&mut body, integration, &instance, &method.arguments)
                .unwrap();
            body.store_local(slots.state);
            tokens
                .write_end_return(&mut body, integration, &instance, &method.return_value)
                .unwrap();
            tokens
                .write_log_exception(&mut body, integration, &instance)
                .unwrap();
            black_box(body.encode())
        });
    });
}

criterion_group!(
    benches,
    bench_begin_method,
    bench_end_method_return,
    bench_call_target_instantiation,
    bench_patched_locals,
    bench_instrument_method
);
criterion_main!(benches);
