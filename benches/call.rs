//! Call-path benchmarks
//!
//! Compares a shared descriptor against preparing one per call, and
//! measures the marshaling cost on its own.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dlcall::interop::{invoke, marshal_args, CallDescriptor, ThreadSink};
use dlcall::{Abi, Function, TypeCode, Value};

extern "C" fn add3(a: i32, b: i32, c: i32) -> i32 {
    a.wrapping_add(b).wrapping_add(c)
}

extern "C" fn dot2(a: f64, b: f64, c: f64, d: f64) -> f64 {
    a * c + b * d
}

fn bench_reuse_vs_fresh(c: &mut Criterion) {
    let codes = [TypeCode::INT; 3];
    let args = [Value::from(1), Value::from(2), Value::from(3)];
    let shared = CallDescriptor::build(&codes, TypeCode::INT, Abi::DEFAULT).unwrap();

    let mut group = c.benchmark_group("descriptor");
    group.bench_function("reused", |b| {
        b.iter(|| unsafe { invoke(&shared, add3 as usize, black_box(&args), &ThreadSink) })
    });
    group.bench_function("fresh", |b| {
        b.iter(|| {
            let desc = CallDescriptor::build(&codes, TypeCode::INT, Abi::DEFAULT).unwrap();
            unsafe { invoke(&desc, add3 as usize, black_box(&args), &ThreadSink) }
        })
    });
    group.finish();
}

fn bench_function_call(c: &mut Criterion) {
    let dot = unsafe {
        Function::new(dot2 as usize, &[TypeCode::DOUBLE; 4], TypeCode::DOUBLE, Abi::DEFAULT)
    }
    .unwrap();
    let args = [
        Value::from(1.0),
        Value::from(2.0),
        Value::from(3.0),
        Value::from(4.0),
    ];

    c.bench_function("function_call_f64x4", |b| b.iter(|| dot.call(black_box(&args))));
}

fn bench_marshal(c: &mut Criterion) {
    let mut group = c.benchmark_group("marshal");
    for arity in [1usize, 4, 8, 16] {
        let codes = vec![TypeCode::LONG; arity];
        let values: Vec<Value> = (0..arity as i64).map(Value::from).collect();
        group.bench_with_input(BenchmarkId::from_parameter(arity), &arity, |b, _| {
            b.iter(|| marshal_args(black_box(&codes), black_box(&values)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reuse_vs_fresh, bench_function_call, bench_marshal);
criterion_main!(benches);
