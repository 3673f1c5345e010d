use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pyembed::{HostValue, Session};

fn make_records(n: usize) -> HostValue {
    HostValue::list((0..n).map(|i| {
        HostValue::map([
            ("id", HostValue::from(i as i64)),
            ("name", HostValue::from(format!("record-{i}"))),
            ("score", HostValue::from(i as f64 * 0.5)),
            ("tags", HostValue::list(["a", "b", "c"])),
        ])
    }))
}

fn bench_marshal(c: &mut Criterion) {
    let py = Session::initialize().expect("python session");
    let small = make_records(10);
    let large = make_records(1000);

    let mut g = c.benchmark_group("marshal");

    g.bench_function("put_small", |b| {
        b.iter(|| py.put("bench_value", black_box(small.clone())).unwrap())
    });
    g.bench_function("put_large", |b| {
        b.iter(|| py.put("bench_value", black_box(large.clone())).unwrap())
    });

    py.put("bench_small", small).unwrap();
    py.put("bench_large", large).unwrap();
    g.bench_function("get_small", |b| b.iter(|| py.get(black_box("bench_small")).unwrap()));
    g.bench_function("get_large", |b| b.iter(|| py.get(black_box("bench_large")).unwrap()));

    g.finish();

    let mut g = c.benchmark_group("session");
    g.bench_function("eval_arith", |b| b.iter(|| py.eval(black_box("1 + 1")).unwrap()));
    g.bench_function("exec_print", |b| b.iter(|| py.exec(black_box("print('x')")).unwrap()));
    g.finish();
}

criterion_group!(benches, bench_marshal);
criterion_main!(benches);
