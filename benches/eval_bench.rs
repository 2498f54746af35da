use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rispy::{Environment, evaluate, parse_program_str, parse_str, tokenize};

const FIB_PROGRAM: &str = "(define fib (lambda (n) \
  (if (< n 2) \
      n \
      (+ (fib (- n 1)) (fib (- n 2))))))";

const PARSE_INPUT: &str = "(define fact (lambda (n) \
  (if (= n 0) 1 (* n (fact (- n 1)))))) \
(fact 10) \
(map (lambda (x) (* x x)) (list 1 2 3 4 5 6 7 8 9 10)) \
(append (list 1 2.5 -3) (cons 0 (list 4 5e2)))";

fn bench_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("reader");

    group.bench_with_input(
        BenchmarkId::new("tokenize", "program"),
        &PARSE_INPUT,
        |b, input| b.iter(|| tokenize(black_box(input))),
    );

    group.bench_with_input(
        BenchmarkId::new("parse_program", "program"),
        &PARSE_INPUT,
        |b, input| b.iter(|| parse_program_str(black_box(input))),
    );

    group.finish();
}

fn bench_evaluator(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluator");

    group.bench_function("fib_15", |b| {
        let env = Environment::new_global_populated();
        for node in parse_program_str(FIB_PROGRAM).expect("program should parse") {
            evaluate(node, env.clone()).expect("definition should evaluate");
        }
        let call = parse_str("(fib 15)").expect("call should parse");
        b.iter(|| evaluate(black_box(call.clone()), env.clone()))
    });

    group.bench_function("closure_calls", |b| {
        let env = Environment::new_global_populated();
        for node in parse_program_str(
            "(define add (lambda (x) (lambda (y) (+ x y)))) (define add5 (add 5))",
        )
        .expect("program should parse")
        {
            evaluate(node, env.clone()).expect("definition should evaluate");
        }
        let call = parse_str("(map add5 (list 1 2 3 4 5 6 7 8 9 10))").expect("call should parse");
        b.iter(|| evaluate(black_box(call.clone()), env.clone()))
    });

    group.finish();
}

criterion_group!(benches, bench_reader, bench_evaluator);
criterion_main!(benches);
