use criterion::{black_box, criterion_group, criterion_main, Criterion};
use plcparse::backend::{generator, interpreter::Interpreter};
use plcparse::{analyzer, lexer, parser};

const WORKLOAD: &str = "\
VAL limit: Integer = 20;
FUN fib(n: Integer): Integer DO
    LET a: Integer = 0;
    LET b: Integer = 1;
    LET i: Integer = 0;
    WHILE i < n DO
        LET next: Integer = a + b;
        a = b;
        b = next;
        i = i + 1;
    END
    RETURN a;
END
FUN main(): Integer DO
    LET i: Integer = 0;
    WHILE i < limit DO
        print(\"fib \" + i + \" = \" + fib(i));
        i = i + 1;
    END
    RETURN 0;
END
";

fn bench_pipeline(c: &mut Criterion) {
    let tokens = lexer::tokenize(WORKLOAD).expect("tokenize");
    let parsed = parser::parse_tokens(tokens.clone()).expect("parse");
    let typed = analyzer::analyze(&parsed).expect("analyze");

    c.bench_function("pipeline_tokenize", |b| {
        b.iter(|| {
            let out = lexer::tokenize(black_box(WORKLOAD)).expect("tokenize");
            black_box(out);
        })
    });

    c.bench_function("pipeline_parse", |b| {
        b.iter(|| {
            let out = parser::parse_tokens(black_box(tokens.clone())).expect("parse");
            black_box(out);
        })
    });

    c.bench_function("pipeline_analyze", |b| {
        b.iter(|| {
            let out = analyzer::analyze(black_box(&parsed)).expect("analyze");
            black_box(out);
        })
    });

    c.bench_function("pipeline_interpret", |b| {
        b.iter(|| {
            let mut interpreter = Interpreter::with_output(Vec::<u8>::new());
            let out = interpreter.run(black_box(&typed)).expect("run");
            black_box(out);
        })
    });

    c.bench_function("pipeline_generate", |b| {
        b.iter(|| {
            let out = generator::generate(black_box(&typed));
            black_box(out);
        })
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
