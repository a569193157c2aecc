use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;
use std::hint::black_box;

use smartpl::catalog::FieldCatalog;
use smartpl::lexer::tokenize;
use smartpl::parser::Parser;
use smartpl::sql_compiler::SqlCompiler;

fn test_cases() -> Vec<(&'static str, String)> {
    let long_chain = (0..200)
        .map(|i| format!("year = {}", 1800 + i))
        .collect::<Vec<_>>()
        .join(" or ");
    vec![
        ("simple", r#"smart playlist "Rock" { genre is "Rock" }"#.to_string()),
        (
            "medium",
            r#"smart playlist "Recent" {
                genre is "Rock" and time_added is in the last 2 weeks and not artist contains "Live"
                order by artist, album desc
                limit 100
            }"#
            .to_string(),
        ),
        (
            "complex",
            r#"smart playlist "Mix" {
                (genre is "Rock" or genre is "Metal" or genre starts with "Prog")
                and (rating >= 60 or play_count > 20)
                and time_played before 3 months ago
                and media_kind is music
                and in playlist "Favourites"
                having play_count > 5
                order by random
                limit 50
            }"#
            .to_string(),
        ),
        ("long_or_chain", format!(r#"smart playlist "Years" {{ {} }}"#, long_chain)),
    ]
}

fn library() -> HashMap<String, String> {
    let mut library = HashMap::new();
    library.insert(
        "Favourites".to_string(),
        r#"smart playlist "Favourites" { rating >= 80 }"#.to_string(),
    );
    library
}

fn benchmark_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_performance");

    for (name, source) in test_cases() {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &source, |b, source| {
            b.iter(|| black_box(tokenize(black_box(source)).unwrap()))
        });
    }

    group.finish();
}

fn benchmark_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_performance");

    for (name, source) in test_cases() {
        let tokens = tokenize(&source).unwrap();

        group.bench_with_input(BenchmarkId::new("parse", name), &tokens, |b, tokens| {
            b.iter(|| {
                let mut parser = Parser::new(black_box(tokens));
                black_box(parser.parse().unwrap())
            })
        });
    }

    group.finish();
}

fn benchmark_sql_compiler(c: &mut Criterion) {
    let catalog = FieldCatalog::media_library();
    let library = library();
    let mut group = c.benchmark_group("sql_compiler_performance");

    for (name, source) in test_cases() {
        let playlist = smartpl::parse_str(&source).unwrap();

        group.bench_with_input(BenchmarkId::new("compile", name), &playlist, |b, playlist| {
            b.iter(|| {
                let compiler = SqlCompiler::new(&catalog, &library);
                black_box(compiler.compile(black_box(playlist)).unwrap())
            })
        });
    }

    group.finish();
}

fn benchmark_end_to_end(c: &mut Criterion) {
    let catalog = FieldCatalog::media_library();
    let library = library();
    let mut group = c.benchmark_group("end_to_end_performance");

    for (name, source) in test_cases() {
        group.bench_with_input(BenchmarkId::new("full_pipeline", name), &source, |b, source| {
            b.iter(|| black_box(smartpl::compile(black_box(source), &catalog, &library).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_lexer,
    benchmark_parser,
    benchmark_sql_compiler,
    benchmark_end_to_end
);
criterion_main!(benches);
