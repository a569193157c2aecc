use std::collections::HashMap;
use std::fs;

use pretty_assertions::assert_eq;

use smartpl::catalog::{FieldCatalog, FieldSpec, FieldType};
use smartpl::library::{NoPlaylists, PlaylistLibrary};
use smartpl::{compile, CompileError, Compiler, SemanticError};

fn media() -> FieldCatalog {
    FieldCatalog::media_library()
}

#[test]
fn genre_is_rock_compiles_to_equality() {
    let compiled = compile(r#"smart playlist "X" { genre is "Rock" }"#, &media(), &NoPlaylists).unwrap();
    assert_eq!(compiled.title, "X");
    assert_eq!(compiled.where_clause, "f.genre = 'Rock'");
    assert_eq!(compiled.having_clause, None);
    assert_eq!(compiled.order_clause, None);
    assert_eq!(compiled.limit, None);
}

#[test]
fn compilation_is_deterministic() {
    let source = r#"
        # favourites from the last few months
        smart playlist "Mix" {
            (genre is "Rock" or genre is "Jazz") and rating > 60
            and time_added is in the last 3 months
            order by random
            limit 25
        }"#;
    let catalog = media();
    let first = compile(source, &catalog, &NoPlaylists).unwrap();
    for _ in 0..5 {
        assert_eq!(compile(source, &catalog, &NoPlaylists).unwrap(), first);
    }
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&compile(source, &media(), &NoPlaylists).unwrap()).unwrap()
    );
}

#[test]
fn and_binds_tighter_than_or() {
    let compiled = compile(
        r#"smart playlist "p" { genre is "A" or genre is "B" and year > 2000 }"#,
        &media(),
        &NoPlaylists,
    )
    .unwrap();
    assert_eq!(
        compiled.where_clause,
        "f.genre = 'A' OR (f.genre = 'B' AND f.year > 2000)"
    );
}

#[test]
fn quotes_in_values_are_escaped() {
    let compiled = compile(
        r#"smart playlist "p" { artist is "O'Brien" }"#,
        &media(),
        &NoPlaylists,
    )
    .unwrap();
    assert_eq!(compiled.where_clause, "f.artist = 'O''Brien'");
}

#[test]
fn quotes_in_titles_are_kept_verbatim() {
    let compiled = compile(
        r#"smart playlist "O'Brien's \"best\"" { artist is "O'Brien" order by title }"#,
        &media(),
        &NoPlaylists,
    )
    .unwrap();
    assert_eq!(compiled.title, r#"O'Brien's "best""#);
    assert_eq!(
        compiled.to_sql("SELECT f.id FROM files f", None).unwrap(),
        "SELECT f.id FROM files f WHERE f.artist = 'O''Brien' ORDER BY f.title ASC"
    );
}

#[test]
fn references_to_titles_with_quotes() {
    let mut playlists = HashMap::new();
    playlists.insert(
        "Rock 'n' Roll".to_string(),
        r#"smart playlist "Rock 'n' Roll" { genre is "Rock 'n' Roll" }"#.to_string(),
    );
    let compiled = compile(
        r#"smart playlist "p" { in playlist "Rock 'n' Roll" }"#,
        &media(),
        &playlists,
    )
    .unwrap();
    assert_eq!(compiled.where_clause, "(f.genre = 'Rock ''n'' Roll')");
}

#[test]
fn long_reference_chains_fail_cleanly() {
    let playlists: HashMap<String, String> = (0..600)
        .map(|i| {
            (
                format!("P{}", i),
                format!(r#"smart playlist "P{}" {{ in playlist "P{}" }}"#, i, i + 1),
            )
        })
        .collect();
    let err = compile(&playlists["P0"], &media(), &playlists).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Semantic(SemanticError::ReferenceTooDeep { .. })
    ));
    assert!(err.to_string().starts_with("playlist references nest too deeply: P0 -> P1 -> "));
}

#[test]
fn unknown_field_is_a_semantic_error() {
    let err = compile(
        r#"smart playlist "p" { bogus_field is "x" }"#,
        &media(),
        &NoPlaylists,
    )
    .unwrap_err();
    match err {
        CompileError::Semantic(SemanticError::UnknownField { field, .. }) => {
            assert_eq!(field, "bogus_field")
        }
        other => panic!("Expected UnknownField, got {:?}", other),
    }
}

#[test]
fn numeric_operator_on_string_field_is_rejected() {
    let err = compile(r#"smart playlist "p" { artist > 3 }"#, &media(), &NoPlaylists).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Semantic(SemanticError::OperatorNotAllowed { .. })
    ));

    let err = compile(r#"smart playlist "p" { year is "1999" }"#, &media(), &NoPlaylists).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Semantic(SemanticError::TypeMismatch { .. })
    ));
}

#[test]
fn time_window_is_date_arithmetic_in_sql() {
    let compiled = compile(
        r#"smart playlist "p" { date_added is in the last 7 days }"#,
        &media(),
        &NoPlaylists,
    )
    .unwrap();
    assert_eq!(
        compiled.where_clause,
        "f.time_added >= CAST(strftime('%s', date('now', '-7 days')) AS INTEGER)"
    );
    assert!(compiled.where_clause.contains("date('now'"));
}

#[test]
fn cyclic_references_are_detected() {
    let mut playlists = HashMap::new();
    playlists.insert(
        "A".to_string(),
        r#"smart playlist "A" { in playlist "B" }"#.to_string(),
    );
    playlists.insert(
        "B".to_string(),
        r#"smart playlist "B" { in playlist "A" }"#.to_string(),
    );

    let err = compile(&playlists["A"], &media(), &playlists).unwrap_err();
    assert_eq!(err.to_string(), "cyclic playlist reference: A -> B -> A");
}

#[test]
fn order_and_limit() {
    let compiled = compile(
        r#"smart playlist "p" { genre is "Rock" order by artist asc, album desc limit 50 }"#,
        &media(),
        &NoPlaylists,
    )
    .unwrap();
    assert_eq!(compiled.order_clause.as_deref(), Some("f.artist ASC, f.album DESC"));
    assert_eq!(compiled.limit, Some(50));
}

#[test]
fn custom_catalog_from_json() {
    let catalog = FieldCatalog::from_json_str(
        r#"{
            "name": { "column": "s.name", "type": "string" },
            "plays": { "column": "count(p.id)", "type": "number", "aggregate": true }
        }"#,
    )
    .unwrap();
    let compiled = compile(
        r#"smart playlist "p" { name starts with "A" having plays >= 3 order by plays desc }"#,
        &catalog,
        &NoPlaylists,
    )
    .unwrap();
    assert_eq!(compiled.where_clause, r"s.name LIKE 'A%' ESCAPE '\'");
    assert_eq!(compiled.having_clause.as_deref(), Some("count(p.id) >= 3"));
    assert_eq!(compiled.order_clause.as_deref(), Some("count(p.id) DESC"));
}

#[test]
fn builder_catalog_restricts_operators() {
    let catalog = FieldCatalog::new()
        .with_field(
            "title",
            FieldSpec::new("t.title", FieldType::String)
                .with_operators(vec![smartpl::ast::Comparator::Eq]),
        )
        .unwrap();
    let compiler = Compiler::new(catalog);
    assert!(compiler.compile(r#"smart playlist "p" { title is "x" }"#).is_ok());
    assert!(matches!(
        compiler.compile(r#"smart playlist "p" { title contains "x" }"#),
        Err(CompileError::Semantic(SemanticError::OperatorNotAllowed { .. }))
    ));
}

#[test]
fn library_directory_resolves_references() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("jazz.smartpl"),
        r#"smart playlist "Jazz" { genre is "Jazz" }"#,
    )
    .unwrap();
    let main = dir.path().join("recent_jazz.smartpl");
    fs::write(
        &main,
        r#"smart playlist "Recent jazz" { in playlist "Jazz" and time_added after yesterday }"#,
    )
    .unwrap();

    let library = PlaylistLibrary::load_dir(dir.path()).unwrap();
    assert_eq!(library.len(), 2);

    let compiler = Compiler::default().with_resolver(library);
    let compiled = compiler.compile_file(&main).unwrap();
    assert_eq!(
        compiled.where_clause,
        "(f.genre = 'Jazz') AND f.time_added >= \
         CAST(strftime('%s', date('now', '-1 days'), '+1 days') AS INTEGER)"
    );
}

#[test]
fn deeply_nested_input_is_rejected_without_overflow() {
    let source = format!(
        r#"smart playlist "deep" {{ {}genre is "Rock"{} }}"#,
        "(".repeat(10_000),
        ")".repeat(10_000)
    );
    let err = compile(&source, &media(), &NoPlaylists).unwrap_err();
    assert!(matches!(err, CompileError::Syntax(_)));
}
