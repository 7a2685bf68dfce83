//! Budget enforcement and runtime failure reporting.

use crate::fixtures::world;
use mapql_engine::{CollectingOutput, DiagnosticKind, ErrorSink, Settings, Severity};

#[test]
fn element_limit_aborts_evaluation_with_a_runtime_error() {
    let storage = world();
    let mut out = CollectingOutput::new();
    let mut sink = ErrorSink::new();
    let ok = mapql_engine::run(
        "[maxsize:1];node[amenity=pub];out;",
        &storage,
        Settings::default(),
        &mut out,
        &mut sink,
    );
    assert!(!ok);
    let diagnostic = &sink.diagnostics()[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::Runtime);
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(
        diagnostic.to_string(),
        "runtime error: Element limit of 1 exceeded"
    );
}

#[test]
fn changed_auto_outside_diff_mode_is_a_runtime_error() {
    let storage = world();
    let mut out = CollectingOutput::new();
    let mut sink = ErrorSink::new();
    let ok = mapql_engine::run(
        "node[amenity=pub](changed);out;",
        &storage,
        Settings::default(),
        &mut out,
        &mut sink,
    );
    assert!(!ok);
    assert!(sink
        .diagnostics()
        .iter()
        .any(|d| d.kind == DiagnosticKind::Runtime));
}

#[test]
fn diff_headers_require_the_diff_entry_point() {
    let storage = world();
    let mut out = CollectingOutput::new();
    let mut sink = ErrorSink::new();
    let ok = mapql_engine::run(
        "[diff:\"2024-01-01T00:00:00Z\"];node(1);out;",
        &storage,
        Settings::default(),
        &mut out,
        &mut sink,
    );
    assert!(!ok);
    assert!(sink
        .diagnostics()
        .iter()
        .any(|d| d.kind == DiagnosticKind::Static));
}

#[test]
fn implicit_global_bbox_constrains_every_query() {
    let storage = world();
    let mut out = CollectingOutput::new();
    let mut sink = ErrorSink::new();
    let settings = Settings {
        implicit_global_bbox: true,
    };
    let ok = mapql_engine::run(
        "[bbox:50.7,7.1,50.8,7.2];node[amenity];out;",
        &storage,
        settings,
        &mut out,
        &mut sink,
    );
    assert!(ok, "{:?}", sink.diagnostics());
    // Without the implicit bbox the cafe at 51.0 would match too.
    let ids: Vec<u64> = out.elements.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2]);
}
