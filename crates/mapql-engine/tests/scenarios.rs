//! End-to-end runs of the canonical scripts.

use crate::fixtures::{ids_of, run_ok, world};
use mapql_engine::{ErrorSink, JsonOutput, Settings, XmlOutput};
use pretty_assertions::assert_eq;

#[test]
fn tag_and_bbox_query_selects_the_pubs() {
    let storage = world();
    let out = run_ok(&storage, "node[amenity=pub](50.7,7.1,50.8,7.2);out;");
    assert_eq!(ids_of(&out.elements, "node"), vec![1, 2]);
    let first = &out.elements[0];
    assert_eq!(first.tags.as_ref().unwrap()["name"], "Pub A");
    assert!(first.lat.is_some());
}

#[test]
fn union_into_a_named_set_lists_both_nodes_ascending() {
    let storage = world();
    let out = run_ok(&storage, "(node(2);node(1);)->.a; .a out;");
    assert_eq!(ids_of(&out.elements, "node"), vec![1, 2]);
}

#[test]
fn recurse_down_includes_the_relation_and_its_members() {
    let storage = world();
    let out = run_ok(&storage, "rel(21); >; out;");
    assert_eq!(ids_of(&out.elements, "node"), vec![1, 4, 5]);
    assert_eq!(ids_of(&out.elements, "way"), vec![10]);
    assert_eq!(ids_of(&out.elements, "relation"), vec![21]);
}

#[test]
fn evaluation_is_deterministic() {
    let storage = world();
    let script = "node[amenity=pub](50.7,7.1,50.8,7.2);out meta;(node(1);way(10););out;";
    let first = run_ok(&storage, script);
    let second = run_ok(&storage, script);
    assert_eq!(first.to_bytes(), second.to_bytes());
}

#[test]
fn global_bbox_backs_an_empty_query() {
    let storage = world();
    let out = run_ok(&storage, "[bbox:50.7,7.1,50.8,7.2];node;out;");
    assert_eq!(ids_of(&out.elements, "node"), vec![1, 2]);
}

#[test]
fn parse_errors_forbid_evaluation() {
    let storage = world();
    let mut out = mapql_engine::CollectingOutput::new();
    let mut sink = ErrorSink::new();
    let ok = mapql_engine::run(
        "node[amenity=pub];;;out(",
        &storage,
        Settings::default(),
        &mut out,
        &mut sink,
    );
    assert!(!ok);
    assert!(sink.has_errors());
    assert!(out.elements.is_empty());
    assert_eq!(sink.exit_code(), 1);
}

#[test]
fn xml_output_wraps_elements_in_an_osm_document() {
    let storage = world();
    let mut out = XmlOutput::new();
    let mut sink = ErrorSink::new();
    let ok = mapql_engine::run(
        "node(1);out;",
        &storage,
        Settings::default(),
        &mut out,
        &mut sink,
    );
    assert!(ok, "{:?}", sink.diagnostics());
    let document = out.into_string();
    assert!(document.starts_with("<?xml"));
    assert!(document.contains("<node id=\"1\""));
    assert!(document.ends_with("</osm>\n"));
}

#[test]
fn json_output_is_valid_json_with_elements() {
    let storage = world();
    let mut out = JsonOutput::new();
    let mut sink = ErrorSink::new();
    let ok = mapql_engine::run(
        "node(1);out;",
        &storage,
        Settings::default(),
        &mut out,
        &mut sink,
    );
    assert!(ok, "{:?}", sink.diagnostics());
    let value: serde_json::Value = serde_json::from_str(&out.into_string()).unwrap();
    assert_eq!(value["osm3s"]["timestamp_osm_base"], "2024-06-01T00:00:00Z");
    assert_eq!(value["elements"][0]["type"], "node");
    assert_eq!(value["elements"][0]["id"], 1);
}

#[test]
fn out_count_reports_partition_sizes() {
    let storage = world();
    let out = run_ok(&storage, "(node(1);node(2);way(10););out count;");
    assert_eq!(out.elements.len(), 1);
    let tags = out.elements[0].tags.as_ref().unwrap();
    assert_eq!(tags["nodes"], "2");
    assert_eq!(tags["ways"], "1");
    assert_eq!(tags["total"], "3");
}

#[test]
fn out_limit_truncates_the_output() {
    let storage = world();
    let out = run_ok(&storage, "(node(1);node(2);node(3););out 2;");
    assert_eq!(out.elements.len(), 2);
}
