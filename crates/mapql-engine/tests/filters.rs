//! Tag, regex, spatial, and meta filters.

use crate::fixtures::{ids_of, run_ok, world};
use pretty_assertions::assert_eq;

#[test]
fn regex_filters_respect_case_insensitivity() {
    let storage = world();
    let out = run_ok(&storage, "node[amenity~\"^PUB$\",i];out;");
    assert_eq!(ids_of(&out.elements, "node"), vec![1, 2]);
    let strict = run_ok(&storage, "node[amenity~\"^PUB$\"];out;");
    assert!(strict.elements.is_empty());
}

#[test]
fn negated_filters_match_objects_without_the_key() {
    let storage = world();
    let out = run_ok(&storage, "node[amenity!=pub](50.7,7.1,50.8,7.2);out;");
    // Nodes 1 and 2 carry amenity=pub; nothing else lives in the box.
    assert!(out.elements.is_empty());
}

#[test]
fn absence_shortcut_excludes_tagged_objects() {
    let storage = world();
    let out = run_ok(&storage, "node[amenity=pub][!name];out;");
    assert_eq!(ids_of(&out.elements, "node"), vec![2]);
}

#[test]
fn key_regex_filters_scan_matching_keys() {
    let storage = world();
    let out = run_ok(&storage, "node[~\"^amen\"~\"pub|cafe\"];out;");
    assert_eq!(ids_of(&out.elements, "node"), vec![1, 2, 3]);
}

#[test]
fn around_selects_by_great_circle_distance() {
    let storage = world();
    let near = run_ok(&storage, "node(around:100,50.72,7.11);out;");
    assert_eq!(ids_of(&near.elements, "node"), vec![1]);
    // ~3 km between the two pubs.
    let wide = run_ok(&storage, "node(around:5000,50.72,7.11)[amenity=pub];out;");
    assert_eq!(ids_of(&wide.elements, "node"), vec![1, 2]);
}

#[test]
fn polygon_query_selects_contained_nodes() {
    let storage = world();
    let out = run_ok(
        &storage,
        "node(poly:\"50.70 7.10 50.70 7.15 50.75 7.15 50.75 7.10\");out;",
    );
    assert_eq!(ids_of(&out.elements, "node"), vec![1, 2]);
}

#[test]
fn user_and_uid_filters_read_object_meta() {
    let storage = world();
    let by_name = run_ok(&storage, "node(user:alice);out;");
    assert_eq!(ids_of(&by_name.elements, "node"), vec![1]);
    let by_uid = run_ok(&storage, "way(uid:100);out;");
    assert_eq!(ids_of(&by_uid.elements, "way"), vec![10]);
}

#[test]
fn newer_filters_by_timestamp() {
    let storage = world();
    let out = run_ok(
        &storage,
        "node[amenity=pub](newer:\"2024-01-01T00:00:00Z\");out;",
    );
    assert_eq!(ids_of(&out.elements, "node"), vec![1]);
}

#[test]
fn changed_with_explicit_window_filters_by_interval() {
    let storage = world();
    let out = run_ok(
        &storage,
        "node[amenity=pub](changed:\"2023-01-01T00:00:00Z\",\"2023-12-31T00:00:00Z\");out;",
    );
    assert_eq!(ids_of(&out.elements, "node"), vec![2]);
}

#[test]
fn way_queries_intersect_spatial_clauses_through_members() {
    let storage = world();
    let out = run_ok(&storage, "way(50.59,7.0,50.62,7.1);out;");
    assert_eq!(ids_of(&out.elements, "way"), vec![10]);
}

#[test]
fn query_intersects_multiple_clauses() {
    let storage = world();
    let out = run_ok(
        &storage,
        "node[amenity=pub](50.7,7.1,50.8,7.2)(user:alice);out;",
    );
    assert_eq!(ids_of(&out.elements, "node"), vec![1]);
}
