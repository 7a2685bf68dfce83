//! `make` and `convert`: derived elements and the value evaluators.

use crate::fixtures::{ids_of, run_ok, world};
use pretty_assertions::assert_eq;

#[test]
fn make_aggregates_over_the_implicit_set() {
    let storage = world();
    let out = run_ok(
        &storage,
        "node[amenity=pub](50.7,7.1,50.8,7.2); make stat total=count(nodes), top=max(name); out;",
    );
    assert_eq!(out.elements.len(), 1);
    let element = &out.elements[0];
    assert_eq!(element.kind, "stat");
    let tags = element.tags.as_ref().unwrap();
    assert_eq!(tags["total"], "2");
    assert_eq!(tags["top"], "Pub A");
}

#[test]
fn make_evaluates_arithmetic() {
    let storage = world();
    let out = run_ok(&storage, "make m a=1+2*3, b=(1+2)*3, c=10/4, d=x+y; out;");
    let tags = out.elements[0].tags.as_ref().unwrap();
    assert_eq!(tags["a"], "7");
    assert_eq!(tags["b"], "9");
    assert_eq!(tags["c"], "2.5");
    assert_eq!(tags["d"], "xy");
}

#[test]
fn make_with_id_function_takes_the_input_id() {
    let storage = world();
    let out = run_ok(&storage, "node(1); make poi ::id=id(), name=t[\"name\"]; out;");
    let element = &out.elements[0];
    assert_eq!(element.kind, "poi");
    assert_eq!(element.id, 1);
    assert_eq!(element.tags.as_ref().unwrap()["name"], "Pub A");
}

#[test]
fn convert_maps_each_object_keeping_its_id() {
    let storage = world();
    let out = run_ok(
        &storage,
        "node[amenity=pub](50.7,7.1,50.8,7.2); convert poi ::=::, kind=u(::type); out;",
    );
    assert_eq!(ids_of(&out.elements, "poi"), vec![1, 2]);
    let first = &out.elements[0];
    let tags = first.tags.as_ref().unwrap();
    assert_eq!(tags["amenity"], "pub");
    assert_eq!(tags["name"], "Pub A");
    assert_eq!(tags["kind"], "node");
}

#[test]
fn convert_drops_requested_keys_after_the_generic_copy() {
    let storage = world();
    let out = run_ok(&storage, "node(1); convert poi ::=::, !name; out;");
    let tags = out.elements[0].tags.as_ref().unwrap();
    assert!(tags.contains_key("amenity"));
    assert!(!tags.contains_key("name"));
}

#[test]
fn union_value_reports_disagreement() {
    let storage = world();
    let out = run_ok(
        &storage,
        "node[amenity=pub](50.7,7.1,50.8,7.2); make probe all=u(amenity), mixed=u(name); out;",
    );
    let tags = out.elements[0].tags.as_ref().unwrap();
    assert_eq!(tags["all"], "pub");
    // Only node 1 carries a name; the values still agree.
    assert_eq!(tags["mixed"], "Pub A");
}

#[test]
fn set_value_joins_sorted_unique_values() {
    let storage = world();
    let out = run_ok(
        &storage,
        "(node(1);node(2);node(3);); make probe kinds=set(amenity), ids=set(::id); out;",
    );
    let tags = out.elements[0].tags.as_ref().unwrap();
    assert_eq!(tags["kinds"], "cafe;pub");
    assert_eq!(tags["ids"], "1;2;3");
}
