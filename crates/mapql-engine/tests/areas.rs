//! Areas: containment queries, coordinate lookup, the pivot pair, and
//! the offline derivation job.

use crate::fixtures::{ids_of, run_ok, world, AREA_RELATION_OFFSET};
use mapql_engine::area::{build_areas, run_area_job};
use mapql_engine::dispatch::LocalDispatcher;
use mapql_engine::Storage;
use mapql_parser::parse_script;
use pretty_assertions::assert_eq;

#[test]
fn is_in_finds_the_areas_containing_a_point() {
    let storage = world();
    let out = run_ok(&storage, "is_in(50.905,7.305);out;");
    assert_eq!(
        ids_of(&out.elements, "area"),
        vec![11, 20 + AREA_RELATION_OFFSET]
    );
}

#[test]
fn is_in_uses_the_input_set_without_coordinates() {
    let storage = world();
    let out = run_ok(&storage, "node(30); is_in; out;");
    assert_eq!(
        ids_of(&out.elements, "area"),
        vec![11, 20 + AREA_RELATION_OFFSET]
    );
}

#[test]
fn area_query_selects_contained_nodes() {
    let storage = world();
    let out = run_ok(&storage, "node(area:11)[tourism=fountain];out;");
    assert_eq!(ids_of(&out.elements, "node"), vec![30]);
}

#[test]
fn area_filter_by_tag_then_containment() {
    let storage = world();
    let out = run_ok(&storage, "area[name=\"Plaza\"]->.a; node(area.a)[tourism];out;");
    assert_eq!(ids_of(&out.elements, "node"), vec![30]);
}

#[test]
fn pivot_returns_the_origin_objects() {
    let storage = world();
    let ways = run_ok(&storage, "is_in(50.905,7.305)->.a; way(pivot.a); out;");
    assert_eq!(ids_of(&ways.elements, "way"), vec![11]);
    let relations = run_ok(&storage, "is_in(50.905,7.305)->.a; rel(pivot.a); out;");
    assert_eq!(ids_of(&relations.elements, "relation"), vec![20]);
}

#[test]
fn map_to_area_is_the_inverse_of_pivot() {
    let storage = world();
    let from_way = run_ok(&storage, "way(11); map_to_area; out;");
    assert_eq!(ids_of(&from_way.elements, "area"), vec![11]);
    let from_relation = run_ok(&storage, "rel(20); map_to_area; out;");
    assert_eq!(
        ids_of(&from_relation.elements, "area"),
        vec![20 + AREA_RELATION_OFFSET]
    );
}

#[test]
fn build_areas_turns_closed_ways_and_multipolygons_into_areas() {
    let storage = world();
    let mut set = mapql_engine::NamedSet::new();
    set.push_way(storage.way(11).unwrap());
    set.push_relation(storage.relation(20).unwrap());
    let areas = build_areas(&set, &storage);
    assert_eq!(
        areas.iter().map(|a| a.id).collect::<Vec<_>>(),
        vec![11, 20 + AREA_RELATION_OFFSET]
    );
    assert!(areas[0].contains(
        mapql_engine::Coord::from_degrees(50.905),
        mapql_engine::Coord::from_degrees(7.305)
    ));
}

#[test]
fn area_job_commits_the_snapshot_version_under_the_write_token() {
    let storage = world();
    let dir = std::env::temp_dir().join(format!("mapql-area-job-{}", std::process::id()));
    let _ = std::fs::create_dir_all(&dir);
    let dispatcher = LocalDispatcher::new(&dir);

    let parsed = parse_script("way[building];");
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let areas = run_area_job(&parsed.root.unwrap(), &storage, &dispatcher).unwrap();
    assert_eq!(areas.iter().map(|a| a.id).collect::<Vec<_>>(), vec![11]);
    assert_eq!(dispatcher.area_version().unwrap(), "2024-06-01T00:00:00Z");
}
