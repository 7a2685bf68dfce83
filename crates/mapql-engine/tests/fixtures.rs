//! Shared snapshot fixture: a small world around Bonn with pubs, a
//! primary road, a building square with its derived areas, and two
//! relations.

use mapql_engine::{
    Area, CollectingOutput, Coord, ErrorSink, Id, Member, MemStorage, MemStorageBuilder, Meta,
    Node, ObjectType, OutElement, Relation, Settings, Tags, Way,
};

pub use mapql_engine::model::AREA_RELATION_OFFSET;

pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn meta(user: &str, uid: Id, timestamp: &str) -> Option<Meta> {
    Some(Meta {
        version: 1,
        timestamp: timestamp.to_string(),
        changeset: 1,
        uid,
        user: user.to_string(),
    })
}

pub fn node(id: Id, lat: f64, lon: f64, t: &[(&str, &str)]) -> Node {
    Node {
        id,
        lat: Coord::from_degrees(lat),
        lon: Coord::from_degrees(lon),
        tags: tags(t),
        meta: None,
    }
}

fn ring(points: &[(f64, f64)]) -> Vec<(Coord, Coord)> {
    points
        .iter()
        .map(|(lat, lon)| (Coord::from_degrees(*lat), Coord::from_degrees(*lon)))
        .collect()
}

/// The shared world:
///
/// * nodes 1, 2: pubs inside the 50.7,7.1–50.8,7.2 box
/// * node 3: a cafe further north
/// * nodes 4, 5 + way 10: a primary road south of the box
/// * nodes 6–9 + way 11: a closed building square near 50.9, 7.3
/// * node 30: a fountain inside that square
/// * relation 20: multipolygon over way 11
/// * relation 21: route with node 1 (role stop) and way 10
/// * areas 11 and 20+offset: derived from way 11 / relation 20
pub fn world() -> MemStorage {
    let square = [
        (50.90, 7.30),
        (50.90, 7.31),
        (50.91, 7.31),
        (50.91, 7.30),
        (50.90, 7.30),
    ];

    let mut n1 = node(1, 50.72, 7.11, &[("amenity", "pub"), ("name", "Pub A")]);
    n1.meta = meta("alice", 100, "2024-02-01T00:00:00Z");
    let mut n2 = node(2, 50.74, 7.13, &[("amenity", "pub")]);
    n2.meta = meta("bob", 101, "2023-05-01T00:00:00Z");

    MemStorageBuilder::new()
        .timestamp("2024-06-01T00:00:00Z")
        .node(n1)
        .node(n2)
        .node(node(3, 51.0, 7.5, &[("amenity", "cafe")]))
        .node(node(4, 50.60, 7.05, &[]))
        .node(node(5, 50.61, 7.06, &[]))
        .node(node(6, square[0].0, square[0].1, &[]))
        .node(node(7, square[1].0, square[1].1, &[]))
        .node(node(8, square[2].0, square[2].1, &[]))
        .node(node(9, square[3].0, square[3].1, &[]))
        .node(node(30, 50.905, 7.305, &[("tourism", "fountain")]))
        .way(Way {
            id: 10,
            nodes: vec![4, 5],
            tags: tags(&[("highway", "primary")]),
            meta: meta("alice", 100, "2024-03-01T00:00:00Z"),
        })
        .way(Way {
            id: 11,
            nodes: vec![6, 7, 8, 9, 6],
            tags: tags(&[("building", "yes"), ("name", "Plaza")]),
            meta: None,
        })
        .relation(Relation {
            id: 20,
            members: vec![Member {
                kind: ObjectType::Way,
                id: 11,
                role: "outer".to_string(),
            }],
            tags: tags(&[("type", "multipolygon"), ("name", "Plaza District")]),
            meta: None,
        })
        .relation(Relation {
            id: 21,
            members: vec![
                Member {
                    kind: ObjectType::Node,
                    id: 1,
                    role: "stop".to_string(),
                },
                Member {
                    kind: ObjectType::Way,
                    id: 10,
                    role: String::new(),
                },
            ],
            tags: tags(&[("type", "route")]),
            meta: None,
        })
        .area(Area {
            id: 11,
            tags: tags(&[("building", "yes"), ("name", "Plaza")]),
            rings: vec![ring(&square)],
        })
        .area(Area {
            id: 20 + AREA_RELATION_OFFSET,
            tags: tags(&[("name", "Plaza District")]),
            rings: vec![ring(&square)],
        })
        .finish()
}

/// Runs a script against a storage, asserting a clean evaluation.
pub fn run_ok(storage: &MemStorage, source: &str) -> CollectingOutput {
    let mut out = CollectingOutput::new();
    let mut sink = ErrorSink::new();
    let ok = mapql_engine::run(source, storage, Settings::default(), &mut out, &mut sink);
    assert!(
        ok && !sink.has_errors(),
        "script {source:?} failed: {:?}",
        sink.diagnostics()
    );
    out
}

/// Ids of the output elements of one kind, in emission order.
pub fn ids_of(elements: &[OutElement], kind: &str) -> Vec<Id> {
    elements
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.id)
        .collect()
}
