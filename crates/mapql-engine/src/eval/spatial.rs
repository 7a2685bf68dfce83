//! Geometry-driven statements: bbox, around, polygon, area containment,
//! coordinate lookup, and the area/object pivot pair.

use std::collections::BTreeSet;

use mapql_parser::stmt::{Bbox, ObjectType};

use crate::diagnostics::RuntimeError;
use crate::model::{point_in_ring, Area, Coord, Id, AREA_RELATION_OFFSET};
use crate::rman::ResourceManager;
use crate::set::NamedSet;
use crate::storage::Storage;

const EARTH_RADIUS_M: f64 = 6_371_000.8;
/// Metres per degree of latitude, for bbox prefetching.
const M_PER_DEGREE: f64 = 111_320.0;

/// Great-circle distance between two coordinates, in metres.
pub(crate) fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// A rectangle guaranteed to contain the circle of `radius` metres
/// around the point.
fn circle_bbox(lat: f64, lon: f64, radius: f64) -> Bbox {
    let d_lat = radius / M_PER_DEGREE;
    let d_lon = radius / (M_PER_DEGREE * lat.to_radians().cos().abs().max(0.01));
    Bbox {
        south: lat - d_lat,
        west: lon - d_lon,
        north: lat + d_lat,
        east: lon + d_lon,
    }
}

fn bbox_of_points(points: &[(f64, f64)]) -> Option<Bbox> {
    let mut bounds: Option<Bbox> = None;
    for (lat, lon) in points {
        bounds = Some(match bounds {
            None => Bbox {
                south: *lat,
                west: *lon,
                north: *lat,
                east: *lon,
            },
            Some(b) => Bbox {
                south: b.south.min(*lat),
                west: b.west.min(*lon),
                north: b.north.max(*lat),
                east: b.east.max(*lon),
            },
        });
    }
    bounds
}

/// Ids of `class` objects touching the rectangle: nodes directly, ways
/// and relations through their members.
pub(crate) fn bbox_class_ids<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    bbox: &Bbox,
    class: ObjectType,
) -> Result<BTreeSet<Id>, RuntimeError> {
    let nodes: Vec<Id> = rman.storage().nodes_in_bbox(bbox);
    rman.account(nodes.len() as u64)?;
    expand_nodes_to_class(rman, nodes, class)
}

fn expand_nodes_to_class<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    nodes: Vec<Id>,
    class: ObjectType,
) -> Result<BTreeSet<Id>, RuntimeError> {
    match class {
        ObjectType::Node => Ok(nodes.into_iter().collect()),
        ObjectType::Way => {
            let mut ways = BTreeSet::new();
            for node in &nodes {
                ways.extend(rman.storage().ways_of_node(*node));
            }
            rman.account(ways.len() as u64)?;
            Ok(ways)
        }
        ObjectType::Relation => {
            let mut ways = BTreeSet::new();
            let mut relations = BTreeSet::new();
            for node in &nodes {
                ways.extend(rman.storage().ways_of_node(*node));
                relations.extend(rman.storage().relations_of(ObjectType::Node, *node));
            }
            for way in &ways {
                relations.extend(rman.storage().relations_of(ObjectType::Way, *way));
            }
            rman.account(relations.len() as u64)?;
            Ok(relations)
        }
        ObjectType::Area => Ok(BTreeSet::new()),
    }
}

/// Seed coordinates of an `around` filter: the explicit center, or every
/// node position of the input set, ways included.
fn around_seeds<S: Storage>(
    rman: &ResourceManager<'_, S>,
    from: &str,
    center: Option<(f64, f64)>,
) -> Vec<(f64, f64)> {
    if let Some(center) = center {
        return vec![center];
    }
    let input = rman.set_clone(from);
    let mut seeds = Vec::new();
    for node in &input.nodes {
        seeds.push((node.lat.degrees(), node.lon.degrees()));
    }
    for way in &input.ways {
        for id in &way.nodes {
            if let Some(node) = rman.storage().node(*id) {
                seeds.push((node.lat.degrees(), node.lon.degrees()));
            }
        }
    }
    seeds
}

fn nodes_around<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    seeds: &[(f64, f64)],
    radius: f64,
) -> Result<BTreeSet<Id>, RuntimeError> {
    let mut matched = BTreeSet::new();
    for (lat, lon) in seeds {
        let prefetch = circle_bbox(*lat, *lon, radius);
        let candidates = rman.storage().nodes_in_bbox(&prefetch);
        rman.account(candidates.len() as u64)?;
        for id in candidates {
            if let Some(node) = rman.storage().node(id) {
                if haversine_m(*lat, *lon, node.lat.degrees(), node.lon.degrees()) <= radius {
                    matched.insert(id);
                }
            }
        }
    }
    Ok(matched)
}

pub(crate) fn around_class_ids<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    from: &str,
    radius: f64,
    center: Option<(f64, f64)>,
    class: ObjectType,
) -> Result<BTreeSet<Id>, RuntimeError> {
    let seeds = around_seeds(rman, from, center);
    let nodes = nodes_around(rman, &seeds, radius)?;
    expand_nodes_to_class(rman, nodes.into_iter().collect(), class)
}

pub(crate) fn polygon_class_ids<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    points: &[(f64, f64)],
    class: ObjectType,
) -> Result<BTreeSet<Id>, RuntimeError> {
    let ring: Vec<(Coord, Coord)> = points
        .iter()
        .map(|(lat, lon)| (Coord::from_degrees(*lat), Coord::from_degrees(*lon)))
        .collect();
    let Some(prefetch) = bbox_of_points(points) else {
        return Ok(BTreeSet::new());
    };
    let candidates = rman.storage().nodes_in_bbox(&prefetch);
    rman.account(candidates.len() as u64)?;
    let mut nodes = Vec::new();
    for id in candidates {
        if let Some(node) = rman.storage().node(id) {
            if point_in_ring(&ring, node.lat.degrees(), node.lon.degrees()) {
                nodes.push(id);
            }
        }
    }
    expand_nodes_to_class(rman, nodes, class)
}

/// Resolves the areas an area filter refers to: an explicit id, or the
/// areas of the input set.
fn resolve_areas<S: Storage>(
    rman: &ResourceManager<'_, S>,
    from: &str,
    id: Option<Id>,
) -> Vec<Area> {
    match id {
        Some(id) => rman.storage().area(id).into_iter().collect(),
        None => rman.set_clone(from).areas,
    }
}

pub(crate) fn area_class_ids<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    from: &str,
    id: Option<Id>,
    class: ObjectType,
) -> Result<BTreeSet<Id>, RuntimeError> {
    let areas = resolve_areas(rman, from, id);
    let mut nodes = BTreeSet::new();
    for area in &areas {
        let Some((south, west, north, east)) = area.bounding_box() else {
            continue;
        };
        let prefetch = Bbox {
            south,
            west,
            north,
            east,
        };
        let candidates = rman.storage().nodes_in_bbox(&prefetch);
        rman.account(candidates.len() as u64)?;
        for node_id in candidates {
            if let Some(node) = rman.storage().node(node_id) {
                if area.contains(node.lat, node.lon) {
                    nodes.insert(node_id);
                }
            }
        }
    }
    expand_nodes_to_class(rman, nodes.into_iter().collect(), class)
}

/// The way/relation ids the areas of a set were derived from.
pub(crate) fn pivot_origins<S: Storage>(
    rman: &ResourceManager<'_, S>,
    from: &str,
) -> Vec<(ObjectType, Id)> {
    rman.set_clone(from)
        .areas
        .iter()
        .map(Area::origin)
        .collect()
}

pub(crate) fn execute_bbox<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    bbox: &Bbox,
    into: &str,
) -> Result<(), RuntimeError> {
    let ids = rman.storage().nodes_in_bbox(bbox);
    rman.account(ids.len() as u64)?;
    let mut result = NamedSet::new();
    for id in ids {
        if let Some(node) = rman.storage().node(id) {
            result.push_node(node);
        }
    }
    rman.swap_set(into, result);
    Ok(())
}

pub(crate) fn execute_around<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    from: &str,
    into: &str,
    radius: f64,
    center: Option<(f64, f64)>,
) -> Result<(), RuntimeError> {
    let seeds = around_seeds(rman, from, center);
    let ids = nodes_around(rman, &seeds, radius)?;
    let mut result = NamedSet::new();
    for id in ids {
        if let Some(node) = rman.storage().node(id) {
            result.push_node(node);
        }
    }
    rman.swap_set(into, result);
    Ok(())
}

pub(crate) fn execute_polygon<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    points: &[(f64, f64)],
    into: &str,
) -> Result<(), RuntimeError> {
    let ids = polygon_class_ids(rman, points, ObjectType::Node)?;
    let mut result = NamedSet::new();
    for id in ids {
        if let Some(node) = rman.storage().node(id) {
            result.push_node(node);
        }
    }
    rman.swap_set(into, result);
    Ok(())
}

pub(crate) fn execute_area_query<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    from: &str,
    into: &str,
    id: Option<Id>,
) -> Result<(), RuntimeError> {
    let ids = area_class_ids(rman, from, id, ObjectType::Node)?;
    let mut result = NamedSet::new();
    for node_id in ids {
        if let Some(node) = rman.storage().node(node_id) {
            result.push_node(node);
        }
    }
    rman.swap_set(into, result);
    Ok(())
}

/// `is_in`: the areas containing the given point, or any node of the
/// input set.
pub(crate) fn execute_coord_query<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    from: &str,
    into: &str,
    point: Option<(f64, f64)>,
) -> Result<(), RuntimeError> {
    let points: Vec<(f64, f64)> = match point {
        Some(p) => vec![p],
        None => rman
            .set_clone(from)
            .nodes
            .iter()
            .map(|n| (n.lat.degrees(), n.lon.degrees()))
            .collect(),
    };

    let area_ids = rman.storage().area_ids();
    rman.account(area_ids.len() as u64)?;
    let mut result = NamedSet::new();
    for id in area_ids {
        let Some(area) = rman.storage().area(id) else {
            continue;
        };
        let hit = points.iter().any(|(lat, lon)| {
            area.contains(Coord::from_degrees(*lat), Coord::from_degrees(*lon))
        });
        if hit {
            result.push_area(area);
        }
    }
    rman.swap_set(into, result);
    Ok(())
}

/// Maps ways and relations of the input set to the areas derived from
/// them, when those areas exist in the area store.
pub(crate) fn execute_map_to_area<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    from: &str,
    into: &str,
) -> Result<(), RuntimeError> {
    let input = rman.set_clone(from);
    rman.account(input.len() as u64)?;
    let mut result = NamedSet::new();
    for way in &input.ways {
        if let Some(area) = rman.storage().area(way.id) {
            result.push_area(area);
        }
    }
    for relation in &input.relations {
        if let Some(area) = rman.storage().area(relation.id + AREA_RELATION_OFFSET) {
            result.push_area(area);
        }
    }
    rman.swap_set(into, result);
    Ok(())
}

/// The inverse of `map_to_area`: back from areas to their origin way or
/// relation.
pub(crate) fn execute_pivot<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    from: &str,
    into: &str,
) -> Result<(), RuntimeError> {
    let origins = pivot_origins(rman, from);
    rman.account(origins.len() as u64)?;
    let mut result = NamedSet::new();
    for (kind, id) in origins {
        match kind {
            ObjectType::Way => {
                if let Some(way) = rman.storage().way(id) {
                    result.push_way(way);
                }
            }
            ObjectType::Relation => {
                if let Some(relation) = rman.storage().relation(id) {
                    result.push_relation(relation);
                }
            }
            ObjectType::Node | ObjectType::Area => {}
        }
    }
    rman.swap_set(into, result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_matches_known_distances() {
        // Bonn cathedral to Bonn station is roughly 600 m.
        let d = haversine_m(50.7336, 7.1022, 50.7323, 7.0964);
        assert!((350.0..900.0).contains(&d), "distance was {d}");
        assert_eq!(haversine_m(50.0, 7.0, 50.0, 7.0), 0.0);
    }

    #[test]
    fn circle_bbox_contains_the_circle() {
        let b = circle_bbox(50.0, 7.0, 1000.0);
        assert!(b.south < 50.0 && b.north > 50.0);
        assert!(haversine_m(50.0, 7.0, b.north, 7.0) >= 1000.0);
    }
}
