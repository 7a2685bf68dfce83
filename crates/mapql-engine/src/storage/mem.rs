//! An in-memory snapshot implementing the storage contract.
//!
//! Objects are ingested in any order; `finish` sorts the primary vectors
//! and derives the tag, spatial, and reverse-reference indexes. This is
//! the fixture behind every evaluator test.

use std::collections::BTreeMap;

use mapql_parser::stmt::Bbox;

use crate::model::{Area, Coord, Id, Meta, Node, ObjectType, Relation, Tags, Way};
use crate::storage::{lat_cell, lon_cell, quadtile, quadtile_cells, Storage};

#[derive(Debug, Default)]
pub struct MemStorage {
    nodes: Vec<Node>,
    ways: Vec<Way>,
    relations: Vec<Relation>,
    areas: Vec<Area>,
    /// (class, key, value) → ids; the key-only entries use an empty value
    /// marker row per key via `key_index`.
    tag_index: BTreeMap<(ObjectType, String, String), Vec<Id>>,
    key_index: BTreeMap<(ObjectType, String), Vec<Id>>,
    spatial: BTreeMap<u32, Vec<Id>>,
    ways_by_node: BTreeMap<Id, Vec<Id>>,
    relations_by_member: BTreeMap<(ObjectType, Id), Vec<Id>>,
    timestamp: String,
}

#[derive(Debug, Default)]
pub struct MemStorageBuilder {
    storage: MemStorage,
}

impl MemStorageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamp(mut self, timestamp: &str) -> Self {
        self.storage.timestamp = timestamp.to_string();
        self
    }

    pub fn node(mut self, node: Node) -> Self {
        self.storage.nodes.push(node);
        self
    }

    pub fn way(mut self, way: Way) -> Self {
        self.storage.ways.push(way);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.storage.relations.push(relation);
        self
    }

    pub fn area(mut self, area: Area) -> Self {
        self.storage.areas.push(area);
        self
    }

    pub fn finish(mut self) -> MemStorage {
        let s = &mut self.storage;
        s.nodes.sort_by_key(|o| o.id);
        s.nodes.dedup_by_key(|o| o.id);
        s.ways.sort_by_key(|o| o.id);
        s.ways.dedup_by_key(|o| o.id);
        s.relations.sort_by_key(|o| o.id);
        s.relations.dedup_by_key(|o| o.id);
        s.areas.sort_by_key(|o| o.id);
        s.areas.dedup_by_key(|o| o.id);

        for node in &s.nodes {
            index_tags(
                &mut s.tag_index,
                &mut s.key_index,
                ObjectType::Node,
                node.id,
                &node.tags,
            );
            s.spatial
                .entry(quadtile(node.lat, node.lon))
                .or_default()
                .push(node.id);
        }
        for way in &s.ways {
            index_tags(
                &mut s.tag_index,
                &mut s.key_index,
                ObjectType::Way,
                way.id,
                &way.tags,
            );
            for node_id in &way.nodes {
                let entry = s.ways_by_node.entry(*node_id).or_default();
                if entry.last() != Some(&way.id) {
                    entry.push(way.id);
                }
            }
        }
        for relation in &s.relations {
            index_tags(
                &mut s.tag_index,
                &mut s.key_index,
                ObjectType::Relation,
                relation.id,
                &relation.tags,
            );
            for member in &relation.members {
                let entry = s
                    .relations_by_member
                    .entry((member.kind, member.id))
                    .or_default();
                if entry.last() != Some(&relation.id) {
                    entry.push(relation.id);
                }
            }
        }
        for area in &s.areas {
            index_tags(
                &mut s.tag_index,
                &mut s.key_index,
                ObjectType::Area,
                area.id,
                &area.tags,
            );
        }
        for ids in s.spatial.values_mut() {
            ids.sort_unstable();
        }

        self.storage
    }
}

fn index_tags(
    tag_index: &mut BTreeMap<(ObjectType, String, String), Vec<Id>>,
    key_index: &mut BTreeMap<(ObjectType, String), Vec<Id>>,
    class: ObjectType,
    id: Id,
    tags: &Tags,
) {
    for (key, value) in tags {
        tag_index
            .entry((class, key.clone(), value.clone()))
            .or_default()
            .push(id);
        key_index.entry((class, key.clone())).or_default().push(id);
    }
}

fn find<T>(items: &[T], id: Id, key: impl Fn(&T) -> Id) -> Option<&T> {
    items
        .binary_search_by_key(&id, key)
        .ok()
        .map(|pos| &items[pos])
}

impl Storage for MemStorage {
    fn node(&self, id: Id) -> Option<Node> {
        find(&self.nodes, id, |o| o.id).cloned()
    }

    fn way(&self, id: Id) -> Option<Way> {
        find(&self.ways, id, |o| o.id).cloned()
    }

    fn relation(&self, id: Id) -> Option<Relation> {
        find(&self.relations, id, |o| o.id).cloned()
    }

    fn area(&self, id: Id) -> Option<Area> {
        find(&self.areas, id, |o| o.id).cloned()
    }

    fn node_ids(&self) -> Vec<Id> {
        self.nodes.iter().map(|o| o.id).collect()
    }

    fn way_ids(&self) -> Vec<Id> {
        self.ways.iter().map(|o| o.id).collect()
    }

    fn relation_ids(&self) -> Vec<Id> {
        self.relations.iter().map(|o| o.id).collect()
    }

    fn area_ids(&self) -> Vec<Id> {
        self.areas.iter().map(|o| o.id).collect()
    }

    fn ids_with_tag(&self, class: ObjectType, key: &str, value: Option<&str>) -> Vec<Id> {
        let ids = match value {
            Some(value) => self
                .tag_index
                .get(&(class, key.to_string(), value.to_string())),
            None => self.key_index.get(&(class, key.to_string())),
        };
        ids.cloned().unwrap_or_default()
    }

    fn tags_of(&self, class: ObjectType, id: Id) -> Option<Tags> {
        match class {
            ObjectType::Node => find(&self.nodes, id, |o| o.id).map(|o| o.tags.clone()),
            ObjectType::Way => find(&self.ways, id, |o| o.id).map(|o| o.tags.clone()),
            ObjectType::Relation => find(&self.relations, id, |o| o.id).map(|o| o.tags.clone()),
            ObjectType::Area => find(&self.areas, id, |o| o.id).map(|o| o.tags.clone()),
        }
    }

    fn meta_of(&self, class: ObjectType, id: Id) -> Option<Meta> {
        match class {
            ObjectType::Node => find(&self.nodes, id, |o| o.id).and_then(|o| o.meta.clone()),
            ObjectType::Way => find(&self.ways, id, |o| o.id).and_then(|o| o.meta.clone()),
            ObjectType::Relation => {
                find(&self.relations, id, |o| o.id).and_then(|o| o.meta.clone())
            }
            ObjectType::Area => None,
        }
    }

    fn nodes_in_bbox(&self, bbox: &Bbox) -> Vec<Id> {
        let lat_min = lat_cell(Coord::from_degrees(bbox.south));
        let lat_max = lat_cell(Coord::from_degrees(bbox.north));
        let lon_min = lon_cell(Coord::from_degrees(bbox.west));
        let lon_max = lon_cell(Coord::from_degrees(bbox.east));

        let mut ids = Vec::new();
        for (code, tile_ids) in &self.spatial {
            let (lat_c, lon_c) = quadtile_cells(*code);
            if lat_c < lat_min || lat_c > lat_max || lon_c < lon_min || lon_c > lon_max {
                continue;
            }
            for id in tile_ids {
                // Tiles are coarser than the bbox; confirm per node.
                if let Some(node) = find(&self.nodes, *id, |o| o.id) {
                    if bbox.contains(node.lat.degrees(), node.lon.degrees()) {
                        ids.push(*id);
                    }
                }
            }
        }
        ids.sort_unstable();
        ids
    }

    fn ways_of_node(&self, id: Id) -> Vec<Id> {
        self.ways_by_node.get(&id).cloned().unwrap_or_default()
    }

    fn relations_of(&self, class: ObjectType, id: Id) -> Vec<Id> {
        self.relations_by_member
            .get(&(class, id))
            .cloned()
            .unwrap_or_default()
    }

    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Member;

    fn node(id: Id, lat: f64, lon: f64, tags: &[(&str, &str)]) -> Node {
        Node {
            id,
            lat: Coord::from_degrees(lat),
            lon: Coord::from_degrees(lon),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            meta: None,
        }
    }

    fn fixture() -> MemStorage {
        MemStorageBuilder::new()
            .timestamp("2024-06-01T00:00:00Z")
            .node(node(2, 50.75, 7.15, &[("amenity", "pub")]))
            .node(node(1, 50.70, 7.10, &[("amenity", "pub"), ("name", "A")]))
            .node(node(3, 51.50, 7.50, &[("amenity", "cafe")]))
            .way(Way {
                id: 10,
                nodes: vec![1, 2],
                tags: [("highway".to_string(), "primary".to_string())].into(),
                meta: None,
            })
            .relation(Relation {
                id: 20,
                members: vec![Member {
                    kind: ObjectType::Way,
                    id: 10,
                    role: "outer".to_string(),
                }],
                tags: Tags::new(),
                meta: None,
            })
            .finish()
    }

    #[test]
    fn lookups_are_by_id() {
        let s = fixture();
        assert_eq!(s.node(1).unwrap().tags["name"], "A");
        assert!(s.node(99).is_none());
        assert_eq!(s.node_ids(), vec![1, 2, 3]);
    }

    #[test]
    fn tag_index_filters_by_key_and_value() {
        let s = fixture();
        assert_eq!(
            s.ids_with_tag(ObjectType::Node, "amenity", Some("pub")),
            vec![1, 2]
        );
        assert_eq!(
            s.ids_with_tag(ObjectType::Node, "amenity", None),
            vec![1, 2, 3]
        );
        assert!(s.ids_with_tag(ObjectType::Way, "amenity", None).is_empty());
    }

    #[test]
    fn spatial_index_respects_the_bbox() {
        let s = fixture();
        let bbox = Bbox {
            south: 50.6,
            west: 7.0,
            north: 50.8,
            east: 7.2,
        };
        assert_eq!(s.nodes_in_bbox(&bbox), vec![1, 2]);
    }

    #[test]
    fn reverse_indexes_resolve_membership() {
        let s = fixture();
        assert_eq!(s.ways_of_node(1), vec![10]);
        assert_eq!(s.relations_of(ObjectType::Way, 10), vec![20]);
        assert!(s.relations_of(ObjectType::Node, 1).is_empty());
    }
}
