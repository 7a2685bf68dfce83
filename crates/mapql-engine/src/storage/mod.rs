//! The storage backend contract.
//!
//! The evaluator talks to snapshot storage exclusively through this
//! trait: per-variant id lookup, ascending full scans, global and local
//! tag indexes, a quadtile spatial index, reverse-reference indexes, and
//! the area store. Everything is read-only; iteration is ascending by
//! primary key.

mod mem;

pub use mem::{MemStorage, MemStorageBuilder};

use mapql_parser::stmt::Bbox;

use crate::model::{Area, Coord, Id, Meta, Node, ObjectType, Relation, Tags, Way};

pub trait Storage {
    fn node(&self, id: Id) -> Option<Node>;
    fn way(&self, id: Id) -> Option<Way>;
    fn relation(&self, id: Id) -> Option<Relation>;
    fn area(&self, id: Id) -> Option<Area>;

    /// Full scans, ascending by id.
    fn node_ids(&self) -> Vec<Id>;
    fn way_ids(&self) -> Vec<Id>;
    fn relation_ids(&self) -> Vec<Id>;
    fn area_ids(&self) -> Vec<Id>;

    /// Global tag index: ids of `class` objects carrying `key`, further
    /// restricted to an exact value when `value` is given. Ascending.
    fn ids_with_tag(&self, class: ObjectType, key: &str, value: Option<&str>) -> Vec<Id>;

    /// Local tag index.
    fn tags_of(&self, class: ObjectType, id: Id) -> Option<Tags>;

    fn meta_of(&self, class: ObjectType, id: Id) -> Option<Meta>;

    /// Spatial index: ids of nodes inside the rectangle, ascending.
    fn nodes_in_bbox(&self, bbox: &Bbox) -> Vec<Id>;

    /// Reverse reference index: ways containing the node.
    fn ways_of_node(&self, id: Id) -> Vec<Id>;

    /// Reverse reference index: relations with a member of this class/id.
    fn relations_of(&self, class: ObjectType, id: Id) -> Vec<Id>;

    /// The snapshot version timestamp.
    fn timestamp(&self) -> &str;
}

/// Number of bit levels in a quadtile code.
const QUAD_LEVELS: u32 = 16;

/// Encodes a coordinate pair as a quadtile code: the cell indexes of a
/// 2^16 × 2^16 grid over the whole globe, bit-interleaved so that nearby
/// tiles share prefixes.
pub fn quadtile(lat: Coord, lon: Coord) -> u32 {
    let lat_cell = cell(lat.raw() as i64 + 900_000_000, 1_800_000_000);
    let lon_cell = cell(lon.raw() as i64 + 1_800_000_000, 3_600_000_000);
    interleave(lat_cell, lon_cell)
}

/// Splits a quadtile code back into its (lat, lon) cell indexes.
pub(crate) fn quadtile_cells(code: u32) -> (u16, u16) {
    let mut lat = 0u16;
    let mut lon = 0u16;
    for i in 0..QUAD_LEVELS {
        lat |= (((code >> (2 * i + 1)) & 1) as u16) << i;
        lon |= (((code >> (2 * i)) & 1) as u16) << i;
    }
    (lat, lon)
}

pub(crate) fn lat_cell(lat: Coord) -> u16 {
    cell(lat.raw() as i64 + 900_000_000, 1_800_000_000)
}

pub(crate) fn lon_cell(lon: Coord) -> u16 {
    cell(lon.raw() as i64 + 1_800_000_000, 3_600_000_000)
}

fn cell(offset: i64, range: i64) -> u16 {
    let clamped = offset.clamp(0, range);
    ((clamped * ((1 << QUAD_LEVELS) - 1)) / range) as u16
}

fn interleave(lat: u16, lon: u16) -> u32 {
    let mut code = 0u32;
    for i in 0..QUAD_LEVELS {
        code |= (((lat >> i) & 1) as u32) << (2 * i + 1);
        code |= (((lon >> i) & 1) as u32) << (2 * i);
    }
    code
}
