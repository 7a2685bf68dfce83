//! The object model: nodes, ways, relations, derived areas, and the
//! elements `make`/`convert` synthesize.

use std::collections::BTreeMap;

pub use mapql_parser::stmt::ObjectType;

/// Object identifiers are 64-bit and unsigned across all variants.
pub type Id = u64;

/// Tag set of one object, unique by key.
pub type Tags = BTreeMap<String, String>;

/// Areas derived from relations carry the relation id plus this offset,
/// so way- and relation-derived areas never collide.
pub const AREA_RELATION_OFFSET: Id = 2_400_000_000;

/// A geographic coordinate component, fixed-point at 1e-7 degree
/// resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord(i32);

impl Coord {
    pub fn from_degrees(degrees: f64) -> Self {
        Coord((degrees * 1e7).round() as i32)
    }

    pub fn degrees(self) -> f64 {
        f64::from(self.0) * 1e-7
    }

    pub fn raw(self) -> i32 {
        self.0
    }
}

/// Version and authorship metadata, present when the snapshot carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub version: u32,
    /// ISO-8601 UTC, e.g. `2024-01-01T00:00:00Z`. The format orders
    /// lexicographically, which the temporal filters rely on.
    pub timestamp: String,
    pub changeset: u64,
    pub uid: u64,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: Id,
    pub lat: Coord,
    pub lon: Coord,
    pub tags: Tags,
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: Id,
    /// Ordered node references; may repeat, first == last for closed ways.
    pub nodes: Vec<Id>,
    pub tags: Tags,
    pub meta: Option<Meta>,
}

impl Way {
    pub fn is_closed(&self) -> bool {
        self.nodes.len() >= 4 && self.nodes.first() == self.nodes.last()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub kind: ObjectType,
    pub id: Id,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: Id,
    /// Ordered, typed, role-carrying members.
    pub members: Vec<Member>,
    pub tags: Tags,
    pub meta: Option<Meta>,
}

/// A closed surface derived offline from a way or a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    pub id: Id,
    pub tags: Tags,
    /// Outer rings as closed coordinate loops.
    pub rings: Vec<Vec<(Coord, Coord)>>,
}

impl Area {
    /// The way or relation this area was derived from.
    pub fn origin(&self) -> (ObjectType, Id) {
        if self.id >= AREA_RELATION_OFFSET {
            (ObjectType::Relation, self.id - AREA_RELATION_OFFSET)
        } else {
            (ObjectType::Way, self.id)
        }
    }

    pub fn contains(&self, lat: Coord, lon: Coord) -> bool {
        self.rings
            .iter()
            .any(|ring| point_in_ring(ring, lat.degrees(), lon.degrees()))
    }

    /// The bounding rectangle of all rings, in degrees
    /// (south, west, north, east).
    pub fn bounding_box(&self) -> Option<(f64, f64, f64, f64)> {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for (lat, lon) in self.rings.iter().flatten() {
            let (lat, lon) = (lat.degrees(), lon.degrees());
            bounds = Some(match bounds {
                None => (lat, lon, lat, lon),
                Some((s, w, n, e)) => (s.min(lat), w.min(lon), n.max(lat), e.max(lon)),
            });
        }
        bounds
    }
}

/// An element produced by `make` or `convert`. Derived elements never
/// enter storage; they exist only inside named sets and output.
#[derive(Debug, Clone, PartialEq)]
pub struct Derived {
    pub id: Id,
    pub type_name: String,
    pub tags: Tags,
}

/// Ray-cast point-in-polygon test over one closed ring, in degrees.
pub(crate) fn point_in_ring(ring: &[(Coord, Coord)], lat: f64, lon: f64) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (lat_i, lon_i) = (ring[i].0.degrees(), ring[i].1.degrees());
        let (lat_j, lon_j) = (ring[j].0.degrees(), ring[j].1.degrees());
        if ((lat_i > lat) != (lat_j > lat))
            && lon < (lon_j - lon_i) * (lat - lat_i) / (lat_j - lat_i) + lon_i
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(points: &[(f64, f64)]) -> Vec<(Coord, Coord)> {
        points
            .iter()
            .map(|(lat, lon)| (Coord::from_degrees(*lat), Coord::from_degrees(*lon)))
            .collect()
    }

    #[test]
    fn coords_are_fixed_point() {
        let c = Coord::from_degrees(50.7234567);
        assert_eq!(c.raw(), 507_234_567);
        assert!((c.degrees() - 50.7234567).abs() < 1e-9);
    }

    #[test]
    fn area_origin_distinguishes_ways_and_relations() {
        let from_way = Area {
            id: 42,
            tags: Tags::new(),
            rings: Vec::new(),
        };
        assert_eq!(from_way.origin(), (ObjectType::Way, 42));
        let from_relation = Area {
            id: AREA_RELATION_OFFSET + 42,
            tags: Tags::new(),
            rings: Vec::new(),
        };
        assert_eq!(from_relation.origin(), (ObjectType::Relation, 42));
    }

    #[test]
    fn point_in_ring_detects_containment() {
        let square = ring(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
        assert!(point_in_ring(&square, 0.5, 0.5));
        assert!(!point_in_ring(&square, 1.5, 0.5));
        assert!(!point_in_ring(&square, -0.5, 0.5));
    }
}
