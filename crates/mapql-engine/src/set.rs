//! Named sets: the values flowing between statements.
//!
//! A set is partitioned by object variant; within each partition objects
//! are unique by id and kept in ascending id order. All set algebra
//! preserves that invariant.

use std::collections::BTreeMap;

use crate::model::{Area, Derived, Id, Node, ObjectType, Relation, Way};

/// The partition an object lives in, in iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SetClass {
    Node,
    Way,
    Relation,
    Area,
    Derived,
}

impl SetClass {
    pub fn name(self) -> &'static str {
        match self {
            SetClass::Node => "node",
            SetClass::Way => "way",
            SetClass::Relation => "relation",
            SetClass::Area => "area",
            SetClass::Derived => "derived",
        }
    }
}

impl From<ObjectType> for SetClass {
    fn from(t: ObjectType) -> Self {
        match t {
            ObjectType::Node => SetClass::Node,
            ObjectType::Way => SetClass::Way,
            ObjectType::Relation => SetClass::Relation,
            ObjectType::Area => SetClass::Area,
        }
    }
}

/// Whether an object appeared or disappeared across a temporal diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffAction {
    Added,
    Deleted,
}

/// Anything stored in a set partition has an id to dedup and sort by.
pub trait HasId {
    fn id(&self) -> Id;
}

impl HasId for Node {
    fn id(&self) -> Id {
        self.id
    }
}
impl HasId for Way {
    fn id(&self) -> Id {
        self.id
    }
}
impl HasId for Relation {
    fn id(&self) -> Id {
        self.id
    }
}
impl HasId for Area {
    fn id(&self) -> Id {
        self.id
    }
}
impl HasId for Derived {
    fn id(&self) -> Id {
        self.id
    }
}

/// An environment-scoped container of map objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedSet {
    pub nodes: Vec<Node>,
    pub ways: Vec<Way>,
    pub relations: Vec<Relation>,
    pub areas: Vec<Area>,
    pub derived: Vec<Derived>,
    diff: BTreeMap<(SetClass, Id), DiffAction>,
}

impl NamedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.ways.is_empty()
            && self.relations.is_empty()
            && self.areas.is_empty()
            && self.derived.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
            + self.ways.len()
            + self.relations.len()
            + self.areas.len()
            + self.derived.len()
    }

    pub fn push_node(&mut self, node: Node) {
        insert_sorted(&mut self.nodes, node);
    }

    pub fn push_way(&mut self, way: Way) {
        insert_sorted(&mut self.ways, way);
    }

    pub fn push_relation(&mut self, relation: Relation) {
        insert_sorted(&mut self.relations, relation);
    }

    pub fn push_area(&mut self, area: Area) {
        insert_sorted(&mut self.areas, area);
    }

    pub fn push_derived(&mut self, derived: Derived) {
        insert_sorted(&mut self.derived, derived);
    }

    /// Marks one object with a diff action.
    pub fn mark(&mut self, class: SetClass, id: Id, action: DiffAction) {
        self.diff.insert((class, id), action);
    }

    pub fn diff_of(&self, class: SetClass, id: Id) -> Option<DiffAction> {
        self.diff.get(&(class, id)).copied()
    }

    /// Merges `other` into `self`, per partition, dedup by id.
    pub fn union_with(&mut self, other: &NamedSet) {
        self.nodes = union_sorted(&self.nodes, &other.nodes);
        self.ways = union_sorted(&self.ways, &other.ways);
        self.relations = union_sorted(&self.relations, &other.relations);
        self.areas = union_sorted(&self.areas, &other.areas);
        self.derived = union_sorted(&self.derived, &other.derived);
        for (key, action) in &other.diff {
            self.diff.insert(*key, *action);
        }
    }

    /// Removes every object of `other` from `self`, by (variant, id).
    pub fn difference_with(&mut self, other: &NamedSet) {
        self.nodes = difference_sorted(&self.nodes, &other.nodes);
        self.ways = difference_sorted(&self.ways, &other.ways);
        self.relations = difference_sorted(&self.relations, &other.relations);
        self.areas = difference_sorted(&self.areas, &other.areas);
        self.derived = difference_sorted(&self.derived, &other.derived);
    }

    /// Ids per partition, for clause intersection.
    pub fn ids(&self, class: SetClass) -> Vec<Id> {
        match class {
            SetClass::Node => self.nodes.iter().map(|o| o.id).collect(),
            SetClass::Way => self.ways.iter().map(|o| o.id).collect(),
            SetClass::Relation => self.relations.iter().map(|o| o.id).collect(),
            SetClass::Area => self.areas.iter().map(|o| o.id).collect(),
            SetClass::Derived => self.derived.iter().map(|o| o.id).collect(),
        }
    }
}

fn insert_sorted<T: HasId>(items: &mut Vec<T>, item: T) {
    match items.binary_search_by_key(&item.id(), HasId::id) {
        Ok(_) => {}
        Err(pos) => items.insert(pos, item),
    }
}

fn union_sorted<T: HasId + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].id().cmp(&b[j].id()) {
            std::cmp::Ordering::Less => {
                out.push(a[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    out.extend(a[i..].iter().cloned());
    out.extend(b[j..].iter().cloned());
    out
}

fn difference_sorted<T: HasId + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len());
    let mut j = 0;
    for item in a {
        while j < b.len() && b[j].id() < item.id() {
            j += 1;
        }
        if j >= b.len() || b[j].id() != item.id() {
            out.push(item.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tags;

    fn node(id: Id) -> Node {
        Node {
            id,
            lat: crate::model::Coord::from_degrees(0.0),
            lon: crate::model::Coord::from_degrees(0.0),
            tags: Tags::new(),
            meta: None,
        }
    }

    fn set_of(ids: &[Id]) -> NamedSet {
        let mut set = NamedSet::new();
        for id in ids {
            set.push_node(node(*id));
        }
        set
    }

    #[test]
    fn insertion_keeps_ascending_unique_ids() {
        let set = set_of(&[3, 1, 2, 3, 1]);
        let ids = set.ids(SetClass::Node);
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn union_is_commutative_and_idempotent() {
        let a = set_of(&[1, 3, 5]);
        let b = set_of(&[2, 3, 4]);

        let mut ab = a.clone();
        ab.union_with(&b);
        let mut ba = b.clone();
        ba.union_with(&a);
        assert_eq!(ab, ba);

        let mut aa = a.clone();
        aa.union_with(&a);
        assert_eq!(aa, a);
    }

    #[test]
    fn difference_with_itself_is_empty() {
        let a = set_of(&[1, 2, 3]);
        let mut d = a.clone();
        d.difference_with(&a);
        assert!(d.is_empty());
    }

    #[test]
    fn difference_respects_variants() {
        let mut a = set_of(&[1]);
        a.push_way(Way {
            id: 1,
            nodes: vec![1, 2],
            tags: Tags::new(),
            meta: None,
        });
        // Removing node 1 leaves way 1 untouched.
        let b = set_of(&[1]);
        a.difference_with(&b);
        assert!(a.nodes.is_empty());
        assert_eq!(a.ways.len(), 1);
    }

    #[test]
    fn diff_markers_are_tracked_per_object() {
        let mut a = set_of(&[1]);
        a.mark(SetClass::Node, 1, DiffAction::Added);
        assert_eq!(a.diff_of(SetClass::Node, 1), Some(DiffAction::Added));
        assert_eq!(a.diff_of(SetClass::Node, 2), None);
    }
}
