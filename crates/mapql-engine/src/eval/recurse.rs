//! The eleven recurse kinds: single-step traversals between variants,
//! and the transitive `down`/`up` closures.

use std::collections::BTreeSet;

use mapql_parser::stmt::{ObjectType, RecurseKind};

use crate::diagnostics::RuntimeError;
use crate::model::Id;
use crate::rman::ResourceManager;
use crate::set::NamedSet;
use crate::storage::Storage;

pub(crate) fn execute_recurse<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    kind: RecurseKind,
    from: &str,
    into: &str,
    role: Option<&str>,
) -> Result<(), RuntimeError> {
    let input = rman.set_clone(from);
    let result = collect(rman, kind, &input, role)?;
    rman.swap_set(into, result);
    Ok(())
}

/// Computes the objects reachable from `input` along `kind`.
///
/// The single-step kinds emit targets only; the transitive arrows emit
/// the closure including the seed objects.
pub(crate) fn collect<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    kind: RecurseKind,
    input: &NamedSet,
    role: Option<&str>,
) -> Result<NamedSet, RuntimeError> {
    let mut out = NamedSet::new();
    match kind {
        RecurseKind::RelationNode => {
            for id in member_ids(input, ObjectType::Node, role) {
                if let Some(node) = rman.storage().node(id) {
                    out.push_node(node);
                }
            }
        }
        RecurseKind::RelationWay => {
            for id in member_ids(input, ObjectType::Way, role) {
                if let Some(way) = rman.storage().way(id) {
                    out.push_way(way);
                }
            }
        }
        RecurseKind::RelationRelation => {
            for id in member_ids(input, ObjectType::Relation, role) {
                if let Some(relation) = rman.storage().relation(id) {
                    out.push_relation(relation);
                }
            }
        }
        RecurseKind::WayNode => {
            for way in &input.ways {
                for id in &way.nodes {
                    if let Some(node) = rman.storage().node(*id) {
                        out.push_node(node);
                    }
                }
            }
        }
        RecurseKind::NodeWay => {
            let mut ids = BTreeSet::new();
            for node in &input.nodes {
                ids.extend(rman.storage().ways_of_node(node.id));
            }
            for id in ids {
                if let Some(way) = rman.storage().way(id) {
                    out.push_way(way);
                }
            }
        }
        RecurseKind::NodeRelation => {
            backward_relations(rman, &mut out, input.ids(ObjectType::Node.into()), ObjectType::Node, role);
        }
        RecurseKind::WayRelation => {
            backward_relations(rman, &mut out, input.ids(ObjectType::Way.into()), ObjectType::Way, role);
        }
        RecurseKind::RelationBackwards => {
            backward_relations(
                rman,
                &mut out,
                input.ids(ObjectType::Relation.into()),
                ObjectType::Relation,
                role,
            );
        }
        RecurseKind::Down => down(rman, input, &mut out, false),
        RecurseKind::DownRel => down(rman, input, &mut out, true),
        RecurseKind::Up => up(rman, input, &mut out, false),
        RecurseKind::UpRel => up(rman, input, &mut out, true),
    }
    rman.account(out.len() as u64)?;
    Ok(out)
}

/// Member ids of the input relations with the requested member type,
/// honoring the role restriction.
fn member_ids(input: &NamedSet, kind: ObjectType, role: Option<&str>) -> BTreeSet<Id> {
    let mut ids = BTreeSet::new();
    for relation in &input.relations {
        for member in &relation.members {
            if member.kind == kind && role.map_or(true, |r| member.role == r) {
                ids.insert(member.id);
            }
        }
    }
    ids
}

/// Relations referencing any of `ids` as a member of class `kind`.
fn backward_relations<S: Storage>(
    rman: &ResourceManager<'_, S>,
    out: &mut NamedSet,
    ids: Vec<Id>,
    kind: ObjectType,
    role: Option<&str>,
) {
    let mut found = BTreeSet::new();
    for id in &ids {
        found.extend(rman.storage().relations_of(kind, *id));
    }
    for relation_id in found {
        if let Some(relation) = rman.storage().relation(relation_id) {
            let role_ok = role.map_or(true, |r| {
                relation
                    .members
                    .iter()
                    .any(|m| m.kind == kind && m.role == r && ids.contains(&m.id))
            });
            if role_ok {
                out.push_relation(relation);
            }
        }
    }
}

/// Members of the input relations plus all nodes of every way involved;
/// `through_relations` additionally descends into member relations.
fn down<S: Storage>(
    rman: &ResourceManager<'_, S>,
    input: &NamedSet,
    out: &mut NamedSet,
    through_relations: bool,
) {
    out.union_with(input);

    let mut queue: Vec<Id> = input.relations.iter().map(|r| r.id).collect();
    let mut visited: BTreeSet<Id> = queue.iter().copied().collect();
    while let Some(relation_id) = queue.pop() {
        let Some(relation) = rman.storage().relation(relation_id) else {
            continue;
        };
        for member in &relation.members {
            match member.kind {
                ObjectType::Node => {
                    if let Some(node) = rman.storage().node(member.id) {
                        out.push_node(node);
                    }
                }
                ObjectType::Way => {
                    if let Some(way) = rman.storage().way(member.id) {
                        out.push_way(way);
                    }
                }
                ObjectType::Relation if through_relations => {
                    if visited.insert(member.id) {
                        if let Some(sub) = rman.storage().relation(member.id) {
                            out.push_relation(sub);
                            queue.push(member.id);
                        }
                    }
                }
                ObjectType::Relation | ObjectType::Area => {}
            }
        }
    }

    let way_node_ids: Vec<Id> = out.ways.iter().flat_map(|w| w.nodes.clone()).collect();
    for id in way_node_ids {
        if let Some(node) = rman.storage().node(id) {
            out.push_node(node);
        }
    }
}

/// Ways containing input nodes and relations referencing any input
/// object; `through_relations` chases parent relations to a fixpoint.
fn up<S: Storage>(
    rman: &ResourceManager<'_, S>,
    input: &NamedSet,
    out: &mut NamedSet,
    through_relations: bool,
) {
    out.union_with(input);

    let mut way_ids = BTreeSet::new();
    for node in &input.nodes {
        way_ids.extend(rman.storage().ways_of_node(node.id));
    }
    for id in &way_ids {
        if let Some(way) = rman.storage().way(*id) {
            out.push_way(way);
        }
    }

    let mut relation_ids = BTreeSet::new();
    for node in &input.nodes {
        relation_ids.extend(rman.storage().relations_of(ObjectType::Node, node.id));
    }
    for way in &input.ways {
        relation_ids.extend(rman.storage().relations_of(ObjectType::Way, way.id));
    }
    for id in &way_ids {
        relation_ids.extend(rman.storage().relations_of(ObjectType::Way, *id));
    }
    for relation in &input.relations {
        relation_ids.extend(rman.storage().relations_of(ObjectType::Relation, relation.id));
    }

    let mut frontier: Vec<Id> = relation_ids.iter().copied().collect();
    while let Some(id) = frontier.pop() {
        if let Some(relation) = rman.storage().relation(id) {
            out.push_relation(relation);
        }
        if through_relations {
            for parent in rman.storage().relations_of(ObjectType::Relation, id) {
                if relation_ids.insert(parent) {
                    frontier.push(parent);
                }
            }
        }
    }
}
