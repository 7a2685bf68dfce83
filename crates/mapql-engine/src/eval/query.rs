//! Query evaluation: intersect the ids selected by each child clause,
//! restricted to the query's type, then filter by the predicate clauses.

use std::collections::BTreeSet;

use mapql_parser::stmt::{
    HasKv, KeyPredicate, ObjectType, Statement, StatementKind, ValuePredicate,
};

use crate::diagnostics::RuntimeError;
use crate::model::{Id, Meta, Tags};
use crate::rman::ResourceManager;
use crate::set::NamedSet;
use crate::storage::Storage;

use super::{recurse, spatial};

pub(crate) fn execute_query<S: Storage>(
    stmt: &Statement,
    rman: &mut ResourceManager<'_, S>,
    object: Option<ObjectType>,
    into: &str,
) -> Result<(), RuntimeError> {
    let classes = match object {
        Some(class) => vec![class],
        None => vec![
            ObjectType::Node,
            ObjectType::Way,
            ObjectType::Relation,
            ObjectType::Area,
        ],
    };

    let mut selectors = Vec::new();
    let mut predicates = Vec::new();
    for child in stmt.children() {
        if is_predicate(child) {
            predicates.push(child);
        } else {
            selectors.push(child);
        }
    }

    let mut result = NamedSet::new();
    for class in classes {
        let ids = candidate_ids(rman, &selectors, &predicates, class)?;
        rman.account(ids.len() as u64)?;
        for id in ids {
            push_if_matching(rman, &predicates, class, id, &mut result)?;
        }
    }
    rman.swap_set(into, result);
    Ok(())
}

fn is_predicate(stmt: &Statement) -> bool {
    matches!(
        stmt.kind(),
        StatementKind::HasKv(_)
            | StatementKind::Newer { .. }
            | StatementKind::Changed { .. }
            | StatementKind::User { .. }
    )
}

fn candidate_ids<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    selectors: &[&Statement],
    predicates: &[&Statement],
    class: ObjectType,
) -> Result<Vec<Id>, RuntimeError> {
    let mut candidates: Option<BTreeSet<Id>> = None;
    for selector in selectors {
        let ids = selector_ids(rman, selector, class)?;
        candidates = Some(match candidates {
            None => ids,
            Some(previous) => previous.intersection(&ids).copied().collect(),
        });
    }

    if rman.settings().implicit_global_bbox {
        if let Some(bbox) = rman.global_bbox() {
            let bbox_ids = spatial::bbox_class_ids(rman, &bbox, class)?;
            candidates = Some(match candidates {
                None => bbox_ids,
                Some(previous) => previous.intersection(&bbox_ids).copied().collect(),
            });
        }
    }

    if let Some(candidates) = candidates {
        return Ok(candidates.into_iter().collect());
    }

    // No set-producing clause: seed from the tag index when a predicate
    // permits it, else from the global bbox, else scan the whole class.
    if let Some(ids) = tag_index_seed(rman, predicates, class) {
        return Ok(ids);
    }
    if let Some(bbox) = rman.global_bbox() {
        return Ok(spatial::bbox_class_ids(rman, &bbox, class)?
            .into_iter()
            .collect());
    }
    let ids = match class {
        ObjectType::Node => rman.storage().node_ids(),
        ObjectType::Way => rman.storage().way_ids(),
        ObjectType::Relation => rman.storage().relation_ids(),
        ObjectType::Area => rman.storage().area_ids(),
    };
    rman.account(ids.len() as u64)?;
    Ok(ids)
}

/// The global tag index answers plain-key filters directly; the first
/// usable positive filter seeds the candidate set.
fn tag_index_seed<S: Storage>(
    rman: &ResourceManager<'_, S>,
    predicates: &[&Statement],
    class: ObjectType,
) -> Option<Vec<Id>> {
    for predicate in predicates {
        if let StatementKind::HasKv(h) = predicate.kind() {
            if h.negated || h.ignore_case {
                continue;
            }
            if let KeyPredicate::Equals(key) = &h.key {
                let ids = match &h.value {
                    ValuePredicate::Equals(value) => {
                        rman.storage().ids_with_tag(class, key, Some(value))
                    }
                    _ => rman.storage().ids_with_tag(class, key, None),
                };
                return Some(ids);
            }
        }
    }
    None
}

fn selector_ids<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    stmt: &Statement,
    class: ObjectType,
) -> Result<BTreeSet<Id>, RuntimeError> {
    match stmt.kind() {
        StatementKind::Item { set } => Ok(rman
            .set_clone(set)
            .ids(class.into())
            .into_iter()
            .collect()),
        StatementKind::IdQuery {
            object, id, ..
        } => Ok(if *object == class {
            BTreeSet::from([*id])
        } else {
            BTreeSet::new()
        }),
        StatementKind::BboxQuery { bbox, .. } => spatial::bbox_class_ids(rman, bbox, class),
        StatementKind::Around {
            from,
            radius,
            center,
            ..
        } => spatial::around_class_ids(rman, from, *radius, *center, class),
        StatementKind::PolygonQuery { points, .. } => {
            spatial::polygon_class_ids(rman, points, class)
        }
        StatementKind::AreaQuery { from, id, .. } => {
            spatial::area_class_ids(rman, from, *id, class)
        }
        StatementKind::Pivot { from, .. } => Ok(spatial::pivot_origins(rman, from)
            .into_iter()
            .filter(|(kind, _)| *kind == class)
            .map(|(_, id)| id)
            .collect()),
        StatementKind::Recurse {
            kind, from, role, ..
        } => {
            let input = rman.set_clone(from);
            let found = recurse::collect(rman, *kind, &input, role.as_deref())?;
            Ok(found.ids(class.into()).into_iter().collect())
        }
        _ => Ok(BTreeSet::new()),
    }
}

fn push_if_matching<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    predicates: &[&Statement],
    class: ObjectType,
    id: Id,
    result: &mut NamedSet,
) -> Result<(), RuntimeError> {
    match class {
        ObjectType::Node => {
            if let Some(node) = rman.storage().node(id) {
                if predicates_match(rman, predicates, &node.tags, node.meta.as_ref())? {
                    result.push_node(node);
                }
            }
        }
        ObjectType::Way => {
            if let Some(way) = rman.storage().way(id) {
                if predicates_match(rman, predicates, &way.tags, way.meta.as_ref())? {
                    result.push_way(way);
                }
            }
        }
        ObjectType::Relation => {
            if let Some(relation) = rman.storage().relation(id) {
                if predicates_match(rman, predicates, &relation.tags, relation.meta.as_ref())? {
                    result.push_relation(relation);
                }
            }
        }
        ObjectType::Area => {
            if let Some(area) = rman.storage().area(id) {
                if predicates_match(rman, predicates, &area.tags, None)? {
                    result.push_area(area);
                }
            }
        }
    }
    Ok(())
}

fn predicates_match<S: Storage>(
    rman: &ResourceManager<'_, S>,
    predicates: &[&Statement],
    tags: &Tags,
    meta: Option<&Meta>,
) -> Result<bool, RuntimeError> {
    for predicate in predicates {
        let ok = match predicate.kind() {
            StatementKind::HasKv(h) => has_kv_matches(h, tags),
            StatementKind::Newer { than } => {
                meta.is_some_and(|m| m.timestamp.as_str() >= than.as_str())
            }
            StatementKind::Changed { since, until, .. } => {
                let (since, until) = resolve_window(rman, since, until)?;
                meta.is_some_and(|m| {
                    m.timestamp.as_str() >= since.as_str()
                        && m.timestamp.as_str() <= until.as_str()
                })
            }
            StatementKind::User { names, uids, .. } => meta.is_some_and(|m| {
                uids.contains(&m.uid) || names.iter().any(|n| *n == m.user)
            }),
            _ => true,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// `changed:auto` borrows its window from the script's diff header.
fn resolve_window<S: Storage>(
    rman: &ResourceManager<'_, S>,
    since: &str,
    until: &str,
) -> Result<(String, String), RuntimeError> {
    if since != "auto" && until != "auto" {
        return Ok((since.to_string(), until.to_string()));
    }
    match rman.diff_window() {
        Some((from, to)) => Ok((
            if since == "auto" { from.clone() } else { since.to_string() },
            if until == "auto" { to.clone() } else { until.to_string() },
        )),
        None => Err(RuntimeError::Other(
            "\"changed\" without a timestamp is only allowed in diff mode".to_string(),
        )),
    }
}

/// The tag test at the heart of every query: does any tag pair satisfy
/// the key and value predicates? Negation inverts the whole test, so an
/// object without the key also satisfies `!=` and `!~`.
pub(crate) fn has_kv_matches(h: &HasKv, tags: &Tags) -> bool {
    let found = tags.iter().any(|(key, value)| {
        key_matches(h, key) && value_matches(h, value)
    });
    found != h.negated
}

fn key_matches(h: &HasKv, key: &str) -> bool {
    match &h.key {
        KeyPredicate::Equals(expected) => {
            if h.ignore_case {
                key.eq_ignore_ascii_case(expected)
            } else {
                key == expected
            }
        }
        KeyPredicate::Matches { re, .. } => re.is_match(key),
    }
}

fn value_matches(h: &HasKv, value: &str) -> bool {
    match &h.value {
        ValuePredicate::Any => true,
        ValuePredicate::Equals(expected) => {
            if h.ignore_case {
                value.eq_ignore_ascii_case(expected)
            } else {
                value == expected
            }
        }
        ValuePredicate::Matches { re, .. } => re.is_match(value),
    }
}

/// Standalone `user` statement: scan the class and keep matching owners.
pub(crate) fn execute_user<S: Storage>(
    rman: &mut ResourceManager<'_, S>,
    object: Option<ObjectType>,
    into: &str,
    names: &[String],
    uids: &[Id],
) -> Result<(), RuntimeError> {
    let classes = match object {
        Some(class) => vec![class],
        None => vec![ObjectType::Node, ObjectType::Way, ObjectType::Relation],
    };
    let mut result = NamedSet::new();
    for class in classes {
        let ids = match class {
            ObjectType::Node => rman.storage().node_ids(),
            ObjectType::Way => rman.storage().way_ids(),
            ObjectType::Relation => rman.storage().relation_ids(),
            ObjectType::Area => Vec::new(),
        };
        rman.account(ids.len() as u64)?;
        for id in ids {
            let matches = rman.storage().meta_of(class, id).is_some_and(|m| {
                uids.contains(&m.uid) || names.iter().any(|n| *n == m.user)
            });
            if !matches {
                continue;
            }
            match class {
                ObjectType::Node => {
                    if let Some(node) = rman.storage().node(id) {
                        result.push_node(node);
                    }
                }
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
                ObjectType::Area => {}
            }
        }
    }
    rman.swap_set(into, result);
    Ok(())
}
