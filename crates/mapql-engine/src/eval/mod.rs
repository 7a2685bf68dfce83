//! Per-statement execution rules.
//!
//! Every set-producing statement writes its `into` set (default `_`) in
//! the resource manager's environment. Dispatch is an exhaustive match
//! over the statement kind; statements that are pure predicates
//! (`has-kv`, `newer`, `changed`) or only meaningful inside `make` /
//! `convert` are no-ops at the top level.

pub(crate) mod query;
pub(crate) mod recurse;
pub(crate) mod spatial;
pub(crate) mod tags;

use mapql_parser::stmt::{Statement, StatementKind};

use crate::diagnostics::RuntimeError;
use crate::output::{execute_print, OutputHandler};
use crate::rman::ResourceManager;
use crate::set::NamedSet;
use crate::storage::Storage;

/// Evaluation interface of one statement node.
pub trait Evaluate {
    fn execute<S: Storage>(
        &self,
        rman: &mut ResourceManager<'_, S>,
        out: &mut dyn OutputHandler,
    ) -> Result<(), RuntimeError>;
}

impl Evaluate for Statement {
    fn execute<S: Storage>(
        &self,
        rman: &mut ResourceManager<'_, S>,
        out: &mut dyn OutputHandler,
    ) -> Result<(), RuntimeError> {
        rman.timed(self.name(), |rman| dispatch(self, rman, out))
    }
}

fn dispatch<S: Storage>(
    stmt: &Statement,
    rman: &mut ResourceManager<'_, S>,
    out: &mut dyn OutputHandler,
) -> Result<(), RuntimeError> {
    match stmt.kind() {
        StatementKind::Script(_) => {
            for child in stmt.children() {
                child.execute(rman, out)?;
            }
            Ok(())
        }
        StatementKind::Union { into } => execute_union(stmt, rman, out, into),
        StatementKind::Difference { into } => execute_difference(stmt, rman, out, into),
        StatementKind::Foreach { from, into } => execute_foreach(stmt, rman, out, from, into),
        StatementKind::Query { object, into } => {
            query::execute_query(stmt, rman, *object, into)
        }
        StatementKind::IdQuery { object, id, into } => {
            let mut result = NamedSet::new();
            match object {
                crate::model::ObjectType::Node => {
                    if let Some(node) = rman.storage().node(*id) {
                        result.push_node(node);
                    }
                }
                crate::model::ObjectType::Way => {
                    if let Some(way) = rman.storage().way(*id) {
                        result.push_way(way);
                    }
                }
                crate::model::ObjectType::Relation => {
                    if let Some(relation) = rman.storage().relation(*id) {
                        result.push_relation(relation);
                    }
                }
                crate::model::ObjectType::Area => {
                    if let Some(area) = rman.storage().area(*id) {
                        result.push_area(area);
                    }
                }
            }
            rman.account(1)?;
            rman.swap_set(into, result);
            Ok(())
        }
        StatementKind::BboxQuery { bbox, into } => spatial::execute_bbox(rman, bbox, into),
        StatementKind::Around {
            from,
            into,
            radius,
            center,
        } => spatial::execute_around(rman, from, into, *radius, *center),
        StatementKind::Recurse {
            kind,
            from,
            into,
            role,
        } => recurse::execute_recurse(rman, *kind, from, into, role.as_deref()),
        StatementKind::PolygonQuery { points, into, .. } => {
            spatial::execute_polygon(rman, points, into)
        }
        StatementKind::User {
            object,
            into,
            names,
            uids,
        } => query::execute_user(rman, *object, into, names, uids),
        StatementKind::AreaQuery { from, into, id } => {
            spatial::execute_area_query(rman, from, into, *id)
        }
        StatementKind::CoordQuery { from, into, point } => {
            spatial::execute_coord_query(rman, from, into, *point)
        }
        StatementKind::MapToArea { from, into } => {
            spatial::execute_map_to_area(rman, from, into)
        }
        StatementKind::Pivot { from, into } => spatial::execute_pivot(rman, from, into),
        StatementKind::Make { into, object } => {
            tags::execute_make(stmt, rman, into, object)
        }
        StatementKind::Convert { into, object } => {
            tags::execute_convert(stmt, rman, into, object)
        }
        StatementKind::Print(print) => execute_print(print, rman, out),
        // Predicates and value evaluators do not produce sets on their own.
        StatementKind::Item { .. }
        | StatementKind::HasKv(_)
        | StatementKind::Newer { .. }
        | StatementKind::Changed { .. }
        | StatementKind::SetTag(_)
        | StatementKind::ValueFixed { .. }
        | StatementKind::ValueId
        | StatementKind::ValueCount { .. }
        | StatementKind::ValueAggregate { .. }
        | StatementKind::ValueArith { .. } => Ok(()),
    }
}

/// The set a statement's result lands in, for union/difference
/// accumulation.
fn result_set_name(stmt: &Statement) -> Option<String> {
    match stmt.kind() {
        StatementKind::Union { into }
        | StatementKind::Difference { into }
        | StatementKind::Foreach { into, .. }
        | StatementKind::Query { into, .. }
        | StatementKind::IdQuery { into, .. }
        | StatementKind::BboxQuery { into, .. }
        | StatementKind::Around { into, .. }
        | StatementKind::Recurse { into, .. }
        | StatementKind::PolygonQuery { into, .. }
        | StatementKind::User { into, .. }
        | StatementKind::AreaQuery { into, .. }
        | StatementKind::CoordQuery { into, .. }
        | StatementKind::MapToArea { into, .. }
        | StatementKind::Pivot { into, .. }
        | StatementKind::Changed { into, .. }
        | StatementKind::Make { into, .. }
        | StatementKind::Convert { into, .. } => Some(into.clone()),
        StatementKind::Item { set } => Some(set.clone()),
        _ => None,
    }
}

/// Child results are unioned per variant; child order does not change
/// the outcome.
fn execute_union<S: Storage>(
    stmt: &Statement,
    rman: &mut ResourceManager<'_, S>,
    out: &mut dyn OutputHandler,
    into: &str,
) -> Result<(), RuntimeError> {
    let mut acc = NamedSet::new();
    for child in stmt.children() {
        child.execute(rman, out)?;
        if let Some(name) = result_set_name(child) {
            acc.union_with(&rman.set_clone(&name));
        }
    }
    rman.account(acc.len() as u64)?;
    rman.swap_set(into, acc);
    Ok(())
}

fn execute_difference<S: Storage>(
    stmt: &Statement,
    rman: &mut ResourceManager<'_, S>,
    out: &mut dyn OutputHandler,
    into: &str,
) -> Result<(), RuntimeError> {
    let mut children = stmt.children().iter();
    let mut result = match children.next() {
        Some(first) => {
            first.execute(rman, out)?;
            result_set_name(first)
                .map(|name| rman.set_clone(&name))
                .unwrap_or_default()
        }
        None => NamedSet::new(),
    };
    if let Some(second) = children.next() {
        second.execute(rman, out)?;
        if let Some(name) = result_set_name(second) {
            result.difference_with(&rman.set_clone(&name));
        }
    }
    rman.account(result.len() as u64)?;
    rman.swap_set(into, result);
    Ok(())
}

/// Iterates the input set in variant order, rebinding `_` to each
/// singleton; results written to the into-set accumulate as a union
/// across iterations, and `_` is restored afterwards.
fn execute_foreach<S: Storage>(
    stmt: &Statement,
    rman: &mut ResourceManager<'_, S>,
    out: &mut dyn OutputHandler,
    from: &str,
    into: &str,
) -> Result<(), RuntimeError> {
    let input = rman.set_clone(from);
    if input.is_empty() {
        return Ok(());
    }
    rman.account(input.len() as u64)?;

    let saved = rman.set_clone("_");
    let mut acc = NamedSet::new();
    for singleton in singletons(&input) {
        rman.swap_set("_", singleton);
        for child in stmt.children() {
            child.execute(rman, out)?;
        }
        acc.union_with(&rman.set_clone(into));
    }
    rman.swap_set("_", saved);
    rman.swap_set(into, acc);
    Ok(())
}

/// One singleton set per object, in variant order then ascending id.
fn singletons(input: &NamedSet) -> Vec<NamedSet> {
    let mut out = Vec::with_capacity(input.len());
    for node in &input.nodes {
        let mut set = NamedSet::new();
        set.push_node(node.clone());
        out.push(set);
    }
    for way in &input.ways {
        let mut set = NamedSet::new();
        set.push_way(way.clone());
        out.push(set);
    }
    for relation in &input.relations {
        let mut set = NamedSet::new();
        set.push_relation(relation.clone());
        out.push(set);
    }
    for area in &input.areas {
        let mut set = NamedSet::new();
        set.push_area(area.clone());
        out.push(set);
    }
    for derived in &input.derived {
        let mut set = NamedSet::new();
        set.push_derived(derived.clone());
        out.push(set);
    }
    out
}
