//! `make`, `convert`, and the value-expression evaluators they drive.

use std::collections::BTreeSet;

use mapql_parser::stmt::{
    AggregateKey, Aggregator, ArithOp, CountType, Statement, StatementKind, TagTarget,
};

use crate::diagnostics::RuntimeError;
use crate::model::{Derived, Id, Tags};
use crate::rman::ResourceManager;
use crate::set::NamedSet;
use crate::storage::Storage;

/// `make` evaluates its tag assignments once against the environment and
/// emits a single derived element.
pub(crate) fn execute_make<S: Storage>(
    stmt: &Statement,
    rman: &mut ResourceManager<'_, S>,
    into: &str,
    type_name: &str,
) -> Result<(), RuntimeError> {
    let (tags, id_override) = apply_set_tags(stmt.children(), rman)?;
    let id = match id_override {
        Some(id) => id,
        None => rman.next_derived_id(),
    };
    let mut result = NamedSet::new();
    result.push_derived(Derived {
        id,
        type_name: type_name.to_string(),
        tags,
    });
    rman.account(1)?;
    rman.swap_set(into, result);
    Ok(())
}

/// `convert` maps every object of the input set to a derived element.
/// The implicit set is rebound to the current object while its
/// assignments evaluate, so aggregates over `_` read that one object.
pub(crate) fn execute_convert<S: Storage>(
    stmt: &Statement,
    rman: &mut ResourceManager<'_, S>,
    into: &str,
    type_name: &str,
) -> Result<(), RuntimeError> {
    let input = rman.set_clone("_");
    rman.account(input.len() as u64)?;

    let saved = rman.set_clone("_");
    let mut result = NamedSet::new();
    for singleton in super::singletons(&input) {
        let default_id = first_id(&singleton);
        rman.swap_set("_", singleton);
        let (tags, id_override) = apply_set_tags(stmt.children(), rman)?;
        result.push_derived(Derived {
            id: id_override.or(default_id).unwrap_or(0),
            type_name: type_name.to_string(),
            tags,
        });
    }
    rman.swap_set("_", saved);
    rman.swap_set(into, result);
    Ok(())
}

fn first_id(set: &NamedSet) -> Option<Id> {
    set.nodes
        .first()
        .map(|o| o.id)
        .or_else(|| set.ways.first().map(|o| o.id))
        .or_else(|| set.relations.first().map(|o| o.id))
        .or_else(|| set.areas.first().map(|o| o.id))
        .or_else(|| set.derived.first().map(|o| o.id))
}

/// Runs the `set-tag` children in order, building the output tag set and
/// the optional id override.
fn apply_set_tags<S: Storage>(
    children: &[Statement],
    rman: &mut ResourceManager<'_, S>,
) -> Result<(Tags, Option<Id>), RuntimeError> {
    let mut tags = Tags::new();
    let mut id_override = None;
    for child in children {
        let StatementKind::SetTag(target) = child.kind() else {
            continue;
        };
        match target {
            TagTarget::Key(key) => match child.children().first() {
                Some(value_stmt) => {
                    let value = eval_value(value_stmt, rman, None)?;
                    tags.insert(key.clone(), value);
                }
                // `!key` removes what an earlier generic copy brought in.
                None => {
                    tags.remove(key);
                }
            },
            TagTarget::Id => {
                if let Some(value_stmt) = child.children().first() {
                    let value = eval_value(value_stmt, rman, None)?;
                    id_override = value.parse().ok();
                }
            }
            TagTarget::Generic { from } => {
                let source = rman.set_clone(from);
                for key in all_keys(&source) {
                    let value = match child.children().first() {
                        Some(value_stmt) => eval_value(value_stmt, rman, Some(&key))?,
                        None => String::new(),
                    };
                    tags.insert(key, value);
                }
            }
        }
    }
    Ok((tags, id_override))
}

fn all_keys(set: &NamedSet) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for tags in tag_sets(set) {
        keys.extend(tags.keys().cloned());
    }
    keys
}

fn tag_sets(set: &NamedSet) -> Vec<&Tags> {
    let mut out = Vec::with_capacity(set.len());
    out.extend(set.nodes.iter().map(|o| &o.tags));
    out.extend(set.ways.iter().map(|o| &o.tags));
    out.extend(set.relations.iter().map(|o| &o.tags));
    out.extend(set.areas.iter().map(|o| &o.tags));
    out.extend(set.derived.iter().map(|o| &o.tags));
    out
}

/// Evaluates one value-expression node to a string.
pub(crate) fn eval_value<S: Storage>(
    stmt: &Statement,
    rman: &mut ResourceManager<'_, S>,
    generic_key: Option<&str>,
) -> Result<String, RuntimeError> {
    match stmt.kind() {
        StatementKind::ValueFixed { value } => Ok(value.clone()),
        StatementKind::ValueId => {
            let set = rman.set_clone("_");
            Ok(first_id(&set).map(|id| id.to_string()).unwrap_or_default())
        }
        StatementKind::ValueCount { count, from } => {
            let set = rman.set_clone(from);
            let n = match count {
                CountType::Nodes => set.nodes.len(),
                CountType::Ways => set.ways.len(),
                CountType::Relations => set.relations.len(),
                CountType::Areas => set.areas.len(),
            };
            Ok(n.to_string())
        }
        StatementKind::ValueAggregate { agg, from, key } => {
            let set = rman.set_clone(from);
            let values = aggregate_inputs(&set, key, generic_key)?;
            Ok(aggregate(*agg, values))
        }
        StatementKind::ValueArith { op } => {
            let children = stmt.children();
            let (Some(left), Some(right)) = (children.first(), children.get(1)) else {
                return Ok(String::new());
            };
            let left = eval_value(left, rman, generic_key)?;
            let right = eval_value(right, rman, generic_key)?;
            Ok(arith(*op, &left, &right))
        }
        _ => Ok(String::new()),
    }
}

fn aggregate_inputs(
    set: &NamedSet,
    key: &AggregateKey,
    generic_key: Option<&str>,
) -> Result<Vec<String>, RuntimeError> {
    let mut values = Vec::new();
    match key {
        AggregateKey::Tag(key) => {
            for tags in tag_sets(set) {
                if let Some(value) = tags.get(key) {
                    values.push(value.clone());
                }
            }
        }
        AggregateKey::Generic => {
            let key = generic_key.ok_or_else(|| {
                RuntimeError::Other(
                    "A generic value is only available in a generic assignment".to_string(),
                )
            })?;
            for tags in tag_sets(set) {
                if let Some(value) = tags.get(key) {
                    values.push(value.clone());
                }
            }
        }
        AggregateKey::Id => {
            for class in [
                crate::set::SetClass::Node,
                crate::set::SetClass::Way,
                crate::set::SetClass::Relation,
                crate::set::SetClass::Area,
                crate::set::SetClass::Derived,
            ] {
                values.extend(set.ids(class).into_iter().map(|id| id.to_string()));
            }
        }
        AggregateKey::Type => {
            values.extend(set.nodes.iter().map(|_| "node".to_string()));
            values.extend(set.ways.iter().map(|_| "way".to_string()));
            values.extend(set.relations.iter().map(|_| "relation".to_string()));
            values.extend(set.areas.iter().map(|_| "area".to_string()));
            values.extend(set.derived.iter().map(|d| d.type_name.clone()));
        }
    }
    Ok(values)
}

fn aggregate(agg: Aggregator, mut values: Vec<String>) -> String {
    match agg {
        Aggregator::Union => {
            let mut unique = values;
            unique.sort();
            unique.dedup();
            match unique.len() {
                0 => String::new(),
                1 => unique.remove(0),
                _ => "< multiple values found >".to_string(),
            }
        }
        Aggregator::Min => pick_extreme(values, false),
        Aggregator::Max => pick_extreme(values, true),
        Aggregator::Set => {
            values.sort();
            values.dedup();
            values.join(";")
        }
    }
}

/// Numeric comparison when every value is a number, lexicographic
/// otherwise.
fn pick_extreme(values: Vec<String>, max: bool) -> String {
    if values.is_empty() {
        return String::new();
    }
    let numbers: Option<Vec<f64>> = values.iter().map(|v| v.parse().ok()).collect();
    match numbers {
        Some(numbers) => {
            let mut best = 0;
            for (i, n) in numbers.iter().enumerate() {
                let better = if max {
                    *n > numbers[best]
                } else {
                    *n < numbers[best]
                };
                if better {
                    best = i;
                }
            }
            values[best].clone()
        }
        None => {
            let mut values = values;
            values.sort();
            if max {
                values.pop().unwrap_or_default()
            } else {
                values.swap_remove(0)
            }
        }
    }
}

fn arith(op: ArithOp, left: &str, right: &str) -> String {
    if let (Ok(l), Ok(r)) = (left.parse::<i64>(), right.parse::<i64>()) {
        let result = match op {
            ArithOp::Plus => l.checked_add(r),
            ArithOp::Minus => l.checked_sub(r),
            ArithOp::Times => l.checked_mul(r),
            // Division stays in floating point, like every other
            // non-integer result.
            ArithOp::Divided => None,
        };
        if let Some(result) = result {
            return result.to_string();
        }
    }
    if let (Ok(l), Ok(r)) = (left.parse::<f64>(), right.parse::<f64>()) {
        let result = match op {
            ArithOp::Plus => l + r,
            ArithOp::Minus => l - r,
            ArithOp::Times => l * r,
            ArithOp::Divided => l / r,
        };
        if result.is_finite() {
            return format!("{result}");
        }
        return "NaN".to_string();
    }
    match op {
        ArithOp::Plus => format!("{left}{right}"),
        _ => "NaN".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_prefers_integers() {
        assert_eq!(arith(ArithOp::Plus, "2", "3"), "5");
        assert_eq!(arith(ArithOp::Times, "2", "3"), "6");
        assert_eq!(arith(ArithOp::Divided, "3", "2"), "1.5");
        assert_eq!(arith(ArithOp::Plus, "2.5", "0.5"), "3");
    }

    #[test]
    fn plus_concatenates_non_numbers() {
        assert_eq!(arith(ArithOp::Plus, "foo", "bar"), "foobar");
        assert_eq!(arith(ArithOp::Minus, "foo", "bar"), "NaN");
        assert_eq!(arith(ArithOp::Divided, "1", "0"), "NaN");
    }

    #[test]
    fn union_reports_multiple_values() {
        assert_eq!(aggregate(Aggregator::Union, vec![]), "");
        assert_eq!(aggregate(Aggregator::Union, vec!["a".into(), "a".into()]), "a");
        assert_eq!(
            aggregate(Aggregator::Union, vec!["a".into(), "b".into()]),
            "< multiple values found >"
        );
    }

    #[test]
    fn set_sorts_and_dedups() {
        assert_eq!(
            aggregate(
                Aggregator::Set,
                vec!["b".into(), "a".into(), "b".into()]
            ),
            "a;b"
        );
    }

    #[test]
    fn min_max_are_numeric_when_possible() {
        assert_eq!(
            aggregate(Aggregator::Min, vec!["10".into(), "9".into()]),
            "9"
        );
        assert_eq!(
            aggregate(Aggregator::Max, vec!["10".into(), "9".into()]),
            "10"
        );
        assert_eq!(
            aggregate(Aggregator::Min, vec!["10".into(), "apple".into()]),
            "10"
        );
    }
}
