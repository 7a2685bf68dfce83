//! Temporal diff evaluation: the script runs once against the old
//! snapshot and once against the new one; per print, the objects that
//! changed between the two runs are collected into a named set carrying
//! diff markers, and that marked set goes through the regular print
//! path, where the markers surface as `action` fields.

use mapql_parser::stmt::{Print, Statement};

use crate::diagnostics::RuntimeError;
use crate::eval::Evaluate;
use crate::output::{print_set, CollectingOutput, OutputHandler};
use crate::rman::{ResourceManager, Settings};
use crate::script_settings;
use crate::set::{DiffAction, HasId, NamedSet, SetClass};
use crate::storage::Storage;

/// Runs `root` against both snapshots and emits per-print differences.
/// Deletions are only shown when the script asked for the augmented
/// diff.
pub fn run_diff<S: Storage>(
    root: &Statement,
    old: &S,
    new: &S,
    settings: Settings,
    out: &mut dyn OutputHandler,
) -> Result<(), RuntimeError> {
    let script = script_settings(root);
    let old_prints = collect_prints(root, old, settings.clone())?;
    let new_prints = collect_prints(root, new, settings.clone())?;

    out.prologue(new.timestamp());
    let mut rman = ResourceManager::new(new, &script, settings);
    let prints = old_prints.len().max(new_prints.len());
    for i in 0..prints {
        let empty = NamedSet::new();
        let old_set = old_prints.get(i).map(|(_, set)| set).unwrap_or(&empty);
        let new_set = new_prints.get(i).map(|(_, set)| set).unwrap_or(&empty);
        let Some(print) = new_prints
            .get(i)
            .or_else(|| old_prints.get(i))
            .map(|(print, _)| print)
        else {
            continue;
        };

        let marked = mark_changes(old_set, new_set, script.augmented);
        print_set(print, &marked, &mut rman, out)?;
    }
    out.epilogue();
    Ok(())
}

/// Evaluates the tree with prints in recording mode, capturing each
/// print's options and resolved set instead of serializing.
fn collect_prints<S: Storage>(
    root: &Statement,
    storage: &S,
    settings: Settings,
) -> Result<Vec<(Print, NamedSet)>, RuntimeError> {
    let script = script_settings(root);
    let mut rman = ResourceManager::new(storage, &script, settings).record_prints();
    let mut scratch = CollectingOutput::new();
    root.execute(&mut rman, &mut scratch)?;
    Ok(rman.take_print_log())
}

/// Builds the set a diff print emits: objects that are new or changed,
/// marked added, plus (in augmented mode) objects that disappeared,
/// marked deleted. Unchanged objects stay out of the set.
fn mark_changes(old: &NamedSet, new: &NamedSet, augmented: bool) -> NamedSet {
    let mut marked = NamedSet::new();

    for node in changed(&old.nodes, &new.nodes) {
        marked.mark(SetClass::Node, node.id(), DiffAction::Added);
        marked.push_node(node);
    }
    for way in changed(&old.ways, &new.ways) {
        marked.mark(SetClass::Way, way.id(), DiffAction::Added);
        marked.push_way(way);
    }
    for relation in changed(&old.relations, &new.relations) {
        marked.mark(SetClass::Relation, relation.id(), DiffAction::Added);
        marked.push_relation(relation);
    }
    for area in changed(&old.areas, &new.areas) {
        marked.mark(SetClass::Area, area.id(), DiffAction::Added);
        marked.push_area(area);
    }
    for derived in changed(&old.derived, &new.derived) {
        marked.mark(SetClass::Derived, derived.id(), DiffAction::Added);
        marked.push_derived(derived);
    }

    if augmented {
        for node in deleted(&old.nodes, &new.nodes) {
            marked.mark(SetClass::Node, node.id(), DiffAction::Deleted);
            marked.push_node(node);
        }
        for way in deleted(&old.ways, &new.ways) {
            marked.mark(SetClass::Way, way.id(), DiffAction::Deleted);
            marked.push_way(way);
        }
        for relation in deleted(&old.relations, &new.relations) {
            marked.mark(SetClass::Relation, relation.id(), DiffAction::Deleted);
            marked.push_relation(relation);
        }
        for area in deleted(&old.areas, &new.areas) {
            marked.mark(SetClass::Area, area.id(), DiffAction::Deleted);
            marked.push_area(area);
        }
        for derived in deleted(&old.derived, &new.derived) {
            marked.mark(SetClass::Derived, derived.id(), DiffAction::Deleted);
            marked.push_derived(derived);
        }
    }

    marked
}

/// Objects of `new` that are absent from `old` or differ from their old
/// version. Both slices are ascending by id.
fn changed<T: HasId + Clone + PartialEq>(old: &[T], new: &[T]) -> Vec<T> {
    let mut out = Vec::new();
    let mut i = 0;
    for item in new {
        while i < old.len() && old[i].id() < item.id() {
            i += 1;
        }
        let unchanged = i < old.len() && old[i].id() == item.id() && old[i] == *item;
        if !unchanged {
            out.push(item.clone());
        }
    }
    out
}

/// Objects of `old` whose id no longer occurs in `new`.
fn deleted<T: HasId + Clone + PartialEq>(old: &[T], new: &[T]) -> Vec<T> {
    let mut out = Vec::new();
    let mut i = 0;
    for item in old {
        while i < new.len() && new[i].id() < item.id() {
            i += 1;
        }
        if i >= new.len() || new[i].id() != item.id() {
            out.push(item.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coord, Node};

    fn node(id: u64, name: &str) -> Node {
        Node {
            id,
            lat: Coord::from_degrees(0.0),
            lon: Coord::from_degrees(0.0),
            tags: [("name".to_string(), name.to_string())].into(),
            meta: None,
        }
    }

    fn set_of(nodes: &[Node]) -> NamedSet {
        let mut set = NamedSet::new();
        for node in nodes {
            set.push_node(node.clone());
        }
        set
    }

    #[test]
    fn mark_changes_flags_new_changed_and_deleted_objects() {
        let old = set_of(&[node(1, "same"), node(2, "before"), node(3, "gone")]);
        let new = set_of(&[node(1, "same"), node(2, "after"), node(4, "fresh")]);

        let plain = mark_changes(&old, &new, false);
        assert_eq!(plain.ids(SetClass::Node), vec![2, 4]);
        assert_eq!(plain.diff_of(SetClass::Node, 2), Some(DiffAction::Added));
        assert_eq!(plain.diff_of(SetClass::Node, 4), Some(DiffAction::Added));

        let augmented = mark_changes(&old, &new, true);
        assert_eq!(augmented.ids(SetClass::Node), vec![2, 3, 4]);
        assert_eq!(
            augmented.diff_of(SetClass::Node, 3),
            Some(DiffAction::Deleted)
        );
    }
}
