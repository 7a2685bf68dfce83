//! The algebraic laws of union, difference, and foreach, exercised
//! through full scripts.

use crate::fixtures::{ids_of, run_ok, world};
use pretty_assertions::assert_eq;

#[test]
fn union_is_commutative_on_content() {
    let storage = world();
    let ab = run_ok(&storage, "(node(1);node(2););out;");
    let ba = run_ok(&storage, "(node(2);node(1););out;");
    assert_eq!(ab.elements, ba.elements);
}

#[test]
fn union_is_idempotent() {
    let storage = world();
    let twice = run_ok(&storage, "(node(1);node(1););out;");
    assert_eq!(ids_of(&twice.elements, "node"), vec![1]);
}

#[test]
fn difference_removes_the_second_operand() {
    let storage = world();
    let out = run_ok(&storage, "(node[amenity=pub]; - node(2););out;");
    assert_eq!(ids_of(&out.elements, "node"), vec![1]);
}

#[test]
fn difference_with_itself_is_empty() {
    let storage = world();
    let out = run_ok(&storage, "(node(1); - node(1););out;");
    assert!(out.elements.is_empty());
}

#[test]
fn foreach_rebinds_the_implicit_set_per_object() {
    let storage = world();
    // Each iteration prints exactly the singleton bound to `_`.
    let out = run_ok(&storage, "(node(1);node(2);)->.p; foreach.p(out;);");
    assert_eq!(ids_of(&out.elements, "node"), vec![1, 2]);
}

#[test]
fn foreach_accumulates_the_into_set_across_iterations() {
    let storage = world();
    let out = run_ok(
        &storage,
        "(node(1);node(2);)->.p; foreach.p->.q(node(around._:50)->.q;); .q out;",
    );
    assert_eq!(ids_of(&out.elements, "node"), vec![1, 2]);
}

#[test]
fn foreach_over_an_empty_set_is_a_no_op() {
    let storage = world();
    let out = run_ok(
        &storage,
        "node(1)->.keep; foreach.missing->.keep(node(2)->.keep;); .keep out;",
    );
    assert_eq!(ids_of(&out.elements, "node"), vec![1]);
}

#[test]
fn foreach_restores_the_implicit_set_afterwards() {
    let storage = world();
    let out = run_ok(
        &storage,
        "(node(1);node(2);)->.p; node(3); foreach.p->.q(.q out ids;); out;",
    );
    // The trailing `out` sees node 3, untouched by the loop's rebinding.
    assert_eq!(*ids_of(&out.elements, "node").last().unwrap(), 3);
}
