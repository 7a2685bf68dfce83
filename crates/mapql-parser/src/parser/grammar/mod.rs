pub(crate) mod foreach;
pub(crate) mod make;
pub(crate) mod output;
pub(crate) mod query;
pub(crate) mod recurse;
pub(crate) mod setup;
pub(crate) mod union;
pub(crate) mod value;

use crate::lexer::TokenKind as T;
use crate::parser::Parser;
use crate::stmt::{AttrMap, ObjectType, Statement};

/// Parses a whole script: optional `[key:value]` headers, then statements
/// separated by semicolons, all collected under one `osm-script` root.
pub(crate) fn script(p: &mut Parser<'_>) -> Option<Statement> {
    let line = p.line();
    let mut attrs = AttrMap::new();
    while p.good() && p.at(T::LBracket) {
        setup::setup(p, &mut attrs);
    }
    let had_headers = !attrs.is_empty();
    let mut root = p.create("osm-script", line, attrs);
    if had_headers {
        p.clear_until_after(&[T::Semicolon], true);
    }

    while p.good() {
        let before = p.pos();
        if let Some(stmt) = statement(p) {
            if let Some(root) = root.as_mut() {
                root.add_child(stmt);
            }
        }
        p.clear_until_after(&[T::Semicolon], true);
        if p.pos() == before {
            // Nothing consumed; skip the offending token to guarantee progress.
            p.advance();
        }
    }

    root
}

/// Parses one statement, guarding the nesting limit.
pub(crate) fn statement(p: &mut Parser<'_>) -> Option<Statement> {
    if !p.good() {
        return None;
    }
    if p.depth.limited() {
        p.err(format!(
            "Nesting of statements is limited to {} levels",
            p.depth.limit
        ));
        return None;
    }
    p.depth.consume();
    let result = statement_inner(p);
    p.depth.release();
    result
}

fn statement_inner(p: &mut Parser<'_>) -> Option<Statement> {
    if p.at(T::LParen) {
        return union::union(p);
    }
    if p.at_word("foreach") {
        return foreach::foreach(p);
    }

    let mut from = String::new();
    if p.at(T::Dot) {
        p.advance();
        if p.good() {
            from = p.get_identifier_token("Variable");
        }
    }

    if p.at_word("out") {
        return output::output(p, &from);
    }
    if p.at_word("convert") {
        return make::make(p, "convert");
    }
    if p.at_word("make") {
        return make::make(p, "make");
    }
    if matches!(p.peek(), T::Lt | T::LtLt | T::Gt | T::GtGt) {
        return recurse::full_recurse(p, &from);
    }
    if p.at_word("is_in") {
        return query::coord_query(p, &from);
    }
    if p.at_word("map_to_area") {
        return query::map_to_area(p, &from);
    }

    let mut object = None;
    if from.is_empty() {
        let raw = p.data().to_string();
        let mapped = if raw == "rel" { "relation" } else { raw.as_str() };
        match ObjectType::parse(mapped) {
            Some(t) => object = Some(t),
            None => p.err(format!("Unknown type \"{raw}\"")),
        }
        p.advance();
        if p.good() && p.at(T::Dot) {
            p.advance();
            if p.good() {
                from = p.get_identifier_token("Variable");
            }
        }
    }

    query::query(p, object, &from)
}

/// Parses `( statement; … )`, used by `foreach`.
pub(crate) fn collect_substatements(p: &mut Parser<'_>) -> Vec<Statement> {
    let mut substatements = Vec::new();
    p.clear_until_after(&[T::LParen], true);
    while p.good() && !p.at(T::RParen) {
        let before = p.pos();
        if let Some(stmt) = statement(p) {
            substatements.push(stmt);
        }
        p.clear_until_after(&[T::Semicolon, T::RParen], false);
        if p.at(T::Semicolon) {
            p.advance();
        }
        if p.pos() == before {
            p.advance();
        }
    }
    if p.good() {
        p.advance();
    }
    substatements
}
