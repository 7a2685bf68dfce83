use crate::lexer::TokenKind as T;
use crate::parser::grammar::statement;
use crate::parser::Parser;
use crate::stmt::{AttrMap, ObjectType, Statement, StatementKind};

/// Parses `( stmt; stmt; … )`, which is a union unless the first two
/// substatements are separated by `-`, making it a difference.
pub(crate) fn union(p: &mut Parser<'_>) -> Option<Statement> {
    let line = p.line();
    let mut is_difference = false;
    let substatements = collect_substatements_and_probe(p, &mut is_difference);
    let into = p.probe_into();

    if is_difference {
        check_difference_operands(p, line, &substatements);
    }

    let mut attrs = AttrMap::new();
    attrs.insert("into".to_string(), into);
    let name = if is_difference { "difference" } else { "union" };
    let mut stmt = p.create(name, line, attrs)?;
    for sub in substatements {
        stmt.add_child(sub);
    }
    Some(stmt)
}

/// A difference takes exactly two operands, and when both operands name
/// their variant the variants must agree.
fn check_difference_operands(p: &mut Parser<'_>, line: u32, substatements: &[Statement]) {
    let mismatch = match substatements {
        [a, b] => match (result_type(a), result_type(b)) {
            (Some(ta), Some(tb)) => ta != tb,
            _ => false,
        },
        // Surplus operands were already reported while collecting.
        [] | [_] => true,
        _ => false,
    };
    if mismatch {
        p.errors.push(crate::error::Error::parse(
            "difference always requires two operands of the same variant".to_string(),
            String::new(),
            line,
        ));
    }
}

fn result_type(stmt: &Statement) -> Option<ObjectType> {
    match stmt.kind() {
        StatementKind::Query { object, .. } => *object,
        StatementKind::IdQuery { object, .. } => Some(*object),
        _ => None,
    }
}

fn collect_substatements_and_probe(
    p: &mut Parser<'_>,
    is_difference: &mut bool,
) -> Vec<Statement> {
    let mut substatements = Vec::new();
    p.clear_until_after(&[T::LParen], true);

    if p.good() && !p.at(T::RParen) {
        if let Some(stmt) = statement(p) {
            substatements.push(stmt);
        }
        p.clear_until_after(&[T::Semicolon, T::RParen, T::Minus], false);
        if p.at(T::Semicolon) {
            p.advance();
        }
        if p.at(T::Minus) {
            *is_difference = true;
            p.advance();
        }
    }
    if p.good() && !p.at(T::RParen) {
        if let Some(stmt) = statement(p) {
            substatements.push(stmt);
        }
        p.clear_until_after(&[T::Semicolon, T::RParen], false);
        if p.at(T::Semicolon) {
            p.advance();
        }
        if *is_difference && p.good() && !p.at(T::RParen) {
            p.err("difference always requires two operands of the same variant");
            p.clear_until_after(&[T::RParen], false);
        }
    }
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

#[cfg(test)]
mod tests {
    use crate::parse_script;
    use expect_test::expect;

    #[test]
    fn it_parses_a_union_with_redirect() {
        let parsed = parse_script("(node(1);node(2);)->.a;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                union into=a
                    id-query type=node ref=1 into=_
                    id-query type=node ref=2 into=_
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_parses_a_difference() {
        let parsed = parse_script("(node(1); - node(2););");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                difference into=_
                    id-query type=node ref=1 into=_
                    id-query type=node ref=2 into=_
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_rejects_mixed_variant_differences() {
        let parsed = parse_script("(way(1); - node(2););");
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(
            parsed.errors[0].to_string(),
            "line 1: parse error: difference always requires two operands of the same variant"
        );
        // The tree is still built, just marked ill-formed by the error.
        assert!(parsed.root.is_some());
    }

    #[test]
    fn it_rejects_differences_with_three_operands() {
        let parsed = parse_script("(node(1); - node(2); node(3););");
        assert!(parsed
            .errors
            .iter()
            .any(|e| e.to_string().contains("difference always requires two operands")));
    }
}
