use crate::lexer::TokenKind as T;
use crate::parser::Parser;
use crate::stmt::{AttrMap, Statement};

/// Parses one value expression into a statement tree.
///
/// Operators and operands are first collected as a flat
/// `(precedence, node)` sequence; [`fold`] then reduces the sequence
/// left-to-right, `*` and `/` before `+` and `-`.
pub(crate) fn value_tree(
    p: &mut Parser<'_>,
    expect_parenthesis: bool,
    expect_generic: bool,
) -> Option<Statement> {
    let mut stack: Vec<(u8, Statement)> = Vec::new();

    while p.good()
        && !p.at(T::Comma)
        && !p.at(T::Semicolon)
        && !p.at(T::Arrow)
        && !p.at(T::RParen)
    {
        let before = p.pos();
        match p.peek() {
            T::LParen => {
                p.advance();
                if let Some(stmt) = value_tree(p, true, expect_generic) {
                    stack.push((0, stmt));
                }
            }
            T::Plus => {
                push_operator(p, &mut stack, 2, "value-plus");
                p.advance();
            }
            T::Minus => {
                // A minus where an operand is expected negates the literal
                // that follows; after a completed operand it subtracts.
                let operand_done = stack.last().is_some_and(|(prec, _)| *prec == 0);
                if operand_done {
                    push_operator(p, &mut stack, 2, "value-minus");
                    p.advance();
                } else {
                    p.advance();
                    match p.peek() {
                        T::Int | T::Decimal => {
                            let line = p.line();
                            let mut attrs = AttrMap::new();
                            attrs.insert("v".to_string(), format!("-{}", p.data()));
                            p.advance();
                            if let Some(stmt) = p.create("value-fixed", line, attrs) {
                                stack.push((0, stmt));
                            }
                        }
                        _ => p.err("Number expected after unary minus"),
                    }
                }
            }
            T::Star => {
                push_operator(p, &mut stack, 1, "value-times");
                p.advance();
            }
            T::Slash => {
                push_operator(p, &mut stack, 1, "value-divided");
                p.advance();
            }
            T::ColonColon => {
                let line = p.line();
                p.advance();
                if expect_generic {
                    let mut attrs = AttrMap::new();
                    attrs.insert("from".to_string(), "_".to_string());
                    attrs.insert("keytype".to_string(), "generic".to_string());
                    if let Some(stmt) = p.create("value-union-value", line, attrs) {
                        stack.push((0, stmt));
                    }
                } else {
                    p.errors.push(crate::error::Error::parse(
                        "A generic value reference is only allowed in generic assignments"
                            .to_string(),
                        "::".to_string(),
                        line,
                    ));
                }
            }
            T::Ident if p.data() == "t" && p.next_kind() == T::LBracket => {
                // `t["key"]` reads the key's value from the input set.
                let line = p.line();
                p.advance();
                p.advance();
                let key = p.get_text_token("Tag key");
                p.clear_until_after(&[T::RBracket], true);
                let mut attrs = AttrMap::new();
                attrs.insert("from".to_string(), "_".to_string());
                attrs.insert("k".to_string(), key);
                if let Some(stmt) = p.create("value-union-value", line, attrs) {
                    stack.push((0, stmt));
                }
            }
            _ => {
                operand(p, &mut stack, expect_generic);
            }
        }
        if p.pos() == before {
            p.advance();
        }
    }

    if expect_parenthesis {
        if p.at(T::RParen) {
            p.advance();
        } else {
            p.err("A right parenthesis is missing");
        }
    } else if p.at(T::RParen) {
        p.err("Unmatched right parenthesis found");
        p.advance();
    }

    fold(p, stack)
}

fn push_operator(p: &mut Parser<'_>, stack: &mut Vec<(u8, Statement)>, prec: u8, name: &str) {
    if let Some(stmt) = p.create(name, p.line(), AttrMap::new()) {
        stack.push((prec, stmt));
    }
}

/// Parses a literal or a function call and pushes it as an operand.
fn operand(p: &mut Parser<'_>, stack: &mut Vec<(u8, Statement)>, expect_generic: bool) {
    let line = p.line();
    let value = p.get_text_token("Tag value");

    let mut func_from = "_".to_string();
    if p.good() && p.at(T::Dot) {
        p.advance();
        func_from = p.get_identifier_token("Input set");
    }

    if !p.good() || !p.at(T::LParen) {
        let mut attrs = AttrMap::new();
        attrs.insert("v".to_string(), value);
        if let Some(stmt) = p.create("value-fixed", line, attrs) {
            stack.push((0, stmt));
        }
        return;
    }

    p.advance();
    match value.as_str() {
        "count" => {
            let count_type = p.get_identifier_token("Count type");
            let mut attrs = AttrMap::new();
            attrs.insert("from".to_string(), func_from);
            attrs.insert("type".to_string(), count_type);
            if let Some(stmt) = p.create("value-count", line, attrs) {
                stack.push((0, stmt));
            }
            p.clear_until_after(&[T::RParen], true);
        }
        "id" => {
            if let Some(stmt) = p.create("value-id", line, AttrMap::new()) {
                stack.push((0, stmt));
            }
            p.clear_until_after(&[T::RParen], true);
        }
        "u" | "min" | "max" | "set" => {
            let name = match value.as_str() {
                "u" => "value-union-value",
                "min" => "value-min-value",
                "max" => "value-max-value",
                _ => "value-set-value",
            };
            let mut attrs = AttrMap::new();
            attrs.insert("from".to_string(), func_from);
            aggregate_key(p, &mut attrs, expect_generic);
            if let Some(stmt) = p.create(name, line, attrs) {
                stack.push((0, stmt));
            }
            p.clear_until_after(&[T::RParen], true);
        }
        _ => {
            p.errors.push(crate::error::Error::parse(
                format!(
                    "\"{value}\" is not a function name, but is followed by a left parenthesis"
                ),
                value,
                line,
            ));
            p.clear_until_after(&[T::RParen], true);
        }
    }
}

/// Parses the argument of an aggregate: a key, or `::id`, `::type`, `::`.
fn aggregate_key(p: &mut Parser<'_>, attrs: &mut AttrMap, expect_generic: bool) {
    if p.good() && p.at(T::ColonColon) {
        p.advance();
        if !p.good() || p.at(T::RParen) {
            if expect_generic {
                attrs.insert("keytype".to_string(), "generic".to_string());
            } else {
                attrs.insert("k".to_string(), String::new());
            }
        } else if p.at_word("id") {
            attrs.insert("keytype".to_string(), "id".to_string());
            p.advance();
        } else if p.at_word("type") {
            attrs.insert("keytype".to_string(), "type".to_string());
            p.advance();
        } else {
            p.err(
                "In aggregate functions after \"::\" the only allowed tokens are \"id\" or \"type\"",
            );
            p.advance();
        }
    } else {
        let key = p.get_text_token("Key to evaluate");
        attrs.insert("k".to_string(), key);
    }
}

/// Reduces the flat `(precedence, node)` sequence: one left-to-right pass
/// for `*` and `/`, a second for `+` and `-`.
fn fold(p: &mut Parser<'_>, stack: Vec<(u8, Statement)>) -> Option<Statement> {
    let line = stack.first().map(|(_, s)| s.line()).unwrap_or_else(|| p.line());
    let mut stack = stack;
    for prec in [1u8, 2u8] {
        let mut reduced: Vec<(u8, Statement)> = Vec::new();
        let mut iter = stack.into_iter().peekable();
        while let Some((op_prec, mut node)) = iter.next() {
            if op_prec != prec {
                reduced.push((op_prec, node));
                continue;
            }
            let left = match reduced.last() {
                Some((0, _)) => Some(reduced.pop().expect("just checked").1),
                _ => None,
            };
            let right = match iter.peek() {
                Some((0, _)) => Some(iter.next().expect("just checked").1),
                _ => None,
            };
            match (left, right) {
                (Some(left), Some(right)) => {
                    node.add_child(left);
                    node.add_child(right);
                    reduced.push((0, node));
                }
                (left, _) => {
                    p.errors.push(crate::error::Error::parse(
                        "Missing operand in value expression".to_string(),
                        String::new(),
                        node.line(),
                    ));
                    if let Some(left) = left {
                        reduced.push((0, left));
                    }
                }
            }
        }
        stack = reduced;
    }

    match stack.len() {
        1 => Some(stack.remove(0).1),
        0 => None,
        _ => {
            p.errors.push(crate::error::Error::parse(
                "Invalid expression in value assignment".to_string(),
                String::new(),
                line,
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parse_script;
    use expect_test::expect;

    #[test]
    fn it_folds_left_to_right_within_a_precedence_class() {
        let parsed = parse_script("make m v=1-2-3;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                make into=_ type=m
                    set-tag k=v
                        value-minus
                            value-minus
                                value-fixed v=1
                                value-fixed v=2
                            value-fixed v=3
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_recognizes_contextual_unary_minus() {
        let parsed = parse_script("make m v=-5, w=3--5;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                make into=_ type=m
                    set-tag k=v
                        value-fixed v=-5
                    set-tag k=w
                        value-minus
                            value-fixed v=3
                            value-fixed v=-5
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_parses_parenthesized_subexpressions() {
        let parsed = parse_script("make m v=(1+2)*3;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                make into=_ type=m
                    set-tag k=v
                        value-times
                            value-plus
                                value-fixed v=1
                                value-fixed v=2
                            value-fixed v=3
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_rejects_operators_without_operands() {
        let parsed = parse_script("make m v=*;");
        assert!(!parsed.errors.is_empty());
    }

    #[test]
    fn it_rejects_non_function_calls() {
        let parsed = parse_script("make m v=frobnicate(3);");
        assert!(parsed.errors[0]
            .to_string()
            .contains("is not a function name"));
    }
}
