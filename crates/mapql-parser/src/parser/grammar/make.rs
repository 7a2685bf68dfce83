use crate::lexer::TokenKind as T;
use crate::parser::grammar::value;
use crate::parser::Parser;
use crate::stmt::{AttrMap, Statement};

/// Parses `make` / `convert`: an element class name followed by tag
/// assignments, each of which becomes a `set-tag` child with the value
/// expression as its own child.
pub(crate) fn make(p: &mut Parser<'_>, strategy: &str) -> Option<Statement> {
    let line = p.line();
    p.advance();

    let mut object = String::new();
    if !p.at(T::Semicolon) {
        object = p.get_identifier_token("Element class name");
    }

    let mut evaluators = Vec::new();
    while p.good() && !p.at(T::Semicolon) && !p.at(T::Arrow) {
        let before = p.pos();
        if p.at(T::Comma) {
            p.advance();
        }

        if p.good() && p.at(T::Bang) {
            // `!key` removes the key; a set-tag with no value child.
            p.advance();
            let key = p.get_text_token("Tag key");
            let mut attrs = AttrMap::new();
            attrs.insert("k".to_string(), key);
            if let Some(stmt) = p.create("set-tag", p.line(), attrs) {
                evaluators.push(stmt);
            }
            p.clear_until_after(&[T::Comma, T::Semicolon, T::Arrow], false);
            continue;
        }

        let mut attrs = AttrMap::new();
        let mut generic = false;
        if p.good() && p.at(T::ColonColon) {
            p.advance();
            generic = true;
            let mut from = "_".to_string();
            if p.good() {
                if p.at(T::Dot) {
                    p.advance();
                    from = p.get_identifier_token("Input set");
                } else if p.at_word("id") {
                    p.advance();
                    generic = false;
                    attrs.insert("keytype".to_string(), "id".to_string());
                }
            }
            if generic {
                attrs.insert("from".to_string(), from);
                attrs.insert("keytype".to_string(), "generic".to_string());
            }
        } else {
            let key = p.get_text_token("Tag key");
            attrs.insert("k".to_string(), key);
        }

        p.clear_until_after(&[T::Eq], true);
        let value_line = p.line();
        if let Some(value_stmt) = value::value_tree(p, false, generic) {
            if let Some(mut key_stmt) = p.create("set-tag", value_line, attrs) {
                key_stmt.add_child(value_stmt);
                evaluators.push(key_stmt);
            }
        }

        if p.pos() == before {
            p.advance();
        }
    }
    let into = p.probe_into();

    let mut attrs = AttrMap::new();
    attrs.insert("into".to_string(), into);
    attrs.insert("type".to_string(), object);
    let mut stmt = p.create(strategy, line, attrs)?;
    for evaluator in evaluators {
        stmt.add_child(evaluator);
    }
    Some(stmt)
}

#[cfg(test)]
mod tests {
    use crate::parse_script;
    use expect_test::expect;

    #[test]
    fn it_parses_make_with_id_and_tag_functions() {
        let parsed = parse_script("make poi ::id=id(), name=t[\"name\"];");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                make into=_ type=poi
                    set-tag keytype=id
                        value-id
                    set-tag k=name
                        value-union-value from=_ k=name
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_parses_convert_with_generic_copy_and_drop() {
        let parsed = parse_script("convert station ::=::, !network;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                convert into=_ type=station
                    set-tag from=_ keytype=generic
                        value-union-value from=_ keytype=generic
                    set-tag k=network
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_parses_arithmetic_value_trees() {
        let parsed = parse_script("make stat total=count(nodes) + count(ways) * 2 ->.counts;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                make into=counts type=stat
                    set-tag k=total
                        value-plus
                            value-count from=_ type=nodes
                            value-times
                                value-count from=_ type=ways
                                value-fixed v=2
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_parses_aggregates_over_named_sets() {
        let parsed = parse_script("make summary top=max.a(population), kinds=set.a(::type);");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                make into=_ type=summary
                    set-tag k=top
                        value-max-value from=a k=population
                    set-tag k=kinds
                        value-set-value from=a keytype=type
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }
}
