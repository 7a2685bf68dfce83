use crate::error::Error;
use crate::lexer::TokenKind as T;
use crate::parser::Parser;
use crate::stmt::{AttrMap, ObjectType, Statement};

/// Parses a standalone `<`, `<<`, `>` or `>>` statement.
pub(crate) fn full_recurse(p: &mut Parser<'_>, from: &str) -> Option<Statement> {
    let line = p.line();
    let kind = match p.peek() {
        T::Lt => "up",
        T::LtLt => "up-rel",
        T::Gt => "down",
        T::GtGt => "down-rel",
        _ => return None,
    };
    p.advance();
    let into = p.probe_into();

    let mut attrs = AttrMap::new();
    attrs.insert("type".to_string(), kind.to_string());
    attrs.insert(
        "from".to_string(),
        if from.is_empty() { "_" } else { from }.to_string(),
    );
    attrs.insert("into".to_string(), into);
    p.create("recurse", line, attrs)
}

/// Resolves a membership flag against the enclosing query type to the
/// canonical recurse kind. Impossible combinations are parse errors; an
/// empty result falls through to the factory, which rejects it as a
/// static error.
pub(crate) fn determine_recurse_type(
    p: &mut Parser<'_>,
    flag: &str,
    object: Option<ObjectType>,
    line: u32,
) -> String {
    let mut parse_err = |message: &str| {
        p.errors
            .push(Error::parse(message.to_string(), String::new(), line));
    };
    let kind = match flag {
        "r" => match object {
            Some(ObjectType::Node) => "relation-node",
            Some(ObjectType::Way) => "relation-way",
            Some(ObjectType::Relation) => "relation-relation",
            _ => "",
        },
        "w" => match object {
            Some(ObjectType::Node) => "way-node",
            _ => {
                parse_err("A recursion from type 'w' produces nodes.");
                ""
            }
        },
        "bn" => match object {
            Some(ObjectType::Node) => {
                parse_err("A recursion from type 'bn' produces ways or relations.");
                ""
            }
            Some(ObjectType::Way) => "node-way",
            Some(ObjectType::Relation) => "node-relation",
            _ => "",
        },
        "bw" => match object {
            Some(ObjectType::Node) | Some(ObjectType::Way) => {
                parse_err("A recursion from type 'bw' produces relations.");
                ""
            }
            Some(ObjectType::Relation) => "way-relation",
            _ => "",
        },
        "br" => match object {
            Some(ObjectType::Node) | Some(ObjectType::Way) => {
                parse_err("A recursion from type 'br' produces relations.");
                ""
            }
            Some(ObjectType::Relation) => "relation-backwards",
            _ => "",
        },
        "<" => "up",
        "<<" => "up-rel",
        ">" => "down",
        ">>" => "down-rel",
        _ => "",
    };
    kind.to_string()
}

#[cfg(test)]
mod tests {
    use crate::parse_script;
    use expect_test::expect;

    #[test]
    fn it_parses_standalone_recursion() {
        let parsed = parse_script("rel(1234); >; out;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                id-query type=relation ref=1234 into=_
                recurse type=down from=_ into=_
                print from=_ mode=body order=id limit="" geometry=skeleton s="" n="" w="" e=""
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_parses_membership_clauses() {
        let parsed = parse_script("way(bn.stops:\"platform\");");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                recurse type=node-way from=stops into=_ role=platform role-restricted=yes
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_rejects_impossible_recursions() {
        let parsed = parse_script("node(bw);");
        assert_eq!(
            parsed.errors[0].to_string(),
            "line 1: parse error: A recursion from type 'bw' produces relations."
        );
        let parsed = parse_script("node(bn);");
        assert_eq!(
            parsed.errors[0].to_string(),
            "line 1: parse error: A recursion from type 'bn' produces ways or relations."
        );
    }

    #[test]
    fn untyped_and_area_recursions_defer_to_the_factory() {
        use crate::ErrorKind;

        // Neither combination is resolvable, but the grammar stays quiet;
        // the factory rejects the empty recurse type as a static error.
        for source in ["area(bn);", ".s(bw);"] {
            let parsed = parse_script(source);
            assert!(
                !parsed.errors.iter().any(|e| e.kind() == ErrorKind::Parse),
                "unexpected parse error for {source:?}: {:?}",
                parsed.errors
            );
            assert!(
                parsed.errors.iter().any(|e| e.kind() == ErrorKind::Static),
                "expected a static error for {source:?}: {:?}",
                parsed.errors
            );
        }
    }
}
