use crate::parser::grammar::collect_substatements;
use crate::parser::Parser;
use crate::stmt::{AttrMap, Statement};

/// Parses `foreach [.from] [->.into] ( statement; … )`.
pub(crate) fn foreach(p: &mut Parser<'_>) -> Option<Statement> {
    let line = p.line();
    p.advance();

    let from = p.probe_from();
    let into = p.probe_into();
    let substatements = collect_substatements(p);

    let mut attrs = AttrMap::new();
    attrs.insert("from".to_string(), from);
    attrs.insert("into".to_string(), into);
    let mut stmt = p.create("foreach", line, attrs)?;
    for sub in substatements {
        stmt.add_child(sub);
    }
    Some(stmt)
}

#[cfg(test)]
mod tests {
    use crate::parse_script;
    use expect_test::expect;

    #[test]
    fn it_parses_foreach_with_sets() {
        let parsed = parse_script("foreach.a->.b(out;);");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                foreach from=a into=b
                    print from=_ mode=body order=id limit="" geometry=skeleton s="" n="" w="" e=""
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }
}
