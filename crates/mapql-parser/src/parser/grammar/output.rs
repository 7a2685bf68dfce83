use crate::lexer::TokenKind as T;
use crate::parser::Parser;
use crate::stmt::{AttrMap, Statement};

/// Parses `out` with its mode, order, limit, geometry and bbox options.
pub(crate) fn output(p: &mut Parser<'_>, from: &str) -> Option<Statement> {
    let line = p.line();
    p.advance();

    let mut mode = "body";
    let mut order = "id";
    let mut limit = String::new();
    let mut geometry = "skeleton";
    let mut south = String::new();
    let mut north = String::new();
    let mut west = String::new();
    let mut east = String::new();

    while p.good() && !p.at(T::Semicolon) {
        if p.at_word("ids") {
            mode = "ids_only";
        } else if p.at_word("tags") {
            mode = "tags";
        } else if p.at_word("skel") {
            mode = "skeleton";
        } else if p.at_word("body") {
            mode = "body";
        } else if p.at_word("meta") {
            mode = "meta";
        } else if p.at_word("quirks") {
            mode = "quirks";
        } else if p.at_word("count") {
            mode = "count";
        } else if p.at_word("qt") {
            order = "quadtile";
        } else if p.at_word("asc") {
            order = "id";
        } else if p.at_word("geom") {
            geometry = "full";
        } else if p.at_word("bb") {
            geometry = "bounds";
        } else if p.at_word("center") {
            geometry = "center";
        } else if p.at(T::Int) {
            limit = p.data().to_string();
        } else if p.at(T::LParen) {
            p.advance();
            south = p.get_number_token("Number");
            p.clear_until_after(&[T::Comma], true);
            west = p.get_number_token("Number");
            p.clear_until_after(&[T::Comma], true);
            north = p.get_number_token("Number");
            p.clear_until_after(&[T::Comma], true);
            east = p.get_number_token("Number");
            p.clear_until_after(&[T::RParen], false);
        } else {
            p.err(format!("Invalid parameter for print: \"{}\"", p.data()));
        }
        p.advance();
    }

    let mut attrs = AttrMap::new();
    attrs.insert(
        "from".to_string(),
        if from.is_empty() { "_" } else { from }.to_string(),
    );
    attrs.insert("mode".to_string(), mode.to_string());
    attrs.insert("order".to_string(), order.to_string());
    attrs.insert("limit".to_string(), limit);
    attrs.insert("geometry".to_string(), geometry.to_string());
    attrs.insert("s".to_string(), south);
    attrs.insert("n".to_string(), north);
    attrs.insert("w".to_string(), west);
    attrs.insert("e".to_string(), east);
    p.create("print", line, attrs)
}

#[cfg(test)]
mod tests {
    use crate::parse_script;
    use expect_test::expect;

    #[test]
    fn it_parses_out_options() {
        let parsed = parse_script(".a out meta qt 50 geom(50.7,7.1,50.8,7.2);");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                print from=a mode=meta order=quadtile limit=50 geometry=full s=50.7 n=50.8 w=7.1 e=7.2
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_rejects_garbage_out_options() {
        let parsed = parse_script("out sideways;");
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0]
            .to_string()
            .contains("Invalid parameter for print: \"sideways\""));
    }
}
