use crate::lexer::TokenKind as T;
use crate::parser::grammar::recurse::determine_recurse_type;
use crate::parser::Parser;
use crate::stmt::{AttrMap, ObjectType, Statement};

/// A filter collected while parsing a query, before the query node is
/// materialized. The reduction rules below decide whether a clause is
/// hoisted to a standalone statement or wrapped in a `query` parent.
pub(crate) struct Clause {
    statement: &'static str,
    line: u32,
    attributes: Vec<String>,
}

impl Clause {
    fn new(statement: &'static str, line: u32) -> Self {
        Self {
            statement,
            line,
            attributes: Vec::new(),
        }
    }
}

/// Parses the clause list of a query statement and reduces it.
pub(crate) fn query(
    p: &mut Parser<'_>,
    object: Option<ObjectType>,
    from: &str,
) -> Option<Statement> {
    let query_line = p.line();
    let mut clauses = Vec::new();

    while p.good() && (p.at(T::LBracket) || p.at(T::LParen) || p.at(T::Dot)) {
        let before = p.pos();
        if p.at(T::LBracket) {
            tag_filter(p, &mut clauses);
        } else if p.at(T::LParen) {
            paren_clause(p, &mut clauses);
        } else {
            let line = p.line();
            let mut clause = Clause::new("item", line);
            clause.attributes.push(p.probe_from());
            clauses.push(clause);
        }
        if p.pos() == before {
            p.advance();
        }
    }
    let into = p.probe_into();

    reduce(p, object, from, &into, query_line, clauses)
}

/// `[key]`, `[!key]`, `[key=value]`, `[key~regex,i]`, `[~key~regex]`, …
fn tag_filter(p: &mut Parser<'_>, clauses: &mut Vec<Clause>) {
    let line = p.line();
    p.advance();

    let key_regex = p.at(T::Tilde);
    if key_regex {
        p.advance();
    }

    if p.at(T::Bang) {
        // [!key] is the absence shortcut for [key !~ ".*"].
        p.advance();
        let key = p.get_text_token("Key");
        p.clear_until_after(&[T::RBracket], true);
        let mut clause = Clause::new("has-kv_regex", line);
        clause.attributes.push(key);
        clause.attributes.push(".*".to_string());
        clause.attributes.push("!".to_string());
        clauses.push(clause);
        return;
    }

    let key = p.get_text_token("Key");
    p.clear_until_after(
        &[T::Bang, T::Tilde, T::NotTilde, T::Eq, T::NotEq, T::RBracket],
        false,
    );

    let mut straight = true;
    if p.at(T::Bang) {
        straight = false;
        p.advance();
        p.clear_until_after(&[T::Tilde, T::Eq, T::RBracket], false);
    }

    let key_regex_err = |p: &mut Parser<'_>| {
        p.err(
            "A regular expression for a key can only be combined with a regular expression as value criterion",
        );
    };

    if p.at(T::RBracket) {
        if key_regex {
            key_regex_err(p);
        }
        let mut clause = Clause::new("has-kv", line);
        clause.attributes.push(key);
        clause.attributes.push(String::new());
        clause
            .attributes
            .push(if straight { "" } else { "!" }.to_string());
        clauses.push(clause);
        p.advance();
    } else if p.at(T::Eq) || p.at(T::NotEq) {
        if key_regex {
            key_regex_err(p);
        }
        straight = p.at(T::Eq);
        p.advance();
        if p.good() && p.at(T::RBracket) {
            p.advance();
        } else {
            let value = p.get_text_token("Value");
            if !value.is_empty() {
                let mut clause = Clause::new("has-kv", line);
                clause.attributes.push(key);
                clause.attributes.push(value);
                clause
                    .attributes
                    .push(if straight { "" } else { "!" }.to_string());
                clauses.push(clause);
            }
            p.clear_until_after(&[T::RBracket], true);
        }
    } else if p.at(T::Tilde) || p.at(T::NotTilde) {
        if p.at(T::NotTilde) {
            straight = false;
        }
        p.advance();
        let value = p.get_text_token("Value");
        let mut statement = if key_regex {
            "has-kv_keyregex"
        } else {
            "has-kv_regex"
        };
        p.clear_until_after(&[T::Comma, T::RBracket], false);
        if p.at(T::Comma) {
            statement = if key_regex {
                "has-kv_keyregex_icase"
            } else {
                "has-kv_icase"
            };
            p.advance();
            if p.at_word("i") {
                p.advance();
            } else {
                p.err("Case insensitivity marker \"i\" expected");
            }
            p.clear_until_after(&[T::RBracket], false);
        }
        if p.at(T::RBracket) {
            p.advance();
        }
        let mut clause = Clause::new(statement, line);
        clause.attributes.push(key);
        clause.attributes.push(value);
        clause
            .attributes
            .push(if straight { "" } else { "!" }.to_string());
        clauses.push(clause);
    } else {
        p.clear_until_after(&[T::RBracket], true);
    }
}

/// The parenthesized clauses: spatial, temporal, membership, id and bbox.
fn paren_clause(p: &mut Parser<'_>, clauses: &mut Vec<Clause>) {
    let line = p.line();
    p.advance();
    if !p.good() {
        p.err("':' or '.' expected.");
        return;
    }

    if p.at_word("around") {
        let mut clause = Clause::new("around", line);
        p.advance();
        clause.attributes.push(p.probe_from());
        p.clear_until_after(&[T::Colon], true);
        clause
            .attributes
            .push(p.get_number_token("Floating point number"));
        p.clear_until_after(&[T::Comma, T::RParen], false);
        if p.at(T::Comma) {
            p.advance();
            clause
                .attributes
                .push(p.get_number_token("Floating point number"));
            p.clear_until_after(&[T::Comma], true);
            clause
                .attributes
                .push(p.get_number_token("Floating point number"));
        } else {
            clause.attributes.push(String::new());
            clause.attributes.push(String::new());
        }
        clauses.push(clause);
        p.clear_until_after(&[T::RParen], true);
    } else if p.at_word("poly") {
        let mut clause = Clause::new("polygon", line);
        p.advance();
        p.clear_until_after(&[T::Colon], true);
        clause
            .attributes
            .push(p.get_text_token("list of coordinates"));
        p.clear_until_after(&[T::RParen], true);
        clauses.push(clause);
    } else if p.at_word("user") || p.at_word("uid") {
        let is_user = p.at_word("user");
        let mut clause = Clause::new(if is_user { "user" } else { "uid" }, line);
        let expectation = if is_user { "User name" } else { "Positive integer" };
        p.advance();
        p.clear_until_after(&[T::Colon, T::RParen], false);
        if p.at(T::Colon) {
            loop {
                p.advance();
                clause.attributes.push(p.get_text_token(expectation));
                p.clear_until_after(&[T::Comma, T::RParen], false);
                if !p.at(T::Comma) {
                    break;
                }
            }
            p.clear_until_after(&[T::RParen], true);
        }
        clauses.push(clause);
    } else if p.at_word("newer") {
        let mut clause = Clause::new("newer", line);
        p.advance();
        p.clear_until_after(&[T::Colon], true);
        clause
            .attributes
            .push(p.get_text_token("\"YYYY-MM-DDThh:mm:ssZ\""));
        p.clear_until_after(&[T::RParen], true);
        clauses.push(clause);
    } else if p.at_word("changed") {
        let mut clause = Clause::new("changed", line);
        p.advance();
        p.clear_until_after(&[T::Colon, T::RParen], false);
        if p.at(T::Colon) {
            p.advance();
            let since = p.get_text_token("\"YYYY-MM-DDThh:mm:ssZ\"");
            clause.attributes.push(since.clone());
            p.clear_until_after(&[T::Comma, T::RParen], false);
            if p.at(T::Comma) {
                p.advance();
                clause
                    .attributes
                    .push(p.get_text_token("\"YYYY-MM-DDThh:mm:ssZ\""));
            } else {
                clause.attributes.push(since);
            }
        } else {
            clause.attributes.push("auto".to_string());
            clause.attributes.push("auto".to_string());
        }
        p.clear_until_after(&[T::RParen], true);
        clauses.push(clause);
    } else if ["r", "w", "bn", "bw", "br"].iter().any(|f| p.at_word(f)) {
        let mut clause = Clause::new("recurse", line);
        clause
            .attributes
            .push(p.get_identifier_token("Recurse type"));
        clause.attributes.push(p.probe_from());
        p.clear_until_after(&[T::Colon, T::RParen], false);
        if p.at(T::Colon) {
            p.advance();
            clause.attributes.push(p.get_text_token("Role"));
        }
        p.clear_until_after(&[T::RParen], true);
        clauses.push(clause);
    } else if p.at_word("area") {
        let mut clause = Clause::new("area", line);
        p.advance();
        clause.attributes.push(p.probe_from());
        if p.at(T::Colon) {
            p.advance();
            clause.attributes.push(p.get_text_token("Positive integer"));
        }
        p.clear_until_after(&[T::RParen], true);
        clauses.push(clause);
    } else if p.at_word("pivot") {
        let mut clause = Clause::new("pivot", line);
        p.advance();
        clause.attributes.push(p.probe_from());
        p.clear_until_after(&[T::RParen], true);
        clauses.push(clause);
    } else if matches!(p.peek(), T::Lt | T::LtLt | T::Gt | T::GtGt) {
        let mut clause = Clause::new("recurse", line);
        clause.attributes.push(p.data().to_string());
        p.advance();
        clause.attributes.push(p.probe_from());
        p.clear_until_after(&[T::RParen], true);
        clauses.push(clause);
    } else if matches!(p.peek(), T::Int | T::Decimal | T::Minus) {
        let first_number = p.get_number_token("Number");
        p.clear_until_after(&[T::Comma, T::RParen], false);
        if p.at(T::RParen) {
            let mut clause = Clause::new("id-query", line);
            clause.attributes.push(first_number);
            p.clear_until_after(&[T::RParen], true);
            clauses.push(clause);
        } else {
            let mut clause = Clause::new("bbox-query", line);
            clause.attributes.push(first_number);
            for _ in 0..3 {
                p.clear_until_after(&[T::Comma], true);
                clause.attributes.push(p.get_number_token("Number"));
            }
            p.clear_until_after(&[T::RParen], true);
            clauses.push(clause);
        }
    } else {
        p.err("Unknown query clause");
        p.clear_until_after(&[T::RParen], true);
    }
}

/// Applies the query reduction rules: hoist a lone clause when it can
/// stand on its own, otherwise wrap everything in a `query` node.
fn reduce(
    p: &mut Parser<'_>,
    object: Option<ObjectType>,
    from: &str,
    into: &str,
    line: u32,
    clauses: Vec<Clause>,
) -> Option<Statement> {
    if clauses.is_empty() {
        if from.is_empty() {
            if p.global_bbox {
                return create_query(p, object, into, line);
            }
            p.err("An empty query is not allowed");
            return None;
        }
        if object.is_none() {
            return create_item(p, from, line);
        }
        let mut query = create_query(p, object, into, line)?;
        if let Some(item) = create_item(p, from, line) {
            query.add_child(item);
        }
        return Some(query);
    }

    if clauses.len() == 1 && from.is_empty() {
        let clause = &clauses[0];
        if needs_type_context(clause, object) {
            let mut query = create_query(p, object, into, line)?;
            if let Some(sub) = substatement(p, clause, object, into) {
                query.add_child(sub);
            }
            return Some(query);
        }
        return substatement(p, clause, object, into);
    }

    let mut query = create_query(p, object, into, line)?;
    if !from.is_empty() {
        if let Some(item) = create_item(p, from, line) {
            query.add_child(item);
        }
    }
    for clause in &clauses {
        if let Some(sub) = substatement(p, clause, object, "_") {
            query.add_child(sub);
        }
    }
    Some(query)
}

/// A lone clause must stay inside a `query` when it is a predicate, or a
/// filter that needs the query's type to select anything but nodes.
fn needs_type_context(clause: &Clause, object: Option<ObjectType>) -> bool {
    match clause.statement {
        s if s.starts_with("has-kv") => true,
        "changed" => true,
        "area" | "around" | "pivot" | "polygon" | "bbox-query" => {
            object != Some(ObjectType::Node)
        }
        "recurse" => matches!(
            clause.attributes[0].as_str(),
            "<" | "<<" | ">" | ">>"
        ),
        _ => false,
    }
}

fn create_query(
    p: &mut Parser<'_>,
    object: Option<ObjectType>,
    into: &str,
    line: u32,
) -> Option<Statement> {
    let mut attrs = AttrMap::new();
    attrs.insert(
        "type".to_string(),
        object.map(ObjectType::name).unwrap_or("").to_string(),
    );
    attrs.insert("into".to_string(), into.to_string());
    p.create("query", line, attrs)
}

fn create_item(p: &mut Parser<'_>, set: &str, line: u32) -> Option<Statement> {
    let mut attrs = AttrMap::new();
    attrs.insert("set".to_string(), set.to_string());
    p.create("item", line, attrs)
}

/// Converts a collected clause into its statement node.
fn substatement(
    p: &mut Parser<'_>,
    clause: &Clause,
    object: Option<ObjectType>,
    into: &str,
) -> Option<Statement> {
    let type_name = object.map(ObjectType::name).unwrap_or("").to_string();
    let a = &clause.attributes;
    let mut attrs = AttrMap::new();
    match clause.statement {
        "has-kv" | "has-kv_regex" | "has-kv_icase" | "has-kv_keyregex"
        | "has-kv_keyregex_icase" => {
            let key_regex = clause.statement.starts_with("has-kv_keyregex");
            let value_regex = clause.statement != "has-kv";
            let icase = clause.statement.ends_with("_icase");
            attrs.insert(if key_regex { "regk" } else { "k" }.to_string(), a[0].clone());
            attrs.insert(
                if value_regex { "regv" } else { "v" }.to_string(),
                a[1].clone(),
            );
            attrs.insert(
                "modv".to_string(),
                if a[2].is_empty() { "" } else { "not" }.to_string(),
            );
            if icase {
                attrs.insert("case".to_string(), "ignore".to_string());
            }
            p.create("has-kv", clause.line, attrs)
        }
        "around" => {
            attrs.insert("from".to_string(), a[0].clone());
            attrs.insert("into".to_string(), into.to_string());
            attrs.insert("radius".to_string(), a[1].clone());
            attrs.insert("lat".to_string(), a[2].clone());
            attrs.insert("lon".to_string(), a[3].clone());
            p.create("around", clause.line, attrs)
        }
        "polygon" => {
            attrs.insert("bounds".to_string(), a[0].clone());
            attrs.insert("into".to_string(), into.to_string());
            p.create("polygon-query", clause.line, attrs)
        }
        "user" | "uid" => {
            attrs.insert("type".to_string(), type_name);
            attrs.insert("into".to_string(), into.to_string());
            let base = if clause.statement == "user" {
                "name"
            } else {
                "uid"
            };
            for (i, value) in a.iter().enumerate() {
                let key = if i == 0 {
                    base.to_string()
                } else {
                    format!("{base}_{i}")
                };
                attrs.insert(key, value.clone());
            }
            p.create("user", clause.line, attrs)
        }
        "newer" => {
            attrs.insert("than".to_string(), a[0].clone());
            p.create("newer", clause.line, attrs)
        }
        "changed" => {
            attrs.insert("since".to_string(), a[0].clone());
            attrs.insert("until".to_string(), a[1].clone());
            attrs.insert("into".to_string(), into.to_string());
            p.create("changed", clause.line, attrs)
        }
        "recurse" => {
            let kind = determine_recurse_type(p, &a[0], object, clause.line);
            attrs.insert("type".to_string(), kind);
            attrs.insert("from".to_string(), a[1].clone());
            attrs.insert("into".to_string(), into.to_string());
            if let Some(role) = a.get(2) {
                attrs.insert("role".to_string(), role.clone());
                attrs.insert("role-restricted".to_string(), "yes".to_string());
            }
            p.create("recurse", clause.line, attrs)
        }
        "id-query" => {
            attrs.insert("type".to_string(), type_name);
            attrs.insert("ref".to_string(), a[0].clone());
            attrs.insert("into".to_string(), into.to_string());
            p.create("id-query", clause.line, attrs)
        }
        "bbox-query" => {
            attrs.insert("s".to_string(), a[0].clone());
            attrs.insert("n".to_string(), a[2].clone());
            attrs.insert("w".to_string(), a[1].clone());
            attrs.insert("e".to_string(), a[3].clone());
            attrs.insert("into".to_string(), into.to_string());
            p.create("bbox-query", clause.line, attrs)
        }
        "area" => {
            attrs.insert("from".to_string(), a[0].clone());
            attrs.insert("into".to_string(), into.to_string());
            if let Some(id) = a.get(1) {
                attrs.insert("ref".to_string(), id.clone());
            }
            p.create("area-query", clause.line, attrs)
        }
        "pivot" => {
            attrs.insert("from".to_string(), a[0].clone());
            attrs.insert("into".to_string(), into.to_string());
            p.create("pivot", clause.line, attrs)
        }
        "item" => {
            attrs.insert("set".to_string(), a[0].clone());
            p.create("item", clause.line, attrs)
        }
        _ => None,
    }
}

/// Parses `is_in`, with or without an explicit coordinate.
pub(crate) fn coord_query(p: &mut Parser<'_>, from: &str) -> Option<Statement> {
    let line = p.line();
    p.advance();

    let mut lat = String::new();
    let mut lon = String::new();
    if p.at(T::LParen) {
        p.advance();
        lat = p.get_number_token("Number");
        p.clear_until_after(&[T::Comma, T::RParen], false);
        if p.at(T::Comma) {
            p.advance();
            lon = p.get_number_token("Number");
            p.clear_until_after(&[T::RParen], false);
        }
        if p.good() {
            p.advance();
        }
    }
    let into = p.probe_into();

    let mut attrs = AttrMap::new();
    attrs.insert(
        "from".to_string(),
        if from.is_empty() { "_" } else { from }.to_string(),
    );
    attrs.insert("into".to_string(), into);
    attrs.insert("lat".to_string(), lat);
    attrs.insert("lon".to_string(), lon);
    p.create("coord-query", line, attrs)
}

/// Parses `map_to_area`.
pub(crate) fn map_to_area(p: &mut Parser<'_>, from: &str) -> Option<Statement> {
    let line = p.line();
    p.advance();
    let into = p.probe_into();

    let mut attrs = AttrMap::new();
    attrs.insert(
        "from".to_string(),
        if from.is_empty() { "_" } else { from }.to_string(),
    );
    attrs.insert("into".to_string(), into);
    p.create("map-to-area", line, attrs)
}

#[cfg(test)]
mod tests {
    use crate::parse_script;
    use expect_test::expect;

    #[test]
    fn it_reduces_a_query_with_tag_and_bbox_clauses() {
        let parsed = parse_script("node[amenity=pub](50.7,7.1,50.8,7.2);out;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                query type=node into=_
                    has-kv k=amenity v=pub modv=""
                    bbox-query s=50.7 n=50.8 w=7.1 e=7.2 into=_
                print from=_ mode=body order=id limit="" geometry=skeleton s="" n="" w="" e=""
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_wraps_a_lone_tag_filter_in_a_query() {
        let parsed = parse_script("way[highway~\"^primary$\",i];out geom;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                query type=way into=_
                    has-kv k=highway regv=^primary$ modv="" case=ignore
                print from=_ mode=body order=id limit="" geometry=full s="" n="" w="" e=""
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_hoists_a_lone_node_bbox() {
        let parsed = parse_script("node(50.7,7.1,50.8,7.2);");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                bbox-query s=50.7 n=50.8 w=7.1 e=7.2 into=_
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_keeps_a_way_bbox_inside_the_query() {
        let parsed = parse_script("way(50.7,7.1,50.8,7.2);");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                query type=way into=_
                    bbox-query s=50.7 n=50.8 w=7.1 e=7.2 into=_
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_emits_an_item_for_a_bare_set_reference() {
        let parsed = parse_script(".a;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                item set=a
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_rejects_empty_queries_without_a_global_bbox() {
        let parsed = parse_script("node;");
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0]
            .to_string()
            .contains("An empty query is not allowed"));
    }

    #[test]
    fn it_allows_empty_queries_under_a_global_bbox() {
        let parsed = parse_script("[bbox:50.6,7.0,50.8,7.3];node;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script bbox=50.6,7,50.8,7.3
                query type=node into=_
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_parses_spatial_and_temporal_clauses_together() {
        let parsed = parse_script(
            "node(around.centers:200.0)[amenity=cafe](newer:\"2024-01-01T00:00:00Z\")->.hits;",
        );
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                query type=node into=hits
                    around from=centers into=_ radius=200
                    has-kv k=amenity v=cafe modv=""
                    newer than=2024-01-01T00:00:00Z
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_parses_an_id_query_with_type() {
        let parsed = parse_script("rel(1234);");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                id-query type=relation ref=1234 into=_
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_parses_area_and_pivot_clauses() {
        let parsed = parse_script("node(area.cities)(pivot.b);");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script
                query type=node into=_
                    area-query from=cities into=_
                    pivot from=b into=_
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_reports_unknown_clauses() {
        let parsed = parse_script("node(sideways:3);");
        assert!(parsed.errors[0].to_string().contains("Unknown query clause"));
    }
}
