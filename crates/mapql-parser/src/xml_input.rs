//! The XML surface front-end.
//!
//! `<kind attr="…">` becomes `create(kind, line, attrs)` and nested tags
//! become children, so both front-ends feed the evaluator the same tree
//! type. Parsing state lives in a per-parse frame stack; there is no
//! module-level mutable state.

use xml::common::Position;
use xml::reader::{EventReader, ParserConfig, XmlEvent};

use crate::error::Error;
use crate::limit::DEFAULT_NESTING_LIMIT;
use crate::parser::ParsedScript;
use crate::stmt::{AttrMap, Factory, Statement};

struct Frame {
    name: String,
    line: u32,
    attrs: AttrMap,
    text: String,
    children: Vec<Statement>,
}

/// Parses the XML surface syntax into a statement tree.
pub fn parse_xml(input: &str) -> ParsedScript {
    let config = ParserConfig::new()
        .trim_whitespace(true)
        .ignore_comments(true);
    let mut reader = EventReader::new_with_config(input.as_bytes(), config);
    let factory = Factory::new();

    let mut errors: Vec<Error> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Statement> = None;
    let mut depth_reported = false;

    loop {
        let line = reader.position().row as u32 + 1;
        match reader.next() {
            Ok(XmlEvent::StartElement {
                name, attributes, ..
            }) => {
                if stack.len() >= DEFAULT_NESTING_LIMIT && !depth_reported {
                    errors.push(Error::parse(
                        format!(
                            "Nesting of statements is limited to {DEFAULT_NESTING_LIMIT} levels"
                        ),
                        String::new(),
                        line,
                    ));
                    depth_reported = true;
                }
                let mut attrs = AttrMap::new();
                for attr in attributes {
                    attrs.insert(attr.name.local_name, attr.value);
                }
                stack.push(Frame {
                    name: name.local_name,
                    line,
                    attrs,
                    text: String::new(),
                    children: Vec::new(),
                });
            }
            Ok(XmlEvent::Characters(text)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Ok(XmlEvent::EndElement { .. }) => {
                let frame = match stack.pop() {
                    Some(frame) => frame,
                    None => continue,
                };
                match factory.create(&frame.name, frame.line, &frame.attrs) {
                    Ok(mut stmt) => {
                        for child in frame.children {
                            stmt.add_child(child);
                        }
                        if !frame.text.is_empty() {
                            stmt.add_final_text(frame.text);
                        }
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(stmt),
                            None => root = Some(stmt),
                        }
                    }
                    Err(err) => errors.push(err),
                }
            }
            Ok(XmlEvent::EndDocument) => break,
            Ok(_) => {}
            Err(e) => {
                errors.push(Error::parse(format!("Invalid XML: {e}"), String::new(), line));
                break;
            }
        }
    }

    ParsedScript { root, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn it_parses_the_xml_surface() {
        let parsed = parse_xml(
            r#"<osm-script timeout="25">
  <query type="node" into="_">
    <has-kv k="amenity" v="pub" modv=""/>
    <bbox-query s="50.7" n="50.8" w="7.1" e="7.2" into="_"/>
  </query>
  <print from="_" mode="body" order="id" limit="" geometry="skeleton" s="" n="" w="" e=""/>
</osm-script>"#,
        );
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script timeout=25
                query type=node into=_
                    has-kv k=amenity v=pub modv=""
                    bbox-query s=50.7 n=50.8 w=7.1 e=7.2 into=_
                print from=_ mode=body order=id limit="" geometry=skeleton s="" n="" w="" e=""
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_records_factory_errors_per_element() {
        let parsed = parse_xml(r#"<osm-script><teleport to="mars"/></osm-script>"#);
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0]
            .to_string()
            .contains("Unknown statement \"teleport\""));
        // The rest of the tree is still built.
        assert!(parsed.root.is_some());
    }

    #[test]
    fn it_reports_malformed_xml() {
        let parsed = parse_xml("<osm-script><query></osm-script>");
        assert!(!parsed.errors.is_empty());
    }
}
