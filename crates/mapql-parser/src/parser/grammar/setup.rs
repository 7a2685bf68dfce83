use crate::lexer::TokenKind as T;
use crate::parser::Parser;
use crate::stmt::AttrMap;

/// Output formats the engine ships handlers for.
const KNOWN_FORMATS: [&str; 2] = ["xml", "json"];

/// Parses one `[key:value(,value)*]` header and folds it into the
/// `osm-script` attribute map, renaming the surface keys to their
/// attribute names.
pub(crate) fn setup(p: &mut Parser<'_>, attrs: &mut AttrMap) {
    p.advance();
    let key = p.get_identifier_token("Keyword");
    p.clear_until_after(&[T::Colon, T::RBracket], true);
    let mut value = if key == "bbox" {
        p.get_number_token("Number")
    } else {
        p.get_text_token("Value")
    };

    match key.as_str() {
        "out" => {
            if !KNOWN_FORMATS.contains(&value.as_str()) {
                p.err(format!("Unknown output format: {value}"));
            }
            p.clear_until_after(&[T::RBracket], true);
            attrs.insert("output".to_string(), value);
        }
        "diff" | "adiff" => {
            p.clear_until_after(&[T::Comma, T::RBracket], false);
            if p.at(T::Comma) {
                p.advance();
                let until = p.get_text_token("Value");
                attrs.insert("date".to_string(), until);
                p.clear_until_after(&[T::RBracket], true);
            } else {
                p.advance();
            }
            if key == "adiff" {
                attrs.insert("augmented".to_string(), "deletions".to_string());
            }
            attrs.insert("from".to_string(), value);
        }
        "bbox" => {
            for _ in 0..3 {
                p.clear_until_after(&[T::Comma, T::RBracket], false);
                if !p.at(T::Comma) {
                    break;
                }
                p.advance();
                value.push(',');
                value.push_str(&p.get_number_token("Number"));
            }
            p.clear_until_after(&[T::RBracket], true);
            p.global_bbox = true;
            attrs.insert("bbox".to_string(), value);
        }
        "maxsize" => {
            p.clear_until_after(&[T::RBracket], true);
            attrs.insert("element-limit".to_string(), value);
        }
        _ => {
            p.clear_until_after(&[T::RBracket], true);
            attrs.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parse_script;
    use expect_test::expect;

    #[test]
    fn it_parses_headers_into_the_script_node() {
        let parsed = parse_script("[out:json][timeout:25][bbox:50.6,7.0,50.8,7.3];out;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script output=json timeout=25 bbox=50.6,7,50.8,7.3
                print from=_ mode=body order=id limit="" geometry=skeleton s="" n="" w="" e=""
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_renames_maxsize_and_diff_headers() {
        let parsed = parse_script("[maxsize:1073741824][adiff:\"2016-01-01T00:00:00Z\"];out;");
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        expect![[r#"
            osm-script element-limit=1073741824 from=2016-01-01T00:00:00Z augmented=deletions
                print from=_ mode=body order=id limit="" geometry=skeleton s="" n="" w="" e=""
        "#]]
        .assert_eq(&parsed.root.unwrap().dump());
    }

    #[test]
    fn it_rejects_unknown_output_formats() {
        let parsed = parse_script("[out:sandwich];out;");
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0]
            .to_string()
            .contains("Unknown output format: sandwich"));
    }
}
