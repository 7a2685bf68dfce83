//! Statement construction and attribute validation.
//!
//! Both front-ends hand `(kind, line, attribute map)` triples to the
//! factory; everything the grammar does not already guarantee is checked
//! here. Unknown kinds, unknown attributes, missing required attributes,
//! and malformed values are static errors: the tree is still assembled,
//! but evaluation is refused.

use indexmap::IndexMap;
use regex::RegexBuilder;

use crate::error::Error;
use crate::stmt::{
    AggregateKey, Aggregator, ArithOp, AttrMap, Bbox, CountType, GeometryMode, HasKv,
    KeyPredicate, ObjectType, Print, PrintMode, RecurseKind, Script, SortOrder, Statement,
    StatementKind, TagTarget, ValuePredicate,
};

/// Registry of statement kinds, keyed by kind string.
#[derive(Debug, Default)]
pub struct Factory;

impl Factory {
    pub fn new() -> Self {
        Factory
    }

    /// Builds a fresh statement node, validating `attrs` against the
    /// schema of `name`.
    pub fn create(&self, name: &str, line: u32, attrs: &AttrMap) -> Result<Statement, Error> {
        let mut a = Attrs::new(name, line, attrs);
        let kind = match name {
            "osm-script" => script(&mut a)?,
            "union" => StatementKind::Union { into: a.into_set()? },
            "difference" => StatementKind::Difference { into: a.into_set()? },
            "foreach" => StatementKind::Foreach {
                from: a.from_set()?,
                into: a.into_set()?,
            },
            "query" => StatementKind::Query {
                object: a.object_type("type")?,
                into: a.into_set()?,
            },
            "item" => StatementKind::Item {
                set: a.take_or("set", "_"),
            },
            "id-query" => StatementKind::IdQuery {
                object: a.required_object_type("type")?,
                id: a.u64_required("ref")?,
                into: a.into_set()?,
            },
            "has-kv" => has_kv(&mut a)?,
            "bbox-query" => StatementKind::BboxQuery {
                bbox: Bbox {
                    south: a.f64_required("s")?,
                    north: a.f64_required("n")?,
                    west: a.f64_required("w")?,
                    east: a.f64_required("e")?,
                },
                into: a.into_set()?,
            },
            "around" => around(&mut a)?,
            "recurse" => recurse(&mut a)?,
            "polygon-query" => polygon(&mut a)?,
            "user" => user(&mut a)?,
            "newer" => StatementKind::Newer {
                than: a.require("than")?,
            },
            "area-query" => StatementKind::AreaQuery {
                from: a.from_set()?,
                into: a.into_set()?,
                id: a.u64_optional("ref")?,
            },
            "coord-query" => StatementKind::CoordQuery {
                from: a.from_set()?,
                into: a.into_set()?,
                point: a.point("lat", "lon")?,
            },
            "map-to-area" => StatementKind::MapToArea {
                from: a.from_set()?,
                into: a.into_set()?,
            },
            "pivot" => StatementKind::Pivot {
                from: a.from_set()?,
                into: a.into_set()?,
            },
            "changed" => StatementKind::Changed {
                since: a.take_or("since", "auto"),
                until: a.take_or("until", "auto"),
                into: a.into_set()?,
            },
            "make" => StatementKind::Make {
                into: a.into_set()?,
                object: a.take_or("type", ""),
            },
            "convert" => StatementKind::Convert {
                into: a.into_set()?,
                object: a.take_or("type", ""),
            },
            "set-tag" => set_tag(&mut a)?,
            "value-fixed" => StatementKind::ValueFixed {
                value: a.require("v")?,
            },
            "value-id" => StatementKind::ValueId,
            "value-count" => value_count(&mut a)?,
            "value-union-value" => aggregate(&mut a, Aggregator::Union)?,
            "value-min-value" => aggregate(&mut a, Aggregator::Min)?,
            "value-max-value" => aggregate(&mut a, Aggregator::Max)?,
            "value-set-value" => aggregate(&mut a, Aggregator::Set)?,
            "value-plus" => StatementKind::ValueArith { op: ArithOp::Plus },
            "value-minus" => StatementKind::ValueArith { op: ArithOp::Minus },
            "value-times" => StatementKind::ValueArith { op: ArithOp::Times },
            "value-divided" => StatementKind::ValueArith {
                op: ArithOp::Divided,
            },
            "print" => print(&mut a)?,
            _ => {
                return Err(Error::invalid(
                    format!("Unknown statement \"{name}\""),
                    line,
                ))
            }
        };
        a.finish()?;
        Ok(Statement::new(kind, line))
    }
}

/// Tracks which attributes a kind's builder consumed, so leftovers can be
/// rejected as unknown.
struct Attrs<'a> {
    name: &'a str,
    line: u32,
    map: IndexMap<&'a str, &'a str>,
}

impl<'a> Attrs<'a> {
    fn new(name: &'a str, line: u32, attrs: &'a AttrMap) -> Self {
        let map = attrs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        Self { name, line, map }
    }

    fn err(&self, message: String) -> Error {
        Error::invalid(message, self.line)
    }

    fn take(&mut self, key: &str) -> Option<String> {
        self.map.shift_remove(key).map(str::to_string)
    }

    fn take_or(&mut self, key: &str, default: &str) -> String {
        match self.take(key) {
            Some(v) if !v.is_empty() => v,
            _ => default.to_string(),
        }
    }

    fn require(&mut self, key: &str) -> Result<String, Error> {
        self.take(key).ok_or_else(|| {
            self.err(format!(
                "Statement \"{}\" requires attribute \"{key}\"",
                self.name
            ))
        })
    }

    fn from_set(&mut self) -> Result<String, Error> {
        Ok(self.take_or("from", "_"))
    }

    fn into_set(&mut self) -> Result<String, Error> {
        Ok(self.take_or("into", "_"))
    }

    fn u64_required(&mut self, key: &str) -> Result<u64, Error> {
        let raw = self.require(key)?;
        self.parse_u64(key, &raw)
    }

    fn u64_optional(&mut self, key: &str) -> Result<Option<u64>, Error> {
        match self.take(key) {
            None => Ok(None),
            Some(raw) if raw.is_empty() => Ok(None),
            Some(raw) => self.parse_u64(key, &raw).map(Some),
        }
    }

    fn parse_u64(&self, key: &str, raw: &str) -> Result<u64, Error> {
        raw.parse().map_err(|_| {
            self.err(format!(
                "Attribute \"{key}\" of \"{}\" must be a nonnegative integer, found \"{raw}\"",
                self.name
            ))
        })
    }

    fn f64_required(&mut self, key: &str) -> Result<f64, Error> {
        let raw = self.require(key)?;
        self.parse_f64(key, &raw)
    }

    fn parse_f64(&self, key: &str, raw: &str) -> Result<f64, Error> {
        raw.parse().map_err(|_| {
            self.err(format!(
                "Attribute \"{key}\" of \"{}\" must be a number, found \"{raw}\"",
                self.name
            ))
        })
    }

    /// Reads a coordinate pair where either both or neither component is
    /// present.
    fn point(&mut self, lat_key: &str, lon_key: &str) -> Result<Option<(f64, f64)>, Error> {
        let lat = self.take(lat_key).filter(|v| !v.is_empty());
        let lon = self.take(lon_key).filter(|v| !v.is_empty());
        match (lat, lon) {
            (None, None) => Ok(None),
            (Some(lat), Some(lon)) => Ok(Some((
                self.parse_f64(lat_key, &lat)?,
                self.parse_f64(lon_key, &lon)?,
            ))),
            _ => Err(self.err(format!(
                "Statement \"{}\" needs either both \"{lat_key}\" and \"{lon_key}\" or neither",
                self.name
            ))),
        }
    }

    /// `""` means absent for an optional typed attribute.
    fn object_type(&mut self, key: &str) -> Result<Option<ObjectType>, Error> {
        match self.take(key) {
            None => Ok(None),
            Some(raw) if raw.is_empty() => Ok(None),
            Some(raw) => ObjectType::parse(&raw)
                .map(Some)
                .ok_or_else(|| self.err(format!("Unknown type \"{raw}\""))),
        }
    }

    fn required_object_type(&mut self, key: &str) -> Result<ObjectType, Error> {
        let raw = self.require(key)?;
        ObjectType::parse(&raw).ok_or_else(|| self.err(format!("Unknown type \"{raw}\"")))
    }

    /// Collects `base`, `base_1`, `base_2`, … in index order.
    fn take_indexed(&mut self, base: &str) -> Vec<String> {
        let mut values = Vec::new();
        let mut i = 0;
        loop {
            let key = if i == 0 {
                base.to_string()
            } else {
                format!("{base}_{i}")
            };
            match self.take(&key) {
                Some(v) => {
                    if !v.is_empty() {
                        values.push(v);
                    }
                }
                None => break,
            }
            i += 1;
        }
        values
    }

    fn finish(self) -> Result<(), Error> {
        if let Some((key, _)) = self.map.first() {
            return Err(Error::invalid(
                format!("Unknown attribute \"{key}\" in statement \"{}\"", self.name),
                self.line,
            ));
        }
        Ok(())
    }
}

fn script(a: &mut Attrs<'_>) -> Result<StatementKind, Error> {
    let bbox = match a.take("bbox").filter(|v| !v.is_empty()) {
        None => None,
        Some(raw) => {
            let parts: Vec<&str> = raw.split(',').collect();
            if parts.len() != 4 {
                return Err(a.err(format!(
                    "Attribute \"bbox\" must hold four comma-separated numbers, found \"{raw}\""
                )));
            }
            Some(Bbox {
                south: a.parse_f64("bbox", parts[0].trim())?,
                west: a.parse_f64("bbox", parts[1].trim())?,
                north: a.parse_f64("bbox", parts[2].trim())?,
                east: a.parse_f64("bbox", parts[3].trim())?,
            })
        }
    };
    let augmented = match a.take("augmented") {
        None => false,
        Some(v) if v == "deletions" => true,
        Some(v) => {
            return Err(a.err(format!(
                "Attribute \"augmented\" accepts only \"deletions\", found \"{v}\""
            )))
        }
    };
    let element_limit = a.u64_optional("element-limit")?;
    let timeout = a.u64_optional("timeout")?;
    Ok(StatementKind::Script(Script {
        element_limit,
        output: a.take("output").filter(|v| !v.is_empty()),
        timeout,
        date: a.take("date").filter(|v| !v.is_empty()),
        from: a.take("from").filter(|v| !v.is_empty()),
        augmented,
        bbox,
    }))
}

fn has_kv(a: &mut Attrs<'_>) -> Result<StatementKind, Error> {
    let negated = match a.take("modv") {
        None => false,
        Some(v) if v.is_empty() => false,
        Some(v) if v == "not" || v == "!" => true,
        Some(v) => {
            return Err(a.err(format!(
                "Attribute \"modv\" accepts only \"\" or \"not\", found \"{v}\""
            )))
        }
    };
    let ignore_case = match a.take("case") {
        None => false,
        Some(v) if v == "ignore" => true,
        Some(v) => {
            return Err(a.err(format!(
                "Attribute \"case\" accepts only \"ignore\", found \"{v}\""
            )))
        }
    };

    let key = match (a.take("k"), a.take("regk")) {
        (Some(k), None) => KeyPredicate::Equals(k),
        (None, Some(pattern)) => {
            let re = compile_regex(a, &pattern, ignore_case)?;
            KeyPredicate::Matches { pattern, re }
        }
        (Some(_), Some(_)) => {
            return Err(a.err("Statement \"has-kv\" must not have both \"k\" and \"regk\"".into()))
        }
        (None, None) => {
            return Err(a.err("Statement \"has-kv\" needs either \"k\" or \"regk\"".into()))
        }
    };

    let value = match (a.take("v"), a.take("regv")) {
        (Some(v), None) => {
            if v.is_empty() {
                ValuePredicate::Any
            } else {
                ValuePredicate::Equals(v)
            }
        }
        (None, Some(pattern)) => {
            let re = compile_regex(a, &pattern, ignore_case)?;
            ValuePredicate::Matches { pattern, re }
        }
        (Some(_), Some(_)) => {
            return Err(a.err("Statement \"has-kv\" must not have both \"v\" and \"regv\"".into()))
        }
        (None, None) => ValuePredicate::Any,
    };

    if matches!(key, KeyPredicate::Matches { .. })
        && !matches!(value, ValuePredicate::Matches { .. })
    {
        return Err(a.err(
            "A regular expression for a key can only be combined with a regular expression as value criterion"
                .into(),
        ));
    }

    Ok(StatementKind::HasKv(HasKv {
        key,
        value,
        negated,
        ignore_case,
    }))
}

fn compile_regex(a: &Attrs<'_>, pattern: &str, ignore_case: bool) -> Result<regex::Regex, Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| a.err(format!("Invalid regular expression \"{pattern}\": {e}")))
}

fn around(a: &mut Attrs<'_>) -> Result<StatementKind, Error> {
    let from = a.from_set()?;
    let into = a.into_set()?;
    let radius = a.f64_required("radius")?;
    if radius < 0.0 {
        return Err(a.err(format!("Around radius must be nonnegative, found {radius}")));
    }
    Ok(StatementKind::Around {
        from,
        into,
        radius,
        center: a.point("lat", "lon")?,
    })
}

fn recurse(a: &mut Attrs<'_>) -> Result<StatementKind, Error> {
    let raw = a.require("type")?;
    let kind = RecurseKind::parse(&raw)
        .ok_or_else(|| a.err(format!("Unknown recurse type \"{raw}\"")))?;
    let from = a.from_set()?;
    let into = a.into_set()?;
    let role = a.take("role");
    match a.take("role-restricted") {
        None => {
            if role.is_some() {
                return Err(
                    a.err("Attribute \"role\" requires \"role-restricted\" set to \"yes\"".into())
                );
            }
        }
        Some(v) if v == "yes" => {
            if role.is_none() {
                return Err(
                    a.err("Attribute \"role-restricted\" requires a \"role\" attribute".into())
                );
            }
        }
        Some(v) => {
            return Err(a.err(format!(
                "Attribute \"role-restricted\" accepts only \"yes\", found \"{v}\""
            )))
        }
    }
    Ok(StatementKind::Recurse {
        kind,
        from,
        into,
        role,
    })
}

fn polygon(a: &mut Attrs<'_>) -> Result<StatementKind, Error> {
    let bounds = a.require("bounds")?;
    let mut points = Vec::new();
    let mut coords = bounds.split_whitespace();
    while let Some(lat) = coords.next() {
        let lon = coords.next().ok_or_else(|| {
            a.err("Polygon bounds need an even number of coordinates".to_string())
        })?;
        points.push((a.parse_f64("bounds", lat)?, a.parse_f64("bounds", lon)?));
    }
    if points.len() < 3 {
        return Err(a.err("A polygon needs at least three points".to_string()));
    }
    Ok(StatementKind::PolygonQuery {
        bounds,
        points,
        into: a.into_set()?,
    })
}

fn user(a: &mut Attrs<'_>) -> Result<StatementKind, Error> {
    let object = a.object_type("type")?;
    let into = a.into_set()?;
    let names = a.take_indexed("name");
    let uids = a
        .take_indexed("uid")
        .into_iter()
        .map(|raw| a.parse_u64("uid", &raw))
        .collect::<Result<Vec<_>, _>>()?;
    if names.is_empty() && uids.is_empty() {
        return Err(a.err("Statement \"user\" needs at least one name or uid".into()));
    }
    Ok(StatementKind::User {
        object,
        into,
        names,
        uids,
    })
}

fn set_tag(a: &mut Attrs<'_>) -> Result<StatementKind, Error> {
    let target = match a.take("keytype") {
        Some(t) if t == "id" => TagTarget::Id,
        Some(t) if t == "generic" => TagTarget::Generic { from: a.from_set()? },
        Some(t) => {
            return Err(a.err(format!(
                "Attribute \"keytype\" accepts \"id\" or \"generic\", found \"{t}\""
            )))
        }
        None => match a.take("k") {
            Some(k) => TagTarget::Key(k),
            None => {
                return Err(a.err("Statement \"set-tag\" needs \"k\" or a \"keytype\"".into()))
            }
        },
    };
    Ok(StatementKind::SetTag(target))
}

fn value_count(a: &mut Attrs<'_>) -> Result<StatementKind, Error> {
    let raw = a.require("type")?;
    let count = CountType::parse(&raw).ok_or_else(|| {
        a.err(format!(
            "Attribute \"type\" of \"value-count\" accepts nodes, ways, relations or areas, found \"{raw}\""
        ))
    })?;
    Ok(StatementKind::ValueCount {
        count,
        from: a.from_set()?,
    })
}

fn aggregate(a: &mut Attrs<'_>, agg: Aggregator) -> Result<StatementKind, Error> {
    let from = a.from_set()?;
    let key = match a.take("keytype") {
        Some(t) if t == "id" => AggregateKey::Id,
        Some(t) if t == "type" => AggregateKey::Type,
        Some(t) if t == "generic" => AggregateKey::Generic,
        Some(t) => {
            return Err(a.err(format!(
                "Attribute \"keytype\" accepts \"id\", \"type\" or \"generic\", found \"{t}\""
            )))
        }
        None => match a.take("k") {
            Some(k) => AggregateKey::Tag(k),
            None => {
                return Err(a.err(format!(
                    "Statement \"{}\" needs \"k\" or a \"keytype\"",
                    agg.name()
                )))
            }
        },
    };
    Ok(StatementKind::ValueAggregate { agg, from, key })
}

fn print(a: &mut Attrs<'_>) -> Result<StatementKind, Error> {
    let from = a.from_set()?;
    let mode_raw = a.take_or("mode", "body");
    let mode = PrintMode::parse(&mode_raw)
        .ok_or_else(|| a.err(format!("Unknown print mode \"{mode_raw}\"")))?;
    let order_raw = a.take_or("order", "id");
    let order = SortOrder::parse(&order_raw)
        .ok_or_else(|| a.err(format!("Unknown print order \"{order_raw}\"")))?;
    let limit = match a.take("limit") {
        None => None,
        Some(raw) if raw.is_empty() => None,
        Some(raw) => Some(a.parse_u64("limit", &raw)?),
    };
    let geometry_raw = a.take_or("geometry", "skeleton");
    let geometry = GeometryMode::parse(&geometry_raw)
        .ok_or_else(|| a.err(format!("Unknown print geometry \"{geometry_raw}\"")))?;

    let corners = [
        a.take("s").unwrap_or_default(),
        a.take("n").unwrap_or_default(),
        a.take("w").unwrap_or_default(),
        a.take("e").unwrap_or_default(),
    ];
    let bbox = if corners.iter().all(|c| c.is_empty()) {
        None
    } else if corners.iter().all(|c| !c.is_empty()) {
        Some(Bbox {
            south: a.parse_f64("s", &corners[0])?,
            north: a.parse_f64("n", &corners[1])?,
            west: a.parse_f64("w", &corners[2])?,
            east: a.parse_f64("e", &corners[3])?,
        })
    } else {
        return Err(a.err("Print needs either all of s, n, w, e or none".into()));
    };

    Ok(StatementKind::Print(Print {
        from,
        mode,
        order,
        limit,
        geometry,
        bbox,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn it_rejects_unknown_kinds() {
        let err = Factory::new()
            .create("teleport", 3, &attrs(&[]))
            .unwrap_err();
        assert_eq!(err.to_string(), "line 3: static error: Unknown statement \"teleport\"");
    }

    #[test]
    fn it_rejects_unknown_attributes() {
        let err = Factory::new()
            .create("union", 1, &attrs(&[("into", "a"), ("color", "red")]))
            .unwrap_err();
        assert!(err.to_string().contains("Unknown attribute \"color\""));
    }

    #[test]
    fn it_rejects_missing_required_attributes() {
        let err = Factory::new()
            .create("newer", 2, &attrs(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("requires attribute \"than\""));
    }

    #[test]
    fn it_rejects_bad_regexes() {
        let err = Factory::new()
            .create("has-kv", 4, &attrs(&[("k", "name"), ("regv", "("), ("modv", "")]))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid regular expression"));
    }

    #[test]
    fn it_rejects_key_regex_with_plain_value() {
        let err = Factory::new()
            .create(
                "has-kv",
                5,
                &attrs(&[("regk", "^addr"), ("v", "x"), ("modv", "")]),
            )
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("can only be combined with a regular expression"));
    }

    #[test]
    fn it_defaults_sets_to_underscore() {
        let stmt = Factory::new()
            .create("foreach", 1, &attrs(&[]))
            .unwrap();
        assert_eq!(
            stmt.attributes(),
            vec![
                ("from".to_string(), "_".to_string()),
                ("into".to_string(), "_".to_string())
            ]
        );
    }

    #[test]
    fn it_parses_script_settings() {
        let stmt = Factory::new()
            .create(
                "osm-script",
                1,
                &attrs(&[("timeout", "25"), ("bbox", "50.6,7.0,50.8,7.3")]),
            )
            .unwrap();
        match stmt.kind() {
            StatementKind::Script(s) => {
                assert_eq!(s.timeout, Some(25));
                let bbox = s.bbox.unwrap();
                assert_eq!(bbox.south, 50.6);
                assert_eq!(bbox.east, 7.3);
            }
            _ => panic!("expected script"),
        }
    }
}
