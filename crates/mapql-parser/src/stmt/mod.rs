//! The statement tree produced by both front-ends.
//!
//! Statements are built once by the [`Factory`], wired into a tree while
//! parsing, and never mutated afterwards. Each node owns its children
//! exclusively; there is no sharing between trees.

mod factory;

pub use factory::Factory;

use regex::Regex;

/// Insertion-ordered attribute map, as handed to the factory.
pub type AttrMap = indexmap::IndexMap<String, String>;

/// The variant of a stored map object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectType {
    Node,
    Way,
    Relation,
    Area,
}

impl ObjectType {
    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Node => "node",
            ObjectType::Way => "way",
            ObjectType::Relation => "relation",
            ObjectType::Area => "area",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "node" => Some(ObjectType::Node),
            "way" => Some(ObjectType::Way),
            "relation" => Some(ObjectType::Relation),
            "area" => Some(ObjectType::Area),
            _ => None,
        }
    }
}

/// A directed traversal across object variant boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurseKind {
    RelationNode,
    RelationWay,
    RelationRelation,
    WayNode,
    NodeWay,
    NodeRelation,
    WayRelation,
    RelationBackwards,
    Down,
    DownRel,
    Up,
    UpRel,
}

impl RecurseKind {
    pub fn name(self) -> &'static str {
        match self {
            RecurseKind::RelationNode => "relation-node",
            RecurseKind::RelationWay => "relation-way",
            RecurseKind::RelationRelation => "relation-relation",
            RecurseKind::WayNode => "way-node",
            RecurseKind::NodeWay => "node-way",
            RecurseKind::NodeRelation => "node-relation",
            RecurseKind::WayRelation => "way-relation",
            RecurseKind::RelationBackwards => "relation-backwards",
            RecurseKind::Down => "down",
            RecurseKind::DownRel => "down-rel",
            RecurseKind::Up => "up",
            RecurseKind::UpRel => "up-rel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "relation-node" => Some(RecurseKind::RelationNode),
            "relation-way" => Some(RecurseKind::RelationWay),
            "relation-relation" => Some(RecurseKind::RelationRelation),
            "way-node" => Some(RecurseKind::WayNode),
            "node-way" => Some(RecurseKind::NodeWay),
            "node-relation" => Some(RecurseKind::NodeRelation),
            "way-relation" => Some(RecurseKind::WayRelation),
            "relation-backwards" => Some(RecurseKind::RelationBackwards),
            "down" => Some(RecurseKind::Down),
            "down-rel" => Some(RecurseKind::DownRel),
            "up" => Some(RecurseKind::Up),
            "up-rel" => Some(RecurseKind::UpRel),
            _ => None,
        }
    }
}

/// How a tag filter selects keys.
#[derive(Debug, Clone)]
pub enum KeyPredicate {
    Equals(String),
    Matches { pattern: String, re: Regex },
}

/// How a tag filter constrains the value under a matched key.
#[derive(Debug, Clone)]
pub enum ValuePredicate {
    /// Any value; the filter is a pure presence test.
    Any,
    Equals(String),
    Matches { pattern: String, re: Regex },
}

/// A key/value tag test. Not a set producer: queries evaluate it as a
/// predicate over candidate objects.
#[derive(Debug, Clone)]
pub struct HasKv {
    pub key: KeyPredicate,
    pub value: ValuePredicate,
    /// Inverted test (`!=` / `!~` / absence).
    pub negated: bool,
    pub ignore_case: bool,
}

/// Geographic rectangle, degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bbox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }
}

/// Settings collected from the `[key:value]` headers of a script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub element_limit: Option<u64>,
    pub output: Option<String>,
    pub timeout: Option<u64>,
    pub date: Option<String>,
    pub from: Option<String>,
    /// `adiff` mode: keep deletions visible in the result.
    pub augmented: bool,
    pub bbox: Option<Bbox>,
}

/// Target of a `set-tag` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagTarget {
    /// Set one fixed key.
    Key(String),
    /// Set the id of the produced object.
    Id,
    /// Copy every key occurring in the source set.
    Generic { from: String },
}

/// Aggregation strategy of the `value-*-value` statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    Union,
    Min,
    Max,
    Set,
}

impl Aggregator {
    pub fn name(self) -> &'static str {
        match self {
            Aggregator::Union => "value-union-value",
            Aggregator::Min => "value-min-value",
            Aggregator::Max => "value-max-value",
            Aggregator::Set => "value-set-value",
        }
    }
}

/// What an aggregate function reads from each object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateKey {
    Tag(String),
    Id,
    Type,
    /// The key currently bound by a generic `set-tag`.
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Plus,
    Minus,
    Times,
    Divided,
}

impl ArithOp {
    pub fn name(self) -> &'static str {
        match self {
            ArithOp::Plus => "value-plus",
            ArithOp::Minus => "value-minus",
            ArithOp::Times => "value-times",
            ArithOp::Divided => "value-divided",
        }
    }
}

/// Which partition `value-count` counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountType {
    Nodes,
    Ways,
    Relations,
    Areas,
}

impl CountType {
    pub fn name(self) -> &'static str {
        match self {
            CountType::Nodes => "nodes",
            CountType::Ways => "ways",
            CountType::Relations => "relations",
            CountType::Areas => "areas",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "nodes" => Some(CountType::Nodes),
            "ways" => Some(CountType::Ways),
            "relations" => Some(CountType::Relations),
            "areas" => Some(CountType::Areas),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintMode {
    IdsOnly,
    Skeleton,
    Body,
    Tags,
    Meta,
    Quirks,
    Count,
}

impl PrintMode {
    pub fn name(self) -> &'static str {
        match self {
            PrintMode::IdsOnly => "ids_only",
            PrintMode::Skeleton => "skeleton",
            PrintMode::Body => "body",
            PrintMode::Tags => "tags",
            PrintMode::Meta => "meta",
            PrintMode::Quirks => "quirks",
            PrintMode::Count => "count",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ids_only" => Some(PrintMode::IdsOnly),
            "skeleton" => Some(PrintMode::Skeleton),
            "body" => Some(PrintMode::Body),
            "tags" => Some(PrintMode::Tags),
            "meta" => Some(PrintMode::Meta),
            "quirks" => Some(PrintMode::Quirks),
            "count" => Some(PrintMode::Count),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Id,
    Quadtile,
}

impl SortOrder {
    pub fn name(self) -> &'static str {
        match self {
            SortOrder::Id => "id",
            SortOrder::Quadtile => "quadtile",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "id" => Some(SortOrder::Id),
            "quadtile" => Some(SortOrder::Quadtile),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryMode {
    Skeleton,
    Full,
    Bounds,
    Center,
}

impl GeometryMode {
    pub fn name(self) -> &'static str {
        match self {
            GeometryMode::Skeleton => "skeleton",
            GeometryMode::Full => "full",
            GeometryMode::Bounds => "bounds",
            GeometryMode::Center => "center",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "skeleton" => Some(GeometryMode::Skeleton),
            "full" => Some(GeometryMode::Full),
            "bounds" => Some(GeometryMode::Bounds),
            "center" => Some(GeometryMode::Center),
            _ => None,
        }
    }
}

/// Attributes of a `print` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Print {
    pub from: String,
    pub mode: PrintMode,
    pub order: SortOrder,
    pub limit: Option<u64>,
    pub geometry: GeometryMode,
    pub bbox: Option<Bbox>,
}

/// The kind tag and typed payload of a statement node.
#[derive(Debug, Clone)]
pub enum StatementKind {
    Script(Script),
    Union {
        into: String,
    },
    Difference {
        into: String,
    },
    Foreach {
        from: String,
        into: String,
    },
    Query {
        object: Option<ObjectType>,
        into: String,
    },
    Item {
        set: String,
    },
    IdQuery {
        object: ObjectType,
        id: u64,
        into: String,
    },
    HasKv(HasKv),
    BboxQuery {
        bbox: Bbox,
        into: String,
    },
    Around {
        from: String,
        into: String,
        radius: f64,
        center: Option<(f64, f64)>,
    },
    Recurse {
        kind: RecurseKind,
        from: String,
        into: String,
        role: Option<String>,
    },
    PolygonQuery {
        bounds: String,
        points: Vec<(f64, f64)>,
        into: String,
    },
    User {
        object: Option<ObjectType>,
        into: String,
        names: Vec<String>,
        uids: Vec<u64>,
    },
    Newer {
        than: String,
    },
    AreaQuery {
        from: String,
        into: String,
        id: Option<u64>,
    },
    CoordQuery {
        from: String,
        into: String,
        point: Option<(f64, f64)>,
    },
    MapToArea {
        from: String,
        into: String,
    },
    Pivot {
        from: String,
        into: String,
    },
    Changed {
        since: String,
        until: String,
        into: String,
    },
    Make {
        into: String,
        object: String,
    },
    Convert {
        into: String,
        object: String,
    },
    SetTag(TagTarget),
    ValueFixed {
        value: String,
    },
    ValueId,
    ValueCount {
        count: CountType,
        from: String,
    },
    ValueAggregate {
        agg: Aggregator,
        from: String,
        key: AggregateKey,
    },
    ValueArith {
        op: ArithOp,
    },
    Print(Print),
}

/// One node of the statement tree.
#[derive(Debug, Clone)]
pub struct Statement {
    kind: StatementKind,
    line: u32,
    children: Vec<Statement>,
    text: String,
}

impl Statement {
    pub(crate) fn new(kind: StatementKind, line: u32) -> Self {
        Self {
            kind,
            line,
            children: Vec::new(),
            text: String::new(),
        }
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn children(&self) -> &[Statement] {
        &self.children
    }

    /// The accumulated textual body; only literal-emitting statements
    /// carry one.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn add_child(&mut self, child: Statement) {
        self.children.push(child);
    }

    pub fn add_final_text(&mut self, text: String) {
        self.text = text;
    }

    /// The kind string this node was created under.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            StatementKind::Script(_) => "osm-script",
            StatementKind::Union { .. } => "union",
            StatementKind::Difference { .. } => "difference",
            StatementKind::Foreach { .. } => "foreach",
            StatementKind::Query { .. } => "query",
            StatementKind::Item { .. } => "item",
            StatementKind::IdQuery { .. } => "id-query",
            StatementKind::HasKv(_) => "has-kv",
            StatementKind::BboxQuery { .. } => "bbox-query",
            StatementKind::Around { .. } => "around",
            StatementKind::Recurse { .. } => "recurse",
            StatementKind::PolygonQuery { .. } => "polygon-query",
            StatementKind::User { .. } => "user",
            StatementKind::Newer { .. } => "newer",
            StatementKind::AreaQuery { .. } => "area-query",
            StatementKind::CoordQuery { .. } => "coord-query",
            StatementKind::MapToArea { .. } => "map-to-area",
            StatementKind::Pivot { .. } => "pivot",
            StatementKind::Changed { .. } => "changed",
            StatementKind::Make { .. } => "make",
            StatementKind::Convert { .. } => "convert",
            StatementKind::SetTag(_) => "set-tag",
            StatementKind::ValueFixed { .. } => "value-fixed",
            StatementKind::ValueId => "value-id",
            StatementKind::ValueCount { .. } => "value-count",
            StatementKind::ValueAggregate { agg, .. } => agg.name(),
            StatementKind::ValueArith { op } => op.name(),
            StatementKind::Print(_) => "print",
        }
    }

    /// Regenerates the schema-conforming attribute map of this node.
    ///
    /// The factory validated the map on the way in; this view is the
    /// inverse, used for XML serialization and structural comparison.
    pub fn attributes(&self) -> Vec<(String, String)> {
        let mut a: Vec<(String, String)> = Vec::new();
        let mut push = |k: &str, v: String| a.push((k.to_string(), v));
        match &self.kind {
            StatementKind::Script(s) => {
                if let Some(limit) = s.element_limit {
                    push("element-limit", limit.to_string());
                }
                if let Some(output) = &s.output {
                    push("output", output.clone());
                }
                if let Some(timeout) = s.timeout {
                    push("timeout", timeout.to_string());
                }
                if let Some(date) = &s.date {
                    push("date", date.clone());
                }
                if let Some(from) = &s.from {
                    push("from", from.clone());
                }
                if s.augmented {
                    push("augmented", "deletions".to_string());
                }
                if let Some(b) = &s.bbox {
                    push(
                        "bbox",
                        format!("{},{},{},{}", b.south, b.west, b.north, b.east),
                    );
                }
            }
            StatementKind::Union { into } | StatementKind::Difference { into } => {
                push("into", into.clone());
            }
            StatementKind::Foreach { from, into }
            | StatementKind::MapToArea { from, into }
            | StatementKind::Pivot { from, into } => {
                push("from", from.clone());
                push("into", into.clone());
            }
            StatementKind::Query { object, into } => {
                push("type", object.map(ObjectType::name).unwrap_or("").to_string());
                push("into", into.clone());
            }
            StatementKind::Item { set } => push("set", set.clone()),
            StatementKind::IdQuery { object, id, into } => {
                push("type", object.name().to_string());
                push("ref", id.to_string());
                push("into", into.clone());
            }
            StatementKind::HasKv(h) => {
                match &h.key {
                    KeyPredicate::Equals(k) => push("k", k.clone()),
                    KeyPredicate::Matches { pattern, .. } => push("regk", pattern.clone()),
                }
                match &h.value {
                    ValuePredicate::Any => push("v", String::new()),
                    ValuePredicate::Equals(v) => push("v", v.clone()),
                    ValuePredicate::Matches { pattern, .. } => push("regv", pattern.clone()),
                }
                push("modv", if h.negated { "not" } else { "" }.to_string());
                if h.ignore_case {
                    push("case", "ignore".to_string());
                }
            }
            StatementKind::BboxQuery { bbox, into } => {
                push("s", bbox.south.to_string());
                push("n", bbox.north.to_string());
                push("w", bbox.west.to_string());
                push("e", bbox.east.to_string());
                push("into", into.clone());
            }
            StatementKind::Around {
                from,
                into,
                radius,
                center,
            } => {
                push("from", from.clone());
                push("into", into.clone());
                push("radius", radius.to_string());
                if let Some((lat, lon)) = center {
                    push("lat", lat.to_string());
                    push("lon", lon.to_string());
                }
            }
            StatementKind::Recurse {
                kind,
                from,
                into,
                role,
            } => {
                push("type", kind.name().to_string());
                push("from", from.clone());
                push("into", into.clone());
                if let Some(role) = role {
                    push("role", role.clone());
                    push("role-restricted", "yes".to_string());
                }
            }
            StatementKind::PolygonQuery { bounds, into, .. } => {
                push("bounds", bounds.clone());
                push("into", into.clone());
            }
            StatementKind::User {
                object,
                into,
                names,
                uids,
            } => {
                push("type", object.map(ObjectType::name).unwrap_or("").to_string());
                push("into", into.clone());
                if names.is_empty() {
                    push("name", String::new());
                }
                for (i, name) in names.iter().enumerate() {
                    if i == 0 {
                        push("name", name.clone());
                    } else {
                        push(&format!("name_{i}"), name.clone());
                    }
                }
                if uids.is_empty() {
                    push("uid", String::new());
                }
                for (i, uid) in uids.iter().enumerate() {
                    if i == 0 {
                        push("uid", uid.to_string());
                    } else {
                        push(&format!("uid_{i}"), uid.to_string());
                    }
                }
            }
            StatementKind::Newer { than } => push("than", than.clone()),
            StatementKind::AreaQuery { from, into, id } => {
                push("from", from.clone());
                push("into", into.clone());
                if let Some(id) = id {
                    push("ref", id.to_string());
                }
            }
            StatementKind::CoordQuery { from, into, point } => {
                push("from", from.clone());
                push("into", into.clone());
                let (lat, lon) = match point {
                    Some((lat, lon)) => (lat.to_string(), lon.to_string()),
                    None => (String::new(), String::new()),
                };
                push("lat", lat);
                push("lon", lon);
            }
            StatementKind::Changed { since, until, into } => {
                push("since", since.clone());
                push("until", until.clone());
                push("into", into.clone());
            }
            StatementKind::Make { into, object }
            | StatementKind::Convert { into, object } => {
                push("into", into.clone());
                push("type", object.clone());
            }
            StatementKind::SetTag(target) => match target {
                TagTarget::Key(k) => push("k", k.clone()),
                TagTarget::Id => push("keytype", "id".to_string()),
                TagTarget::Generic { from } => {
                    push("from", from.clone());
                    push("keytype", "generic".to_string());
                }
            },
            StatementKind::ValueFixed { value } => push("v", value.clone()),
            StatementKind::ValueId => {}
            StatementKind::ValueCount { count, from } => {
                push("from", from.clone());
                push("type", count.name().to_string());
            }
            StatementKind::ValueAggregate { from, key, .. } => {
                push("from", from.clone());
                match key {
                    AggregateKey::Tag(k) => push("k", k.clone()),
                    AggregateKey::Id => push("keytype", "id".to_string()),
                    AggregateKey::Type => push("keytype", "type".to_string()),
                    AggregateKey::Generic => push("keytype", "generic".to_string()),
                }
            }
            StatementKind::ValueArith { .. } => {}
            StatementKind::Print(p) => {
                push("from", p.from.clone());
                push("mode", p.mode.name().to_string());
                push("order", p.order.name().to_string());
                push("limit", p.limit.map(|l| l.to_string()).unwrap_or_default());
                push("geometry", p.geometry.name().to_string());
                let (s, n, w, e) = match &p.bbox {
                    Some(b) => (
                        b.south.to_string(),
                        b.north.to_string(),
                        b.west.to_string(),
                        b.east.to_string(),
                    ),
                    None => Default::default(),
                };
                push("s", s);
                push("n", n);
                push("w", w);
                push("e", e);
            }
        }
        a
    }

    /// Compares two trees by kind string, attribute map, body text, and
    /// children, ignoring source lines. This is the equality the XML
    /// round-trip guarantees.
    pub fn structural_eq(&self, other: &Statement) -> bool {
        self.name() == other.name()
            && self.attributes() == other.attributes()
            && self.text == other.text
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.structural_eq(b))
    }

    /// Renders the tree as indented text, one node per line. Used by the
    /// snapshot tests.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, indent: usize) {
        for _ in 0..indent {
            out.push_str("    ");
        }
        out.push_str(self.name());
        for (k, v) in self.attributes() {
            out.push(' ');
            out.push_str(&k);
            out.push('=');
            if v.is_empty() || v.contains(char::is_whitespace) || v.contains('"') {
                out.push('"');
                out.push_str(&v.replace('\\', "\\\\").replace('"', "\\\""));
                out.push('"');
            } else {
                out.push_str(&v);
            }
        }
        out.push('\n');
        for child in &self.children {
            child.dump_into(out, indent + 1);
        }
    }

    /// Serializes this tree in the XML surface syntax. Reparsing the
    /// result through the XML front-end yields a structurally equal tree.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out, 0);
        out
    }

    fn write_xml(&self, out: &mut String, indent: usize) {
        for _ in 0..indent {
            out.push_str("  ");
        }
        out.push('<');
        out.push_str(self.name());
        for (k, v) in self.attributes() {
            out.push(' ');
            out.push_str(&k);
            out.push_str("=\"");
            out.push_str(&escape_xml(&v));
            out.push('"');
        }
        if self.children.is_empty() && self.text.is_empty() {
            out.push_str("/>\n");
            return;
        }
        out.push_str(">");
        if !self.text.is_empty() {
            out.push_str(&escape_xml(&self.text));
        }
        if !self.children.is_empty() {
            out.push('\n');
            for child in &self.children {
                child.write_xml(out, indent + 1);
            }
            for _ in 0..indent {
                out.push_str("  ");
            }
        }
        out.push_str("</");
        out.push_str(self.name());
        out.push_str(">\n");
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
