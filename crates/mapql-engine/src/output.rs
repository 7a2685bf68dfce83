//! Output backends: the `print` statement hands the referenced set to an
//! [`OutputHandler`], which serializes elements in the requested mode.

use serde::Serialize;

use mapql_parser::stmt::{Bbox, GeometryMode, Print, PrintMode, SortOrder};

use crate::diagnostics::RuntimeError;
use crate::model::{Id, Meta, Node, ObjectType, Relation, Tags, Way};
use crate::rman::ResourceManager;
use crate::set::{DiffAction, NamedSet, SetClass};
use crate::storage::{quadtile, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub minlat: f64,
    pub minlon: f64,
    pub maxlat: f64,
    pub maxlon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutMember {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "ref")]
    pub id: Id,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutMeta {
    pub version: u32,
    pub timestamp: String,
    pub changeset: u64,
    pub uid: u64,
    pub user: String,
}

/// One serialized element, shaped by the print mode and geometry option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutElement {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<Id>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<OutMember>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Vec<LatLon>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<LatLon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(flatten)]
    pub meta: Option<OutMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl OutElement {
    fn new(kind: &str, id: Id) -> Self {
        Self {
            kind: kind.to_string(),
            id,
            lat: None,
            lon: None,
            nodes: None,
            members: None,
            geometry: None,
            bounds: None,
            center: None,
            tags: None,
            meta: None,
            action: None,
        }
    }
}

/// Where serialized elements go. Implementations own their buffer; the
/// engine only pushes elements through.
pub trait OutputHandler {
    fn prologue(&mut self, timestamp: &str);
    fn element(&mut self, element: &OutElement);
    fn epilogue(&mut self);
}

/// Collects elements for tests and byte-level determinism checks.
#[derive(Debug, Default)]
pub struct CollectingOutput {
    pub timestamp: String,
    pub elements: Vec<OutElement>,
}

impl CollectingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// A canonical byte rendering, for determinism comparisons.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.elements).unwrap_or_default()
    }
}

impl OutputHandler for CollectingOutput {
    fn prologue(&mut self, timestamp: &str) {
        self.timestamp = timestamp.to_string();
    }

    fn element(&mut self, element: &OutElement) {
        self.elements.push(element.clone());
    }

    fn epilogue(&mut self) {}
}

/// OSM-XML shaped writer.
#[derive(Debug, Default)]
pub struct XmlOutput {
    buffer: String,
}

impl XmlOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(mut self) -> String {
        if !self.buffer.ends_with("</osm>\n") {
            self.buffer.push_str("</osm>\n");
        }
        self.buffer
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl OutputHandler for XmlOutput {
    fn prologue(&mut self, timestamp: &str) {
        self.buffer.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.buffer.push_str("<osm version=\"0.6\">\n");
        if !timestamp.is_empty() {
            self.buffer
                .push_str(&format!("<meta osm_base=\"{}\"/>\n", xml_escape(timestamp)));
        }
    }

    fn element(&mut self, e: &OutElement) {
        let mut line = format!("  <{} id=\"{}\"", e.kind, e.id);
        if let Some(action) = &e.action {
            line.push_str(&format!(" action=\"{action}\""));
        }
        if let (Some(lat), Some(lon)) = (e.lat, e.lon) {
            line.push_str(&format!(" lat=\"{lat}\" lon=\"{lon}\""));
        }
        if let Some(meta) = &e.meta {
            line.push_str(&format!(
                " version=\"{}\" timestamp=\"{}\" changeset=\"{}\" uid=\"{}\" user=\"{}\"",
                meta.version,
                xml_escape(&meta.timestamp),
                meta.changeset,
                meta.uid,
                xml_escape(&meta.user)
            ));
        }
        let has_body = e.nodes.is_some() || e.members.is_some() || e.tags.is_some();
        if !has_body {
            line.push_str("/>\n");
            self.buffer.push_str(&line);
            return;
        }
        line.push_str(">\n");
        self.buffer.push_str(&line);
        if let Some(nodes) = &e.nodes {
            for id in nodes {
                self.buffer.push_str(&format!("    <nd ref=\"{id}\"/>\n"));
            }
        }
        if let Some(members) = &e.members {
            for m in members {
                self.buffer.push_str(&format!(
                    "    <member type=\"{}\" ref=\"{}\" role=\"{}\"/>\n",
                    m.kind,
                    m.id,
                    xml_escape(&m.role)
                ));
            }
        }
        if let Some(tags) = &e.tags {
            for (k, v) in tags {
                self.buffer.push_str(&format!(
                    "    <tag k=\"{}\" v=\"{}\"/>\n",
                    xml_escape(k),
                    xml_escape(v)
                ));
            }
        }
        self.buffer.push_str(&format!("  </{}>\n", e.kind));
    }

    fn epilogue(&mut self) {
        self.buffer.push_str("</osm>\n");
    }
}

/// JSON writer shaped like the usual `{"elements": […]}` response.
#[derive(Debug, Default)]
pub struct JsonOutput {
    timestamp: String,
    elements: Vec<OutElement>,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    version: f32,
    osm3s: JsonMeta<'a>,
    elements: &'a [OutElement],
}

#[derive(Serialize)]
struct JsonMeta<'a> {
    timestamp_osm_base: &'a str,
}

impl JsonOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(self) -> String {
        let document = JsonDocument {
            version: 0.6,
            osm3s: JsonMeta {
                timestamp_osm_base: &self.timestamp,
            },
            elements: &self.elements,
        };
        serde_json::to_string_pretty(&document).unwrap_or_default()
    }
}

impl OutputHandler for JsonOutput {
    fn prologue(&mut self, timestamp: &str) {
        self.timestamp = timestamp.to_string();
    }

    fn element(&mut self, element: &OutElement) {
        self.elements.push(element.clone());
    }

    fn epilogue(&mut self) {}
}

/// Resolves the referenced set and serializes it. In a recording run the
/// set is logged instead, for the diff runner to mark and emit later.
pub(crate) fn execute_print<S: Storage>(
    print: &Print,
    rman: &mut ResourceManager<'_, S>,
    out: &mut dyn OutputHandler,
) -> Result<(), RuntimeError> {
    let set = rman.set_clone(&print.from);
    if rman.log_print(print, &set) {
        return Ok(());
    }
    print_set(print, &set, rman, out)
}

/// Serializes one already-resolved set in the requested mode, order,
/// limit and geometry. Diff markers on the set become `action` fields.
pub(crate) fn print_set<S: Storage>(
    print: &Print,
    set: &NamedSet,
    rman: &mut ResourceManager<'_, S>,
    out: &mut dyn OutputHandler,
) -> Result<(), RuntimeError> {
    rman.account(set.len() as u64)?;

    if print.mode == PrintMode::Count {
        let mut element = OutElement::new("count", 0);
        let mut tags = Tags::new();
        tags.insert("nodes".to_string(), set.nodes.len().to_string());
        tags.insert("ways".to_string(), set.ways.len().to_string());
        tags.insert("relations".to_string(), set.relations.len().to_string());
        tags.insert("areas".to_string(), set.areas.len().to_string());
        tags.insert("derived".to_string(), set.derived.len().to_string());
        tags.insert("total".to_string(), set.len().to_string());
        element.tags = Some(tags);
        out.element(&element);
        return Ok(());
    }

    let mut nodes: Vec<&Node> = set
        .nodes
        .iter()
        .filter(|n| in_crop(print.bbox.as_ref(), n))
        .collect();
    if print.order == SortOrder::Quadtile {
        nodes.sort_by_key(|n| (quadtile(n.lat, n.lon), n.id));
    }

    let mut emitted: u64 = 0;
    let limit = print.limit.unwrap_or(u64::MAX);

    for node in nodes {
        if emitted >= limit {
            return Ok(());
        }
        out.element(&node_element(print, set, node));
        emitted += 1;
    }
    for way in &set.ways {
        if emitted >= limit {
            return Ok(());
        }
        if !way_in_crop(rman, print.bbox.as_ref(), way) {
            continue;
        }
        out.element(&way_element(print, rman, set, way));
        emitted += 1;
    }
    for relation in &set.relations {
        if emitted >= limit {
            return Ok(());
        }
        out.element(&relation_element(print, set, relation));
        emitted += 1;
    }
    for area in &set.areas {
        if emitted >= limit {
            return Ok(());
        }
        let mut element = OutElement::new("area", area.id);
        if with_tags(print.mode) {
            element.tags = Some(area.tags.clone());
        }
        element.action = action_of(set, SetClass::Area, area.id);
        out.element(&element);
        emitted += 1;
    }
    for derived in &set.derived {
        if emitted >= limit {
            return Ok(());
        }
        let mut element = OutElement::new(&derived.type_name, derived.id);
        if with_tags(print.mode) {
            element.tags = Some(derived.tags.clone());
        }
        element.action = action_of(set, SetClass::Derived, derived.id);
        out.element(&element);
        emitted += 1;
    }
    Ok(())
}

fn with_refs(mode: PrintMode) -> bool {
    !matches!(mode, PrintMode::IdsOnly | PrintMode::Tags)
}

fn with_tags(mode: PrintMode) -> bool {
    matches!(
        mode,
        PrintMode::Body | PrintMode::Tags | PrintMode::Meta | PrintMode::Quirks
    )
}

fn with_meta(mode: PrintMode) -> bool {
    mode == PrintMode::Meta
}

fn in_crop(bbox: Option<&Bbox>, node: &Node) -> bool {
    bbox.map_or(true, |b| {
        b.contains(node.lat.degrees(), node.lon.degrees())
    })
}

fn way_in_crop<S: Storage>(
    rman: &ResourceManager<'_, S>,
    bbox: Option<&Bbox>,
    way: &Way,
) -> bool {
    let Some(bbox) = bbox else { return true };
    way.nodes.iter().any(|id| {
        rman.storage()
            .node(*id)
            .is_some_and(|n| bbox.contains(n.lat.degrees(), n.lon.degrees()))
    })
}

fn meta_out(meta: &Option<Meta>) -> Option<OutMeta> {
    meta.as_ref().map(|m| OutMeta {
        version: m.version,
        timestamp: m.timestamp.clone(),
        changeset: m.changeset,
        uid: m.uid,
        user: m.user.clone(),
    })
}

fn action_of(set: &NamedSet, class: SetClass, id: Id) -> Option<String> {
    set.diff_of(class, id).map(|action| {
        match action {
            DiffAction::Added => "added",
            DiffAction::Deleted => "deleted",
        }
        .to_string()
    })
}

fn node_element(print: &Print, set: &NamedSet, node: &Node) -> OutElement {
    let mut element = OutElement::new("node", node.id);
    if with_refs(print.mode) {
        element.lat = Some(node.lat.degrees());
        element.lon = Some(node.lon.degrees());
    }
    if with_tags(print.mode) && !node.tags.is_empty() {
        element.tags = Some(node.tags.clone());
    }
    if with_meta(print.mode) {
        element.meta = meta_out(&node.meta);
    }
    element.action = action_of(set, SetClass::Node, node.id);
    element
}

fn way_element<S: Storage>(
    print: &Print,
    rman: &ResourceManager<'_, S>,
    set: &NamedSet,
    way: &Way,
) -> OutElement {
    let mut element = OutElement::new("way", way.id);
    if with_refs(print.mode) {
        element.nodes = Some(way.nodes.clone());
    }
    if with_tags(print.mode) && !way.tags.is_empty() {
        element.tags = Some(way.tags.clone());
    }
    if with_meta(print.mode) {
        element.meta = meta_out(&way.meta);
    }
    match print.geometry {
        GeometryMode::Skeleton => {}
        GeometryMode::Full => {
            element.geometry = Some(way_points(rman, way));
        }
        GeometryMode::Bounds => {
            element.bounds = way_bounds(rman, way);
        }
        GeometryMode::Center => {
            element.center = way_bounds(rman, way).map(|b| LatLon {
                lat: (b.minlat + b.maxlat) / 2.0,
                lon: (b.minlon + b.maxlon) / 2.0,
            });
        }
    }
    element.action = action_of(set, SetClass::Way, way.id);
    element
}

fn way_points<S: Storage>(rman: &ResourceManager<'_, S>, way: &Way) -> Vec<LatLon> {
    way.nodes
        .iter()
        .filter_map(|id| rman.storage().node(*id))
        .map(|n| LatLon {
            lat: n.lat.degrees(),
            lon: n.lon.degrees(),
        })
        .collect()
}

fn way_bounds<S: Storage>(rman: &ResourceManager<'_, S>, way: &Way) -> Option<Bounds> {
    let points = way_points(rman, way);
    let first = points.first()?;
    let mut bounds = Bounds {
        minlat: first.lat,
        minlon: first.lon,
        maxlat: first.lat,
        maxlon: first.lon,
    };
    for p in &points {
        bounds.minlat = bounds.minlat.min(p.lat);
        bounds.minlon = bounds.minlon.min(p.lon);
        bounds.maxlat = bounds.maxlat.max(p.lat);
        bounds.maxlon = bounds.maxlon.max(p.lon);
    }
    Some(bounds)
}

fn relation_element(print: &Print, set: &NamedSet, relation: &Relation) -> OutElement {
    let mut element = OutElement::new("relation", relation.id);
    if with_refs(print.mode) {
        element.members = Some(
            relation
                .members
                .iter()
                .map(|m| OutMember {
                    kind: member_kind(m.kind).to_string(),
                    id: m.id,
                    role: m.role.clone(),
                })
                .collect(),
        );
    }
    if with_tags(print.mode) && !relation.tags.is_empty() {
        element.tags = Some(relation.tags.clone());
    }
    if with_meta(print.mode) {
        element.meta = meta_out(&relation.meta);
    }
    element.action = action_of(set, SetClass::Relation, relation.id);
    element
}

fn member_kind(kind: ObjectType) -> &'static str {
    kind.name()
}
