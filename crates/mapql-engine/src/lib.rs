//! Evaluate mapql statement trees against snapshot map storage.
//!
//! The parser crate turns query text into a statement tree; this crate
//! reduces that tree to named sets of map objects and hands results to
//! an output backend. Storage is abstracted behind the [`Storage`]
//! trait — the in-memory [`MemStorage`] ships for tests and embedding,
//! on-disk backends implement the same contract.
//!
//! ## Example
//!
//! ```rust
//! use mapql_engine::{run, CollectingOutput, ErrorSink, MemStorageBuilder, Settings};
//!
//! let storage = MemStorageBuilder::new()
//!     .timestamp("2024-06-01T00:00:00Z")
//!     .finish();
//! let mut out = CollectingOutput::new();
//! let mut sink = ErrorSink::new();
//! let ok = run("node(1);out;", &storage, Settings::default(), &mut out, &mut sink);
//! assert!(ok);
//! assert!(out.elements.is_empty());
//! ```
//!
//! Evaluation is strict sequential and deterministic: identical input
//! and snapshot produce byte-identical output. Parse and static errors
//! recorded by the front-end forbid evaluation entirely; runtime errors
//! (budget exhaustion, storage failures) abort it and surface through
//! the [`ErrorSink`].

pub mod area;
pub mod diagnostics;
pub mod diff;
pub mod dispatch;
mod eval;
pub mod model;
pub mod output;
mod rman;
pub mod set;
pub mod storage;

pub use crate::diagnostics::{
    cli_report, Diagnostic, DiagnosticKind, ErrorSink, RuntimeError, Severity,
};
pub use crate::eval::Evaluate;
pub use crate::model::{
    Area, Coord, Derived, Id, Member, Meta, Node, ObjectType, Relation, Tags, Way,
};
pub use crate::output::{CollectingOutput, JsonOutput, OutElement, OutputHandler, XmlOutput};
pub use crate::rman::{AreaUpdater, ResourceManager, Settings};
pub use crate::set::{DiffAction, NamedSet, SetClass};
pub use crate::storage::{MemStorage, MemStorageBuilder, Storage};

use mapql_parser::stmt::{Script, Statement, StatementKind};
use mapql_parser::parse_script;

/// The settings block of a script root; default when the root is not an
/// `osm-script` node.
pub fn script_settings(root: &Statement) -> Script {
    match root.kind() {
        StatementKind::Script(script) => script.clone(),
        _ => Script::default(),
    }
}

/// Evaluates an already-parsed statement tree.
pub fn run_script<S: Storage>(
    root: &Statement,
    storage: &S,
    settings: Settings,
    out: &mut dyn OutputHandler,
) -> Result<(), RuntimeError> {
    let script = script_settings(root);
    let mut rman = ResourceManager::new(storage, &script, settings);
    out.prologue(storage.timestamp());
    root.execute(&mut rman, out)?;
    out.epilogue();
    Ok(())
}

/// Parses and evaluates a script in one call.
///
/// Front-end errors land in the sink and forbid evaluation; runtime
/// errors abort it. Returns whether evaluation ran to completion.
pub fn run<S: Storage>(
    source: &str,
    storage: &S,
    settings: Settings,
    out: &mut dyn OutputHandler,
    sink: &mut ErrorSink,
) -> bool {
    let parsed = parse_script(source);
    sink.absorb_parse_errors(&parsed.errors);
    let Some(root) = parsed.root else {
        return false;
    };
    if sink.has_errors() {
        return false;
    }
    if script_settings(&root).from.is_some() {
        sink.report(Diagnostic {
            kind: DiagnosticKind::Static,
            severity: Severity::Error,
            line: root.line(),
            message: "Diff evaluation needs both snapshots; use run_diff".to_string(),
        });
        return false;
    }
    match run_script(&root, storage, settings, out) {
        Ok(()) => true,
        Err(error) => {
            sink.report(Diagnostic::runtime(&error));
            false
        }
    }
}
