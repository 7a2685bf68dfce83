//! Area derivation: the one write path. A statement tree selects the
//! candidate objects; closed ways and multipolygon relations of the
//! result become areas, committed to the area snapshot under the write
//! token.

use mapql_parser::stmt::Statement;

use crate::diagnostics::RuntimeError;
use crate::dispatch::{LocalDispatcher, WriteGuard};
use crate::eval::Evaluate;
use crate::model::{Area, Coord, Way, AREA_RELATION_OFFSET};
use crate::output::CollectingOutput;
use crate::rman::{ResourceManager, Settings};
use crate::set::NamedSet;
use crate::storage::Storage;
use crate::{script_settings, ObjectType};

/// Turns the closed ways and multipolygon relations of a result set into
/// areas. Objects whose geometry cannot be resolved are skipped.
pub fn build_areas<S: Storage>(set: &NamedSet, storage: &S) -> Vec<Area> {
    let mut areas = Vec::new();
    for way in &set.ways {
        if !way.is_closed() {
            continue;
        }
        if let Some(ring) = way_ring(storage, way) {
            areas.push(Area {
                id: way.id,
                tags: way.tags.clone(),
                rings: vec![ring],
            });
        }
    }
    for relation in &set.relations {
        let multipolygon = relation
            .tags
            .get("type")
            .is_some_and(|t| t == "multipolygon" || t == "boundary");
        if !multipolygon {
            continue;
        }
        let mut rings = Vec::new();
        for member in &relation.members {
            if member.kind != ObjectType::Way {
                continue;
            }
            if !member.role.is_empty() && member.role != "outer" {
                continue;
            }
            if let Some(way) = storage.way(member.id) {
                if way.is_closed() {
                    if let Some(ring) = way_ring(storage, &way) {
                        rings.push(ring);
                    }
                }
            }
        }
        if !rings.is_empty() {
            areas.push(Area {
                id: relation.id + AREA_RELATION_OFFSET,
                tags: relation.tags.clone(),
                rings,
            });
        }
    }
    areas.sort_by_key(|a| a.id);
    areas
}

fn way_ring<S: Storage>(storage: &S, way: &Way) -> Option<Vec<(Coord, Coord)>> {
    way.nodes
        .iter()
        .map(|id| storage.node(*id).map(|n| (n.lat, n.lon)))
        .collect()
}

/// Evaluates `root` in area-build mode and commits the derived areas'
/// snapshot version. The write token is held for the whole run and
/// rolled back on any failure.
pub fn run_area_job<S: Storage>(
    root: &Statement,
    storage: &S,
    dispatcher: &LocalDispatcher,
) -> Result<Vec<Area>, RuntimeError> {
    let guard = WriteGuard::acquire(dispatcher)?;

    let script = script_settings(root);
    let mut rman = ResourceManager::new(storage, &script, Settings::default()).area_build();
    let mut scratch = CollectingOutput::new();
    root.execute(&mut rman, &mut scratch)?;

    let result = rman.set_clone("_");
    let built = build_areas(&result, storage);
    let Some(updater) = rman.area_updater() else {
        return Err(RuntimeError::Other(
            "area derivation outside area-build mode".to_string(),
        ));
    };
    for area in built {
        updater.push(area);
    }
    let areas = updater.take();

    dispatcher
        .commit_area_version(storage.timestamp())
        .map_err(|e| RuntimeError::Storage(e.to_string()))?;
    guard.commit()?;
    Ok(areas)
}
