//! Pipeline orchestration: scenario resolution, preprocessing, block table
//! construction, geometry synthesis, smoothing and final event fixups.
//!
//! The entry point accepts either a scenario file (which names the route
//! map in its header) or a route map directly. All passes share one
//! [`DiagnosticSink`]; only a missing file, an undeclared map or a
//! cancellation request abort the compile.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use log::{debug, info};
use serde::Serialize;

use crate::commands::build_block_table;
use crate::error::{CompileError, DiagnosticSink};
use crate::preprocess::{is_scenario, parse_scenario_header, preprocess};
use crate::relocate::{insert_safety_beacons, relocate_events};
use crate::route::RouteData;
use crate::smooth::{compute_cant_tangents, smoothen_out_turns};
use crate::source::SourceProvider;
use crate::synthesize::synthesize;
use crate::track::{SceneSink, Section, Station, TrackElement};

/// Spacing of the geometry subdivision relative to the block interval.
const SUBDIVISION_SPACING: f64 = 5.0;

/// Result of a successful compile: the world-space track model plus the
/// station and section tables referenced by its events.
#[derive(Debug, Serialize)]
pub struct CompiledRoute {
    pub elements: Vec<TrackElement>,
    pub stations: Vec<Station>,
    pub sections: Vec<Section>,
}

/// Compile a scenario or route map file into a track model.
///
/// Scene objects are streamed to `scene` as they are placed; `cancel` is
/// polled cooperatively and aborts the compile without partial output.
pub fn compile(
    provider: &dyn SourceProvider,
    path: &Path,
    sink: &mut DiagnosticSink,
    scene: &mut dyn SceneSink,
    cancel: &AtomicBool,
) -> Result<CompiledRoute, CompileError> {
    if path.as_os_str().is_empty() || !provider.exists(path) {
        return Err(CompileError::RouteFileNotFound(path.display().to_string()));
    }
    let text = provider
        .read_source(path)
        .map_err(|source| CompileError::Io {
            path: path.display().to_string(),
            source,
        })?;

    let (map_path, map_text) = if is_scenario(&text) {
        let header = parse_scenario_header(&text);
        let Some(route) = header.route else {
            return Err(CompileError::MissingMapDeclaration(
                path.display().to_string(),
            ));
        };
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let map_path = provider.resolve(base, &route);
        if !provider.exists(&map_path) {
            return Err(CompileError::RouteFileNotFound(
                map_path.display().to_string(),
            ));
        }
        let map_text = provider
            .read_source(&map_path)
            .map_err(|source| CompileError::Io {
                path: map_path.display().to_string(),
                source,
            })?;
        (map_path, map_text)
    } else {
        (path.to_path_buf(), text)
    };

    let map_label = map_path.display().to_string();
    let mut data = RouteData::new();
    let mut expressions = preprocess(provider, &map_path, &map_text, &mut data, sink);
    build_block_table(&mut expressions, &mut data, sink);

    let mut track = synthesize(&map_label, &data, sink, scene, cancel)?;
    compute_cant_tangents(&mut track.elements);

    let subdivisions = (data.block_interval / SUBDIVISION_SPACING).floor() as usize;
    if subdivisions >= 2 {
        smoothen_out_turns(&mut track.elements, subdivisions);
        // subdivision introduced new cant sample points
        compute_cant_tangents(&mut track.elements);
    } else {
        debug!(
            "block interval {} too short for turn smoothing",
            data.block_interval
        );
    }

    relocate_events(&mut track.elements);
    insert_safety_beacons(&mut track.elements, &track.stations);

    info!(
        "compiled {} into {} elements, {} stations, {} sections",
        map_label,
        track.elements.len(),
        track.stations.len(),
        track.sections.len()
    );
    Ok(CompiledRoute {
        elements: track.elements,
        stations: track.stations,
        sections: track.sections,
    })
}
