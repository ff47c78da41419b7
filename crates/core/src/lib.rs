//! camber-core: route compiler core library.
//!
//! Compiles BVE-style route scripts (scenario files and route maps) into a
//! world-space track model: a chain of track elements carrying position and
//! orientation frames, distance-keyed events, and the station and section
//! tables those events reference.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`compile()`] -- run the full pipeline on a scenario or map file
//! - [`CompiledRoute`] -- elements plus station and section tables
//! - [`TrackElement`], [`Event`], [`EventKind`] -- the track model
//! - [`Diagnostic`], [`DiagnosticSink`], [`CompileError`] -- error reporting
//! - [`SourceProvider`] -- file access abstraction, with
//!   [`FileSystemProvider`] and [`InMemoryProvider`] implementations
//! - [`SceneSink`] -- receiver for placed scenery objects
//!
//! Individual pass entry points are also re-exported for selective
//! pipeline execution.

pub mod commands;
pub mod compile;
pub mod error;
pub mod expression;
pub mod numbers;
pub mod preprocess;
pub mod relocate;
pub mod route;
pub mod smooth;
pub mod source;
pub mod synthesize;
pub mod track;

// ── Convenience re-exports: key types ────────────────────────────────

pub use compile::CompiledRoute;
pub use error::{CompileError, Diagnostic, DiagnosticSink, Severity};
pub use route::RouteData;
pub use source::{FileSystemProvider, InMemoryProvider, SourceProvider};
pub use track::{
    CollectingSceneSink, Event, EventKind, ObjectPlacement, PlacementKind, SceneSink, Section,
    SectionAspect, Station, TrackElement,
};

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use commands::build_block_table;
pub use compile::compile;
pub use preprocess::preprocess;
pub use relocate::{insert_safety_beacons, relocate_events};
pub use smooth::{compute_cant_tangents, smoothen_out_turns, TrackFollower};
pub use synthesize::{synthesize, SynthesizedTrack};
