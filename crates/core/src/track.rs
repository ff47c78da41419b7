//! Final track model: world-space elements, distance-anchored events, and
//! the scene-construction collaborator interface.
//!
//! Everything in this module is output. The synthesizer builds it, the
//! smoothing passes adjust it, and after relocation the model is handed to
//! the consumer immutable.

use nalgebra::Vector3;
use serde::Serialize;

use crate::route::{DoorSide, FogState, SafetySystem};

/// One synthesized segment of track geometry.
///
/// The frame (direction, up, side) is orthonormal and `start` values are
/// strictly increasing across the element array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackElement {
    /// Distance along the track at which this element begins.
    pub start: f64,
    pub position: Vector3<f64>,
    pub direction: Vector3<f64>,
    pub up: Vector3<f64>,
    pub side: Vector3<f64>,
    /// Signed curve radius; 0 means straight. Mutable until turn smoothing
    /// finalizes it.
    pub curve_radius: f64,
    pub curve_cant: f64,
    pub curve_cant_tangent: f64,
    pub pitch: f64,
    pub accuracy: f64,
    pub adhesion: f64,
    pub events: Vec<Event>,
}

impl TrackElement {
    /// An element at `start` with the identity frame: looking along +Z,
    /// up +Y, side +X.
    pub fn at(start: f64) -> Self {
        TrackElement {
            start,
            position: Vector3::new(0.0, 0.0, 0.0),
            direction: Vector3::new(0.0, 0.0, 1.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            side: Vector3::new(1.0, 0.0, 0.0),
            curve_radius: 0.0,
            curve_cant: 0.0,
            curve_cant_tangent: 0.0,
            pitch: 0.0,
            accuracy: 2.0,
            adhesion: 1.0,
            events: Vec::new(),
        }
    }
}

/// A discrete state transition anchored at a signed offset from its
/// element's start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub offset: f64,
    pub kind: EventKind,
}

/// Closed set of event payloads. Each variant carries the previous/next
/// values a consumer needs to replay the transition without scanning
/// history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    BackgroundChange {
        index: i32,
    },
    FogChange {
        previous: FogState,
        next: FogState,
    },
    BrightnessChange {
        previous: f64,
        next: f64,
        /// Distance back to the previous change point, for interpolation.
        previous_distance: f64,
    },
    RailSounds {
        previous_run_index: i32,
        previous_flange_index: i32,
        next_run_index: i32,
        next_flange_index: i32,
    },
    PointSound,
    SectionChange {
        /// Index into the compiled section table.
        section: usize,
    },
    Signal {
        signal_key: String,
        section: usize,
    },
    LimitChange {
        /// m/s; `f64::INFINITY` encodes "unlimited".
        previous_speed: f64,
        next_speed: f64,
    },
    StationStart {
        station: usize,
    },
    Stop {
        station: usize,
        door: DoorSide,
        backward_tolerance: f64,
        forward_tolerance: f64,
    },
    StationEnd {
        station: usize,
    },
    Transponder {
        kind: TransponderKind,
        value: i32,
    },
    TrackEnd,
}

/// Beacon types understood by the train-control compatibility layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransponderKind {
    AtcTrackStatus,
    AtcSpeedLimit,
}

/// A station in the compiled global table, referenced by index from
/// station events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub name: String,
    pub arrival_time: Option<f64>,
    pub departure_time: Option<f64>,
    pub doors: DoorSide,
    pub pass: bool,
    pub system: SafetySystem,
    pub stop_position: f64,
    /// Minimum dwell time in seconds.
    pub stop_duration: f64,
    /// The departure section holds a red aspect until departure time.
    pub forced_red: bool,
}

/// A signalling section boundary in the compiled global table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub track_position: f64,
    pub aspects: Vec<SectionAspect>,
}

/// One permissible aspect of a section and the speed it imposes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SectionAspect {
    pub number: i32,
    /// m/s; `f64::INFINITY` when the aspect has no mapped speed.
    pub speed: f64,
}

/// One object instantiation call issued during synthesis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectPlacement {
    pub structure_key: String,
    pub rail_key: String,
    pub kind: PlacementKind,
    pub track_position: f64,
    pub position: Vector3<f64>,
    pub direction: Vector3<f64>,
    pub up: Vector3<f64>,
    pub side: Vector3<f64>,
}

/// What produced a placement; consumers use this for visibility grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    FreeObject,
    Repeater,
    Crack,
    Signal,
}

/// Scene-construction collaborator. The synthesizer calls this once per
/// placed free object, repeater instance, crack and signal post.
pub trait SceneSink {
    fn place_object(&mut self, placement: ObjectPlacement);
}

/// Sink that just collects placements, for the CLI and for tests.
#[derive(Debug, Default)]
pub struct CollectingSceneSink {
    pub placements: Vec<ObjectPlacement>,
}

impl CollectingSceneSink {
    pub fn new() -> Self {
        CollectingSceneSink::default()
    }
}

impl SceneSink for CollectingSceneSink {
    fn place_object(&mut self, placement: ObjectPlacement) {
        self.placements.push(placement);
    }
}
