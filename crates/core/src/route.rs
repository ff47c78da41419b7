//! Compiler context and the distance-indexed block table.
//!
//! All state accumulated while reading a route map lives in [`RouteData`],
//! which is threaded by exclusive reference through the preprocessor and the
//! command handlers and then consumed by the synthesizer. Nothing here is
//! global; the context's lifetime is one compile.

use std::collections::HashMap;

use serde::Serialize;

/// Conversion factor from km/h to m/s.
pub const KMH_TO_MS: f64 = 1.0 / 3.6;

/// Default spacing between consecutive block slots, in meters.
pub const DEFAULT_BLOCK_INTERVAL: f64 = 25.0;

/// Which side a station's doors open to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorSide {
    Left,
    #[default]
    None,
    Right,
}

/// Safety system in effect from a station boundary onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetySystem {
    #[default]
    Ats,
    Atc,
}

/// An entry in the structure lookup table: a named pointer to an external
/// object file. The compiler never opens the object itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPointer {
    pub path: String,
}

/// A station list entry loaded by `station.load`.
#[derive(Debug, Clone, PartialEq)]
pub struct StationDefinition {
    pub name: String,
    /// Seconds since midnight.
    pub arrival_time: Option<f64>,
    pub departure_time: Option<f64>,
    /// Trains pass without stopping.
    pub pass: bool,
    /// Minimum stop duration in seconds.
    pub stop_duration: f64,
    /// Signal held at red until the departure time.
    pub forced_red: bool,
}

/// A signal list entry: the aspect indices a named signal model can show.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalAspects {
    pub aspects: Vec<i32>,
}

/// Running curve/pitch state carried from block to block until changed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackState {
    /// Signed curve radius in meters; 0 means straight.
    pub curve_radius: f64,
    /// Superelevation in meters applied across the gauge.
    pub curve_cant: f64,
    /// Gradient as rise over run.
    pub pitch: f64,
}

/// Lateral placement of a secondary (named) rail relative to the player rail.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rail {
    pub x: f64,
    pub y: f64,
}

/// An active repeater: a structure placed every `interval` meters along a
/// rail until explicitly ended. Carried forward across blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Repeater {
    pub rail_key: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub interval: f64,
    pub structure_keys: Vec<String>,
    /// Track position the repetition pattern is phased from.
    pub start: f64,
}

/// A single structure placement on a rail.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeObject {
    pub rail_key: String,
    pub structure_key: String,
    pub position: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

/// A structure spanning the gap between two rails.
#[derive(Debug, Clone, PartialEq)]
pub struct Crack {
    pub primary_rail: String,
    pub secondary_rail: String,
    pub structure_key: String,
    pub position: f64,
}

/// A signal model placed against a signalling section.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPlacement {
    pub signal_key: String,
    /// Section offset the signal reads, relative to the section at its
    /// position.
    pub section: i32,
    pub rail_key: String,
    pub position: f64,
    pub x: f64,
    pub y: f64,
}

/// A signalling section boundary with its permissible aspect indices.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionPlacement {
    pub position: f64,
    pub aspects: Vec<i32>,
}

/// A speed limit taking effect at a position. Stored in m/s;
/// `f64::INFINITY` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    pub position: f64,
    pub speed: f64,
}

/// A station stop placed on the track, referencing a [`StationDefinition`].
#[derive(Debug, Clone, PartialEq)]
pub struct StationPlacement {
    pub key: String,
    pub position: f64,
    pub door: DoorSide,
    pub backward_tolerance: f64,
    pub forward_tolerance: f64,
    pub system: SafetySystem,
}

/// A change of rolling or flange sound index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSound {
    pub position: f64,
    pub run_index: Option<i32>,
    pub flange_index: Option<i32>,
}

/// A cab brightness change point. An immediate change is stored as two
/// points one meter apart; interpolated changes as a single point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessChange {
    pub position: f64,
    /// 0.0 (dark) to 1.0 (full).
    pub value: f64,
}

/// Fog state for one block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FogState {
    pub start: f64,
    pub end: f64,
    pub color: [f64; 3],
}

impl Default for FogState {
    fn default() -> Self {
        FogState {
            start: 0.0,
            end: 1.0,
            color: [0.5, 0.5, 0.5],
        }
    }
}

/// Per-interval accumulator of all pending track commands.
///
/// Carry-forward fields (track state, rails, repeaters, accuracy, adhesion,
/// fog) are cloned into newly grown blocks; event lists start empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub background: Option<i32>,
    pub track_state: TrackState,
    /// One-off turn angle (rise over run) applied at the block boundary.
    pub turn: f64,
    pub accuracy: f64,
    pub adhesion: f64,
    pub rails: HashMap<String, Rail>,
    pub repeaters: HashMap<String, Repeater>,
    pub free_objects: Vec<FreeObject>,
    pub cracks: Vec<Crack>,
    pub signals: Vec<SignalPlacement>,
    pub sections: Vec<SectionPlacement>,
    pub limits: Vec<Limit>,
    pub stations: Vec<StationPlacement>,
    pub run_sounds: Vec<TrackSound>,
    pub point_sounds: Vec<f64>,
    pub brightness_changes: Vec<BrightnessChange>,
    pub fog: FogState,
    pub fog_defined: bool,
}

impl Block {
    fn grown_from(previous: &Block) -> Self {
        Block {
            track_state: previous.track_state,
            accuracy: previous.accuracy,
            adhesion: previous.adhesion,
            rails: previous.rails.clone(),
            repeaters: previous.repeaters.clone(),
            fog: previous.fog,
            ..Block::default()
        }
    }
}

/// Compiler-wide aggregate: block table, lookup tables and bookkeeping.
#[derive(Debug)]
pub struct RouteData {
    pub block_interval: f64,
    /// Unit-of-length factor table for position values (`1:30` groups
    /// right-align against it).
    pub unit_of_length: Vec<f64>,
    /// Conversion factor applied to speed arguments, km/h by default.
    pub unit_of_speed: f64,
    /// Current absolute track position set by the last bare number.
    pub track_position: f64,
    pub blocks: Vec<Block>,
    pub structures: HashMap<String, ObjectPointer>,
    pub stations: HashMap<String, StationDefinition>,
    pub signals: HashMap<String, SignalAspects>,
    /// Speed per signal aspect index, m/s.
    pub signal_speeds: Vec<f64>,
    /// Structure keys promoted to backgrounds, indexed by block background
    /// ids.
    pub backgrounds: Vec<String>,
    /// Highest block index any command landed in.
    pub last_command_block: usize,
    pub last_brightness: f64,
}

impl Default for RouteData {
    fn default() -> Self {
        RouteData {
            block_interval: DEFAULT_BLOCK_INTERVAL,
            unit_of_length: vec![1.0],
            unit_of_speed: KMH_TO_MS,
            track_position: 0.0,
            blocks: vec![Block {
                accuracy: 2.0,
                adhesion: 1.0,
                ..Block::default()
            }],
            structures: HashMap::new(),
            stations: HashMap::new(),
            signals: HashMap::new(),
            signal_speeds: vec![
                0.0,
                25.0 * KMH_TO_MS,
                55.0 * KMH_TO_MS,
                75.0 * KMH_TO_MS,
                f64::INFINITY,
                f64::INFINITY,
            ],
            backgrounds: Vec::new(),
            last_command_block: 0,
            last_brightness: 1.0,
        }
    }
}

impl RouteData {
    pub fn new() -> Self {
        RouteData::default()
    }

    /// Block index for an absolute track position. The small bias keeps
    /// positions that land exactly on a boundary in the upper block despite
    /// accumulated floating-point error.
    pub fn block_index(&self, position: f64) -> usize {
        let index = (position / self.block_interval + 0.001).floor();
        if index <= 0.0 {
            0
        } else {
            index as usize
        }
    }

    /// Mutable access to the block at `index`, growing the table as needed.
    /// Intermediate blocks inherit carry-forward state from their
    /// predecessor.
    pub fn block_mut(&mut self, index: usize) -> &mut Block {
        while self.blocks.len() <= index {
            let last = self
                .blocks
                .last()
                .cloned()
                .unwrap_or_default();
            self.blocks.push(Block::grown_from(&last));
        }
        &mut self.blocks[index]
    }

    /// The block containing the current track position.
    pub fn current_block(&mut self) -> &mut Block {
        let index = self.block_index(self.track_position);
        self.last_command_block = self.last_command_block.max(index);
        self.block_mut(index)
    }

    /// Number of elements the synthesizer will produce: enough to cover both
    /// the final declared position and the last block any command touched.
    pub fn element_count(&self) -> usize {
        let declared = self.block_index(self.track_position);
        declared.max(self.last_command_block + 1)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_index_uses_floor_with_bias() {
        let data = RouteData::new();
        assert_eq!(data.block_index(0.0), 0);
        assert_eq!(data.block_index(24.9), 0);
        assert_eq!(data.block_index(25.0), 1);
        // a position epsilon short of a boundary still lands above it
        assert_eq!(data.block_index(49.999999), 2);
        assert_eq!(data.block_index(-5.0), 0);
    }

    #[test]
    fn growth_fills_intermediate_blocks_with_defaults() {
        let mut data = RouteData::new();
        data.track_position = 100.0;
        data.current_block();
        assert_eq!(data.blocks.len(), 5);
        for block in &data.blocks[1..] {
            assert!(block.limits.is_empty());
            assert!(block.free_objects.is_empty());
            assert!(!block.fog_defined);
        }
    }

    #[test]
    fn growth_carries_running_state_forward() {
        let mut data = RouteData::new();
        data.blocks[0].track_state.curve_radius = 300.0;
        data.blocks[0].rails.insert("siding".to_owned(), Rail { x: 3.8, y: 0.0 });
        data.track_position = 75.0;
        data.current_block();
        let last = data.blocks.last().unwrap();
        assert_eq!(last.track_state.curve_radius, 300.0);
        assert_eq!(last.rails["siding"].x, 3.8);
        assert_eq!(last.adhesion, 1.0);
    }

    #[test]
    fn element_count_covers_commands_past_the_declared_end() {
        let mut data = RouteData::new();
        data.track_position = 100.0;
        assert_eq!(data.element_count(), 4);
        data.track_position = 130.0;
        data.current_block();
        data.track_position = 100.0;
        assert_eq!(data.element_count(), 6);
    }

    #[test]
    fn default_signal_speed_table_leaves_the_top_aspects_open() {
        let data = RouteData::new();
        assert_eq!(data.signal_speeds.len(), 6);
        assert_eq!(data.signal_speeds[0], 0.0);
        assert_eq!(data.signal_speeds[1], 25.0 * KMH_TO_MS);
        assert_eq!(data.signal_speeds[4], f64::INFINITY);
        assert_eq!(data.signal_speeds[5], f64::INFINITY);
    }
}
