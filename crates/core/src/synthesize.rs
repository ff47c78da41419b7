//! Track synthesizer: one walk over the finalized block table.
//!
//! The walk carries a running position and horizontal heading, converts each
//! block's curve/pitch state into a chord advance, emits a [`TrackElement`]
//! per block and anchors every queued event at its local offset. Object
//! placements are resolved against the element frame and handed to the
//! [`SceneSink`] as they are encountered.

use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use nalgebra::{Rotation3, Unit, Vector3};

use crate::error::{CompileError, DiagnosticSink};
use crate::route::{FogState, RouteData};
use crate::track::{
    Event, EventKind, ObjectPlacement, PlacementKind, SceneSink, Section, SectionAspect, Station,
    TrackElement,
};

/// Blocks between cancellation polls.
const CANCEL_POLL_MASK: usize = 15;

/// Result of the synthesis walk, before smoothing and relocation.
#[derive(Debug)]
pub struct SynthesizedTrack {
    pub elements: Vec<TrackElement>,
    pub stations: Vec<Station>,
    pub sections: Vec<Section>,
}

/// Walk the block table and produce the world-space track model.
///
/// Cancellation is polled every 16 blocks; a cancelled walk returns
/// [`CompileError::Cancelled`] and publishes nothing.
pub fn synthesize(
    file: &str,
    data: &RouteData,
    sink: &mut DiagnosticSink,
    scene: &mut dyn SceneSink,
    cancel: &AtomicBool,
) -> Result<SynthesizedTrack, CompileError> {
    let n = data.element_count();
    let interval = data.block_interval;
    debug!("synthesizing {n} track elements at interval {interval}");

    let mut elements: Vec<TrackElement> = Vec::with_capacity(n);
    let mut stations: Vec<Station> = Vec::new();
    let mut sections: Vec<Section> = Vec::new();

    let mut position = Vector3::new(0.0, 0.0, 0.0);
    // horizontal heading in the ground plane, initially due +Z
    let mut heading = (0.0_f64, 1.0_f64);

    let mut current_background = -1_i32;
    let mut current_fog = FogState::default();
    let mut brightness_value = 1.0_f64;
    let mut brightness_position = 0.0_f64;
    let mut current_run = 0_i32;
    let mut current_flange = 0_i32;
    let mut current_limit = f64::INFINITY;
    // (station index, absolute position of the departure boundary)
    let mut pending_station_ends: Vec<(usize, f64)> = Vec::new();

    for i in 0..n {
        if i & CANCEL_POLL_MASK == 0 && cancel.load(Ordering::Relaxed) {
            return Err(CompileError::Cancelled);
        }
        let block = &data.blocks[i];
        let state = block.track_state;
        let start = i as f64 * interval;

        let norm = (heading.0 * heading.0 + heading.1 * heading.1).sqrt();
        if norm != 0.0 {
            heading.0 /= norm;
            heading.1 /= norm;
        }

        let mut element = TrackElement::at(start);
        element.position = position;
        element.direction = Vector3::new(heading.0, state.pitch, heading.1).normalize();
        element.side = Vector3::new(heading.1, 0.0, -heading.0);
        element.up = element.direction.cross(&element.side);
        element.curve_radius = state.curve_radius;
        element.curve_cant = state.curve_cant;
        element.pitch = state.pitch;
        element.accuracy = block.accuracy;
        element.adhesion = block.adhesion;

        // one-off turn at the block boundary
        if block.turn != 0.0 {
            let ag = -block.turn.atan();
            let (cosag, sinag) = (ag.cos(), ag.sin());
            rotate_heading(&mut heading, cosag, sinag);
            rotate_plane(&mut element.direction, cosag, sinag);
            rotate_plane(&mut element.side, cosag, sinag);
            element.up = element.direction.cross(&element.side);
        }

        // chord length, climb and half turn angle for this block
        let mut a = 0.0;
        let mut c = interval;
        let mut h = 0.0;
        if state.curve_radius != 0.0 && state.pitch != 0.0 {
            let p = state.pitch;
            let r = state.curve_radius;
            let s = interval / (1.0 + p * p).sqrt();
            h = s * p;
            let b = s / r.abs();
            c = (2.0 * r * r * (1.0 - b.cos())).sqrt();
            a = 0.5 * sign(r) * b;
            rotate_heading(&mut heading, (-a).cos(), (-a).sin());
        } else if state.curve_radius != 0.0 {
            let r = state.curve_radius;
            let b = interval / r.abs();
            c = (2.0 * r * r * (1.0 - b.cos())).sqrt();
            a = 0.5 * sign(r) * b;
            rotate_heading(&mut heading, (-a).cos(), (-a).sin());
        } else if state.pitch != 0.0 {
            c = interval / (1.0 + state.pitch * state.pitch).sqrt();
            h = c * state.pitch;
        }

        if let Some(index) = block.background {
            if index != current_background {
                current_background = index;
                element.events.push(Event {
                    offset: 0.0,
                    kind: EventKind::BackgroundChange { index },
                });
            }
        }
        if block.fog_defined {
            element.events.push(Event {
                offset: 0.0,
                kind: EventKind::FogChange {
                    previous: current_fog,
                    next: block.fog,
                },
            });
            current_fog = block.fog;
        }
        for change in &block.brightness_changes {
            element.events.push(Event {
                offset: change.position - start,
                kind: EventKind::BrightnessChange {
                    previous: brightness_value,
                    next: change.value,
                    previous_distance: change.position - brightness_position,
                },
            });
            brightness_value = change.value;
            brightness_position = change.position;
        }
        for sound in &block.run_sounds {
            let run = sound.run_index.unwrap_or(current_run);
            let flange = sound.flange_index.unwrap_or(current_flange);
            if run == current_run && flange == current_flange {
                continue;
            }
            // sound changes must not lag behind the block they belong to
            let offset = (sound.position - start).min(0.0);
            element.events.push(Event {
                offset,
                kind: EventKind::RailSounds {
                    previous_run_index: current_run,
                    previous_flange_index: current_flange,
                    next_run_index: run,
                    next_flange_index: flange,
                },
            });
            current_run = run;
            current_flange = flange;
        }
        if i + 1 < n {
            for _ in 0..block.point_sounds.len() {
                element.events.push(Event {
                    offset: 0.0,
                    kind: EventKind::PointSound,
                });
            }
        }
        for placement in &block.sections {
            let section = sections.len();
            sections.push(Section {
                track_position: placement.position,
                aspects: placement
                    .aspects
                    .iter()
                    .map(|&number| SectionAspect {
                        number,
                        speed: match usize::try_from(number) {
                            Ok(n) if n < data.signal_speeds.len() => data.signal_speeds[n],
                            _ => f64::INFINITY,
                        },
                    })
                    .collect(),
            });
            element.events.push(Event {
                offset: placement.position - start,
                kind: EventKind::SectionChange { section },
            });
        }
        for signal in &block.signals {
            if sections.is_empty() {
                sink.error(
                    file,
                    0,
                    0,
                    format!(
                        "signal {} at track position {} precedes any section",
                        signal.signal_key, signal.position
                    ),
                );
                continue;
            }
            let base = sections.len() as i64 - 1;
            let section = (base + i64::from(signal.section)).clamp(0, base) as usize;
            element.events.push(Event {
                offset: signal.position - start,
                kind: EventKind::Signal {
                    signal_key: signal.signal_key.clone(),
                    section,
                },
            });
            let rail = block.rails.get(&signal.rail_key).copied().unwrap_or_default();
            scene.place_object(ObjectPlacement {
                structure_key: signal.signal_key.clone(),
                rail_key: signal.rail_key.clone(),
                kind: PlacementKind::Signal,
                track_position: signal.position,
                position: element.position
                    + element.side * (rail.x + signal.x)
                    + element.up * (rail.y + signal.y)
                    + element.direction * (signal.position - start),
                direction: element.direction,
                up: element.up,
                side: element.side,
            });
        }
        for limit in &block.limits {
            element.events.push(Event {
                offset: limit.position - start,
                kind: EventKind::LimitChange {
                    previous_speed: current_limit,
                    next_speed: limit.speed,
                },
            });
            current_limit = limit.speed;
        }
        for placement in &block.stations {
            let Some(definition) = data.stations.get(&placement.key) else {
                // rejected during block building
                continue;
            };
            let station = stations.len();
            stations.push(Station {
                name: definition.name.clone(),
                arrival_time: definition.arrival_time,
                departure_time: definition.departure_time,
                doors: placement.door,
                pass: definition.pass,
                system: placement.system,
                stop_position: placement.position,
                stop_duration: definition.stop_duration,
                forced_red: definition.forced_red,
            });
            element.events.push(Event {
                offset: 0.0,
                kind: EventKind::StationStart { station },
            });
            element.events.push(Event {
                offset: placement.position - start,
                kind: EventKind::Stop {
                    station,
                    door: placement.door,
                    backward_tolerance: placement.backward_tolerance,
                    forward_tolerance: placement.forward_tolerance,
                },
            });
            pending_station_ends
                .push((station, placement.position + placement.forward_tolerance + interval));
        }

        for object in &block.free_objects {
            let rail = block.rails.get(&object.rail_key).copied().unwrap_or_default();
            let (direction, up, side) = rotated_frame(&element, object.rx, object.ry, object.rz);
            scene.place_object(ObjectPlacement {
                structure_key: object.structure_key.clone(),
                rail_key: object.rail_key.clone(),
                kind: PlacementKind::FreeObject,
                track_position: object.position,
                position: element.position
                    + element.side * (rail.x + object.x)
                    + element.up * (rail.y + object.y)
                    + element.direction * (object.position - start + object.z),
                direction,
                up,
                side,
            });
        }
        let mut repeater_keys: Vec<&String> = block.repeaters.keys().collect();
        repeater_keys.sort();
        for key in repeater_keys {
            let repeater = &block.repeaters[key];
            if repeater.interval <= 0.0 {
                continue;
            }
            let count = (interval / repeater.interval) as usize;
            let rail = block.rails.get(&repeater.rail_key).copied().unwrap_or_default();
            let (direction, up, side) = rotated_frame(&element, repeater.rx, repeater.ry, repeater.rz);
            for k in 0..count {
                let track_position = start + k as f64 * repeater.interval;
                if track_position < repeater.start {
                    continue;
                }
                let structure_key = &repeater.structure_keys[k % repeater.structure_keys.len()];
                scene.place_object(ObjectPlacement {
                    structure_key: structure_key.clone(),
                    rail_key: repeater.rail_key.clone(),
                    kind: PlacementKind::Repeater,
                    track_position,
                    position: element.position
                        + element.side * (rail.x + repeater.x)
                        + element.up * (rail.y + repeater.y)
                        + element.direction * (track_position - start + repeater.z),
                    direction,
                    up,
                    side,
                });
            }
        }
        for crack in &block.cracks {
            let primary = block.rails.get(&crack.primary_rail).copied().unwrap_or_default();
            let Some(secondary) = block.rails.get(&crack.secondary_rail).copied() else {
                sink.error(
                    file,
                    0,
                    0,
                    format!(
                        "rail {} is not defined for the crack at track position {}",
                        crack.secondary_rail, crack.position
                    ),
                );
                continue;
            };
            scene.place_object(ObjectPlacement {
                structure_key: crack.structure_key.clone(),
                rail_key: crack.primary_rail.clone(),
                kind: PlacementKind::Crack,
                track_position: crack.position,
                position: element.position
                    + element.side * (0.5 * (primary.x + secondary.x))
                    + element.up * (0.5 * (primary.y + secondary.y))
                    + element.direction * (crack.position - start),
                direction: element.direction,
                up: element.up,
                side: element.side,
            });
        }

        elements.push(element);
        position.x += heading.0 * c;
        position.y += h;
        position.z += heading.1 * c;
        if a != 0.0 {
            rotate_heading(&mut heading, (-a).cos(), (-a).sin());
        }
    }

    if let Some(last) = elements.last_mut() {
        last.events.push(Event {
            offset: interval,
            kind: EventKind::TrackEnd,
        });
    }
    for (station, boundary) in pending_station_ends {
        let index = (boundary / interval).floor() as i64;
        if index >= 0 && (index as usize) < elements.len() {
            let index = index as usize;
            elements[index].events.push(Event {
                offset: boundary - index as f64 * interval,
                kind: EventKind::StationEnd { station },
            });
        }
    }
    convert_cant_to_points(&mut elements);

    Ok(SynthesizedTrack {
        elements,
        stations,
        sections,
    })
}

/// Convert block-held cant into per-point cant so the tangent computer sees
/// a continuous series: zeros inherit backwards, same-sign neighbours keep
/// the larger magnitude and sign flips meet at their average.
fn convert_cant_to_points(elements: &mut [TrackElement]) {
    for i in (1..elements.len()).rev() {
        if elements[i].curve_cant == 0.0 {
            elements[i].curve_cant = elements[i - 1].curve_cant;
        } else if elements[i - 1].curve_cant != 0.0 {
            if sign(elements[i - 1].curve_cant) == sign(elements[i].curve_cant) {
                if elements[i - 1].curve_cant.abs() > elements[i].curve_cant.abs() {
                    elements[i].curve_cant = elements[i - 1].curve_cant;
                }
            } else {
                elements[i].curve_cant =
                    0.5 * (elements[i].curve_cant + elements[i - 1].curve_cant);
            }
        }
    }
}

fn rotate_heading(heading: &mut (f64, f64), cosa: f64, sina: f64) {
    let x = cosa * heading.0 - sina * heading.1;
    let y = sina * heading.0 + cosa * heading.1;
    *heading = (x, y);
}

/// Rotate a world vector about the vertical axis.
fn rotate_plane(v: &mut Vector3<f64>, cosa: f64, sina: f64) {
    let x = v.x * cosa - v.z * sina;
    let z = v.x * sina + v.z * cosa;
    v.x = x;
    v.z = z;
}

fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Apply an object's yaw/pitch/roll to the element frame.
fn rotated_frame(
    element: &TrackElement,
    rx: f64,
    ry: f64,
    rz: f64,
) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let mut direction = element.direction;
    let mut up = element.up;
    let mut side = element.side;
    if ry != 0.0 {
        let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(up), ry);
        direction = rotation * direction;
        side = rotation * side;
    }
    if rx != 0.0 {
        let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(side), rx);
        direction = rotation * direction;
        up = rotation * up;
    }
    if rz != 0.0 {
        let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(direction), rz);
        up = rotation * up;
        side = rotation * side;
    }
    (direction, up, side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{
        DoorSide, Limit, Repeater, SafetySystem, SectionPlacement, StationDefinition,
        StationPlacement, TrackSound, KMH_TO_MS,
    };
    use crate::track::CollectingSceneSink;

    fn run(data: &RouteData) -> SynthesizedTrack {
        let mut sink = DiagnosticSink::new();
        let mut scene = CollectingSceneSink::new();
        let cancel = AtomicBool::new(false);
        let track = synthesize("map.txt", data, &mut sink, &mut scene, &cancel)
            .expect("synthesis should succeed");
        assert!(sink.is_empty(), "unexpected diagnostics: {:?}", sink.messages());
        track
    }

    #[test]
    fn straight_route_produces_one_element_per_block() {
        let mut data = RouteData::new();
        data.track_position = 100.0;
        data.block_mut(data.block_index(100.0));
        let track = run(&data);
        assert_eq!(track.elements.len(), 4);
        for (i, element) in track.elements.iter().enumerate() {
            assert_eq!(element.start, i as f64 * 25.0);
            assert!((element.position.z - i as f64 * 25.0).abs() < 1e-12);
            assert_eq!(element.position.x, 0.0);
            assert_eq!(element.position.y, 0.0);
        }
        let last = track.elements.last().unwrap();
        assert_eq!(
            last.events.last().unwrap(),
            &Event {
                offset: 25.0,
                kind: EventKind::TrackEnd
            }
        );
    }

    #[test]
    fn chord_length_matches_the_circular_identity() {
        let mut data = RouteData::new();
        data.blocks[0].track_state.curve_radius = 300.0;
        data.track_position = 100.0;
        data.block_mut(data.block_index(100.0));
        let track = run(&data);
        let expected = (2.0 * 300.0_f64.powi(2) * (1.0 - (25.0 / 300.0_f64).cos())).sqrt();
        for pair in track.elements.windows(2) {
            let chord = (pair[1].position - pair[0].position).norm();
            assert!(
                (chord - expected).abs() / expected < 1e-9,
                "chord {chord} differs from {expected}"
            );
        }
    }

    #[test]
    fn curved_track_bends_by_the_full_block_angle() {
        let mut data = RouteData::new();
        data.blocks[0].track_state.curve_radius = 300.0;
        data.track_position = 100.0;
        data.block_mut(data.block_index(100.0));
        let track = run(&data);
        let expected = 25.0 / 300.0;
        let d0 = track.elements[0].direction;
        let d1 = track.elements[1].direction;
        let angle = d0.dot(&d1).clamp(-1.0, 1.0).acos();
        assert!((angle - expected).abs() < 1e-9);
        // positive radius bends towards +X
        assert!(d1.x > 0.0);
    }

    #[test]
    fn limit_events_chain_previous_and_next_speeds() {
        let mut data = RouteData::new();
        data.track_position = 100.0;
        data.block_mut(1).limits.push(Limit {
            position: 30.0,
            speed: 80.0 * KMH_TO_MS,
        });
        data.last_command_block = 1;
        data.block_mut(data.block_index(100.0));
        data.blocks[3].limits.push(Limit {
            position: 75.0,
            speed: f64::INFINITY,
        });
        data.last_command_block = 3;
        let track = run(&data);
        let events: Vec<&Event> = track
            .elements
            .iter()
            .flat_map(|e| &e.events)
            .filter(|e| matches!(e.kind, EventKind::LimitChange { .. }))
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].offset, 5.0);
        assert_eq!(
            events[0].kind,
            EventKind::LimitChange {
                previous_speed: f64::INFINITY,
                next_speed: 80.0 * KMH_TO_MS,
            }
        );
        assert_eq!(
            events[1].kind,
            EventKind::LimitChange {
                previous_speed: 80.0 * KMH_TO_MS,
                next_speed: f64::INFINITY,
            }
        );
    }

    #[test]
    fn station_emits_start_stop_and_delayed_end() {
        let mut data = RouteData::new();
        data.track_position = 100.0;
        data.block_mut(data.block_index(100.0));
        data.stations.insert(
            "sta1".to_owned(),
            StationDefinition {
                name: "Harbour".to_owned(),
                arrival_time: Some(3600.0),
                departure_time: Some(3660.0),
                pass: false,
                stop_duration: 30.0,
                forced_red: true,
            },
        );
        data.blocks[2].stations.push(StationPlacement {
            key: "sta1".to_owned(),
            position: 60.0,
            door: DoorSide::Left,
            backward_tolerance: 5.0,
            forward_tolerance: 10.0,
            system: SafetySystem::Ats,
        });
        data.last_command_block = 2;
        let track = run(&data);
        assert_eq!(track.stations.len(), 1);
        assert_eq!(track.stations[0].name, "Harbour");
        assert_eq!(track.stations[0].stop_position, 60.0);
        assert_eq!(track.stations[0].stop_duration, 30.0);
        assert!(track.stations[0].forced_red);
        let second = &track.elements[2].events;
        assert!(second.contains(&Event {
            offset: 0.0,
            kind: EventKind::StationStart { station: 0 }
        }));
        assert!(second.contains(&Event {
            offset: 10.0,
            kind: EventKind::Stop {
                station: 0,
                door: DoorSide::Left,
                backward_tolerance: 5.0,
                forward_tolerance: 10.0,
            }
        }));
        // departure boundary at 60 + 10 + 25 = 95, in the fourth element
        assert!(track.elements[3].events.contains(&Event {
            offset: 20.0,
            kind: EventKind::StationEnd { station: 0 }
        }));
    }

    #[test]
    fn section_aspects_take_speeds_from_the_signal_table() {
        let mut data = RouteData::new();
        data.track_position = 50.0;
        data.block_mut(data.block_index(50.0));
        data.signal_speeds = vec![0.0, 40.0 * KMH_TO_MS, 60.0 * KMH_TO_MS];
        data.blocks[0].sections.push(SectionPlacement {
            position: 0.0,
            aspects: vec![0, 2, 7],
        });
        data.last_command_block = 0;
        let track = run(&data);
        assert_eq!(
            track.sections[0].aspects,
            vec![
                SectionAspect {
                    number: 0,
                    speed: 0.0,
                },
                SectionAspect {
                    number: 2,
                    speed: 60.0 * KMH_TO_MS,
                },
                // aspects past the table are unrestricted
                SectionAspect {
                    number: 7,
                    speed: f64::INFINITY,
                },
            ]
        );
    }

    #[test]
    fn rail_sound_events_fire_only_on_change() {
        let mut data = RouteData::new();
        data.track_position = 100.0;
        data.block_mut(data.block_index(100.0));
        data.blocks[0].run_sounds.push(TrackSound {
            position: 0.0,
            run_index: Some(0),
            flange_index: None,
        });
        data.blocks[1].run_sounds.push(TrackSound {
            position: 25.0,
            run_index: Some(2),
            flange_index: Some(1),
        });
        data.last_command_block = 1;
        let track = run(&data);
        let events: Vec<&Event> = track
            .elements
            .iter()
            .flat_map(|e| &e.events)
            .filter(|e| matches!(e.kind, EventKind::RailSounds { .. }))
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            EventKind::RailSounds {
                previous_run_index: 0,
                previous_flange_index: 0,
                next_run_index: 2,
                next_flange_index: 1,
            }
        );
    }

    #[test]
    fn fog_events_carry_the_previous_state() {
        let mut data = RouteData::new();
        data.track_position = 100.0;
        data.block_mut(data.block_index(100.0));
        let fog = FogState {
            start: 0.0,
            end: 200.0,
            color: [0.2, 0.2, 0.2],
        };
        data.blocks[1].fog = fog;
        data.blocks[1].fog_defined = true;
        data.last_command_block = 1;
        let track = run(&data);
        assert_eq!(
            track.elements[1].events,
            vec![Event {
                offset: 0.0,
                kind: EventKind::FogChange {
                    previous: FogState::default(),
                    next: fog,
                }
            }]
        );
        // carried fog state in later blocks raises no further events
        assert!(track.elements[2].events.is_empty());
    }

    #[test]
    fn repeater_places_one_instance_per_repetition() {
        let mut data = RouteData::new();
        data.structures.insert(
            "fence".to_owned(),
            crate::route::ObjectPointer {
                path: "fence.csv".to_owned(),
            },
        );
        data.track_position = 50.0;
        data.block_mut(data.block_index(50.0));
        data.blocks[0].repeaters.insert(
            "f".to_owned(),
            Repeater {
                rail_key: "0".to_owned(),
                x: 1.5,
                y: 0.0,
                z: 0.0,
                rx: 0.0,
                ry: 0.0,
                rz: 0.0,
                interval: 5.0,
                structure_keys: vec!["fence".to_owned()],
                start: 0.0,
            },
        );
        let mut sink = DiagnosticSink::new();
        let mut scene = CollectingSceneSink::new();
        let cancel = AtomicBool::new(false);
        synthesize("map.txt", &data, &mut sink, &mut scene, &cancel).unwrap();
        // five instances in the one block holding the repeater
        assert_eq!(scene.placements.len(), 5);
        assert_eq!(scene.placements[0].kind, PlacementKind::Repeater);
        assert_eq!(scene.placements[1].track_position, 5.0);
        assert!((scene.placements[1].position.x - 1.5).abs() < 1e-12);
    }

    #[test]
    fn cant_conversion_propagates_and_averages() {
        let mut elements: Vec<TrackElement> = (0..4)
            .map(|i| TrackElement::at(i as f64 * 25.0))
            .collect();
        elements[0].curve_cant = 0.09;
        elements[1].curve_cant = 0.0;
        elements[2].curve_cant = -0.03;
        convert_cant_to_points(&mut elements);
        assert_eq!(elements[1].curve_cant, 0.09);
        assert_eq!(elements[2].curve_cant, 0.5 * (0.09 - 0.03));
        assert_eq!(elements[3].curve_cant, elements[2].curve_cant);
    }

    #[test]
    fn cancellation_aborts_without_output() {
        let mut data = RouteData::new();
        data.track_position = 100.0;
        data.block_mut(data.block_index(100.0));
        let mut sink = DiagnosticSink::new();
        let mut scene = CollectingSceneSink::new();
        let cancel = AtomicBool::new(true);
        let result = synthesize("map.txt", &data, &mut sink, &mut scene, &cancel);
        assert!(matches!(result, Err(CompileError::Cancelled)));
    }
}
