//! Final fixups after geometry smoothing: event relocation and
//! compatibility beacon synthesis.
//!
//! Turn smoothing shortens elements, so an event anchored near the end of
//! its element can end up past the following element's start; those are
//! migrated forward with a recomputed offset. Beacons encode safety-system
//! zones and speed limits for the train-control compatibility layer.

use crate::route::SafetySystem;
use crate::track::{Event, EventKind, Station, TrackElement, TransponderKind};

/// Move every event whose absolute position falls at or past the next
/// element's start into that element. Cascades across elements until all
/// events satisfy the containment invariant.
pub fn relocate_events(elements: &mut [TrackElement]) {
    for i in 0..elements.len().saturating_sub(1) {
        let (left, right) = elements.split_at_mut(i + 1);
        let current = &mut left[i];
        let next = &mut right[0];
        let mut j = 0;
        while j < current.events.len() {
            if current.start + current.events[j].offset >= next.start {
                let mut event = current.events.remove(j);
                event.offset += current.start - next.start;
                next.events.push(event);
            } else {
                j += 1;
            }
        }
    }
}

/// Scan station and limit events in track order and synthesize transponder
/// events for the automatic train control compatibility layer.
///
/// Track-status beacons are inserted next to the station event that opens
/// or closes the zone; speed-limit beacons pack the clamped speed and
/// distance into one value and are all anchored to the first element.
pub fn insert_safety_beacons(elements: &mut [TrackElement], stations: &[Station]) {
    if elements.is_empty() {
        return;
    }
    let mut limit_beacons: Vec<Event> = Vec::new();
    let mut atc = false;
    for element in elements.iter_mut() {
        let start = element.start;
        let mut inserted: Vec<Event> = Vec::new();
        for event in &element.events {
            match event.kind {
                EventKind::StationStart { station } => {
                    if !atc && stations[station].system == SafetySystem::Atc {
                        inserted.push(track_status(0));
                        inserted.push(track_status(1));
                        atc = true;
                    } else if atc && stations[station].system == SafetySystem::Ats {
                        inserted.push(track_status(2));
                        inserted.push(track_status(3));
                    }
                }
                EventKind::StationEnd { station } if atc => {
                    match stations[station].system {
                        SafetySystem::Atc => {
                            inserted.push(track_status(1));
                            inserted.push(track_status(2));
                        }
                        SafetySystem::Ats => {
                            inserted.push(track_status(3));
                            inserted.push(track_status(0));
                            atc = false;
                        }
                    }
                }
                EventKind::LimitChange { next_speed, .. } if atc => {
                    let speed = (3.6 * next_speed).min(4095.0).round() as u32;
                    let distance = ((start + event.offset).round() as i64).min(1_048_575) as u32;
                    limit_beacons.push(Event {
                        offset: 0.0,
                        kind: EventKind::Transponder {
                            kind: TransponderKind::AtcSpeedLimit,
                            value: (speed | (distance << 12)) as i32,
                        },
                    });
                }
                _ => {}
            }
        }
        element.events.extend(inserted);
    }
    elements[0].events.extend(limit_beacons);
}

fn track_status(value: i32) -> Event {
    Event {
        offset: 0.0,
        kind: EventKind::Transponder {
            kind: TransponderKind::AtcTrackStatus,
            value,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::DoorSide;

    fn elements_at(starts: &[f64]) -> Vec<TrackElement> {
        starts.iter().map(|s| TrackElement::at(*s)).collect()
    }

    fn station(system: SafetySystem) -> Station {
        Station {
            name: "Test".to_owned(),
            arrival_time: None,
            departure_time: None,
            doors: DoorSide::Left,
            pass: false,
            system,
            stop_position: 0.0,
            stop_duration: 15.0,
            forced_red: false,
        }
    }

    #[test]
    fn event_past_the_boundary_moves_forward() {
        let mut elements = elements_at(&[0.0, 20.0, 45.0]);
        elements[0].events.push(Event {
            offset: 22.0,
            kind: EventKind::PointSound,
        });
        elements[0].events.push(Event {
            offset: 5.0,
            kind: EventKind::TrackEnd,
        });
        relocate_events(&mut elements);
        assert_eq!(elements[0].events.len(), 1);
        assert_eq!(elements[0].events[0].offset, 5.0);
        assert_eq!(elements[1].events.len(), 1);
        assert_eq!(elements[1].events[0].offset, 2.0);
        assert_eq!(elements[1].events[0].kind, EventKind::PointSound);
    }

    #[test]
    fn relocation_cascades_and_restores_containment() {
        let mut elements = elements_at(&[0.0, 10.0, 20.0, 30.0]);
        elements[0].events.push(Event {
            offset: 25.0,
            kind: EventKind::PointSound,
        });
        relocate_events(&mut elements);
        for i in 0..elements.len() - 1 {
            for event in &elements[i].events {
                let p = elements[i].start + event.offset;
                assert!(p >= elements[i].start && p < elements[i + 1].start);
            }
        }
        assert_eq!(elements[2].events.len(), 1);
        assert_eq!(elements[2].events[0].offset, 5.0);
    }

    #[test]
    fn atc_zone_gets_paired_track_status_beacons() {
        let mut elements = elements_at(&[0.0, 25.0, 50.0]);
        elements[0].events.push(Event {
            offset: 0.0,
            kind: EventKind::StationStart { station: 0 },
        });
        elements[2].events.push(Event {
            offset: 5.0,
            kind: EventKind::StationEnd { station: 0 },
        });
        let stations = vec![station(SafetySystem::Atc)];
        insert_safety_beacons(&mut elements, &stations);
        let opening: Vec<i32> = transponder_values(&elements[0]);
        assert_eq!(opening, vec![0, 1]);
        let closing: Vec<i32> = transponder_values(&elements[2]);
        assert_eq!(closing, vec![1, 2]);
    }

    #[test]
    fn returning_to_ats_closes_the_zone() {
        let mut elements = elements_at(&[0.0, 25.0]);
        elements[0].events.push(Event {
            offset: 0.0,
            kind: EventKind::StationStart { station: 0 },
        });
        elements[1].events.push(Event {
            offset: 0.0,
            kind: EventKind::StationEnd { station: 1 },
        });
        // a limit change after the zone closes must not produce a beacon
        elements[1].events.push(Event {
            offset: 1.0,
            kind: EventKind::LimitChange {
                previous_speed: f64::INFINITY,
                next_speed: 20.0,
            },
        });
        let stations = vec![station(SafetySystem::Atc), station(SafetySystem::Ats)];
        insert_safety_beacons(&mut elements, &stations);
        assert_eq!(transponder_values(&elements[1]), vec![3, 0]);
        assert!(elements[0].events.iter().all(|e| !matches!(
            e.kind,
            EventKind::Transponder {
                kind: TransponderKind::AtcSpeedLimit,
                ..
            }
        )));
    }

    #[test]
    fn limit_changes_inside_the_zone_pack_speed_and_distance() {
        let mut elements = elements_at(&[0.0, 25.0, 50.0]);
        elements[0].events.push(Event {
            offset: 0.0,
            kind: EventKind::StationStart { station: 0 },
        });
        elements[1].events.push(Event {
            offset: 5.0,
            kind: EventKind::LimitChange {
                previous_speed: f64::INFINITY,
                next_speed: 100.0 / 3.6,
            },
        });
        let stations = vec![station(SafetySystem::Atc)];
        insert_safety_beacons(&mut elements, &stations);
        let last = elements[0].events.last().unwrap();
        let EventKind::Transponder { kind, value } = last.kind else {
            panic!("expected a speed limit beacon, got {:?}", last.kind);
        };
        assert_eq!(kind, TransponderKind::AtcSpeedLimit);
        assert_eq!(value, 100 | (30 << 12));
    }

    #[test]
    fn unlimited_speed_clamps_to_the_field_maximum() {
        let mut elements = elements_at(&[0.0]);
        elements[0].events.push(Event {
            offset: 0.0,
            kind: EventKind::StationStart { station: 0 },
        });
        elements[0].events.push(Event {
            offset: 1.0,
            kind: EventKind::LimitChange {
                previous_speed: 0.0,
                next_speed: f64::INFINITY,
            },
        });
        let stations = vec![station(SafetySystem::Atc)];
        insert_safety_beacons(&mut elements, &stations);
        let last = elements[0].events.last().unwrap();
        let EventKind::Transponder { value, .. } = last.kind else {
            panic!("expected a beacon");
        };
        assert_eq!(value & 0xFFF, 4095);
    }

    fn transponder_values(element: &TrackElement) -> Vec<i32> {
        element
            .events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::Transponder {
                    kind: TransponderKind::AtcTrackStatus,
                    value,
                } => Some(value),
                _ => None,
            })
            .collect()
    }
}
