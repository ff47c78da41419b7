//! Geometry smoothing passes run after synthesis.
//!
//! Two passes: cant tangents (a clamped Catmull-Rom scheme so superelevation
//! eases in and out without overshoot) and turn smoothing (subdivide the
//! elements, find residual direction kinks left by block-granularity
//! geometry and replace each with a fitted circular arc). The
//! [`TrackFollower`] interpolates a world frame at an arbitrary track
//! position and is shared by both the smoother and its tests.

use log::debug;
use nalgebra::{Rotation3, Unit, Vector3};

use crate::track::TrackElement;

/// Fractional probe placed just short of an element boundary.
const BOUNDARY_PROBE: f64 = 0.000_000_01;

/// Squared horizontal direction difference above which a boundary counts as
/// a turn.
const TURN_EPSILON: f64 = 0.0001;

/// Steps in the element-shortening search.
const SHORTENING_STEPS: usize = 1000;

/// Interpolates a world-space frame at any track position by advancing
/// along the owning element's curve.
#[derive(Debug, Clone)]
pub struct TrackFollower {
    pub track_position: f64,
    pub position: Vector3<f64>,
    pub direction: Vector3<f64>,
    pub up: Vector3<f64>,
    pub side: Vector3<f64>,
    pub curve_radius: f64,
    pub curve_cant: f64,
    last_element: usize,
}

impl Default for TrackFollower {
    fn default() -> Self {
        TrackFollower {
            track_position: 0.0,
            position: Vector3::new(0.0, 0.0, 0.0),
            direction: Vector3::new(0.0, 0.0, 1.0),
            up: Vector3::new(0.0, 1.0, 0.0),
            side: Vector3::new(1.0, 0.0, 0.0),
            curve_radius: 0.0,
            curve_cant: 0.0,
            last_element: 0,
        }
    }
}

impl TrackFollower {
    pub fn new() -> Self {
        TrackFollower::default()
    }

    /// Move the follower to `position` and recompute its world frame.
    pub fn follow(&mut self, elements: &[TrackElement], position: f64) {
        if elements.is_empty() {
            return;
        }
        let mut i = self.last_element.min(elements.len() - 1);
        while i > 0 && position < elements[i].start {
            i -= 1;
        }
        while i + 1 < elements.len() && position >= elements[i + 1].start {
            i += 1;
        }
        let element = &elements[i];
        let db = position - element.start;
        if db != 0.0 && element.curve_radius != 0.0 {
            let r = element.curve_radius;
            let horizontal =
                (element.direction.x * element.direction.x + element.direction.z * element.direction.z)
                    .sqrt();
            let p = element.direction.y / horizontal;
            let s = db / (1.0 + p * p).sqrt();
            let h = s * p;
            let b = s / r.abs();
            let f = 2.0 * r * r * (1.0 - b.cos());
            let c = sign(db) * f.max(0.0).sqrt();
            let a = 0.5 * sign(r) * b;
            let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), a);
            let mut d = Vector3::new(element.direction.x, 0.0, element.direction.z).normalize();
            d = rotation * d;
            self.position = element.position + Vector3::new(c * d.x, h, c * d.z);
            d = rotation * d;
            self.direction = Vector3::new(d.x, p, d.z).normalize();
            self.side =
                Rotation3::from_axis_angle(&Vector3::y_axis(), 2.0 * a) * element.side;
            self.up = self.direction.cross(&self.side);
            self.curve_radius = r;
        } else if db != 0.0 {
            self.position = element.position + db * element.direction;
            self.direction = element.direction;
            self.up = element.up;
            self.side = element.side;
            self.curve_radius = 0.0;
        } else {
            self.position = element.position;
            self.direction = element.direction;
            self.up = element.up;
            self.side = element.side;
            self.curve_radius = element.curve_radius;
        }
        if db != 0.0 && i + 1 < elements.len() {
            let t = (db / (elements[i + 1].start - element.start)).clamp(0.0, 1.0);
            let t2 = t * t;
            let t3 = t2 * t;
            self.curve_cant = (2.0 * t3 - 3.0 * t2 + 1.0) * element.curve_cant
                + (t3 - 2.0 * t2 + t) * element.curve_cant_tangent
                + (-2.0 * t3 + 3.0 * t2) * elements[i + 1].curve_cant
                + (t3 - t2) * elements[i + 1].curve_cant_tangent;
        } else {
            self.curve_cant = element.curve_cant;
        }
        self.track_position = position;
        self.last_element = i;
    }
}

/// Recompute cant tangents over the whole element sequence.
///
/// Tangents are centered averages of the forward differences; whenever the
/// ratio pair against a delta satisfies `a² + b² > 9`, both tangents are
/// rescaled by `3 / sqrt(a² + b²)` to bound interpolation overshoot.
pub fn compute_cant_tangents(elements: &mut [TrackElement]) {
    match elements.len() {
        0 => {}
        1 => elements[0].curve_cant_tangent = 0.0,
        n => {
            let mut deltas = vec![0.0; n - 1];
            for i in 0..n - 1 {
                deltas[i] = elements[i + 1].curve_cant - elements[i].curve_cant;
            }
            let mut tangents = vec![0.0; n];
            tangents[0] = deltas[0];
            tangents[n - 1] = deltas[n - 2];
            for i in 1..n - 1 {
                tangents[i] = 0.5 * (deltas[i - 1] + deltas[i]);
            }
            for i in 0..n - 1 {
                if deltas[i] == 0.0 {
                    tangents[i] = 0.0;
                    tangents[i + 1] = 0.0;
                } else {
                    let a = tangents[i] / deltas[i];
                    let b = tangents[i + 1] / deltas[i];
                    if a * a + b * b > 9.0 {
                        let t = 3.0 / (a * a + b * b).sqrt();
                        tangents[i] = t * a * deltas[i];
                        tangents[i + 1] = t * b * deltas[i];
                    }
                }
            }
            for (element, tangent) in elements.iter_mut().zip(tangents) {
                element.curve_cant_tangent = tangent;
            }
        }
    }
}

/// Subdivide the element sequence and replace residual direction kinks with
/// fitted circular arcs.
///
/// Each detected turn gets an equivalent radius estimated by intersecting
/// the side-offset lines of its neighbours; the following element is then
/// iteratively shortened and the best of three turn-angle candidates kept
/// so positional continuity survives the fit. Event offsets are NOT
/// corrected here; run the relocation pass afterwards.
pub fn smoothen_out_turns(elements: &mut Vec<TrackElement>, subdivisions: usize) {
    assert!(subdivisions >= 2, "turn smoothing needs at least two subdivisions");
    if elements.len() < 2 {
        return;
    }
    subdivide(elements, subdivisions);
    let turns = detect_turns(elements, subdivisions);
    let mut total_shortage = 0.0;
    for i in 0..elements.len() {
        if !turns[i] {
            continue;
        }
        let Some(r) = estimate_radius(elements, i) else {
            continue;
        };
        let mut follower = TrackFollower::new();
        elements[i - 1].curve_radius = r;
        let p = probe_position(elements[i - 1].start, elements[i].start);
        follower.follow(elements, p - 1.0);
        follower.follow(elements, p);
        elements[i].curve_radius = r;
        elements[i].position = follower.position;
        elements[i].direction = follower.direction;
        elements[i].up = follower.up;
        elements[i].side = follower.side;
        total_shortage += shorten_following(elements, &mut follower, i);

        // search the turn-angle candidates for the orientation with the
        // smallest endpoint error
        let p = probe_position(elements[i].start, elements[i + 1].start);
        follower.follow(elements, p - 1.0);
        follower.follow(elements, p);
        let ab = elements[i + 1].position - follower.position;
        let ac = elements[i + 1].position - elements[i].position;
        let bc = follower.position - elements[i].position;
        let sa = (bc.x * bc.x + bc.z * bc.z).sqrt();
        let sb = (ac.x * ac.x + ac.z * ac.z).sqrt();
        let sc = (ab.x * ab.x + ab.z * ab.z).sqrt();
        let denominator = 2.0 * sa * sb;
        if denominator != 0.0 {
            let value = (sa * sa + sb * sb - sc * sc) / denominator;
            let original_angle = if value < -1.0 {
                std::f64::consts::PI
            } else if value > 1.0 {
                0.0
            } else {
                value.acos()
            };
            let original = elements[i].clone();
            let mut best_error = f64::MAX;
            let mut best_candidate = 0;
            for candidate in -1i32..=1 {
                elements[i] = original.clone();
                rotate_element_about_y(&mut elements[i], f64::from(candidate) * original_angle);
                let p = probe_position(elements[i].start, elements[i + 1].start);
                follower.follow(elements, p - 1.0);
                follower.follow(elements, p);
                let d = elements[i + 1].position - follower.position;
                let error = d.norm_squared();
                if error < best_error {
                    best_error = error;
                    best_candidate = candidate;
                }
            }
            elements[i] = original;
            rotate_element_about_y(&mut elements[i], f64::from(best_candidate) * original_angle);
            total_shortage += shorten_following(elements, &mut follower, i);
        }

        // compensate any residual vertical-angle mismatch
        let p = probe_position(elements[i].start, elements[i + 1].start);
        follower.follow(elements, p - 1.0);
        follower.follow(elements, p);
        let d1 = elements[i + 1].position - elements[i].position;
        let a1 = (d1.y / (d1.x * d1.x + d1.z * d1.z).sqrt()).atan();
        let d2 = follower.position - elements[i].position;
        let a2 = (d2.y / (d2.x * d2.x + d2.z * d2.z).sqrt()).atan();
        let b = a2 - a1;
        if b * b > BOUNDARY_PROBE {
            let rotation =
                Rotation3::from_axis_angle(&Unit::new_normalize(elements[i].side), b);
            elements[i].direction = rotation * elements[i].direction;
            elements[i].up = rotation * elements[i].up;
        }
    }
    if total_shortage != 0.0 {
        debug!("turn smoothing shortened the track by {total_shortage:.4} m");
    }
}

/// Re-sample every element into `subdivisions` interpolated midpoints.
/// Original elements keep their events; midpoints get none.
fn subdivide(elements: &mut Vec<TrackElement>, subdivisions: usize) {
    let length = elements.len();
    let new_length = (length - 1) * subdivisions + 1;
    let mut subdivided: Vec<TrackElement> = Vec::with_capacity(new_length);
    for i in 0..new_length {
        let q = i / subdivisions;
        if i % subdivisions == 0 {
            subdivided.push(elements[q].clone());
        } else {
            let r = (i % subdivisions) as f64 / subdivisions as f64;
            let p = (1.0 - r) * elements[q].start + r * elements[q + 1].start;
            let mut follower = TrackFollower::new();
            follower.follow(elements, -1.0);
            follower.follow(elements, p);
            let mut element = elements[q].clone();
            element.events.clear();
            element.start = p;
            element.position = follower.position;
            element.direction = follower.direction;
            element.up = follower.up;
            element.side = follower.side;
            element.curve_cant = follower.curve_cant;
            element.curve_cant_tangent = 0.0;
            subdivided.push(element);
        }
    }
    *elements = subdivided;
}

/// Flag every former block boundary whose horizontal direction jumps by
/// more than the detection epsilon.
fn detect_turns(elements: &[TrackElement], subdivisions: usize) -> Vec<bool> {
    let mut turns = vec![false; elements.len()];
    let mut follower = TrackFollower::new();
    for i in 1..elements.len() - 1 {
        if i % subdivisions != 0 {
            continue;
        }
        let p = probe_position(elements[i - 1].start, elements[i].start);
        follower.follow(elements, p);
        let d = elements[i].direction - follower.direction;
        if d.x * d.x + d.z * d.z > TURN_EPSILON {
            turns[i] = true;
        }
    }
    turns
}

/// Estimate the equivalent curve radius at a turn by intersecting the
/// side-offset lines of the surrounding elements. Returns nothing when the
/// two per-axis estimates disagree or the radius degenerates.
fn estimate_radius(elements: &[TrackElement], i: usize) -> Option<f64> {
    let ap = elements[i - 1].position;
    let bp = elements[i + 1].position;
    let s = elements[i - 1].side - elements[i + 1].side;
    let rx = if s.x * s.x > 0.000001 {
        (bp.x - ap.x) / s.x
    } else {
        0.0
    };
    let rz = if s.z * s.z > 0.000001 {
        (bp.z - ap.z) / s.z
    } else {
        0.0
    };
    let r = if rx != 0.0 && rz != 0.0 {
        if sign(rx) != sign(rz) {
            return None;
        }
        let f = rx / rz;
        if (f > -1.1 && f < -0.9) || (f > 0.9 && f < 1.1) {
            (rx * rz).abs().sqrt() * sign(rx)
        } else {
            return None;
        }
    } else if rx != 0.0 {
        rx
    } else if rz != 0.0 {
        rz
    } else {
        return None;
    };
    (r * r > 1.0).then_some(r)
}

/// Walk the shortening search: pull element `i + 1`'s start backwards one
/// step at a time while the endpoint error keeps improving, then shift all
/// following elements by the winning amount. Returns the distance removed.
fn shorten_following(
    elements: &mut [TrackElement],
    follower: &mut TrackFollower,
    i: usize,
) -> f64 {
    let p = probe_position(elements[i].start, elements[i + 1].start);
    follower.follow(elements, p - 1.0);
    follower.follow(elements, p);
    let d = elements[i + 1].position - follower.position;
    let mut best_error = d.norm_squared();
    let mut best_step = 0;
    let step = (elements[i + 1].start - elements[i].start) / SHORTENING_STEPS as f64;
    for j in 1..SHORTENING_STEPS - 1 {
        follower.follow(elements, elements[i + 1].start - j as f64 * step);
        let d = elements[i + 1].position - follower.position;
        let error = d.norm_squared();
        if error < best_error {
            best_error = error;
            best_step = j;
        } else {
            break;
        }
    }
    let shortage = best_step as f64 * step;
    for element in elements.iter_mut().skip(i + 1) {
        element.start -= shortage;
    }
    shortage
}

fn probe_position(before: f64, at: f64) -> f64 {
    BOUNDARY_PROBE * before + (1.0 - BOUNDARY_PROBE) * at
}

fn rotate_element_about_y(element: &mut TrackElement, angle: f64) {
    let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), angle);
    element.direction = rotation * element.direction;
    element.up = rotation * element.up;
    element.side = rotation * element.side;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{Event, EventKind};

    fn straight_elements(n: usize, interval: f64) -> Vec<TrackElement> {
        (0..n)
            .map(|i| {
                let mut e = TrackElement::at(i as f64 * interval);
                e.position = Vector3::new(0.0, 0.0, i as f64 * interval);
                e
            })
            .collect()
    }

    #[test]
    fn single_element_gets_a_zero_tangent() {
        let mut elements = straight_elements(1, 25.0);
        elements[0].curve_cant_tangent = 7.0;
        compute_cant_tangents(&mut elements);
        assert_eq!(elements[0].curve_cant_tangent, 0.0);
    }

    #[test]
    fn flat_cant_regions_get_zero_tangents() {
        let mut elements = straight_elements(3, 25.0);
        elements[1].curve_cant = 0.1;
        elements[2].curve_cant = 0.1;
        compute_cant_tangents(&mut elements);
        assert_eq!(elements[0].curve_cant_tangent, 0.1);
        assert_eq!(elements[1].curve_cant_tangent, 0.0);
        assert_eq!(elements[2].curve_cant_tangent, 0.0);
    }

    #[test]
    fn tangent_ratios_stay_inside_the_clamp() {
        let mut elements = straight_elements(4, 25.0);
        elements[1].curve_cant = 5.0;
        elements[2].curve_cant = 5.000001;
        elements[3].curve_cant = 10.0;
        compute_cant_tangents(&mut elements);
        for i in 0..elements.len() - 1 {
            let delta = elements[i + 1].curve_cant - elements[i].curve_cant;
            if delta == 0.0 {
                continue;
            }
            let a = elements[i].curve_cant_tangent / delta;
            let b = elements[i + 1].curve_cant_tangent / delta;
            assert!(
                a * a + b * b <= 9.0 + 1e-9,
                "ratio pair {a}, {b} exceeds the clamp at {i}"
            );
        }
    }

    #[test]
    fn follower_interpolates_straight_track() {
        let elements = straight_elements(4, 25.0);
        let mut follower = TrackFollower::new();
        follower.follow(&elements, 60.0);
        assert_eq!(follower.position, Vector3::new(0.0, 0.0, 60.0));
        assert_eq!(follower.direction, Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(follower.curve_radius, 0.0);
    }

    #[test]
    fn follower_advances_along_the_curve_chord() {
        let mut elements = straight_elements(2, 25.0);
        elements[0].curve_radius = 300.0;
        let mut follower = TrackFollower::new();
        follower.follow(&elements, 25.0 - 1e-9);
        let expected =
            (2.0 * 300.0_f64.powi(2) * (1.0 - ((25.0 - 1e-9) / 300.0_f64).cos())).sqrt();
        let chord = (follower.position - elements[0].position).norm();
        assert!((chord - expected).abs() < 1e-6);
        assert!(follower.direction.x > 0.0);
    }

    #[test]
    fn follower_hermite_interpolates_cant() {
        let mut elements = straight_elements(3, 25.0);
        elements[1].curve_cant = 0.1;
        elements[2].curve_cant = 0.1;
        compute_cant_tangents(&mut elements);
        let mut follower = TrackFollower::new();
        follower.follow(&elements, 12.5);
        assert!(follower.curve_cant > 0.0 && follower.curve_cant < 0.1);
        follower.follow(&elements, 37.5);
        assert!((follower.curve_cant - 0.1).abs() < 1e-12);
    }

    #[test]
    fn subdivision_keeps_events_on_original_boundaries() {
        let mut elements = straight_elements(3, 25.0);
        elements[1].events.push(Event {
            offset: 3.0,
            kind: EventKind::PointSound,
        });
        smoothen_out_turns(&mut elements, 5);
        assert_eq!(elements.len(), 11);
        for (i, element) in elements.iter().enumerate() {
            if i % 5 == 0 {
                continue;
            }
            assert!(element.events.is_empty(), "midpoint {i} has events");
        }
        assert_eq!(elements[5].events.len(), 1);
        for pair in elements.windows(2) {
            assert!(pair[0].start < pair[1].start);
        }
    }

    #[test]
    fn turn_smoothing_eliminates_direction_kinks() {
        let interval = 25.0;
        let subdivisions = 5;
        let angle = 0.05_f64;
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), angle);
        let mut elements = straight_elements(2, interval);
        let direction = rotation * Vector3::new(0.0, 0.0, 1.0);
        let side = rotation * Vector3::new(1.0, 0.0, 0.0);
        for i in 2..4 {
            let mut e = TrackElement::at(i as f64 * interval);
            e.position = Vector3::new(0.0, 0.0, 50.0)
                + (i - 2) as f64 * interval * direction;
            e.direction = direction;
            e.side = side;
            e.up = direction.cross(&side);
            elements.push(e);
        }
        let before = detect_turns(
            &{
                let mut copy = elements.clone();
                subdivide(&mut copy, subdivisions);
                copy
            },
            subdivisions,
        );
        assert!(before.iter().any(|t| *t), "expected a detectable turn");
        smoothen_out_turns(&mut elements, subdivisions);
        let after = detect_turns(&elements, subdivisions);
        assert!(
            after.iter().all(|t| !*t),
            "turns remain after smoothing: {after:?}"
        );
    }
}
