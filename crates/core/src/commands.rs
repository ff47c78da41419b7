//! Block table builder: the main pass over the expression stream.
//!
//! A bare number switches the active track position (and with it the active
//! block); everything else is a dot/bracket-addressed command dispatched to
//! a per-domain handler that mutates the current block. Unknown commands
//! are skipped so newer dialect revisions still load.

use log::debug;

use crate::error::DiagnosticSink;
use crate::expression::{separate_commands_and_arguments, Expression};
use crate::numbers::{parse_double, parse_double_units, parse_int, unquote};
use crate::route::{
    BrightnessChange, Crack, DoorSide, FreeObject, Limit, Rail, Repeater, RouteData, SafetySystem,
    SectionPlacement, SignalPlacement, StationPlacement, TrackSound,
};

const DEG: f64 = 0.0174532925199433;

/// Fog distances applied when a fog command disables fog.
const NO_FOG_START: f64 = 800.0;
const NO_FOG_END: f64 = 1600.0;

/// Run the main pass, populating the block table in `data`.
pub fn build_block_table(
    expressions: &mut [Expression],
    data: &mut RouteData,
    sink: &mut DiagnosticSink,
) {
    for expression in expressions.iter_mut() {
        if let Some(value) = parse_double_units(&expression.text, &data.unit_of_length) {
            let position = value + expression.position_offset;
            if position < 0.0 {
                sink.warning(
                    &expression.file,
                    expression.line,
                    expression.column,
                    "negative track position encountered",
                );
            } else {
                data.track_position = position;
                let index = data.block_index(position);
                data.block_mut(index);
            }
            continue;
        }
        let (command, argument_sequence) =
            separate_commands_and_arguments(expression, true, sink);
        let arguments = split_arguments(&argument_sequence);
        dispatch(&command.to_lowercase(), &arguments, expression, data, sink);
    }
}

fn split_arguments(sequence: &str) -> Vec<String> {
    if sequence.is_empty() {
        return Vec::new();
    }
    sequence
        .split(|c| c == ',' || c == ';')
        .map(|a| a.trim().to_owned())
        .collect()
}

fn dispatch(
    command: &str,
    arguments: &[String],
    expression: &Expression,
    data: &mut RouteData,
    sink: &mut DiagnosticSink,
) {
    if command.ends_with(".load") {
        // consumed by the preprocessor
        return;
    }
    if let Some(rest) = command.strip_prefix("legacy.") {
        legacy_command(rest, arguments, data, sink, expression);
        return;
    }
    if command.starts_with("structure[") {
        let Some((key, sub)) = bracket_parts(command) else {
            debug!("malformed structure command {command}");
            return;
        };
        match sub.as_str() {
            "put" => put_structure(&key, arguments, false, data, sink, expression),
            "put0" => put_structure(&key, arguments, true, data, sink, expression),
            "putbetween" => put_structure_between(&key, arguments, data, sink, expression),
            _ => debug!("unrecognised structure command {command}"),
        }
        return;
    }
    if command.starts_with("station[") {
        if let Some((key, _)) = bracket_parts(command) {
            put_station(&key, arguments, data, sink, expression);
        }
        return;
    }
    if command.starts_with("repeater[") {
        let Some((key, sub)) = bracket_parts(command) else {
            return;
        };
        match sub.as_str() {
            "begin" => start_repeater(&key, arguments, false, data, sink, expression),
            "begin0" => start_repeater(&key, arguments, true, data, sink, expression),
            "end" => end_repeater(&key, data),
            _ => debug!("unrecognised repeater command {command}"),
        }
        return;
    }
    if let Some(sub) = command.strip_prefix("speedlimit.") {
        match sub {
            "begin" => {
                if let Some(limit) = arguments.first().and_then(|a| parse_double(a)) {
                    start_speed_limit(limit, data);
                }
            }
            "end" => end_speed_limit(data),
            _ => debug!("unrecognised speedlimit command {command}"),
        }
        return;
    }
    if let Some(sub) = command.strip_prefix("section.") {
        if sub == "begin" {
            start_section(arguments, data);
        }
        return;
    }
    if command.starts_with("signal.speedlimit") {
        // omitted entries leave the aspect unrestricted; 0 is a stop aspect
        data.signal_speeds = arguments
            .iter()
            .map(|a| match parse_double(a) {
                Some(v) if v >= 0.0 => v * data.unit_of_speed,
                _ => f64::INFINITY,
            })
            .collect();
        return;
    }
    if command.starts_with("signal[") {
        if let Some((key, _)) = bracket_parts(command) {
            place_signal(&key, arguments, data, sink, expression);
        }
        return;
    }
    if let Some(sub) = command.strip_prefix("rollingnoise.") {
        if sub == "change" {
            if let Some(index) = arguments.first().and_then(|a| parse_int(a)) {
                change_rail_sound(data, Some(index), None);
            }
        }
        return;
    }
    if let Some(sub) = command.strip_prefix("flangenoise.") {
        if sub == "change" {
            if let Some(index) = arguments.first().and_then(|a| parse_int(a)) {
                change_rail_sound(data, None, Some(index));
            }
        }
        return;
    }
    if command.starts_with("track[") {
        let Some((key, sub)) = bracket_parts(command) else {
            return;
        };
        match sub.as_str() {
            "position" => secondary_track(&key, arguments, data),
            "x.interpolate" => interpolate_secondary_track(&key, arguments, false, data),
            "y.interpolate" => interpolate_secondary_track(&key, arguments, true, data),
            _ => debug!("unsupported track command {command}"),
        }
        return;
    }
    if command.starts_with("light.") {
        // atmosphere only, no bearing on track geometry
        debug!("ignoring light command {command}");
        return;
    }
    if let Some(sub) = command.strip_prefix("curve.") {
        set_curve(sub, arguments, data);
        return;
    }
    if let Some(sub) = command.strip_prefix("background.") {
        if sub == "change" {
            change_background(arguments, data, sink, expression);
        }
        return;
    }
    if command.starts_with("adhesion.") {
        set_adhesion(arguments, data);
        return;
    }
    if command.starts_with("irregularity.") {
        set_accuracy(arguments, data);
        return;
    }
    if command.starts_with("jointnoise.") {
        let position = data.track_position;
        data.current_block().point_sounds.push(position);
        return;
    }
    if let Some(sub) = command.strip_prefix("cabilluminance.") {
        match sub {
            "set" => change_brightness(true, arguments, data),
            "interpolate" => change_brightness(false, arguments, data),
            _ => debug!("unrecognised cabilluminance command {command}"),
        }
        return;
    }
    if let Some(sub) = command.strip_prefix("fog.") {
        if sub == "set" || sub == "interpolate" {
            change_fog(arguments, data);
        }
        return;
    }
    debug!(
        "skipping unrecognised command {} at {}:{}",
        command, expression.file, expression.line
    );
}

/// Split `name['key'].sub` into its unquoted key and sub-command.
fn bracket_parts(command: &str) -> Option<(String, String)> {
    let open = command.find('[')?;
    let close = command[open..].find(']')? + open;
    let key = unquote(&command[open + 1..close]).to_lowercase();
    let sub = command[close + 1..]
        .strip_prefix('.')
        .unwrap_or("")
        .to_lowercase();
    Some((key, sub))
}

fn argument(arguments: &[String], index: usize) -> Option<&str> {
    arguments.get(index).map(String::as_str).filter(|a| !a.is_empty())
}

// ── curve / gradient state ──────────────────────────────────────────────

fn legacy_command(
    command: &str,
    arguments: &[String],
    data: &mut RouteData,
    sink: &mut DiagnosticSink,
    expression: &Expression,
) {
    match command {
        "curve" => {
            let radius = argument(arguments, 0)
                .and_then(|a| parse_double_units(a, &data.unit_of_length))
                .unwrap_or(0.0);
            let cant = argument(arguments, 1)
                .and_then(parse_double)
                .map(|c| c * 0.001)
                .unwrap_or(0.0);
            apply_curve(radius, cant, data);
        }
        "pitch" => {
            let permille = argument(arguments, 0).and_then(parse_double).unwrap_or(0.0);
            data.current_block().track_state.pitch = 0.001 * permille;
        }
        "turn" => {
            let ratio = argument(arguments, 0).and_then(parse_double).unwrap_or(0.0);
            data.current_block().turn = ratio;
        }
        "fog" => {
            let start = argument(arguments, 0).and_then(parse_double).unwrap_or(0.0);
            let end = argument(arguments, 1).and_then(parse_double).unwrap_or(0.0);
            let r = color_component(argument(arguments, 2));
            let g = color_component(argument(arguments, 3));
            let b = color_component(argument(arguments, 4));
            let block = data.current_block();
            if start < end {
                block.fog.start = start;
                block.fog.end = end;
            } else {
                block.fog.start = NO_FOG_START;
                block.fog.end = NO_FOG_END;
            }
            block.fog.color = [r, g, b];
            block.fog_defined = true;
        }
        _ => {
            sink.warning(
                &expression.file,
                expression.line,
                expression.column,
                format!("unrecognised legacy command {command}"),
            );
        }
    }
}

fn color_component(argument: Option<&str>) -> f64 {
    let value = argument.and_then(parse_int).unwrap_or(128);
    f64::from(value.clamp(0, 255)) / 255.0
}

fn set_curve(sub: &str, arguments: &[String], data: &mut RouteData) {
    match sub {
        "begincircular" => {
            let radius = argument(arguments, 0)
                .and_then(|a| parse_double_units(a, &data.unit_of_length))
                .unwrap_or(0.0);
            let cant = argument(arguments, 1)
                .and_then(parse_double)
                .map(|c| c * 0.001)
                .unwrap_or(0.0);
            apply_curve(radius, cant, data);
        }
        "begintransition" => {
            // transition easing is handled by the turn smoother's arc fit
            debug!("curve.begintransition treated as a straight lead-in");
        }
        "end" => apply_curve(0.0, 0.0, data),
        _ => debug!("unrecognised curve command curve.{sub}"),
    }
}

/// Cant is unsigned in the source dialect; it takes the sign of the radius.
fn apply_curve(radius: f64, cant: f64, data: &mut RouteData) {
    let cant = cant.abs() * sign(radius);
    let state = &mut data.current_block().track_state;
    state.curve_radius = radius;
    state.curve_cant = cant;
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

// ── structures and repeaters ────────────────────────────────────────────

fn ensure_rail(data: &mut RouteData, key: &str) {
    let block = data.current_block();
    block.rails.entry(key.to_owned()).or_insert_with(Rail::default);
}

fn put_structure(
    key: &str,
    arguments: &[String],
    compact: bool,
    data: &mut RouteData,
    sink: &mut DiagnosticSink,
    expression: &Expression,
) {
    if !data.structures.contains_key(key) {
        sink.error(
            &expression.file,
            expression.line,
            expression.column,
            format!("structure key {key} is invalid in structure.put"),
        );
        return;
    }
    let rail_key = unquote(argument(arguments, 0).unwrap_or("0")).to_lowercase();
    ensure_rail(data, &rail_key);
    let (mut x, mut y, mut z) = (0.0, 0.0, 0.0);
    let (mut rx, mut ry, mut rz) = (0.0, 0.0, 0.0);
    if !compact {
        x = argument(arguments, 1)
            .and_then(|a| parse_double_units(a, &data.unit_of_length))
            .unwrap_or(0.0);
        y = argument(arguments, 2)
            .and_then(|a| parse_double_units(a, &data.unit_of_length))
            .unwrap_or(0.0);
        z = argument(arguments, 3)
            .and_then(|a| parse_double_units(a, &data.unit_of_length))
            .unwrap_or(0.0);
        // pitch and yaw are swapped relative to the published grammar
        rx = argument(arguments, 4).and_then(parse_double).unwrap_or(0.0) * DEG;
        ry = argument(arguments, 5).and_then(parse_double).unwrap_or(0.0) * DEG;
        rz = argument(arguments, 6).and_then(parse_double).unwrap_or(0.0) * DEG;
    }
    let position = data.track_position;
    data.current_block().free_objects.push(FreeObject {
        rail_key,
        structure_key: key.to_owned(),
        position,
        x,
        y,
        z,
        rx,
        ry,
        rz,
    });
}

fn put_structure_between(
    key: &str,
    arguments: &[String],
    data: &mut RouteData,
    sink: &mut DiagnosticSink,
    expression: &Expression,
) {
    if !data.structures.contains_key(key) {
        sink.error(
            &expression.file,
            expression.line,
            expression.column,
            format!("structure key {key} is invalid in structure.putbetween"),
        );
        return;
    }
    let primary = unquote(argument(arguments, 0).unwrap_or("")).to_lowercase();
    let secondary = unquote(argument(arguments, 1).unwrap_or("")).to_lowercase();
    if primary == secondary {
        sink.error(
            &expression.file,
            expression.line,
            expression.column,
            "rail keys are expected to differ in structure.putbetween",
        );
        return;
    }
    ensure_rail(data, &primary);
    ensure_rail(data, &secondary);
    let position = data.track_position;
    data.current_block().cracks.push(Crack {
        primary_rail: primary,
        secondary_rail: secondary,
        structure_key: key.to_owned(),
        position,
    });
}

fn start_repeater(
    key: &str,
    arguments: &[String],
    compact: bool,
    data: &mut RouteData,
    sink: &mut DiagnosticSink,
    expression: &Expression,
) {
    let required = if compact { 5 } else { 11 };
    if arguments.len() < required {
        sink.error(
            &expression.file,
            expression.line,
            expression.column,
            format!("incomplete repeater definition for {key}"),
        );
        return;
    }
    let rail_key = unquote(&arguments[0]).to_lowercase();
    let (mut x, mut y, mut z) = (0.0, 0.0, 0.0);
    let (mut rx, mut ry, mut rz) = (0.0, 0.0, 0.0);
    let mut interval;
    let structure_key;
    if compact {
        interval = parse_double(&arguments[3]).unwrap_or(0.0);
        structure_key = unquote(&arguments[4]).to_lowercase();
    } else {
        x = parse_double_units(&arguments[1], &data.unit_of_length).unwrap_or(0.0);
        y = parse_double_units(&arguments[2], &data.unit_of_length).unwrap_or(0.0);
        z = parse_double_units(&arguments[3], &data.unit_of_length).unwrap_or(0.0);
        rx = parse_double(&arguments[4]).unwrap_or(0.0) * DEG;
        ry = parse_double(&arguments[5]).unwrap_or(0.0) * DEG;
        rz = parse_double(&arguments[6]).unwrap_or(0.0) * DEG;
        interval = parse_double(&arguments[9]).unwrap_or(0.0);
        structure_key = unquote(&arguments[10]).to_lowercase();
    }
    if !data.structures.contains_key(&structure_key) {
        sink.error(
            &expression.file,
            expression.line,
            expression.column,
            format!("structure key {structure_key} is invalid in repeater.begin"),
        );
        return;
    }
    if interval == 24.99 {
        // the BVETS convertor emits 24.99 to mean one whole block
        interval = 25.0;
    }
    ensure_rail(data, &rail_key);
    let start = data.track_position;
    data.current_block().repeaters.insert(
        key.to_owned(),
        Repeater {
            rail_key,
            x,
            y,
            z,
            rx,
            ry,
            rz,
            interval,
            structure_keys: vec![structure_key],
            start,
        },
    );
}

fn end_repeater(key: &str, data: &mut RouteData) {
    if data.current_block().repeaters.remove(key).is_none() {
        debug!("repeater {key} ended without a matching begin");
    }
}

// ── stations, limits, sections and signals ──────────────────────────────

fn put_station(
    key: &str,
    arguments: &[String],
    data: &mut RouteData,
    sink: &mut DiagnosticSink,
    expression: &Expression,
) {
    if !data.stations.contains_key(key) {
        sink.error(
            &expression.file,
            expression.line,
            expression.column,
            format!("station key {key} was not found in the station list"),
        );
        return;
    }
    let door = match argument(arguments, 0).and_then(parse_int).unwrap_or(0) {
        d if d < 0 => DoorSide::Left,
        d if d > 0 => DoorSide::Right,
        _ => DoorSide::None,
    };
    let mut backward_tolerance = argument(arguments, 1)
        .and_then(|a| parse_double_units(a, &data.unit_of_length))
        .unwrap_or(5.0)
        .abs();
    if backward_tolerance <= 0.0 {
        backward_tolerance = 5.0;
    }
    let mut forward_tolerance = argument(arguments, 2)
        .and_then(|a| parse_double_units(a, &data.unit_of_length))
        .unwrap_or(5.0);
    if forward_tolerance <= 0.0 {
        forward_tolerance = 5.0;
    }
    let system = match argument(arguments, 3).and_then(parse_int) {
        Some(1) => SafetySystem::Atc,
        _ => SafetySystem::Ats,
    };
    let position = data.track_position;
    data.current_block().stations.push(StationPlacement {
        key: key.to_owned(),
        position,
        door,
        backward_tolerance,
        forward_tolerance,
        system,
    });
}

fn start_speed_limit(limit: f64, data: &mut RouteData) {
    let speed = if limit <= 0.0 {
        f64::INFINITY
    } else {
        limit * data.unit_of_speed
    };
    let position = data.track_position;
    data.current_block().limits.push(Limit { position, speed });
}

fn end_speed_limit(data: &mut RouteData) {
    let position = data.track_position;
    data.current_block().limits.push(Limit {
        position,
        speed: f64::INFINITY,
    });
}

fn start_section(arguments: &[String], data: &mut RouteData) {
    if arguments.is_empty() {
        return;
    }
    let aspects: Vec<i32> = arguments
        .iter()
        .map(|a| match parse_int(a) {
            Some(v) if v >= 0 => v,
            _ => -1,
        })
        .collect();
    let position = data.track_position;
    data.current_block()
        .sections
        .push(SectionPlacement { position, aspects });
}

fn place_signal(
    key: &str,
    arguments: &[String],
    data: &mut RouteData,
    sink: &mut DiagnosticSink,
    expression: &Expression,
) {
    let Some(signal) = data.signals.get(key).cloned() else {
        sink.error(
            &expression.file,
            expression.line,
            expression.column,
            format!("signal key {key} was not found in the signal list"),
        );
        return;
    };
    let rail_key = unquote(argument(arguments, 0).unwrap_or("0")).to_lowercase();
    let section = argument(arguments, 1).and_then(parse_int).unwrap_or(0);
    let x = argument(arguments, 2)
        .and_then(|a| parse_double_units(a, &data.unit_of_length))
        .unwrap_or(0.0);
    let mut y = argument(arguments, 3)
        .and_then(|a| parse_double_units(a, &data.unit_of_length))
        .unwrap_or(0.0);
    if y < 0.0 {
        // negative height means a default post
        y = 4.8;
    }
    let position = data.track_position;
    let block = data.current_block();
    block.sections.push(SectionPlacement {
        position,
        aspects: signal.aspects.clone(),
    });
    block.signals.push(SignalPlacement {
        signal_key: key.to_owned(),
        section,
        rail_key,
        position,
        x,
        y,
    });
}

// ── per-block ambience ──────────────────────────────────────────────────

fn change_rail_sound(data: &mut RouteData, run_index: Option<i32>, flange_index: Option<i32>) {
    let position = data.track_position;
    let block = data.current_block();
    if let Some(sound) = block
        .run_sounds
        .iter_mut()
        .find(|s| s.position == position)
    {
        if run_index.is_some() {
            sound.run_index = run_index;
        }
        if flange_index.is_some() {
            sound.flange_index = flange_index;
        }
    } else {
        block.run_sounds.push(TrackSound {
            position,
            run_index,
            flange_index,
        });
    }
}

fn secondary_track(key: &str, arguments: &[String], data: &mut RouteData) {
    let x = argument(arguments, 0).and_then(|a| parse_double_units(a, &data.unit_of_length));
    let y = argument(arguments, 1).and_then(|a| parse_double_units(a, &data.unit_of_length));
    let block = data.current_block();
    let rail = block.rails.entry(key.to_owned()).or_insert_with(Rail::default);
    if let Some(x) = x {
        rail.x = x;
    }
    if let Some(y) = y {
        rail.y = y;
    }
}

fn interpolate_secondary_track(key: &str, arguments: &[String], vertical: bool, data: &mut RouteData) {
    let Some(distance) = argument(arguments, 0).and_then(parse_double) else {
        return;
    };
    let block = data.current_block();
    let rail = block.rails.entry(key.to_owned()).or_insert_with(Rail::default);
    if vertical {
        rail.y = distance;
    } else {
        rail.x = distance;
    }
}

fn change_background(
    arguments: &[String],
    data: &mut RouteData,
    sink: &mut DiagnosticSink,
    expression: &Expression,
) {
    if arguments.len() != 1 {
        return;
    }
    let key = unquote(&arguments[0]).to_lowercase();
    if !data.structures.contains_key(&key) {
        sink.error(
            &expression.file,
            expression.line,
            expression.column,
            format!("background structure key {key} is invalid"),
        );
        return;
    }
    let index = match data.backgrounds.iter().position(|b| *b == key) {
        Some(i) => i,
        None => {
            data.backgrounds.push(key);
            data.backgrounds.len() - 1
        }
    };
    data.current_block().background = Some(index as i32);
}

fn set_adhesion(arguments: &[String], data: &mut RouteData) {
    match arguments.len() {
        1 => {
            let Some(c) = parse_double(&arguments[0]) else {
                return;
            };
            // coefficient at 0 km/h, quantized the way the old convertor did
            data.current_block().adhesion = (c * 100.0 / 0.26).trunc() / 100.0;
        }
        3 => {
            let c0 = parse_double(&arguments[0]).unwrap_or(0.0);
            let c1 = parse_double(&arguments[1]).unwrap_or(0.0);
            let c2 = parse_double(&arguments[2]).unwrap_or(0.0);
            if c1 != 0.0 || c0 == 0.0 || c2 == 0.0 {
                return;
            }
            if c0 == 0.35 && c2 == 0.01 {
                data.current_block().adhesion = 1.0;
                return;
            }
            let ca = (c0 * 100.0 / 0.26).trunc();
            let cb = 1.0 / (300.0 * (ca / 100.0 * 0.259999990463257));
            let adhesion = if round_to(cb, 8) == c2 {
                // values produced by the BVE2/4 convertor
                ca / 100.0
            } else {
                (ca + cb) / 2.0 / 100.0
            };
            data.current_block().adhesion = adhesion;
        }
        _ => {}
    }
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

fn set_accuracy(arguments: &[String], data: &mut RouteData) {
    if let Some(value) = argument(arguments, 0).and_then(parse_double) {
        data.current_block().accuracy = value.clamp(0.0, 4.0);
    }
}

fn change_brightness(immediate: bool, arguments: &[String], data: &mut RouteData) {
    let Some(value) = argument(arguments, 0).and_then(parse_double) else {
        return;
    };
    let position = data.track_position;
    let previous = data.last_brightness;
    let block = data.current_block();
    if immediate {
        block
            .brightness_changes
            .push(BrightnessChange { position, value: previous });
        block.brightness_changes.push(BrightnessChange {
            position: position + 1.0,
            value,
        });
    } else {
        block
            .brightness_changes
            .push(BrightnessChange { position, value });
    }
    data.last_brightness = value;
}

/// Fog density form: the argument is fog per meter, so the fog ends at its
/// reciprocal. Non-positive density clears fog.
fn change_fog(arguments: &[String], data: &mut RouteData) {
    let density = argument(arguments, 0).and_then(parse_double).unwrap_or(0.0);
    let r = color_component(argument(arguments, 1));
    let g = color_component(argument(arguments, 2));
    let b = color_component(argument(arguments, 3));
    let block = data.current_block();
    if density > 0.0 {
        block.fog.start = 0.0;
        block.fog.end = 1.0 / density;
    } else {
        block.fog.start = NO_FOG_START;
        block.fog.end = NO_FOG_END;
    }
    block.fog.color = [r, g, b];
    block.fog_defined = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::split_into_expressions;
    use crate::route::{ObjectPointer, SignalAspects, StationDefinition, KMH_TO_MS};

    fn build(source: &str, data: &mut RouteData) -> DiagnosticSink {
        let lines: Vec<String> = source.lines().map(str::to_owned).collect();
        let mut expressions = split_into_expressions("map.txt", &lines, 0.0);
        let mut sink = DiagnosticSink::new();
        build_block_table(&mut expressions, data, &mut sink);
        sink
    }

    fn with_structure(key: &str) -> RouteData {
        let mut data = RouteData::new();
        data.structures.insert(
            key.to_owned(),
            ObjectPointer {
                path: format!("{key}.csv"),
            },
        );
        data
    }

    #[test]
    fn bare_number_switches_block() {
        let mut data = RouteData::new();
        let sink = build("0;\n100;", &mut data);
        assert!(sink.is_empty());
        assert_eq!(data.blocks.len(), 5);
        assert_eq!(data.track_position, 100.0);
        // positions alone do not extend the commanded range
        assert_eq!(data.last_command_block, 0);
    }

    #[test]
    fn negative_position_warns_and_keeps_previous() {
        let mut data = RouteData::new();
        let sink = build("50;\n-25;", &mut data);
        assert_eq!(sink.messages().len(), 1);
        assert_eq!(data.track_position, 50.0);
    }

    #[test]
    fn curve_sets_state_and_cant_takes_radius_sign() {
        let mut data = RouteData::new();
        build("0;\ncurve.begincircular(-300, 105);", &mut data);
        let state = data.blocks[0].track_state;
        assert_eq!(state.curve_radius, -300.0);
        assert!((state.curve_cant - (-0.105)).abs() < 1e-12);
        build("25;\ncurve.end();", &mut data);
        assert_eq!(data.blocks[1].track_state.curve_radius, 0.0);
    }

    #[test]
    fn legacy_pitch_is_permille() {
        let mut data = RouteData::new();
        build("0;\nlegacy.pitch(20);", &mut data);
        assert_eq!(data.blocks[0].track_state.pitch, 0.02);
    }

    #[test]
    fn structure_put_records_placement() {
        let mut data = with_structure("pole");
        let sink = build("50;\nstructure['pole'].put('0', 2.5, 0, 0, 0, 0, 0);", &mut data);
        assert!(sink.is_empty());
        let block = &data.blocks[2];
        assert_eq!(block.free_objects.len(), 1);
        assert_eq!(block.free_objects[0].structure_key, "pole");
        assert_eq!(block.free_objects[0].x, 2.5);
        assert_eq!(block.free_objects[0].position, 50.0);
        assert_eq!(data.last_command_block, 2);
    }

    #[test]
    fn unknown_structure_key_is_a_reference_error() {
        let mut data = RouteData::new();
        let sink = build("0;\nstructure['gone'].put('0', 0, 0, 0);", &mut data);
        assert_eq!(sink.error_count(), 1);
        assert!(data.blocks[0].free_objects.is_empty());
    }

    #[test]
    fn repeater_lifecycle_with_interval_normalization() {
        let mut data = with_structure("fence");
        build(
            "0;\nrepeater['f'].begin0('0', 0, 25, 24.99, 'fence');\n100;\nrepeater['f'].end();",
            &mut data,
        );
        assert_eq!(data.blocks[0].repeaters["f"].interval, 25.0);
        // carried into grown blocks up to the end command
        assert!(data.blocks[3].repeaters.contains_key("f"));
        assert!(!data.blocks[4].repeaters.contains_key("f"));
    }

    #[test]
    fn speed_limits_convert_and_unlimit() {
        let mut data = RouteData::new();
        build("0;\nspeedlimit.begin(80);\n50;\nspeedlimit.end();", &mut data);
        assert_eq!(data.blocks[0].limits[0].speed, 80.0 * KMH_TO_MS);
        assert_eq!(data.blocks[2].limits[0].speed, f64::INFINITY);
    }

    #[test]
    fn station_placement_defaults_and_system() {
        let mut data = RouteData::new();
        data.stations.insert(
            "sta1".to_owned(),
            StationDefinition {
                name: "Midtown".to_owned(),
                arrival_time: None,
                departure_time: None,
                pass: false,
                stop_duration: 15.0,
                forced_red: false,
            },
        );
        let sink = build("75;\nstation['sta1'](-1, 0, 10, 1);", &mut data);
        assert!(sink.is_empty());
        let placement = &data.blocks[3].stations[0];
        assert_eq!(placement.door, DoorSide::Left);
        assert_eq!(placement.backward_tolerance, 5.0);
        assert_eq!(placement.forward_tolerance, 10.0);
        assert_eq!(placement.system, SafetySystem::Atc);
    }

    #[test]
    fn signal_creates_section_with_listed_aspects() {
        let mut data = RouteData::new();
        data.signals
            .insert("main".to_owned(), SignalAspects { aspects: vec![1, 3, 4] });
        build("25;\nsignal['main'].put('0', 0, -3.0, -1);", &mut data);
        let block = &data.blocks[1];
        assert_eq!(block.sections[0].aspects, vec![1, 3, 4]);
        assert_eq!(block.signals[0].y, 4.8);
    }

    #[test]
    fn signal_speed_table_replaces_the_defaults() {
        let mut data = RouteData::new();
        build("0;\nsignal.speedlimit(0, 40, , 90);", &mut data);
        assert_eq!(data.signal_speeds[0], 0.0);
        assert_eq!(data.signal_speeds[1], 40.0 * KMH_TO_MS);
        assert_eq!(data.signal_speeds[2], f64::INFINITY);
        assert_eq!(data.signal_speeds[3], 90.0 * KMH_TO_MS);
        assert_eq!(data.signal_speeds.len(), 4);
    }

    #[test]
    fn rolling_and_flange_noise_merge_at_same_position() {
        let mut data = RouteData::new();
        build("0;\nrollingnoise.change(2);\nflangenoise.change(3);", &mut data);
        let sounds = &data.blocks[0].run_sounds;
        assert_eq!(sounds.len(), 1);
        assert_eq!(sounds[0].run_index, Some(2));
        assert_eq!(sounds[0].flange_index, Some(3));
    }

    #[test]
    fn immediate_brightness_pushes_a_pair() {
        let mut data = RouteData::new();
        build("0;\ncabilluminance.set(0.4);", &mut data);
        let changes = &data.blocks[0].brightness_changes;
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].value, 1.0);
        assert_eq!(changes[1].position, 1.0);
        assert_eq!(changes[1].value, 0.4);
        assert_eq!(data.last_brightness, 0.4);
    }

    #[test]
    fn adhesion_single_argument_quantizes() {
        let mut data = RouteData::new();
        build("0;\nadhesion.changeall(0.3);", &mut data);
        assert_eq!(data.blocks[0].adhesion, 1.15);
    }

    #[test]
    fn unknown_command_leaves_no_trace() {
        let mut data = RouteData::new();
        let sink = build("0;\nfuturefeature.enable(1);", &mut data);
        assert!(sink.is_empty());
        assert_eq!(data.blocks.len(), 1);
    }
}
