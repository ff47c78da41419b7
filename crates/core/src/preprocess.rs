//! First pass over the route source: scenario header, include expansion,
//! and eager loading of structure/station/signal list files.
//!
//! Includes are appended to the end of the expression stream rather than
//! spliced in place; the scan then visits them naturally, so nested
//! includes work without explicit recursion. List files are consumed here
//! so that the main pass can resolve keys positionally.

use std::path::Path;

use log::debug;

use crate::error::DiagnosticSink;
use crate::expression::{separate_commands_and_arguments, split_into_expressions, Expression};
use crate::numbers::{parse_double, parse_double_units, parse_time, unquote};
use crate::route::{ObjectPointer, RouteData, SignalAspects, StationDefinition};
use crate::source::SourceProvider;

/// Upper bound on include expansions per compile, to terminate cyclic
/// include graphs.
const MAX_INCLUDES: usize = 64;

/// Parsed `key = value` scenario header.
#[derive(Debug, Default, PartialEq)]
pub struct ScenarioHeader {
    pub route: Option<String>,
    pub comment: Option<String>,
    pub image: Option<String>,
}

/// Whether a source text is a scenario file rather than a route map.
pub fn is_scenario(text: &str) -> bool {
    text.lines()
        .next()
        .map(|l| l.trim().to_lowercase().starts_with("bvets scenario"))
        .unwrap_or(false)
}

/// Parse the scenario header. Unknown keys are ignored.
pub fn parse_scenario_header(text: &str) -> ScenarioHeader {
    let mut header = ScenarioHeader::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_lowercase().as_str() {
            "route" => header.route = Some(value.to_owned()),
            "comment" => header.comment = Some(value.to_owned()),
            "image" => header.image = Some(value.to_owned()),
            _ => {}
        }
    }
    header
}

/// Run the preprocessor over the map source: split into expressions, expand
/// `include` directives, and load referenced list files into the context's
/// lookup tables. Returns the expression stream for the main pass.
pub fn preprocess(
    provider: &dyn SourceProvider,
    map_path: &Path,
    text: &str,
    data: &mut RouteData,
    sink: &mut DiagnosticSink,
) -> Vec<Expression> {
    let map_label = map_path.display().to_string();
    let base = map_path.parent().unwrap_or_else(|| Path::new(""));
    let mut expressions = split_map(&map_label, text);

    // include expansion; appended expressions are revisited by the same scan
    let mut includes = 0usize;
    let mut e = 0usize;
    while e < expressions.len() {
        let lower = expressions[e].text.to_lowercase();
        if lower.starts_with("include") {
            if includes >= MAX_INCLUDES {
                sink.error(
                    &expressions[e].file,
                    expressions[e].line,
                    expressions[e].column,
                    "include limit exceeded, possible include cycle",
                );
                expressions[e].text.clear();
                e += 1;
                continue;
            }
            includes += 1;
            match include_reference(&expressions[e].text) {
                Some(reference) => {
                    let path = provider.resolve(base, &reference);
                    match provider.read_source(&path) {
                        Ok(included) => {
                            let offset = expressions[e].position_offset;
                            let mut inner =
                                split_map_with_offset(&path.display().to_string(), &included, offset);
                            expressions.append(&mut inner);
                        }
                        Err(_) => {
                            sink.error(
                                &expressions[e].file,
                                expressions[e].line,
                                expressions[e].column,
                                format!("included file not found: {reference}"),
                            );
                        }
                    }
                }
                None => {
                    sink.error(
                        &expressions[e].file,
                        expressions[e].line,
                        expressions[e].column,
                        "include directive without a quoted file reference",
                    );
                }
            }
            expressions[e].text.clear();
        }
        e += 1;
    }

    // eager list loading
    for e in 0..expressions.len() {
        if expressions[e].text.is_empty() {
            continue;
        }
        let mut probe = expressions[e].clone();
        let mut scratch = DiagnosticSink::new();
        let (command, argument_sequence) =
            separate_commands_and_arguments(&mut probe, false, &mut scratch);
        if parse_double_units(&command, &data.unit_of_length).is_some() {
            continue;
        }
        let loader = match command.to_lowercase().as_str() {
            "structure.load" => Some(ListKind::Structures),
            "station.load" => Some(ListKind::Stations),
            "signal.load" => Some(ListKind::Signals),
            _ => None,
        };
        let Some(kind) = loader else {
            continue;
        };
        if argument_sequence.is_empty() {
            sink.error(
                &expressions[e].file,
                expressions[e].line,
                expressions[e].column,
                format!("at least 1 argument is expected in {command}"),
            );
        }
        for reference in argument_sequence.split(',') {
            let reference = unquote(reference);
            if reference.is_empty() {
                continue;
            }
            let path = provider.resolve(base, reference);
            match provider.read_source(&path) {
                Ok(list_text) => {
                    let label = path.display().to_string();
                    match kind {
                        ListKind::Structures => load_structure_list(&label, &list_text, data, sink),
                        ListKind::Stations => load_station_list(&label, &list_text, data, sink),
                        ListKind::Signals => load_signal_list(&label, &list_text, data, sink),
                    }
                }
                Err(_) => {
                    sink.error(
                        &expressions[e].file,
                        expressions[e].line,
                        expressions[e].column,
                        format!("referenced list file not found: {reference}"),
                    );
                }
            }
        }
        expressions[e].text.clear();
    }

    expressions.retain(|x| !x.text.is_empty());
    debug!(
        "preprocessed {} with {} expressions, {} structures, {} stations, {} signals",
        map_label,
        expressions.len(),
        data.structures.len(),
        data.stations.len(),
        data.signals.len()
    );
    expressions
}

#[derive(Clone, Copy)]
enum ListKind {
    Structures,
    Stations,
    Signals,
}

fn split_map(label: &str, text: &str) -> Vec<Expression> {
    split_map_with_offset(label, text, 0.0)
}

fn split_map_with_offset(label: &str, text: &str, offset: f64) -> Vec<Expression> {
    let mut lines: Vec<String> = text.lines().map(str::to_owned).collect();
    if let Some(first) = lines.first_mut() {
        if first.trim().to_lowercase().starts_with("bvets map") {
            first.clear();
        }
    }
    split_into_expressions(label, &lines, offset)
}

/// Extract the quoted file reference from an `include 'file'` directive.
fn include_reference(text: &str) -> Option<String> {
    let first = text.find('\'')?;
    let rest = &text[first + 1..];
    let second = rest.find('\'')?;
    let reference = rest[..second].trim();
    if reference.is_empty() {
        None
    } else {
        Some(reference.to_owned())
    }
}

/// Validate a list file's `bvets <kind> list x.xx` header. Returns false
/// (with a diagnostic) when the file is not loadable.
fn check_list_header(label: &str, lines: &[&str], prefix: &str, sink: &mut DiagnosticSink) -> bool {
    let Some(first) = lines.first() else {
        sink.error(label, 1, 1, format!("file is empty, expected a {prefix} header"));
        return false;
    };
    let lower = first.trim().to_lowercase();
    if !lower.starts_with(prefix) {
        sink.error(label, 1, 1, format!("file does not carry a {prefix} header"));
        return false;
    }
    let version_text: String = lower[prefix.len()..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    match parse_double(&version_text) {
        Some(version) if version > 2.0 => {
            sink.error(
                label,
                1,
                1,
                format!("{version} is not a supported {prefix} version"),
            );
            false
        }
        Some(_) => true,
        None => {
            sink.error(label, 1, 1, format!("file does not contain a {prefix} version"));
            false
        }
    }
}

fn strip_list_comments(line: &str) -> &str {
    let end = line
        .find('#')
        .or_else(|| line.find("//"))
        .unwrap_or(line.len());
    line[..end].trim()
}

/// `key,path` per line. Keys are lowercased; paths stay as written and are
/// resolved by the scene consumer.
fn load_structure_list(label: &str, text: &str, data: &mut RouteData, sink: &mut DiagnosticSink) {
    let lines: Vec<&str> = text.lines().collect();
    if !check_list_header(label, &lines, "bvets structure list", sink) {
        return;
    }
    for (i, raw) in lines.iter().enumerate().skip(1) {
        let line = strip_list_comments(raw);
        if line.is_empty() {
            continue;
        }
        let Some((key, path)) = line.split_once(',') else {
            sink.warning(label, i as u32 + 1, 1, "structure entry without a path");
            continue;
        };
        data.structures.insert(
            key.trim().to_lowercase(),
            ObjectPointer {
                path: path.trim().to_owned(),
            },
        );
    }
}

/// Station list columns: key, name, arrival (or P/L to pass), departure
/// (or T/= for a terminal), minimum stop duration, jump time, forced red
/// flag. Later columns are ignored.
fn load_station_list(label: &str, text: &str, data: &mut RouteData, sink: &mut DiagnosticSink) {
    let lines: Vec<&str> = text.lines().collect();
    if !check_list_header(label, &lines, "bvets station list", sink) {
        return;
    }
    for (i, raw) in lines.iter().enumerate().skip(1) {
        let line = strip_list_comments(raw);
        if line.is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split(',').map(str::trim).collect();
        if columns[0].is_empty() {
            sink.error(label, i as u32 + 1, 1, "station entry with an empty key");
            continue;
        }
        let key = columns[0].to_lowercase();
        let name = columns
            .get(1)
            .filter(|n| !n.is_empty())
            .map(|n| (*n).to_owned())
            .unwrap_or_else(|| format!("Station {}", data.stations.len() + 1));
        let mut pass = false;
        let mut arrival_time = None;
        if let Some(arr) = columns.get(2).filter(|c| !c.is_empty()) {
            if arr.eq_ignore_ascii_case("p") || arr.eq_ignore_ascii_case("l") {
                pass = true;
            } else if let Some(t) = parse_time(arr) {
                arrival_time = Some(t);
            } else {
                sink.error(label, i as u32 + 1, 1, "arrival time is invalid");
            }
        }
        let mut departure_time = None;
        if let Some(dep) = columns.get(3).filter(|c| !c.is_empty()) {
            if dep.eq_ignore_ascii_case("t") || *dep == "=" {
                // terminal station, no departure
            } else if let Some(t) = parse_time(dep) {
                departure_time = Some(t);
            } else {
                sink.error(label, i as u32 + 1, 1, "departure time is invalid");
            }
        }
        let mut stop_duration = 15.0;
        if let Some(halt) = columns.get(4).filter(|c| !c.is_empty()) {
            match parse_double(halt) {
                Some(value) => stop_duration = value.max(5.0),
                None => sink.error(label, i as u32 + 1, 1, "stop duration is invalid"),
            }
        }
        let forced_red = columns
            .get(6)
            .and_then(|c| parse_double(c))
            .map(|v| v == 1.0)
            .unwrap_or(false);
        data.stations.insert(
            key,
            StationDefinition {
                name,
                arrival_time,
                departure_time,
                pass,
                stop_duration,
                forced_red,
            },
        );
    }
}

/// Signal aspect list: first column is the signal key, each later nonempty
/// column names the structure shown for that aspect index.
fn load_signal_list(label: &str, text: &str, data: &mut RouteData, sink: &mut DiagnosticSink) {
    let lines: Vec<&str> = text.lines().collect();
    if !check_list_header(label, &lines, "bvets signal aspects list", sink) {
        return;
    }
    for raw in lines.iter().skip(1) {
        let line = strip_list_comments(raw);
        if line.is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split(',').map(str::trim).collect();
        if columns[0].is_empty() {
            // a keyless line defines glow textures for the previous entry
            continue;
        }
        let aspects: Vec<i32> = columns
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, c)| !c.is_empty())
            .map(|(j, _)| j as i32)
            .collect();
        data.signals
            .insert(columns[0].to_lowercase(), SignalAspects { aspects });
    }
}
