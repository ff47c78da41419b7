//! Statement splitting and command/argument separation.
//!
//! The map dialect packs several statements on one line, separated by `;`,
//! with `#`/`//` comments and free placement of whitespace. Parenthesis
//! nesting is statement-transparent: a `;` inside an argument list does not
//! terminate the statement. Malformed nesting is tolerated here; the
//! separator reports it later.

use serde::Serialize;

use crate::error::DiagnosticSink;

/// One positional statement, with enough location data for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    pub file: String,
    pub text: String,
    pub line: u32,
    pub column: u32,
    /// Track-position offset inherited from the including file.
    pub position_offset: f64,
}

/// Split raw lines into expressions, tracking parenthesis depth so that
/// separators inside argument lists are preserved.
///
/// Depth may go negative transiently on malformed input; detection of that
/// is deferred to [`separate_commands_and_arguments`].
pub fn split_into_expressions(
    file: &str,
    lines: &[String],
    position_offset: f64,
) -> Vec<Expression> {
    let mut expressions = Vec::with_capacity(lines.len());
    for (line_index, line) in lines.iter().enumerate() {
        let chars: Vec<char> = line.chars().collect();
        let mut depth: i32 = 0;
        let mut segment_start = 0usize;
        let mut i = 0usize;
        while i < chars.len() {
            match chars[i] {
                '(' => depth += 1,
                ')' => depth -= 1,
                '#' => {
                    if depth == 0 {
                        break;
                    }
                }
                '/' => {
                    if depth == 0 && i + 1 < chars.len() && chars[i + 1] == '/' {
                        break;
                    }
                }
                ';' => {
                    if depth == 0 {
                        push_segment(
                            file,
                            &chars[segment_start..i],
                            line_index,
                            segment_start,
                            position_offset,
                            &mut expressions,
                        );
                        segment_start = i + 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        push_segment(
            file,
            &chars[segment_start..i],
            line_index,
            segment_start,
            position_offset,
            &mut expressions,
        );
    }
    expressions
}

fn push_segment(
    file: &str,
    segment: &[char],
    line_index: usize,
    segment_start: usize,
    position_offset: f64,
    expressions: &mut Vec<Expression>,
) {
    let leading = segment.iter().take_while(|c| c.is_whitespace()).count();
    let text: String = segment.iter().collect::<String>().trim().to_owned();
    if text.is_empty() {
        return;
    }
    expressions.push(Expression {
        file: file.to_owned(),
        text,
        line: line_index as u32 + 1,
        column: (segment_start + leading) as u32 + 1,
        position_offset,
    });
}

/// Separate one expression into its command and argument-sequence strings.
///
/// The command keeps its dotted sub-path and bracketed key but sheds all
/// unquoted whitespace, and the argument sequence is re-joined from its
/// trimmed parts, so spellings differing only in whitespace come out
/// identical.
///
/// Recovery policy: a missing closing parenthesis is synthesized, a stray
/// closing parenthesis is reported and dropped, a trailing argument
/// separator is reported and stripped. The compile never aborts here.
///
/// One quirk is kept as observed behavior: a nested `(` encountered before
/// the first argument separator inside the parenthesized group is rewritten
/// to `[` (and its partner `)` to `]`). Once a `,` or `;` has been seen the
/// group is treated as a station-name field and nested parens are reported
/// instead. Do not generalize this; it papers over an ambiguous grammar.
pub fn separate_commands_and_arguments(
    expression: &mut Expression,
    raise_errors: bool,
    sink: &mut DiagnosticSink,
) -> (String, String) {
    let mut text: Vec<char> = expression.text.chars().collect();
    let mut group_open: Option<usize> = None;
    let mut group_close: Option<usize> = None;
    let mut opening_error = false;
    let mut closing_error = false;

    // repair parentheses in place
    let mut i = 0usize;
    while i < text.len() {
        match text[i] {
            '\'' => {
                i += 1;
                while i < text.len() && text[i] != '\'' {
                    i += 1;
                }
            }
            '(' => {
                group_open = Some(i);
                let mut station_name = false;
                let mut replaced = false;
                i += 1;
                while i < text.len() {
                    if text[i] == ',' || text[i] == ';' {
                        // separators mean we are past the station name field
                        station_name = true;
                    }
                    if text[i] == '(' {
                        if station_name {
                            if raise_errors && !opening_error {
                                sink.error(
                                    &expression.file,
                                    expression.line,
                                    expression.column,
                                    "invalid opening parenthesis",
                                );
                                opening_error = true;
                            }
                        } else {
                            text[i] = '[';
                            replaced = true;
                        }
                    } else if text[i] == ')' {
                        if !station_name && replaced {
                            text[i] = ']';
                            replaced = false;
                        } else {
                            group_close = Some(i);
                            break;
                        }
                    }
                    i += 1;
                }
                if group_close.is_none() {
                    if raise_errors && !closing_error {
                        sink.error(
                            &expression.file,
                            expression.line,
                            expression.column,
                            "missing closing parenthesis",
                        );
                        closing_error = true;
                    }
                    text.push(')');
                    group_close = Some(text.len() - 1);
                }
                break;
            }
            ')' => {
                if raise_errors && !closing_error {
                    sink.error(
                        &expression.file,
                        expression.line,
                        expression.column,
                        "invalid closing parenthesis",
                    );
                    closing_error = true;
                }
                text.remove(i);
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    expression.text = text.iter().collect();

    // command: everything before the argument group, minus unquoted whitespace
    let command_end = group_open.unwrap_or(text.len());
    let mut command = String::with_capacity(command_end);
    let mut in_quote = false;
    for &c in &text[..command_end] {
        if c == '\'' {
            in_quote = !in_quote;
            command.push(c);
        } else if c.is_whitespace() && !in_quote {
            // dropped so spacing variants compare equal
        } else {
            command.push(c);
        }
    }

    let argument_sequence = match (group_open, group_close) {
        (Some(open), Some(close)) => {
            if raise_errors && text[close + 1..].iter().any(|c| !c.is_whitespace()) {
                sink.warning(
                    &expression.file,
                    expression.line,
                    expression.column,
                    "invalid trailing characters after argument list",
                );
            }
            normalize_argument_sequence(&text[open + 1..close], expression, raise_errors, sink)
        }
        _ => String::new(),
    };
    (command, argument_sequence)
}

/// Re-join an argument sequence from its trimmed parts, preserving the
/// original separator characters and reporting a trailing separator.
fn normalize_argument_sequence(
    chars: &[char],
    expression: &Expression,
    raise_errors: bool,
    sink: &mut DiagnosticSink,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut separators: Vec<char> = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    for &c in chars {
        match c {
            '\'' => {
                in_quote = !in_quote;
                current.push(c);
            }
            '(' | '[' if !in_quote => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' if !in_quote => {
                depth -= 1;
                current.push(c);
            }
            ',' | ';' if !in_quote && depth == 0 => {
                parts.push(current.trim().to_owned());
                separators.push(c);
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    let last = current.trim().to_owned();
    if last.is_empty() && !separators.is_empty() {
        if raise_errors {
            sink.error(
                &expression.file,
                expression.line,
                expression.column,
                "invalid trailing comma in argument sequence",
            );
        }
        separators.pop();
    } else if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(separators[i - 1]);
        }
        out.push_str(part);
    }
    out
}
