//! Instruction-text builds (Dockerfile-like)
//!
//! Handles what the analyzers need and nothing more:
//! - `#` comments and blank lines
//! - `\` line continuations
//! - case-insensitive keywords
//! - `--flag=value` options on COPY/ADD/RUN
//! - JSON-array (exec) form for COPY/ADD/RUN
//! - `<<EOF` heredoc bodies on RUN/COPY/ADD
//!
//! Unknown keywords are kept as `Other` steps.

use lazy_static::lazy_static;
use regex::Regex;
use stackcheck_core::{BuildModel, BuildStep, MalformedInputError};
use std::collections::HashSet;

lazy_static! {
    /// Keywords that identify instruction text
    static ref KEYWORDS: HashSet<&'static str> = [
        "FROM", "ARG", "RUN", "COPY", "ADD", "USER", "EXPOSE", "WORKDIR", "ENV", "CMD",
        "ENTRYPOINT", "LABEL", "VOLUME", "HEALTHCHECK", "SHELL", "STOPSIGNAL", "ONBUILD",
        "MAINTAINER",
    ]
    .into_iter()
    .collect();

    static ref HEREDOC: Regex = Regex::new(r#"<<-?["']?([A-Za-z_][A-Za-z0-9_]*)["']?"#).unwrap();
}

/// One logical instruction after joining continuations
#[derive(Debug, Clone, PartialEq, Eq)]
struct Instruction {
    line: usize,
    keyword: String,
    args: String,
}

/// Whether the first meaningful line starts with a known keyword
pub fn looks_like_instructions(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .and_then(|l| l.split_whitespace().next())
        .map(|first| KEYWORDS.contains(first.to_ascii_uppercase().as_str()))
        .unwrap_or(false)
}

/// Parse instruction text into a build model
pub fn parse(name: &str, text: &str) -> Result<BuildModel, MalformedInputError> {
    let mut steps = Vec::new();

    for instruction in logical_lines(name, text)? {
        let field = format!("{}:{}", name, instruction.line);
        let step = to_step(&instruction, &field)?;
        steps.push(step);
    }

    if steps.is_empty() {
        return Err(MalformedInputError::invalid(name, "build contains no instructions"));
    }

    Ok(BuildModel::named(name, steps))
}

fn logical_lines(name: &str, text: &str) -> Result<Vec<Instruction>, MalformedInputError> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    let mut lines = text.lines().enumerate();

    while let Some((i, raw)) = lines.next() {
        // Blank and comment lines never end a continuation
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (continues, content) = match trimmed.strip_suffix('\\') {
            Some(head) => (true, head.trim_end()),
            None => (false, trimmed),
        };

        let (start, mut joined) = pending.take().unwrap_or((i + 1, String::new()));
        if !joined.is_empty() && !content.is_empty() {
            joined.push(' ');
        }
        joined.push_str(content);

        if continues {
            pending = Some((start, joined));
            continue;
        }

        let Some(mut instruction) = split(start, &joined) else {
            continue;
        };

        // Heredoc bodies belong to the instruction that opens them
        for terminator in heredoc_terminators(&instruction) {
            let mut closed = false;
            for (_, body) in lines.by_ref() {
                if body.trim() == terminator {
                    closed = true;
                    break;
                }
                instruction.args.push('\n');
                instruction.args.push_str(body);
            }
            if !closed {
                return Err(MalformedInputError::invalid(
                    format!("{}:{}", name, start),
                    format!("heredoc '{}' is never closed", terminator),
                ));
            }
        }
        out.push(instruction);
    }

    // Trailing continuation at end of input
    if let Some((start, joined)) = pending {
        if let Some(instruction) = split(start, &joined) {
            out.push(instruction);
        }
    }

    Ok(out)
}

/// Terminator words of `<<EOF` / `<<-"EOF"` markers, in order
fn heredoc_terminators(instruction: &Instruction) -> Vec<String> {
    if !matches!(instruction.keyword.as_str(), "RUN" | "COPY" | "ADD") {
        return Vec::new();
    }
    HEREDOC
        .captures_iter(&instruction.args)
        .map(|c| c[1].to_string())
        .collect()
}

fn split(line: usize, text: &str) -> Option<Instruction> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let (keyword, args) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    Some(Instruction {
        line,
        keyword: keyword.to_ascii_uppercase(),
        args: args.trim().to_string(),
    })
}

fn to_step(instruction: &Instruction, field: &str) -> Result<BuildStep, MalformedInputError> {
    let keyword = instruction.keyword.as_str();
    let args = instruction.args.as_str();

    match keyword {
        "COPY" | "ADD" => {
            let (flags, rest) = take_flags(args.lines().next().unwrap_or_default());
            let operands = words(rest, field)?;
            if operands.len() < 2 {
                return Err(MalformedInputError::invalid(
                    field,
                    format!("{} needs at least one source and a destination", keyword),
                ));
            }

            let sources: Vec<String> = operands[..operands.len() - 1]
                .iter()
                .filter(|source| !source.starts_with("<<"))
                .cloned()
                .collect();
            let mut step = BuildStep::copy(sources).with_instruction(keyword);
            if let Some(stage) = flag_value(&flags, "from") {
                step = step.with_from_stage(stage);
            }
            Ok(step)
        }
        "RUN" => {
            let (_, rest) = take_flags(args);
            let command = if rest.starts_with('[') {
                words(rest, field)?.join(" ")
            } else {
                rest.to_string()
            };
            if command.is_empty() {
                return Err(MalformedInputError::invalid(field, "RUN needs a command"));
            }
            Ok(BuildStep::run(command))
        }
        "USER" => required(args, field, "USER needs a user").map(BuildStep::user),
        "EXPOSE" => required(args, field, "EXPOSE needs a port").map(BuildStep::expose),
        "FROM" => required(args, field, "FROM needs an image").map(BuildStep::from),
        other => Ok(BuildStep::other(other, args)),
    }
}

fn required(args: &str, field: &str, reason: &str) -> Result<String, MalformedInputError> {
    if args.is_empty() {
        Err(MalformedInputError::invalid(field, reason))
    } else {
        Ok(args.to_string())
    }
}

/// Shell-form words, or the elements of a JSON-array form
fn words(args: &str, field: &str) -> Result<Vec<String>, MalformedInputError> {
    if args.starts_with('[') {
        serde_json::from_str::<Vec<String>>(args)
            .map_err(|e| MalformedInputError::invalid(field, format!("invalid JSON array: {}", e)))
    } else {
        Ok(args.split_whitespace().map(str::to_string).collect())
    }
}

/// Leading `--flag[=value]` options and the remaining operand text
fn take_flags(args: &str) -> (Vec<String>, &str) {
    let mut flags = Vec::new();
    let mut rest = args.trim_start();
    while rest.starts_with("--") {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        flags.push(rest[..end].to_string());
        rest = rest[end..].trim_start();
    }
    (flags, rest)
}

fn flag_value<'a>(flags: &'a [String], name: &str) -> Option<&'a str> {
    flags.iter().find_map(|f| {
        let (key, value) = f.trim_start_matches("--").split_once('=')?;
        (key == name).then_some(value)
    })
}
