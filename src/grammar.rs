use std::fmt;

use tracing::instrument;

use crate::*;

/// One position of a chain path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Single(String),
    /// Parallel group. An empty list stands for `[]` or an empty segment; it
    /// produces no node.
    Group(Vec<String>),
}

impl Step {
    pub fn is_empty_group(&self) -> bool {
        matches!(self, Step::Group(refs) if refs.is_empty())
    }

    pub fn object_refs(&self) -> &[String] {
        match self {
            Step::Single(object_ref) => std::slice::from_ref(object_ref),
            Step::Group(refs) => refs,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Single(object_ref) => f.write_str(object_ref),
            Step::Group(refs) => {
                write!(f, "{GROUP_START}")?;
                for (idx, object_ref) in refs.iter().enumerate() {
                    if idx > 0 {
                        write!(f, "{GROUP_SEPARATOR}")?;
                    }
                    f.write_str(object_ref)?;
                }
                write!(f, "{GROUP_END}")
            }
        }
    }
}

/// Splits a chain string into steps, left to right.
///
/// Never fails. Object references are kept verbatim, whitespace included. An
/// empty segment (`1>>>>2`, a trailing `>>`) reads as an empty group, a
/// segment starting with `[` is read as a group even when the closing bracket
/// is missing, and brackets anywhere else are literal characters of the
/// object reference.
#[instrument(level = "trace")]
pub fn parse_steps(definition: &str) -> Vec<Step> {
    if definition.trim().is_empty() {
        return Vec::new();
    }

    definition.split(EDGE_TOKEN).map(parse_segment).collect()
}

fn parse_segment(segment: &str) -> Step {
    if segment.is_empty() {
        return Step::Group(Vec::new());
    }
    let Some(inner) = segment.strip_prefix(GROUP_START) else {
        return Step::Single(segment.to_string());
    };

    let inner = inner.strip_suffix(GROUP_END).unwrap_or(inner);
    let refs = inner
        .split(GROUP_SEPARATOR)
        .filter(|object_ref| !object_ref.is_empty())
        .map(str::to_string)
        .collect();

    Step::Group(refs)
}

/// Drops the single line terminator a chain file ends with; everything else
/// belongs to the chain.
pub fn strip_line_ending(contents: &str) -> &str {
    match contents.strip_suffix('\n') {
        Some(line) => line.strip_suffix('\r').unwrap_or(line),
        None => contents,
    }
}

/// Renders steps back into chain notation.
pub fn format_steps(steps: &[Step]) -> String {
    steps
        .iter()
        .map(Step::to_string)
        .collect::<Vec<_>>()
        .join(EDGE_TOKEN)
}
