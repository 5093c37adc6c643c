//! Pathological type-name screening
//!
//! Dependent-type names arrive from the wire and can be arbitrarily
//! malformed: runaway generic instantiations, self-referential array
//! event-argument types and similar shapes would cause unbounded
//! fetch recursion if attempted. These checks run before any network
//! round-trip and reject such names cheaply.

use crate::error::{Error, Result};

/// Names longer than this are never fetched
pub const MAX_TYPE_NAME_LEN: usize = 500;

/// Consecutive `[]` array markers at or beyond this count are rejected
pub const MAX_ARRAY_MARKER_RUN: usize = 6;

/// Maximum bracket nesting depth before a name counts as runaway generics
pub const MAX_GENERIC_NESTING: usize = 16;

/// Validate a type name before attempting to fetch its descriptor.
///
/// Returns [`Error::PathologicalType`] without any network activity
/// when the name is structurally hopeless.
pub fn screen_type_name(name: &str) -> Result<()> {
    if name.len() > MAX_TYPE_NAME_LEN {
        return Err(reject(
            name,
            format!(
                "name length {} exceeds ceiling of {}",
                name.len(),
                MAX_TYPE_NAME_LEN
            ),
        ));
    }

    if array_marker_run(name) >= MAX_ARRAY_MARKER_RUN {
        return Err(reject(
            name,
            format!(
                "{} or more consecutive array markers",
                MAX_ARRAY_MARKER_RUN
            ),
        ));
    }

    let depth = max_bracket_depth(name);
    if depth > MAX_GENERIC_NESTING {
        return Err(reject(
            name,
            format!(
                "generic nesting depth {} exceeds ceiling of {}",
                depth, MAX_GENERIC_NESTING
            ),
        ));
    }

    Ok(())
}

fn reject(name: &str, reason: String) -> Error {
    // Long names are truncated so the error itself stays bounded
    let shown: String = name.chars().take(64).collect();
    Error::PathologicalType {
        name: shown,
        reason,
    }
}

/// Longest run of consecutive `[]` markers in the name
fn array_marker_run(name: &str) -> usize {
    let bytes = name.as_bytes();
    let mut longest = 0;
    let mut run = 0;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'[' && bytes[i + 1] == b']' {
            run += 1;
            longest = longest.max(run);
            i += 2;
        } else {
            run = 0;
            i += 1;
        }
    }
    longest
}

/// Maximum nesting depth across `[`/`]` and `<`/`>` brackets.
///
/// Managed generic instantiations nest with `[[..]]`, native template
/// names with `<..>`; both count toward the same ceiling.
fn max_bracket_depth(name: &str) -> usize {
    let mut depth: usize = 0;
    let mut max_depth = 0;
    for c in name.chars() {
        match c {
            '[' | '<' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            ']' | '>' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max_depth
}
