//! Request query-string handling
//!
//! Queries are `name=value` pairs separated by `&` or `;`. Only the
//! interface (`if`) attribute matters to this resource.

use crate::codec::DEFAULT_INTERFACE;

/// Interface query attribute
pub const INTERFACE_ATTR: &str = "if";

/// Iterates over the `(name, value)` pairs of a query string
///
/// Empty segments are skipped; a segment without `=` yields an empty value.
pub fn query_pairs(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query
        .split(['&', ';'])
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.split_once('=').unwrap_or((segment, "")))
}

/// Whether a GET with this query may be answered
///
/// A query without an interface attribute always matches. With one or more
/// interface attributes, at least one must name the baseline interface.
/// Names and values compare case-insensitively.
pub fn validate_query(query: &str) -> bool {
    let mut interface_queried = false;
    let mut interface_matched = false;

    for (name, value) in query_pairs(query) {
        if name.eq_ignore_ascii_case(INTERFACE_ATTR) {
            interface_queried = true;
            if value.eq_ignore_ascii_case(DEFAULT_INTERFACE) {
                interface_matched = true;
            }
        }
    }

    !interface_queried || interface_matched
}
