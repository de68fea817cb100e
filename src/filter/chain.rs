//! Filter chain resolution over the catalog's MIME-type graph.
//!
//! [`auto_chain`] is an exhaustive depth-first search: catalog sizes are
//! tens of filters, so correctness and reproducibility win over search
//! performance. Determinism comes from the catalog's sorted-id iteration
//! order (ties keep the first candidate found).

use super::catalog::FilterCatalog;
use super::descriptor::FilterDescriptor;
use std::sync::Arc;

/// Find the shortest filter chain converting `src` into `dest`.
///
/// A direct single-filter conversion is always preferred and returned
/// without considering composed candidates. Otherwise every filter
/// accepting `src` (excluding self-loops) is expanded recursively and the
/// shortest composed chain wins, first-found on ties.
///
/// The returned ids satisfy the chain invariant: each filter's output MIME
/// type is accepted by its successor, the first filter accepts `src`, and
/// the last filter produces `dest`. An empty result means no conversion is
/// possible — callers decide whether to surface that to the user. When
/// `src` equals `dest` the empty "no conversion needed" chain is returned.
pub fn auto_chain(catalog: &FilterCatalog, src: &str, dest: &str) -> Vec<String> {
    if src == dest {
        return Vec::new();
    }
    let descriptors = catalog.descriptors();
    solve(&descriptors, src, dest, &mut Vec::new())
}

/// DFS step. `visited` holds the filter ids already on the current branch;
/// skipping them generalizes the self-loop exclusion to arbitrary cycles,
/// so the recursion terminates on any catalog.
fn solve(
    descriptors: &[Arc<FilterDescriptor>],
    src: &str,
    dest: &str,
    visited: &mut Vec<String>,
) -> Vec<String> {
    // Direct matches win outright.
    for filter in descriptors {
        if visited.iter().any(|v| v == &filter.id) {
            continue;
        }
        if filter.accepts(src) && filter.output == dest {
            return vec![filter.id.clone()];
        }
    }

    let mut best: Vec<String> = Vec::new();
    for filter in descriptors {
        if !filter.accepts(src) || filter.output == src {
            continue;
        }
        if visited.iter().any(|v| v == &filter.id) {
            continue;
        }

        visited.push(filter.id.clone());
        let tail = solve(descriptors, &filter.output, dest, visited);
        visited.pop();

        if tail.is_empty() {
            continue;
        }
        let mut candidate = Vec::with_capacity(tail.len() + 1);
        candidate.push(filter.id.clone());
        candidate.extend(tail);
        if best.is_empty() || candidate.len() < best.len() {
            best = candidate;
        }
    }
    best
}

/// Insert a named filter into an existing ordered filter list.
///
/// Walks the list tracking the running output MIME type, starting from the
/// new filter's first accepted input. The new filter goes in front of the
/// first position whose filter accepts the new filter's output while the
/// new filter accepts the running type. Failing that, it is appended when
/// it accepts the end-of-chain output, prepended when the list is empty or
/// `prefer_start` is set, and otherwise not inserted at all.
///
/// On success the id is inserted into `list` and its position returned.
/// `None` means no valid insertion point exists — an outcome for the caller
/// to act on, not an error.
pub fn insert_filter(
    catalog: &FilterCatalog,
    list: &mut Vec<String>,
    filter_id: &str,
    prefer_start: bool,
) -> Option<usize> {
    let new = catalog.get(filter_id)?;
    let mut running = new.inputs.first()?.clone();

    for (pos, id) in list.iter().enumerate() {
        let Some(existing) = catalog.get(id) else {
            tracing::warn!(id, "filter list references unknown filter");
            return None;
        };
        if existing.accepts(&new.output) && new.accepts(&running) {
            list.insert(pos, filter_id.to_string());
            return Some(pos);
        }
        running = existing.output.clone();
    }

    if !list.is_empty() && new.accepts(&running) {
        list.push(filter_id.to_string());
        Some(list.len() - 1)
    } else if list.is_empty() || prefer_start {
        list.insert(0, filter_id.to_string());
        Some(0)
    } else {
        None
    }
}

/// Render a resolved chain into a `|`-joined shell pipeline from the
/// filters' command templates.
///
/// Returns `None` when the chain is empty, references an unknown filter, or
/// contains a filter without a command template.
pub fn chain_command(catalog: &FilterCatalog, chain: &[String]) -> Option<String> {
    if chain.is_empty() {
        return None;
    }
    let mut parts = Vec::with_capacity(chain.len());
    for id in chain {
        parts.push(catalog.get(id)?.command.clone()?);
    }
    Some(parts.join(" | "))
}
