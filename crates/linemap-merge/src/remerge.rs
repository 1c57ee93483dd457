//! 3D-only consolidation of finished tracks.

use crate::graph::DisjointSet;
use crate::LineLinker3d;
use linemap_core::LineTrack;
use log::{info, warn};

/// Merge tracks whose representative lines the 3D linker accepts.
///
/// Observation lists are concatenated in track order and the line is
/// re-derived from every member 3D segment. Groups are emitted in order of
/// their first track, so unmerged tracks keep their relative order. A group
/// whose member segments are all degenerate cannot yield a line and is
/// emitted as its original tracks.
pub fn remerge(linker3d: &LineLinker3d, tracks: Vec<LineTrack>) -> Vec<LineTrack> {
    let n = tracks.len();
    let mut sets = DisjointSet::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if linker3d.check_connection(&tracks[i].line, &tracks[j].line) {
                sets.union(i, j);
            }
        }
    }

    let groups = sets.groups(1);
    let mut slots: Vec<Option<LineTrack>> = tracks.into_iter().map(Some).collect();
    let mut out: Vec<LineTrack> = Vec::with_capacity(groups.len());
    for members in groups {
        let parts: Vec<LineTrack> = members.into_iter().filter_map(|k| slots[k].take()).collect();
        if parts.len() < 2 {
            out.extend(parts);
            continue;
        }
        let mut merged = LineTrack {
            line: parts[0].line,
            observations: parts.iter().flat_map(|t| t.observations.iter().copied()).collect(),
        };
        if merged.recompute_line() {
            out.push(merged);
        } else {
            warn!(
                "remerge: group of {} tracks has no usable 3D segment, kept unmerged",
                parts.len()
            );
            out.extend(parts);
        }
    }

    info!("remerge: {} -> {} tracks", n, out.len());
    out
}
