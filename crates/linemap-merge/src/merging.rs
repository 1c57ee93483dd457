//! Cross-view track merging over neighboring images.

use crate::graph::CorrespondenceGraph;
use crate::LineLinker;
use linemap_core::{
    FitOutput, ImageCollection, ImageId, LineTrack, NeighborMap, SegmentMap, TrackObservation,
};
use log::{debug, info};
use std::collections::{BTreeMap, HashSet};

/// Tracks produced by [`merge_line_tracks`] plus graph statistics.
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub tracks: Vec<LineTrack>,
    pub num_nodes: usize,
    pub num_edges: usize,
}

/// Link fitted segments across neighboring images and turn every connected
/// component of at least two segments into a track.
///
/// A pair `(a in i, b in j)` is linked when the 3D linker accepts the two 3D
/// segments and the 2D linker accepts each observed segment against the other
/// segment projected into its image. Failed fits, images without cameras,
/// unknown neighbors and self-neighbors are ignored.
pub fn merge_line_tracks(
    linker: &LineLinker,
    segments: &SegmentMap,
    fits: &FitOutput,
    imagecols: &ImageCollection,
    neighbors: &NeighborMap,
) -> MergeResult {
    // Register nodes in (image, line) order so component ordering is stable.
    let mut graph = CorrespondenceGraph::new();
    let mut nodes: Vec<TrackObservation> = Vec::new();
    let mut by_image: BTreeMap<ImageId, Vec<usize>> = BTreeMap::new();
    for (&image_id, image_fits) in fits {
        if !imagecols.contains(image_id) {
            continue;
        }
        let Some(segs) = segments.get(&image_id) else {
            continue;
        };
        for (line_id, (fit, seg2d)) in image_fits.iter().zip(segs).enumerate() {
            let Some(seg3d) = fit.segment() else {
                continue;
            };
            let idx = graph.add_node((image_id, line_id));
            debug_assert_eq!(idx, nodes.len());
            nodes.push(TrackObservation {
                image_id,
                line_id,
                seg2d: *seg2d,
                seg3d: *seg3d,
            });
            by_image.entry(image_id).or_default().push(idx);
        }
    }

    let mut visited_pairs: HashSet<(ImageId, ImageId)> = HashSet::new();
    for (&i, nodes_i) in &by_image {
        let Ok(view_i) = imagecols.camview(i) else {
            continue;
        };
        for &j in neighbors.get(&i).map_or(&[][..], Vec::as_slice) {
            if j == i || !visited_pairs.insert((i.min(j), i.max(j))) {
                continue;
            }
            let (Some(nodes_j), Ok(view_j)) = (by_image.get(&j), imagecols.camview(j)) else {
                continue;
            };
            let mut linked = 0usize;
            for &na in nodes_i {
                let a = &nodes[na];
                let a_in_j = view_j.project_segment(&a.seg3d);
                for &nb in nodes_j {
                    let b = &nodes[nb];
                    if !linker.linker3d.check_connection(&a.seg3d, &b.seg3d) {
                        continue;
                    }
                    let Some(b_in_i) = view_i.project_segment(&b.seg3d) else {
                        continue;
                    };
                    let Some(a_in_j) = a_in_j.as_ref() else {
                        continue;
                    };
                    if linker.linker2d.check_connection(&a.seg2d, &b_in_i)
                        && linker.linker2d.check_connection(&b.seg2d, a_in_j)
                    {
                        graph.add_edge((a.image_id, a.line_id), (b.image_id, b.line_id));
                        linked += 1;
                    }
                }
            }
            debug!("images {} <-> {}: {} links", i, j, linked);
        }
    }

    let tracks: Vec<LineTrack> = graph
        .components(2)
        .into_iter()
        .filter_map(|members| {
            LineTrack::from_observations(members.into_iter().map(|idx| nodes[idx]).collect())
        })
        .collect();

    info!(
        "merged {} fitted segments with {} links into {} tracks",
        graph.num_nodes(),
        graph.num_edges(),
        tracks.len()
    );
    MergeResult {
        tracks,
        num_nodes: graph.num_nodes(),
        num_edges: graph.num_edges(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LineLinker2d, LineLinker3d, Linker2dConfig, Linker3dConfig};
    use linemap_core::synthetic::scene::SyntheticScene;
    use linemap_core::SegmentFit;

    fn linker() -> LineLinker {
        LineLinker::new(
            LineLinker2d::new(Linker2dConfig::default(), 5.0),
            LineLinker3d::new(Linker3dConfig::default()),
        )
    }

    fn exact_fits(scene: &SyntheticScene) -> FitOutput {
        scene
            .line_index
            .iter()
            .map(|(id, idx)| {
                (
                    *id,
                    idx.iter()
                        .map(|&li| SegmentFit::Fitted(scene.lines[li]))
                        .collect(),
                )
            })
            .collect()
    }

    #[test]
    fn one_track_per_ground_truth_line() {
        let scene = SyntheticScene::wall().unwrap();
        let res = merge_line_tracks(
            &linker(),
            &scene.segments,
            &exact_fits(&scene),
            &scene.imagecols,
            &scene.all_pairs_neighbors(),
        );
        assert_eq!(res.tracks.len(), 2);
        assert_eq!(res.num_nodes, 6);
        for (k, track) in res.tracks.iter().enumerate() {
            assert_eq!(track.num_images(), 3);
            assert!(track.observations.iter().all(|o| o.line_id == k));
            assert!((track.line.p0 - scene.lines[k].p0).norm() < 1e-9);
        }
    }

    #[test]
    fn failed_fits_and_missing_neighbors_are_skipped() {
        let scene = SyntheticScene::wall().unwrap();
        let mut fits = exact_fits(&scene);
        fits.get_mut(&1).unwrap()[0] = SegmentFit::Failed;
        let mut neighbors = NeighborMap::new();
        neighbors.insert(0, vec![0, 1, 42]);

        let res = merge_line_tracks(&linker(), &scene.segments, &fits, &scene.imagecols, &neighbors);
        // Only line 1 can link 0 <-> 1.
        assert_eq!(res.tracks.len(), 1);
        assert_eq!(res.tracks[0].image_ids(), vec![0, 1]);
        assert!(res.tracks[0].observations.iter().all(|o| o.line_id == 1));
    }

    #[test]
    fn no_neighbors_no_tracks() {
        let scene = SyntheticScene::wall().unwrap();
        let res = merge_line_tracks(
            &linker(),
            &scene.segments,
            &exact_fits(&scene),
            &scene.imagecols,
            &NeighborMap::new(),
        );
        assert!(res.tracks.is_empty());
        assert_eq!(res.num_edges, 0);
    }
}
