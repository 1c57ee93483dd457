//! Neighbor selection for cross-view merging.
//!
//! Supplied and computed neighbor maps go through the same
//! [`truncate_neighbors`] policy.

use linemap_core::{ImageCollection, ImageId, NeighborMap, Real};
use log::debug;
use std::collections::HashSet;

/// Produces a ranked neighbor list for every image of a collection.
pub trait NeighborRanker {
    fn rank(&self, imagecols: &ImageCollection) -> NeighborMap;
}

/// Ranks other images by the angle between optical axes, then by camera
/// center distance. Images looking more than `max_axis_angle_deg` away are
/// not neighbors.
#[derive(Debug, Clone, Copy)]
pub struct PoseNeighborRanker {
    pub max_axis_angle_deg: Real,
}

impl Default for PoseNeighborRanker {
    fn default() -> Self {
        Self {
            max_axis_angle_deg: 90.0,
        }
    }
}

impl NeighborRanker for PoseNeighborRanker {
    fn rank(&self, imagecols: &ImageCollection) -> NeighborMap {
        let poses: Vec<_> = imagecols
            .iter()
            .map(|(id, image)| (id, image.view.optical_axis(), image.view.center()))
            .collect();

        poses
            .iter()
            .map(|(i, axis_i, center_i)| {
                let mut ranked: Vec<(Real, Real, ImageId)> = poses
                    .iter()
                    .filter(|(j, _, _)| j != i)
                    .filter_map(|(j, axis_j, center_j)| {
                        let angle = axis_i.dot(axis_j).clamp(-1.0, 1.0).acos().to_degrees();
                        (angle <= self.max_axis_angle_deg)
                            .then(|| (angle, (center_j - center_i).norm(), *j))
                    })
                    .collect();
                ranked.sort_by(|a, b| {
                    a.0.total_cmp(&b.0)
                        .then(a.1.total_cmp(&b.1))
                        .then(a.2.cmp(&b.2))
                });
                (*i, ranked.into_iter().map(|(_, _, j)| j).collect())
            })
            .collect()
    }
}

/// Keep at most `n` neighbors per image, in the given order.
///
/// Entries for images outside the collection, self references, unknown
/// neighbor ids and repeats are dropped before truncation.
pub fn truncate_neighbors(
    neighbors: &NeighborMap,
    imagecols: &ImageCollection,
    n: usize,
) -> NeighborMap {
    neighbors
        .iter()
        .filter(|(id, _)| imagecols.contains(**id))
        .map(|(&id, list)| {
            let mut seen = HashSet::new();
            let kept: Vec<ImageId> = list
                .iter()
                .copied()
                .filter(|&j| j != id && imagecols.contains(j) && seen.insert(j))
                .take(n)
                .collect();
            (id, kept)
        })
        .collect()
}

/// Supplied neighbors if any, otherwise `ranker`'s, truncated to `n`.
pub fn resolve_neighbors(
    supplied: Option<&NeighborMap>,
    ranker: &dyn NeighborRanker,
    imagecols: &ImageCollection,
    n: usize,
) -> NeighborMap {
    let raw = match supplied {
        Some(map) => {
            debug!("using {} supplied neighbor lists", map.len());
            map.clone()
        }
        None => ranker.rank(imagecols),
    };
    truncate_neighbors(&raw, imagecols, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use linemap_core::synthetic::scene::{look_at, SyntheticScene};
    use linemap_core::{CameraImage, FxFyCxCySkew, Pt3, Vec3};

    #[test]
    fn truncation_is_uniform() {
        let scene = SyntheticScene::wall().unwrap();
        let mut supplied = NeighborMap::new();
        supplied.insert(0, vec![0, 2, 2, 7, 1]);
        supplied.insert(9, vec![0]);

        let out = truncate_neighbors(&supplied, &scene.imagecols, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[&0], vec![2]);

        let computed = resolve_neighbors(None, &PoseNeighborRanker::default(), &scene.imagecols, 1);
        assert!(computed.values().all(|list| list.len() == 1));
    }

    #[test]
    fn pose_ranker_prefers_similar_views() {
        let k = FxFyCxCySkew::new(100.0, 100.0, 50.0, 50.0);
        let up = Vec3::new(0.0, -1.0, 0.0);
        let target = Pt3::new(0.0, 0.0, 5.0);
        let mk = |c: Pt3, t: Pt3| look_at(k, c, t, up, 100, 100).unwrap();
        let imagecols = ImageCollection::from_images([
            (0, CameraImage::new("a", mk(Pt3::origin(), target))),
            (1, CameraImage::new("b", mk(Pt3::new(2.0, 0.0, 0.0), target))),
            (2, CameraImage::new("c", mk(Pt3::new(0.3, 0.0, 0.0), target))),
            // Looking back at the others.
            (3, CameraImage::new("d", mk(Pt3::new(0.0, 0.0, 10.0), Pt3::origin()))),
        ])
        .unwrap();

        let ranked = PoseNeighborRanker::default().rank(&imagecols);
        assert_eq!(ranked[&0], vec![2, 1]);
        assert!(ranked[&3].is_empty());
    }

    #[test]
    fn supplied_neighbors_win() {
        let scene = SyntheticScene::wall().unwrap();
        let mut supplied = NeighborMap::new();
        supplied.insert(1, vec![2]);
        let out = resolve_neighbors(
            Some(&supplied),
            &PoseNeighborRanker::default(),
            &scene.imagecols,
            20,
        );
        assert_eq!(out, supplied);
    }
}
