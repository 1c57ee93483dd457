use crate::Real;
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Dense row-major depth map for one image.
///
/// Values are camera-frame depths. Non-finite or non-positive entries mark
/// missing measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDepthMap")]
pub struct DepthMap {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

/// Unchecked serialized form; goes through [`DepthMap::new`] on load.
#[derive(Deserialize)]
struct RawDepthMap {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl TryFrom<RawDepthMap> for DepthMap {
    type Error = anyhow::Error;

    fn try_from(raw: RawDepthMap) -> Result<Self> {
        Self::new(raw.width, raw.height, raw.data)
    }
}

impl DepthMap {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        ensure!(
            data.len() == width * height,
            "depth buffer has {} values, expected {}x{}",
            data.len(),
            width,
            height
        );
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Depth map with every pixel set to `value`.
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Valid depth at integer pixel `(x, y)`, or `None` when out of bounds or invalid.
    pub fn get(&self, x: usize, y: usize) -> Option<Real> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let d = self.data[y * self.width + x] as Real;
        (d.is_finite() && d > 0.0).then_some(d)
    }

    /// Number of pixels holding a valid depth.
    pub fn num_valid(&self) -> usize {
        self.data
            .iter()
            .filter(|d| d.is_finite() && **d > 0.0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_values_are_hidden() {
        let map = DepthMap::new(2, 2, vec![1.0, 0.0, f32::NAN, -3.0]).unwrap();
        assert_eq!(map.get(0, 0), Some(1.0));
        assert_eq!(map.get(1, 0), None);
        assert_eq!(map.get(0, 1), None);
        assert_eq!(map.get(1, 1), None);
        assert_eq!(map.get(5, 0), None);
        assert_eq!(map.num_valid(), 1);
    }

    #[test]
    fn rejects_wrong_buffer_size() {
        assert!(DepthMap::new(3, 2, vec![1.0; 5]).is_err());
    }

    #[test]
    fn short_buffer_in_json_is_rejected() {
        let json = r#"{ "width": 320, "height": 240, "data": [1.0, 2.0, 3.0] }"#;
        let err = serde_json::from_str::<DepthMap>(json).unwrap_err();
        assert!(err.to_string().contains("expected 320x240"));

        let map = DepthMap::filled(4, 3, 2.5);
        let restored: DepthMap = serde_json::from_str(&serde_json::to_string(&map).unwrap()).unwrap();
        assert_eq!(restored, map);
        assert_eq!(restored.get(3, 2), Some(2.5));
    }

    #[test]
    fn from_fn_is_row_major() {
        let map = DepthMap::from_fn(3, 2, |x, y| (1 + x + 10 * y) as f32);
        assert_eq!(map.get(2, 1), Some(13.0));
        assert_eq!(map.get(0, 1), Some(11.0));
    }
}
