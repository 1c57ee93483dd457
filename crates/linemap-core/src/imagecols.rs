use crate::CameraView;
use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of an image within a collection.
pub type ImageId = u32;

/// Ranked neighbor lists per image.
pub type NeighborMap = BTreeMap<ImageId, Vec<ImageId>>;

/// One registered image: name, camera view and undistortion flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraImage {
    pub name: String,
    pub view: CameraView,
    /// Required on input; the pipeline refuses images not flagged undistorted.
    pub undistorted: bool,
}

impl CameraImage {
    pub fn new(name: impl Into<String>, view: CameraView) -> Self {
        Self {
            name: name.into(),
            view,
            undistorted: true,
        }
    }
}

/// Set of calibrated images keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageCollection {
    images: BTreeMap<ImageId, CameraImage>,
}

impl ImageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_images(images: impl IntoIterator<Item = (ImageId, CameraImage)>) -> Result<Self> {
        let mut out = Self::new();
        for (id, image) in images {
            out.insert(id, image)?;
        }
        Ok(out)
    }

    pub fn insert(&mut self, id: ImageId, image: CameraImage) -> Result<()> {
        ensure!(
            !self.images.contains_key(&id),
            "duplicate image id {} ({})",
            id,
            image.name
        );
        self.images.insert(id, image);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.images.contains_key(&id)
    }

    /// Image ids in ascending order.
    pub fn image_ids(&self) -> Vec<ImageId> {
        self.images.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ImageId, &CameraImage)> {
        self.images.iter().map(|(id, img)| (*id, img))
    }

    pub fn image(&self, id: ImageId) -> Option<&CameraImage> {
        self.images.get(&id)
    }

    pub fn camview(&self, id: ImageId) -> Result<&CameraView> {
        self.images
            .get(&id)
            .map(|img| &img.view)
            .ok_or_else(|| anyhow!("image {} is not in the collection", id))
    }

    pub fn image_name(&self, id: ImageId) -> Option<&str> {
        self.images.get(&id).map(|img| img.name.as_str())
    }

    pub fn image_name_map(&self) -> BTreeMap<ImageId, String> {
        self.images
            .iter()
            .map(|(id, img)| (*id, img.name.clone()))
            .collect()
    }

    pub fn is_undistorted(&self) -> bool {
        self.images.values().all(|img| img.undistorted)
    }

    /// First image (by id) that is not flagged as undistorted.
    pub fn first_distorted(&self) -> Option<ImageId> {
        self.images
            .iter()
            .find(|(_, img)| !img.undistorted)
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FxFyCxCySkew, Mat3, Vec3};

    fn image(name: &str) -> CameraImage {
        let view = CameraView::new(
            FxFyCxCySkew::new(100.0, 100.0, 50.0, 40.0),
            Mat3::identity(),
            Vec3::zeros(),
            100,
            80,
        )
        .unwrap();
        CameraImage::new(name, view)
    }

    #[test]
    fn ids_are_sorted_and_unique() {
        let mut cols = ImageCollection::from_images([(7, image("b")), (2, image("a"))]).unwrap();
        assert_eq!(cols.image_ids(), vec![2, 7]);
        assert!(cols.insert(2, image("dup")).is_err());
        assert_eq!(cols.image_name(7), Some("b"));
        assert!(cols.camview(3).is_err());
    }

    #[test]
    fn undistorted_flag_is_tracked() {
        let mut distorted = image("c");
        distorted.undistorted = false;
        let cols = ImageCollection::from_images([(1, image("a")), (4, distorted)]).unwrap();
        assert!(!cols.is_undistorted());
        assert_eq!(cols.first_distorted(), Some(4));
    }

    #[test]
    fn undistorted_flag_is_required_in_json() {
        let mut value = serde_json::to_value(image("a")).unwrap();
        value.as_object_mut().unwrap().remove("undistorted");
        assert!(serde_json::from_value::<CameraImage>(value).is_err());
    }

    #[test]
    fn json_roundtrip_keeps_integer_keys() {
        let cols = ImageCollection::from_images([(3, image("x"))]).unwrap();
        let json = serde_json::to_string(&cols).unwrap();
        let back: ImageCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cols);
    }
}
