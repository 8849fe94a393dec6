use image::DynamicImage;
use std::collections::HashMap;

use crate::error::{TaskError, TaskResult};
use crate::features::FeatureType;

/// Raster features of one patch, keyed by category and then by name.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    features: HashMap<FeatureType, HashMap<String, DynamicImage>>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_feature(mut self, feature_type: FeatureType, name: impl Into<String>, image: DynamicImage) -> Self {
        self.insert(feature_type, name, image);
        self
    }

    /// Store an image, returning the one it replaced.
    pub fn insert(
        &mut self,
        feature_type: FeatureType,
        name: impl Into<String>,
        image: DynamicImage,
    ) -> Option<DynamicImage> {
        self.features
            .entry(feature_type)
            .or_default()
            .insert(name.into(), image)
    }

    pub fn get(&self, feature_type: FeatureType, name: &str) -> Option<&DynamicImage> {
        self.features.get(&feature_type)?.get(name)
    }

    pub fn get_mut(&mut self, feature_type: FeatureType, name: &str) -> Option<&mut DynamicImage> {
        self.features.get_mut(&feature_type)?.get_mut(name)
    }

    /// Like [`Patch::get`] but reports a missing feature as an error.
    pub fn require(&self, feature_type: FeatureType, name: &str) -> TaskResult<&DynamicImage> {
        self.get(feature_type, name)
            .ok_or_else(|| TaskError::MissingFeature {
                feature_type,
                name: name.to_string(),
            })
    }

    /// Like [`Patch::get_mut`] but reports a missing feature as an error.
    pub fn require_mut(&mut self, feature_type: FeatureType, name: &str) -> TaskResult<&mut DynamicImage> {
        self.get_mut(feature_type, name)
            .ok_or_else(|| TaskError::MissingFeature {
                feature_type,
                name: name.to_string(),
            })
    }

    pub fn contains(&self, feature_type: FeatureType, name: &str) -> bool {
        self.get(feature_type, name).is_some()
    }

    /// Names stored under `feature_type`, sorted.
    pub fn names(&self, feature_type: FeatureType) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .features
            .get(&feature_type)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Every `(type, name, image)` in the patch, sorted by type then name.
    pub fn iter(&self) -> Vec<(FeatureType, &str, &DynamicImage)> {
        let mut all: Vec<_> = self
            .features
            .iter()
            .flat_map(|(ft, by_name)| by_name.iter().map(move |(name, img)| (*ft, name.as_str(), img)))
            .collect();
        all.sort_by(|a, b| (a.0 as u8, a.1).cmp(&(b.0 as u8, b.1)));
        all
    }

    pub fn len(&self) -> usize {
        self.features.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_existing() {
        let mut patch = Patch::new();
        assert!(patch.insert(FeatureType::Data, "bands", DynamicImage::new_luma8(2, 2)).is_none());
        let old = patch.insert(FeatureType::Data, "bands", DynamicImage::new_rgb8(3, 3));
        assert_eq!(old.map(|img| img.width()), Some(2));
        assert_eq!(patch.get(FeatureType::Data, "bands").map(|img| img.width()), Some(3));
        assert_eq!(patch.len(), 1);
    }

    #[test]
    fn test_categories_are_separate() {
        let patch = Patch::new()
            .with_feature(FeatureType::Data, "bands", DynamicImage::new_luma8(1, 1))
            .with_feature(FeatureType::Mask, "bands", DynamicImage::new_luma8(1, 1));
        assert!(patch.contains(FeatureType::Data, "bands"));
        assert!(patch.contains(FeatureType::Mask, "bands"));
        assert!(!patch.contains(FeatureType::Scalar, "bands"));
        assert_eq!(patch.iter().len(), 2);
    }

    #[test]
    fn test_require_mut_reports_missing_feature() {
        let mut patch = Patch::new();
        let err = patch.require_mut(FeatureType::Mask, "clouds").unwrap_err();
        assert_eq!(err.to_string(), "feature mask:clouds is not present in the patch");
    }

    #[test]
    fn test_names_are_sorted() {
        let patch = Patch::new()
            .with_feature(FeatureType::Data, "b", DynamicImage::new_luma8(1, 1))
            .with_feature(FeatureType::Data, "a", DynamicImage::new_luma8(1, 1));
        assert_eq!(patch.names(FeatureType::Data), vec!["a", "b"]);
        assert!(patch.names(FeatureType::Label).is_empty());
    }
}
