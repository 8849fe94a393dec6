use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{ConfigurationError, parse_variant};

/// Category of a feature stored in a [`Patch`](crate::patch::Patch).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    /// Raster bands.
    #[default]
    Data,
    Mask,
    Scalar,
    Label,
    DataTimeless,
    MaskTimeless,
}

/// A feature as written by a user, before defaults are filled in.
///
/// Deserializes from `"bands"`, `["data", "bands"]` or
/// `["data", "bands", "bands_out"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureSpec {
    Name(String),
    Typed(FeatureType, String),
    Renamed(FeatureType, String, String),
}

impl FeatureSpec {
    /// Normalize into a full triple. Missing types become `default_type`;
    /// missing output names come from `rename`.
    pub fn normalize<F>(&self, default_type: FeatureType, rename: F) -> FeatureRef
    where
        F: Fn(&str) -> String,
    {
        match self {
            FeatureSpec::Name(name) => FeatureRef::new(default_type, name, rename(name)),
            FeatureSpec::Typed(feature_type, name) => FeatureRef::new(*feature_type, name, rename(name)),
            FeatureSpec::Renamed(feature_type, name, new_name) => {
                FeatureRef::new(*feature_type, name, new_name)
            }
        }
    }
}

impl FromStr for FeatureSpec {
    type Err = ConfigurationError;

    /// Parses `name`, `type:name` or `type:name:new_name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let invalid = || ConfigurationError::InvalidFeature(s.to_string());

        if parts.iter().any(|part| part.is_empty()) {
            return Err(invalid());
        }

        match parts.as_slice() {
            [name] => Ok(FeatureSpec::Name(name.to_string())),
            [feature_type, name] => Ok(FeatureSpec::Typed(
                parse_variant("feature type", feature_type)?,
                name.to_string(),
            )),
            [feature_type, name, new_name] => Ok(FeatureSpec::Renamed(
                parse_variant("feature type", feature_type)?,
                name.to_string(),
                new_name.to_string(),
            )),
            _ => Err(invalid()),
        }
    }
}

impl From<(FeatureType, &str)> for FeatureSpec {
    fn from((feature_type, name): (FeatureType, &str)) -> Self {
        FeatureSpec::Typed(feature_type, name.to_string())
    }
}

impl From<(FeatureType, &str, &str)> for FeatureSpec {
    fn from((feature_type, name, new_name): (FeatureType, &str, &str)) -> Self {
        FeatureSpec::Renamed(feature_type, name.to_string(), new_name.to_string())
    }
}

/// Normalized `(category, input name, output name)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureRef {
    pub feature_type: FeatureType,
    pub name: String,
    pub new_name: String,
}

impl FeatureRef {
    pub fn new(feature_type: FeatureType, name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            feature_type,
            name: name.into(),
            new_name: new_name.into(),
        }
    }
}

impl fmt::Display for FeatureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}", self.feature_type, self.name, self.new_name)
    }
}

/// Output name used by thresholding when none is given.
pub fn thresh_name(name: &str) -> String {
    format!("{}_THRESH", name)
}

/// Normalize a list of user feature specs.
pub fn parse_features<F>(specs: &[FeatureSpec], default_type: FeatureType, rename: F) -> Vec<FeatureRef>
where
    F: Fn(&str) -> String,
{
    specs
        .iter()
        .map(|spec| spec.normalize(default_type, &rename))
        .collect()
}
