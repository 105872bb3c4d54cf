//! Feature schemas for the basic and advanced training variants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::encoding::{EncodeError, StatusLabel};

/// Column holding the route identifier in every schema.
pub const ROUTE_COLUMN: &str = "route_id";
/// Feature name of the derived route code; always the first feature.
pub const ROUTE_CODE_FEATURE: &str = "route_code";

const BASIC_FEATURES: &[&str] = &[
    ROUTE_CODE_FEATURE,
    "month",
    "wind_speed",
    "wind_gust",
    "snowfall",
    "snow_depth",
    "temperature",
    "precipitation",
];

const ADVANCED_FEATURES: &[&str] = &[
    ROUTE_CODE_FEATURE,
    "month",
    "wind_speed",
    "wind_dir",
    "wind_gust",
    "snowfall",
    "snow_depth",
    "temperature",
    "pressure",
    "wind_change",
    "pressure_change",
];

const BASIC_CLASSES: &[&str] = &["running", "stopped"];
const ADVANCED_CLASSES: &[&str] = &["normal", "delayed", "suspended"];

/// Which dataset layout and target encoding a training run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureSchema {
    /// Binary `is_stopped` target, precipitation-based weather features.
    Basic,
    /// Three-way `status` target plus `recovery_time`, pressure and trend features.
    Advanced,
}

impl FeatureSchema {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        }
    }

    /// Ordered feature names; the model input layout.
    pub fn feature_names(self) -> &'static [&'static str] {
        match self {
            Self::Basic => BASIC_FEATURES,
            Self::Advanced => ADVANCED_FEATURES,
        }
    }

    pub fn feature_len(self) -> usize {
        self.feature_names().len()
    }

    /// Numeric input columns passed through unchanged, in feature order.
    pub fn numeric_columns(self) -> &'static [&'static str] {
        &self.feature_names()[1..]
    }

    pub fn target_column(self) -> &'static str {
        match self {
            Self::Basic => "is_stopped",
            Self::Advanced => "status",
        }
    }

    /// Column holding recovery hours, when the schema has one.
    pub fn recovery_column(self) -> Option<&'static str> {
        match self {
            Self::Basic => None,
            Self::Advanced => Some("recovery_time"),
        }
    }

    /// Class names indexed by class code. Index 0 is the undisrupted class.
    pub fn classes(self) -> &'static [&'static str] {
        match self {
            Self::Basic => BASIC_CLASSES,
            Self::Advanced => ADVANCED_CLASSES,
        }
    }

    /// Class index whose rows are used for the restricted recovery metrics.
    pub fn suspended_class(self) -> Option<usize> {
        match self {
            Self::Basic => None,
            Self::Advanced => Some(StatusLabel::Suspended.code()),
        }
    }

    /// Every column the input file must carry for this schema.
    pub fn required_columns(self) -> Vec<&'static str> {
        let mut columns = vec![ROUTE_COLUMN];
        columns.extend_from_slice(self.numeric_columns());
        columns.push(self.target_column());
        columns.extend(self.recovery_column());
        columns
    }

    /// Encode a raw target cell into a class index.
    pub fn parse_target(self, raw: &str) -> Result<usize, EncodeError> {
        match self {
            Self::Basic => match raw.trim() {
                "0" => Ok(0),
                "1" => Ok(1),
                _ => Err(EncodeError::InvalidStopFlag(raw.to_string())),
            },
            Self::Advanced => raw.trim().parse::<StatusLabel>().map(StatusLabel::code),
        }
    }

    /// Owned copy of the feature names, as stored on fitted models.
    pub fn feature_name_vec(self) -> Vec<String> {
        self.feature_names().iter().map(|name| name.to_string()).collect()
    }

    pub fn class_name_vec(self) -> Vec<String> {
        self.classes().iter().map(|name| name.to_string()).collect()
    }
}

impl FromStr for FeatureSchema {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!("Unknown schema '{other}' (expected basic or advanced)")),
        }
    }
}

impl fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advanced_schema_has_eleven_features_starting_with_route_code() {
        let names = FeatureSchema::Advanced.feature_names();
        assert_eq!(names.len(), 11);
        assert_eq!(names[0], ROUTE_CODE_FEATURE);
        assert_eq!(names[3], "wind_dir");
        assert_eq!(names[10], "pressure_change");
    }

    #[test]
    fn required_columns_cover_inputs_and_targets() {
        assert_eq!(
            FeatureSchema::Basic.required_columns(),
            vec![
                "route_id",
                "month",
                "wind_speed",
                "wind_gust",
                "snowfall",
                "snow_depth",
                "temperature",
                "precipitation",
                "is_stopped",
            ]
        );
        let advanced = FeatureSchema::Advanced.required_columns();
        assert_eq!(advanced.first(), Some(&"route_id"));
        assert_eq!(&advanced[advanced.len() - 2..], &["status", "recovery_time"]);
        assert!(!advanced.contains(&ROUTE_CODE_FEATURE));
    }

    #[test]
    fn targets_are_parsed_strictly() {
        assert_eq!(FeatureSchema::Basic.parse_target("1").unwrap(), 1);
        assert!(matches!(
            FeatureSchema::Basic.parse_target("2"),
            Err(EncodeError::InvalidStopFlag(_))
        ));
        assert_eq!(FeatureSchema::Advanced.parse_target("suspended").unwrap(), 2);
        assert!(matches!(
            FeatureSchema::Advanced.parse_target("late"),
            Err(EncodeError::UnknownStatus(_))
        ));
    }

    #[test]
    fn schema_names_parse() {
        assert_eq!("basic".parse::<FeatureSchema>().unwrap(), FeatureSchema::Basic);
        assert!("extended".parse::<FeatureSchema>().is_err());
    }
}
