//! Categorical encoders: route identifiers and operational status labels.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a value falls outside a fitted or fixed encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("unknown route '{0}' (not present when the route encoder was fitted)")]
    UnknownRoute(String),
    #[error("unknown route code {0}")]
    UnknownCode(u32),
    #[error("unknown status label '{0}' (expected normal, delayed or suspended)")]
    UnknownStatus(String),
    #[error("invalid is_stopped flag '{0}' (expected 0 or 1)")]
    InvalidStopFlag(String),
    #[error("route map is empty")]
    EmptyRouteMap,
    #[error("route map codes must be dense 0..{expected}; found {found}")]
    NonDenseCodes { expected: usize, found: u32 },
    #[error("route map assigns code {code} to both '{first}' and '{second}'")]
    DuplicateCode {
        code: u32,
        first: String,
        second: String,
    },
    #[error("route map codes are not in sorted route order")]
    UnsortedCodes,
}

/// Operational state of a rail route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLabel {
    Normal,
    Delayed,
    Suspended,
}

impl StatusLabel {
    /// Ordinal code used as the class index.
    pub fn code(self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Delayed => 1,
            Self::Suspended => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Delayed => "delayed",
            Self::Suspended => "suspended",
        }
    }
}

impl FromStr for StatusLabel {
    type Err = EncodeError;

    /// Exact, case-sensitive match against the fixed dictionary.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "normal" => Ok(Self::Normal),
            "delayed" => Ok(Self::Delayed),
            "suspended" => Ok(Self::Suspended),
            other => Err(EncodeError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bijective mapping from route identifiers to dense integer codes.
///
/// Codes follow the sorted order of the distinct routes seen at fit time, so
/// refitting on the same set of routes always yields the same codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEncoder {
    routes: Vec<String>,
}

impl RouteEncoder {
    /// Fit the encoder on every route identifier in `routes`.
    pub fn fit<I, S>(routes: I) -> Result<Self, EncodeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut distinct: Vec<String> = routes
            .into_iter()
            .map(|route| route.as_ref().to_string())
            .collect();
        distinct.sort();
        distinct.dedup();
        if distinct.is_empty() {
            return Err(EncodeError::EmptyRouteMap);
        }
        Ok(Self { routes: distinct })
    }

    pub fn encode(&self, route: &str) -> Result<u32, EncodeError> {
        self.routes
            .binary_search_by(|entry| entry.as_str().cmp(route))
            .map(|idx| idx as u32)
            .map_err(|_| EncodeError::UnknownRoute(route.to_string()))
    }

    pub fn decode(&self, code: u32) -> Result<&str, EncodeError> {
        self.routes
            .get(code as usize)
            .map(String::as_str)
            .ok_or(EncodeError::UnknownCode(code))
    }

    /// Check the invariants `fit` establishes, for encoders read back from disk.
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.routes.is_empty() {
            return Err(EncodeError::EmptyRouteMap);
        }
        if self.routes.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(EncodeError::UnsortedCodes);
        }
        Ok(())
    }

    /// Fitted routes in code order.
    pub fn routes(&self) -> &[String] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route id to code mapping, keyed in sorted order.
    pub fn to_route_map(&self) -> BTreeMap<String, u32> {
        self.routes
            .iter()
            .enumerate()
            .map(|(code, route)| (route.clone(), code as u32))
            .collect()
    }

    /// Rebuild an encoder from an exported route map.
    ///
    /// The map must be a bijection onto `0..n` that agrees with sorted route
    /// order, which is exactly what [`RouteEncoder::to_route_map`] produces.
    pub fn from_route_map(map: &BTreeMap<String, u32>) -> Result<Self, EncodeError> {
        if map.is_empty() {
            return Err(EncodeError::EmptyRouteMap);
        }
        let n = map.len();
        let mut slots: Vec<Option<String>> = vec![None; n];
        for (route, &code) in map {
            let slot = slots
                .get_mut(code as usize)
                .ok_or(EncodeError::NonDenseCodes { expected: n, found: code })?;
            if let Some(first) = slot.take() {
                return Err(EncodeError::DuplicateCode {
                    code,
                    first,
                    second: route.clone(),
                });
            }
            *slot = Some(route.clone());
        }
        let routes: Vec<String> = slots.into_iter().flatten().collect();
        if routes.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(EncodeError::UnsortedCodes);
        }
        Ok(Self { routes })
    }
}
