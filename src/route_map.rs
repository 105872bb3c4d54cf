//! `route_map.json`: the fitted route encoder as a plain id to code object.

use serde::de::{Deserialize, Deserializer, Error as SerdeDeError, MapAccess, Visitor};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::artifacts::{ArtifactError, write_atomic};
use crate::encoding::{EncodeError, RouteEncoder};

pub const ROUTE_MAP_FILE_NAME: &str = "route_map.json";

#[derive(Debug, Error)]
pub enum RouteMapError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid route map {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid route map {path}: {source}")]
    Encoding { path: PathBuf, source: EncodeError },
    #[error("Failed to serialize route map: {0}")]
    Serialize(serde_json::Error),
    #[error(transparent)]
    Write(#[from] ArtifactError),
}

/// Pretty-printed (2-space indent) JSON with keys in sorted order.
pub fn render_route_map(encoder: &RouteEncoder) -> Result<String, serde_json::Error> {
    let mut text = serde_json::to_string_pretty(&encoder.to_route_map())?;
    text.push('\n');
    Ok(text)
}

/// Write the route map to `path`, returning the number of routes written.
pub fn export_route_map(encoder: &RouteEncoder, path: &Path) -> Result<usize, RouteMapError> {
    let text = render_route_map(encoder).map_err(RouteMapError::Serialize)?;
    write_atomic(path, text.as_bytes())?;
    tracing::info!(routes = encoder.len(), path = %path.display(), "Exported route map");
    Ok(encoder.len())
}

/// Route id to code entries; a repeated route id fails deserialization.
struct RouteEntries(BTreeMap<String, u32>);

impl<'de> Deserialize<'de> for RouteEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RouteEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping route ids to codes")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = BTreeMap::new();
                while let Some((route, code)) = access.next_entry::<String, u32>()? {
                    if entries.contains_key(&route) {
                        return Err(A::Error::custom(format!("duplicate route id `{route}`")));
                    }
                    entries.insert(route, code);
                }
                Ok(RouteEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Read a route map file back into an encoder, rejecting repeated route ids
/// and duplicate or non-dense codes.
pub fn import_route_map(path: &Path) -> Result<RouteEncoder, RouteMapError> {
    let text = std::fs::read_to_string(path).map_err(|source| RouteMapError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let RouteEntries(map) =
        serde_json::from_str(&text).map_err(|source| RouteMapError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    RouteEncoder::from_route_map(&map).map_err(|source| RouteMapError::Encoding {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_map_is_sorted_and_indented() {
        let encoder = RouteEncoder::fit(["sekisho", "hakodate", "chitose"]).unwrap();
        assert_eq!(
            render_route_map(&encoder).unwrap(),
            "{\n  \"chitose\": 0,\n  \"hakodate\": 1,\n  \"sekisho\": 2\n}\n"
        );
    }

    #[test]
    fn export_then_import_reproduces_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ROUTE_MAP_FILE_NAME);
        let encoder = RouteEncoder::fit(["muroran", "chitose", "hakodate", "sekisho"]).unwrap();
        assert_eq!(export_route_map(&encoder, &path).unwrap(), 4);
        let text = std::fs::read_to_string(&path).unwrap();
        for route in encoder.routes() {
            assert_eq!(text.matches(&format!("\"{route}\"")).count(), 1);
        }
        assert_eq!(import_route_map(&path).unwrap(), encoder);
    }

    #[test]
    fn import_rejects_repeated_route_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ROUTE_MAP_FILE_NAME);
        std::fs::write(&path, "{\n  \"hakodate\": 0,\n  \"sekisho\": 1,\n  \"hakodate\": 1\n}\n").unwrap();
        let err = import_route_map(&path).unwrap_err();
        assert!(matches!(err, RouteMapError::Json { .. }));
        assert!(err.to_string().contains("duplicate route id `hakodate`"));

        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(import_route_map(&path), Err(RouteMapError::Json { .. })));
    }

    #[test]
    fn import_rejects_duplicate_and_sparse_codes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ROUTE_MAP_FILE_NAME);
        std::fs::write(&path, r#"{"a": 0, "b": 0}"#).unwrap();
        assert!(matches!(
            import_route_map(&path),
            Err(RouteMapError::Encoding {
                source: EncodeError::DuplicateCode { .. },
                ..
            })
        ));
        std::fs::write(&path, r#"{"a": 0, "b": 5}"#).unwrap();
        assert!(matches!(
            import_route_map(&path),
            Err(RouteMapError::Encoding {
                source: EncodeError::NonDenseCodes { .. },
                ..
            })
        ));
    }
}
