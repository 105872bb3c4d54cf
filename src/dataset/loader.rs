//! Reader for delimited observation files.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

use super::schema::{FeatureSchema, ROUTE_COLUMN};
use crate::encoding::EncodeError;

#[derive(Debug, Error)]
pub enum DatasetLoadError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset is missing required columns for the {schema} schema: {}", columns.join(", "))]
    MissingColumns {
        schema: FeatureSchema,
        columns: Vec<String>,
    },
    #[error("line {line}: column {column} has non-numeric value '{value}'")]
    InvalidNumber {
        line: u64,
        column: &'static str,
        value: String,
    },
    #[error("line {line}: month {value} is outside 1-12")]
    MonthOutOfRange { line: u64, value: f32 },
    #[error("line {line}: recovery_time {value} is negative")]
    NegativeRecovery { line: u64, value: f32 },
    #[error("line {line}: empty route_id")]
    EmptyRoute { line: u64 },
    #[error("line {line}: {source}")]
    Target { line: u64, source: EncodeError },
    #[error("dataset has no rows")]
    Empty,
}

/// One parsed row of the input file.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// 1-based line in the source file.
    pub line: u64,
    pub route_id: String,
    /// Values of [`FeatureSchema::numeric_columns`], in order.
    pub values: Vec<f32>,
    /// Class index from [`FeatureSchema::parse_target`].
    pub class_index: usize,
    /// Hours until recovery; present only for schemas with a recovery column.
    pub recovery_hours: Option<f32>,
}

/// Every observation of a file, validated against one schema.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub schema: FeatureSchema,
    pub observations: Vec<Observation>,
}

impl LoadedDataset {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn route_ids(&self) -> impl Iterator<Item = &str> {
        self.observations.iter().map(|obs| obs.route_id.as_str())
    }

    /// Row count per class index, including classes with no rows.
    pub fn class_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts: BTreeMap<usize, usize> = (0..self.schema.classes().len())
            .map(|idx| (idx, 0))
            .collect();
        for obs in &self.observations {
            *counts.entry(obs.class_index).or_default() += 1;
        }
        counts
    }
}

/// Load and validate a dataset file.
pub fn load_dataset(
    path: &Path,
    schema: FeatureSchema,
    delimiter: u8,
) -> Result<LoadedDataset, DatasetLoadError> {
    let file = File::open(path).map_err(|source| DatasetLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    read_dataset(file, schema, delimiter)
}

/// Parse a dataset from any reader; the first record must be the header.
///
/// Column presence is checked before any row is parsed, and every row is
/// validated before the function returns, so callers never fit on a partial
/// dataset.
pub fn read_dataset<R: Read>(
    reader: R,
    schema: FeatureSchema,
    delimiter: u8,
) -> Result<LoadedDataset, DatasetLoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let layout = ColumnLayout::resolve(&headers, schema)?;

    let mut observations = Vec::new();
    for (idx, record) in csv_reader.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|pos| pos.line())
            .unwrap_or(idx as u64 + 2);
        observations.push(layout.parse(&record, line)?);
    }
    if observations.is_empty() {
        return Err(DatasetLoadError::Empty);
    }
    tracing::debug!(rows = observations.len(), schema = %schema, "Parsed dataset");
    Ok(LoadedDataset {
        schema,
        observations,
    })
}

struct ColumnLayout {
    schema: FeatureSchema,
    route: usize,
    numeric: Vec<(&'static str, usize)>,
    target: usize,
    recovery: Option<usize>,
}

impl ColumnLayout {
    fn resolve(headers: &csv::StringRecord, schema: FeatureSchema) -> Result<Self, DatasetLoadError> {
        let index: BTreeMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name, idx))
            .collect();
        let missing: Vec<String> = schema
            .required_columns()
            .into_iter()
            .filter(|column| !index.contains_key(column))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(DatasetLoadError::MissingColumns {
                schema,
                columns: missing,
            });
        }
        let column = |name: &str| index[name];
        Ok(Self {
            schema,
            route: column(ROUTE_COLUMN),
            numeric: schema
                .numeric_columns()
                .iter()
                .map(|&name| (name, column(name)))
                .collect(),
            target: column(schema.target_column()),
            recovery: schema.recovery_column().map(column),
        })
    }

    fn parse(&self, record: &csv::StringRecord, line: u64) -> Result<Observation, DatasetLoadError> {
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let route_id = cell(self.route).to_string();
        if route_id.is_empty() {
            return Err(DatasetLoadError::EmptyRoute { line });
        }

        let mut values = Vec::with_capacity(self.numeric.len());
        for &(name, idx) in &self.numeric {
            let value = parse_number(cell(idx), name, line)?;
            if name == "month" && !(1.0..=12.0).contains(&value) {
                return Err(DatasetLoadError::MonthOutOfRange { line, value });
            }
            values.push(value);
        }

        let class_index = self
            .schema
            .parse_target(cell(self.target))
            .map_err(|source| DatasetLoadError::Target { line, source })?;

        let recovery_hours = match self.recovery {
            Some(idx) => {
                let value = parse_number(cell(idx), "recovery_time", line)?;
                if value < 0.0 {
                    return Err(DatasetLoadError::NegativeRecovery { line, value });
                }
                Some(value)
            }
            None => None,
        };

        Ok(Observation {
            line,
            route_id,
            values,
            class_index,
            recovery_hours,
        })
    }
}

fn parse_number(raw: &str, column: &'static str, line: u64) -> Result<f32, DatasetLoadError> {
    raw.parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| DatasetLoadError::InvalidNumber {
            line,
            column,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const BASIC_HEADER: &str =
        "route_id,month,wind_speed,wind_gust,snowfall,snow_depth,temperature,precipitation,is_stopped";
    const ADVANCED_HEADER: &str = "route_id,month,wind_speed,wind_dir,wind_gust,snowfall,snow_depth,temperature,pressure,wind_change,pressure_change,status,recovery_time";

    #[test]
    fn loads_basic_rows_in_feature_order() {
        let text = format!(
            "{BASIC_HEADER},station_note\n\
             hakodate,1,12.5,20.1,3,40,-5.5,2.0,1,gusty\n\
             soya,7,3,5,0,0,18,0,0,\n"
        );
        let dataset = read_dataset(text.as_bytes(), FeatureSchema::Basic, b',').unwrap();
        assert_eq!(dataset.len(), 2);
        let first = &dataset.observations[0];
        assert_eq!(first.route_id, "hakodate");
        assert_eq!(first.values, vec![1.0, 12.5, 20.1, 3.0, 40.0, -5.5, 2.0]);
        assert_eq!(first.class_index, 1);
        assert_eq!(first.recovery_hours, None);
        assert_eq!(first.line, 2);
        assert_eq!(dataset.class_counts(), BTreeMap::from([(0, 1), (1, 1)]));
    }

    #[test]
    fn loads_advanced_rows_with_recovery() {
        let text = format!(
            "{ADVANCED_HEADER}\n\
             chitose,2,18,270,25,5,30,-3,1002,4,-3.5,suspended,6.5\n"
        );
        let dataset = read_dataset(text.as_bytes(), FeatureSchema::Advanced, b',').unwrap();
        let obs = &dataset.observations[0];
        assert_eq!(obs.values.len(), 10);
        assert_eq!(obs.class_index, 2);
        assert_eq!(obs.recovery_hours, Some(6.5));
    }

    #[test]
    fn missing_columns_fail_before_rows_are_read() {
        let text = "route_id,month,wind_speed\nhakodate,not-a-number,1\n";
        let err = read_dataset(text.as_bytes(), FeatureSchema::Basic, b',').unwrap_err();
        match err {
            DatasetLoadError::MissingColumns { columns, .. } => {
                assert!(columns.contains(&"wind_gust".to_string()));
                assert!(columns.contains(&"is_stopped".to_string()));
                assert!(!columns.contains(&"month".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_status_is_a_data_error() {
        let text = format!(
            "{ADVANCED_HEADER}\n\
             chitose,2,18,270,25,5,30,-3,1002,4,-3.5,normal,0\n\
             chitose,2,18,270,25,5,30,-3,1002,4,-3.5,partial,1\n"
        );
        let err = read_dataset(text.as_bytes(), FeatureSchema::Advanced, b',').unwrap_err();
        assert!(matches!(
            err,
            DatasetLoadError::Target {
                line: 3,
                source: EncodeError::UnknownStatus(_)
            }
        ));
    }

    #[test]
    fn malformed_numbers_and_ranges_are_rejected() {
        let bad_number = format!("{BASIC_HEADER}\nsoya,1,fast,5,0,0,18,0,0\n");
        assert!(matches!(
            read_dataset(bad_number.as_bytes(), FeatureSchema::Basic, b','),
            Err(DatasetLoadError::InvalidNumber { column: "wind_speed", .. })
        ));

        let bad_month = format!("{BASIC_HEADER}\nsoya,13,1,5,0,0,18,0,0\n");
        assert!(matches!(
            read_dataset(bad_month.as_bytes(), FeatureSchema::Basic, b','),
            Err(DatasetLoadError::MonthOutOfRange { .. })
        ));

        let nan = format!("{BASIC_HEADER}\nsoya,1,NaN,5,0,0,18,0,0\n");
        assert!(matches!(
            read_dataset(nan.as_bytes(), FeatureSchema::Basic, b','),
            Err(DatasetLoadError::InvalidNumber { .. })
        ));

        let negative = format!(
            "{ADVANCED_HEADER}\nchitose,2,18,270,25,5,30,-3,1002,4,-3.5,delayed,-1\n"
        );
        assert!(matches!(
            read_dataset(negative.as_bytes(), FeatureSchema::Advanced, b','),
            Err(DatasetLoadError::NegativeRecovery { .. })
        ));
    }

    #[test]
    fn header_only_file_is_empty() {
        let err = read_dataset(BASIC_HEADER.as_bytes(), FeatureSchema::Basic, b',').unwrap_err();
        assert!(matches!(err, DatasetLoadError::Empty));
    }

    #[test]
    fn honours_custom_delimiter_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("training_data.tsv");
        let text = format!(
            "{}\nsoya\t1\t3\t5\t0\t0\t18\t0\t0\n",
            BASIC_HEADER.replace(',', "\t")
        );
        std::fs::write(&path, text).unwrap();
        let dataset = load_dataset(&path, FeatureSchema::Basic, b'\t').unwrap();
        assert_eq!(dataset.observations[0].route_id, "soya");

        let missing = load_dataset(&dir.path().join("nope.csv"), FeatureSchema::Basic, b',');
        assert!(matches!(missing, Err(DatasetLoadError::Io { .. })));
    }
}
