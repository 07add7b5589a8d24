use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tb_types::{DataError, TbResult};

use crate::dataset::Dataset;

/// Loads a [`Dataset`] from a CSV file with a header row.
///
/// The target column holds 0/1 labels (`true`/`false` also accepted); every
/// other column is parsed as a numeric feature.
#[derive(Debug, Clone)]
pub struct CsvDatasetLoader {
    target_column: String,
    delimiter: u8,
    skip_invalid: bool,
}

impl CsvDatasetLoader {
    pub fn new(target_column: impl Into<String>) -> Self {
        Self {
            target_column: target_column.into(),
            delimiter: b',',
            skip_invalid: false,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Drop unparseable records with a warning instead of failing the load.
    pub fn skip_invalid(mut self, skip: bool) -> Self {
        self.skip_invalid = skip;
        self
    }

    pub fn load<P: AsRef<Path>>(&self, file_path: P) -> TbResult<Dataset> {
        let path = file_path.as_ref();
        tracing::info!("Loading CSV dataset from: {}", path.display());

        let file = std::fs::File::open(path).map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to open CSV file {}: {}", path.display(), e),
        })?;
        self.load_from_reader(file)
    }

    pub fn load_from_reader<R: Read>(&self, reader: R) -> TbResult<Dataset> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV headers: {}", e),
            })?
            .clone();

        let target_idx = headers
            .iter()
            .position(|h| h.trim() == self.target_column)
            .ok_or_else(|| DataError::ColumnNotFound {
                column: self.target_column.clone(),
            })?;

        let feature_names: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != target_idx)
            .map(|(_, h)| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        let mut labels = Vec::new();

        for (line_num, result) in rdr.records().enumerate() {
            // header is line 1
            let line = line_num + 2;
            let parsed = result
                .map_err(|e| DataError::ParseError {
                    line,
                    message: e.to_string(),
                })
                .and_then(|record| parse_record(&record, target_idx, line));

            match parsed {
                Ok((row, label)) => {
                    rows.push(row);
                    labels.push(label);
                }
                Err(e) if self.skip_invalid => {
                    tracing::warn!("Skipping invalid record at line {}: {}", line, e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if rows.is_empty() {
            return Err(DataError::InsufficientData {
                message: "CSV file contains no usable records".to_string(),
            }
            .into());
        }

        tracing::info!(
            "Loaded {} rows with {} features from CSV",
            rows.len(),
            feature_names.len()
        );
        Dataset::new(feature_names, rows, labels)
    }
}

fn parse_record(record: &StringRecord, target_idx: usize, line: usize) -> Result<(Vec<f64>, u8), DataError> {
    let mut row = Vec::with_capacity(record.len().saturating_sub(1));
    let mut label = None;

    for (i, field) in record.iter().enumerate() {
        let field = field.trim();
        if i == target_idx {
            label = Some(parse_label(field).ok_or_else(|| DataError::ParseError {
                line,
                message: format!("invalid label '{field}'"),
            })?);
        } else {
            let value = field.parse::<f64>().map_err(|e| DataError::ParseError {
                line,
                message: format!("column {i}: '{field}': {e}"),
            })?;
            row.push(value);
        }
    }

    let label = label.ok_or_else(|| DataError::ParseError {
        line,
        message: "record is missing the target column".to_string(),
    })?;
    Ok((row, label))
}

fn parse_label(field: &str) -> Option<u8> {
    match field {
        "0" | "0.0" | "false" | "False" => Some(0),
        "1" | "1.0" | "true" | "True" => Some(1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "mean_radius,mean_texture,target\n\
                       14.2,19.1,0\n\
                       11.0,15.4,1\n\
                       20.5,25.0,0\n";

    #[test]
    fn loads_features_and_labels() {
        let data = CsvDatasetLoader::new("target")
            .load_from_reader(CSV.as_bytes())
            .unwrap();
        assert_eq!(data.feature_names, vec!["mean_radius", "mean_texture"]);
        assert_eq!(data.len(), 3);
        assert_eq!(data.row(1), &[11.0, 15.4]);
        assert_eq!(data.labels(), &[0, 1, 0]);
    }

    #[test]
    fn target_column_may_be_anywhere() {
        let csv = "label,a,b\ntrue,1,2\nfalse,3,4\n";
        let data = CsvDatasetLoader::new("label")
            .load_from_reader(csv.as_bytes())
            .unwrap();
        assert_eq!(data.feature_names, vec!["a", "b"]);
        assert_eq!(data.labels(), &[1, 0]);
    }

    #[test]
    fn missing_target_column_is_reported() {
        let err = CsvDatasetLoader::new("y")
            .load_from_reader(CSV.as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("Column not found: y"));
    }

    #[test]
    fn bad_record_fails_with_line_number() {
        let csv = "a,target\n1.0,0\nnot-a-number,1\n";
        let err = CsvDatasetLoader::new("target")
            .load_from_reader(csv.as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("line 3"), "{err}");
    }

    #[test]
    fn bad_records_can_be_skipped() {
        let csv = "a,target\n1.0,0\nnot-a-number,1\n2.0,1\n";
        let data = CsvDatasetLoader::new("target")
            .skip_invalid(true)
            .load_from_reader(csv.as_bytes())
            .unwrap();
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn loads_from_file_with_custom_delimiter() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "a;b;target\n1;2;1\n3;4;0\n").unwrap();
        let data = CsvDatasetLoader::new("target")
            .with_delimiter(b';')
            .load(file.path())
            .unwrap();
        assert_eq!(data.class_counts(), [1, 1]);
    }
}
