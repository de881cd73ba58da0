//! Batch feature export for training data.
//!
//! Scans a directory of trial recordings named `data_<label>_<timestamp>.csv`,
//! summarises each whole file as one feature vector, and writes a table of
//! labelled rows for the offline training step.

use crate::core::features::{extract_series, FeatureVector, FEATURE_NAMES};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Column holding the sensor values.
pub const VALUE_COLUMN: &str = "value";

/// Optional column holding sample times.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to scan directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: {column} is not a number: {text:?}")]
    BadCell {
        row: usize,
        column: &'static str,
        text: String,
    },
}

/// One labelled feature row.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub label: String,
    pub source: PathBuf,
    pub features: FeatureVector,
}

/// A recording that did not produce a row.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of scanning a directory.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub rows: Vec<FeatureRow>,
    pub skipped: Vec<SkippedFile>,
}

/// Label encoded in a recording's file name: the second `_`-separated token.
pub fn label_from_file_name(name: &str) -> Option<&str> {
    let parts: Vec<&str> = name.split('_').collect();
    if parts.len() < 3 || parts[1].is_empty() {
        return None;
    }
    Some(parts[1])
}

/// Extract one feature row per recording in `data_dir`.
pub fn scan_recordings(data_dir: &Path) -> Result<BatchSummary, BatchError> {
    let mut summary = BatchSummary::default();

    let entries = WalkDir::new(data_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != "csv") {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        let Some(label) = label_from_file_name(&file_name) else {
            summary.skipped.push(skip(path, "file name has no label"));
            continue;
        };

        match read_recording(path) {
            Ok(Some(features)) => summary.rows.push(FeatureRow {
                label: label.to_string(),
                source: path.to_path_buf(),
                features,
            }),
            Ok(None) => summary
                .skipped
                .push(skip(path, "no 'value' column or no rows")),
            Err(e) => summary.skipped.push(skip(path, &e.to_string())),
        }
    }

    for skipped in &summary.skipped {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped recording");
    }

    Ok(summary)
}

fn skip(path: &Path, reason: &str) -> SkippedFile {
    SkippedFile {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Compute the features of one recording.
///
/// Returns `None` if the file has no value column or no rows. With a
/// timestamp column, the AUC is integrated over time; otherwise over the
/// sample index.
pub fn read_recording(path: &Path) -> Result<Option<FeatureVector>, BatchError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let Some(value_index) = headers.iter().position(|h| h.trim() == VALUE_COLUMN) else {
        return Ok(None);
    };
    let timestamp_index = headers.iter().position(|h| h.trim() == TIMESTAMP_COLUMN);

    let mut values = Vec::new();
    let mut timestamps = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        values.push(parse_cell(&record, value_index, row, VALUE_COLUMN)?);
        if let Some(index) = timestamp_index {
            timestamps.push(parse_cell(&record, index, row, TIMESTAMP_COLUMN)?);
        }
    }

    if values.is_empty() {
        return Ok(None);
    }

    let timestamps = timestamp_index.map(|_| timestamps.as_slice());
    Ok(Some(extract_series(&values, timestamps)))
}

fn parse_cell(
    record: &csv::StringRecord,
    index: usize,
    row: usize,
    column: &'static str,
) -> Result<f64, BatchError> {
    let text = record.get(index).unwrap_or("").trim();
    text.parse::<f64>().map_err(|_| BatchError::BadCell {
        row: row + 1,
        column,
        text: text.to_string(),
    })
}

/// Write feature rows as `label,auc,mean,...,std_deriv`.
pub fn write_features(rows: &[FeatureRow], output: &Path) -> Result<(), BatchError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(output)?;

    let mut header = vec!["label"];
    header.extend(FEATURE_NAMES);
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.label.clone()];
        record.extend(row.features.to_array().iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Scan `data_dir` and write the feature table to `output`.
pub fn export_features(data_dir: &Path, output: &Path) -> Result<BatchSummary, BatchError> {
    let summary = scan_recordings(data_dir)?;
    write_features(&summary.rows, output)?;

    info!(
        rows = summary.rows.len(),
        skipped = summary.skipped.len(),
        output = %output.display(),
        "features exported"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_label_from_file_name() {
        assert_eq!(label_from_file_name("data_clench_1712.csv"), Some("clench"));
        assert_eq!(label_from_file_name("data_rest_1_2.csv"), Some("rest"));
        assert_eq!(label_from_file_name("data_clench.csv"), None);
        assert_eq!(label_from_file_name("data__1712.csv"), None);
    }

    #[test]
    fn test_recording_without_timestamps_uses_index_spacing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "data_index_1.csv", "value\n1\n2\n3\n4\n");

        let features = read_recording(&dir.path().join("data_index_1.csv"))
            .unwrap()
            .unwrap();
        assert!((features.auc - 7.5).abs() < 1e-9);
        assert!((features.mean - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_recording_with_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "data_clench_1.csv",
            "timestamp,value\n0.0,2\n0.5,2\n1.0,2\n",
        );

        let features = read_recording(&dir.path().join("data_clench_1.csv"))
            .unwrap()
            .unwrap();
        assert!((features.auc - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_export_features() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "data_clench_1.csv", "value\n10\n20\n");
        write(dir.path(), "data_rest_2.csv", "value\n1\n1\n1\n");
        write(dir.path(), "data_broken.csv", "value\n1\n");
        write(dir.path(), "data_wrist_3.csv", "reading\n5\n");
        write(dir.path(), "data_index_4.csv", "value\nabc\n");
        write(dir.path(), "notes.txt", "not a recording");

        let output = dir.path().join("out").join("features.csv");
        let summary = export_features(dir.path(), &output).unwrap();

        let labels: Vec<&str> = summary.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["clench", "rest"]);
        assert_eq!(summary.skipped.len(), 3);

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(
            headers,
            vec!["label", "auc", "mean", "std", "rms", "max", "min", "mean_deriv", "std_deriv"]
        );

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][0], "clench");
        assert_eq!(records[0][2].parse::<f64>().unwrap(), 15.0);
    }

    #[test]
    fn test_missing_directory() {
        let result = scan_recordings(Path::new("/nonexistent/emg-data"));
        assert!(matches!(result, Err(BatchError::Walk(_))));
    }
}
