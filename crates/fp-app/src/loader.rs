//! CSV loading

use std::path::Path;

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use fp_data::{MissingValues, Record, Value};
use tracing::{debug, info};

/// Read every row of a headed CSV file into records. Cells are parsed into
/// the most specific value type; missing-value tokens become nulls.
pub fn load_csv(path: &Path, missing: &MissingValues) -> Result<Vec<Record>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read the header of {}", path.display()))?
        .clone();
    debug!("CSV columns: {:?}", headers);

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("bad row {} in {}", line + 2, path.display()))?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(field, raw)| (field, Value::parse(raw, missing)))
            .collect();
        records.push(record);
    }

    info!("Loaded {} rows from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cells_are_typed_and_missing_tokens_dropped() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "age,city,joined").unwrap();
        writeln!(file, "20,A,2024-01-15").unwrap();
        writeln!(file, "N/A,B,").unwrap();
        file.flush().unwrap();

        let records = load_csv(file.path(), &MissingValues::default()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("age"), &Value::Number(20.0));
        assert_eq!(records[0].get("city"), &Value::Text("A".into()));
        assert!(records[0].get("joined").as_date().is_some());
        assert!(records[1].get("age").is_missing());
        assert!(records[1].get("joined").is_missing());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_csv(&dir.path().join("absent.csv"), &MissingValues::default()).unwrap_err();
        assert!(err.to_string().contains("failed to open"));
    }
}
