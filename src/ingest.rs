//! Table ingestion and cell pre-cleaning
//!
//! Loads a CSV file into a [`Table`], injecting the synthetic `index`
//! column (string form of the zero-based ordinal; empty cells stay empty
//! strings), and applies the configured per-header regex pre-cleaning
//! before any tokenization happens.

use crate::error::{LinkError, Result};
use crate::types::{Row, Table, INDEX_COLUMN};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

/// Load a CSV file into a table with the `index` column injected
pub fn load_csv(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| LinkError::Input(format!("cannot open {}: {e}", path.display())))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| LinkError::Input(format!("cannot read headers of {}: {e}", path.display())))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.iter().any(|h| h == INDEX_COLUMN) {
        tracing::warn!(
            path = %path.display(),
            "source table carries an '{INDEX_COLUMN}' column; it will be overwritten"
        );
    }

    let mut columns = vec![INDEX_COLUMN.to_string()];
    columns.extend(headers.iter().cloned());
    let mut table = Table::new(columns);

    for (ordinal, record) in reader.records().enumerate() {
        let record = record?;
        let mut row = Row::new();
        for (slot, header) in headers.iter().enumerate() {
            row.set(header.clone(), record.get(slot).unwrap_or(""));
        }
        row.set(INDEX_COLUMN, ordinal.to_string());
        table.push(row);
    }

    tracing::info!(path = %path.display(), rows = table.len(), "table loaded");
    Ok(table)
}

/// Apply regex pre-cleaning to every configured header.
///
/// Each cell under a configured header is replaced by the first capture
/// group of the first match, or left unchanged when the pattern does not
/// match. Returns how many cells each header's pattern rewrote.
pub fn preclean(
    table: &mut Table,
    patterns: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();

    for (header, pattern) in patterns {
        let regex = Regex::new(pattern).map_err(|e| {
            LinkError::Configuration(format!("bad pattern for '{header}': {e}"))
        })?;
        if regex.captures_len() < 2 {
            return Err(LinkError::Configuration(format!(
                "pattern for '{header}' needs at least one capture group"
            )));
        }

        let mut count = 0;
        for pos in 0..table.len() {
            let Some(row) = table.get_mut(pos) else { break };
            let Some(cell) = row.get(header).map(str::to_string) else {
                continue;
            };
            if let Some(replacement) = regex
                .captures(&cell)
                .and_then(|caps| caps.get(1))
                .map(|g| g.as_str().to_string())
            {
                row.set(header.clone(), replacement);
                count += 1;
            }
        }
        counts.insert(header.clone(), count);
        tracing::info!(%header, rewritten = count, "pre-cleaning applied");
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_injects_index_and_keeps_empty_cells() {
        let file = write_csv("Customer_ID,Customer_Name\n12345,Acme Corp\n,Beta Holdings\n");
        let table = load_csv(file.path()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.columns()[0], INDEX_COLUMN);
        assert_eq!(table.get(0).unwrap().value(INDEX_COLUMN), "0");
        assert_eq!(table.get(1).unwrap().value(INDEX_COLUMN), "1");
        assert_eq!(table.get(1).unwrap().value("Customer_ID"), "");
        assert_eq!(table.get(1).unwrap().value("Customer_Name"), "Beta Holdings");
    }

    #[test]
    fn short_records_pad_with_empty_strings() {
        let file = write_csv("A,B,C\nx,y\n");
        let table = load_csv(file.path()).unwrap();
        assert_eq!(table.get(0).unwrap().value("C"), "");
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let err = load_csv("/nonexistent/table.csv").unwrap_err();
        assert!(matches!(err, LinkError::Input(_)));
    }

    #[test]
    fn preclean_keeps_first_capture_group() {
        let file = write_csv("Customer_Name\nAcme Corp (formerly AcmeCo)\nBeta Holdings\n");
        let mut table = load_csv(file.path()).unwrap();

        let mut patterns = BTreeMap::new();
        patterns.insert("Customer_Name".to_string(), r"^([^(]+?)\s*\(".to_string());

        let counts = preclean(&mut table, &patterns).unwrap();
        assert_eq!(counts["Customer_Name"], 1);
        assert_eq!(table.get(0).unwrap().value("Customer_Name"), "Acme Corp");
        // unmatched cells stay untouched
        assert_eq!(table.get(1).unwrap().value("Customer_Name"), "Beta Holdings");
    }

    #[test]
    fn pattern_without_capture_group_is_rejected() {
        let file = write_csv("A\nx\n");
        let mut table = load_csv(file.path()).unwrap();

        let mut patterns = BTreeMap::new();
        patterns.insert("A".to_string(), "x+".to_string());

        assert!(matches!(
            preclean(&mut table, &patterns),
            Err(LinkError::Configuration(_))
        ));
    }
}
