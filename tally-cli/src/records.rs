//! Worklog record files: a JSON array of records, as the store would return them.

use anyhow::{Context, Result};
use std::path::Path;
use tally_engine::domain::models::WorklogRecord;

pub fn load(path: &Path) -> Result<Vec<WorklogRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read records at {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse records at {}", path.display()))
}

pub fn save(path: &Path, records: &[WorklogRecord]) -> Result<()> {
    let raw = serde_json::to_string_pretty(records)?;
    std::fs::write(path, raw)
        .with_context(|| format!("Failed to write records to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_camel_case_records_with_optional_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(
            &path,
            r#"[{"id": "10", "issueKey": "PROJ-1", "durationSeconds": 3600, "date": "2024-03-04"}]"#,
        )
        .unwrap();

        let records = load(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].issue_key.as_str(), "PROJ-1");
        assert!(records[0].comment.is_empty());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load(Path::new("/nonexistent/records.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/records.json"));
    }
}
