//! File sinks: JSON array and CSV buffered until shutdown, JSONL streamed

use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::infrastructure::persistence::PersistenceError;

fn ensure_parent(path: &Path) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn lock_poisoned(path: &Path) -> PersistenceError {
    PersistenceError::Poisoned(path.display().to_string())
}

/// Whole-run JSON array, written once at shutdown with 2-space indentation
pub struct JsonArraySink {
    path: PathBuf,
    overwrite: bool,
    records: Mutex<Vec<Value>>,
}

impl JsonArraySink {
    pub fn new(path: PathBuf, overwrite: bool) -> Self {
        Self {
            path,
            overwrite,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add(&self, record: Value) -> Result<(), PersistenceError> {
        self.records
            .lock()
            .map_err(|_| lock_poisoned(&self.path))?
            .push(record);
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.records.lock().is_ok_and(|r| !r.is_empty())
    }

    /// Write the array. New records go in ascending `processo_id` order.
    /// Without `overwrite`, records already in the file are kept unless a new
    /// record carries the same `processo_id`.
    pub fn finish(&self) -> Result<usize, PersistenceError> {
        let mut records = std::mem::take(&mut *self.records.lock().map_err(|_| lock_poisoned(&self.path))?);
        // session completion order is not stable across runs
        records.sort_by_key(|record| record.get("processo_id").and_then(Value::as_u64));

        let mut merged: Vec<Value> = if !self.overwrite && self.path.exists() {
            let existing = std::fs::read_to_string(&self.path)?;
            match serde_json::from_str::<Value>(&existing) {
                Ok(Value::Array(items)) => items,
                Ok(_) | Err(_) => {
                    warn!("Existing {} is not a JSON array; replacing it", self.path.display());
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        for record in records {
            let key = record.get("processo_id").cloned();
            match merged
                .iter_mut()
                .find(|existing| key.is_some() && existing.get("processo_id") == key.as_ref())
            {
                Some(slot) => *slot = record,
                None => merged.push(record),
            }
        }

        ensure_parent(&self.path)?;
        let text = serde_json::to_string_pretty(&Value::Array(merged.clone()))?;
        std::fs::write(&self.path, text)?;
        info!("💾 Wrote {} records to {}", merged.len(), self.path.display());
        Ok(merged.len())
    }
}

/// Flat rows, one per record, written once at shutdown
pub struct CsvSink {
    path: PathBuf,
    overwrite: bool,
    rows: Mutex<Vec<Map<String, Value>>>,
}

impl CsvSink {
    pub fn new(path: PathBuf, overwrite: bool) -> Self {
        Self {
            path,
            overwrite,
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add(&self, row: Map<String, Value>) -> Result<(), PersistenceError> {
        self.rows.lock().map_err(|_| lock_poisoned(&self.path))?.push(row);
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.rows.lock().is_ok_and(|r| !r.is_empty())
    }

    /// Write buffered rows by ascending `processo_id`. Appending to an
    /// existing file reuses its header.
    pub fn finish(&self) -> Result<usize, PersistenceError> {
        let mut rows = std::mem::take(&mut *self.rows.lock().map_err(|_| lock_poisoned(&self.path))?);
        rows.sort_by_key(|row| row.get("processo_id").and_then(Value::as_u64));
        if rows.is_empty() {
            return Ok(0);
        }
        ensure_parent(&self.path)?;

        let existing_header = if !self.overwrite && self.path.exists() {
            let mut reader = csv::Reader::from_path(&self.path)?;
            let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
            (!header.is_empty()).then_some(header)
        } else {
            None
        };

        let (header, file) = match existing_header {
            Some(header) => (header, OpenOptions::new().append(true).open(&self.path)?),
            None => (union_header(&rows), File::create(&self.path)?),
        };
        let appending = file.metadata()?.len() > 0;

        let mut writer = csv::Writer::from_writer(file);
        if !appending {
            writer.write_record(&header)?;
        }
        for row in &rows {
            let dropped: Vec<&String> = row.keys().filter(|k| !header.contains(k)).collect();
            if !dropped.is_empty() {
                warn!("CSV columns not in existing header were dropped: {:?}", dropped);
            }
            writer.write_record(header.iter().map(|column| cell(row.get(column))))?;
        }
        writer.flush()?;
        info!("💾 Wrote {} rows to {}", rows.len(), self.path.display());
        Ok(rows.len())
    }
}

/// Column order: first-seen order across rows
fn union_header(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut header: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !header.contains(key) {
                header.push(key.clone());
            }
        }
    }
    header
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// One JSON document per line, appended as records arrive
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
    overwrite: bool,
}

impl JsonlSink {
    pub fn new(path: PathBuf, overwrite: bool) -> Self {
        Self {
            path,
            file: Mutex::new(None),
            overwrite,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &Value) -> Result<(), PersistenceError> {
        let mut guard = self.file.lock().map_err(|_| lock_poisoned(&self.path))?;
        if guard.is_none() {
            ensure_parent(&self.path)?;
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(!self.overwrite)
                .truncate(self.overwrite)
                .open(&self.path)?;
            *guard = Some(file);
        }
        if let Some(file) = guard.as_mut() {
            let line = serde_json::to_string(record)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    pub fn finish(&self) -> Result<(), PersistenceError> {
        let mut guard = self.file.lock().map_err(|_| lock_poisoned(&self.path))?;
        if let Some(file) = guard.as_mut() {
            file.flush()?;
        }
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_array_is_pretty_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonArraySink::new(dir.path().join("out.json"), true);
        sink.add(json!({"processo_id": 1, "a": [1]})).unwrap();
        sink.add(json!({"processo_id": 2})).unwrap();
        assert_eq!(sink.finish().unwrap(), 2);

        let text = std::fs::read_to_string(sink.path()).unwrap();
        assert!(text.starts_with("[\n  {\n    \"processo_id\": 1"));
    }

    #[test]
    fn test_json_array_order_ignores_completion_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonArraySink::new(dir.path().join("out.json"), true);
        for id in [3, 1, 2] {
            sink.add(json!({"processo_id": id})).unwrap();
        }
        assert_eq!(sink.finish().unwrap(), 3);

        let back: Value = serde_json::from_str(&std::fs::read_to_string(sink.path()).unwrap()).unwrap();
        let ids: Vec<u64> = back.as_array().unwrap().iter().map(|r| r["processo_id"].as_u64().unwrap()).collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn test_json_merge_replaces_same_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, r#"[{"processo_id": 1, "v": "old"}, {"processo_id": 5}]"#).unwrap();

        let sink = JsonArraySink::new(path.clone(), false);
        sink.add(json!({"processo_id": 1, "v": "new"})).unwrap();
        assert_eq!(sink.finish().unwrap(), 2);

        let back: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back[0]["v"], "new");
        assert_eq!(back[1]["processo_id"], 5);
    }

    #[test]
    fn test_csv_writes_union_header_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let first = CsvSink::new(path.clone(), false);
        let mut row = Map::new();
        row.insert("processo_id".into(), json!(1));
        row.insert("partes".into(), json!("[{\"nome\":\"X\"}]"));
        first.add(row).unwrap();
        first.finish().unwrap();

        let second = CsvSink::new(path.clone(), false);
        let mut row = Map::new();
        row.insert("processo_id".into(), json!(2));
        row.insert("extra".into(), json!("dropped"));
        second.add(row).unwrap();
        second.finish().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.headers().unwrap(), vec!["processo_id", "partes"]);
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "[{\"nome\":\"X\"}]");
        assert_eq!(&rows[1][0], "2");
        assert_eq!(&rows[1][1], "");
    }

    #[test]
    fn test_csv_rows_follow_case_number() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out.csv"), true);
        for id in [9, 4] {
            let mut row = Map::new();
            row.insert("processo_id".into(), json!(id));
            sink.add(row).unwrap();
        }
        assert_eq!(sink.finish().unwrap(), 2);

        let mut reader = csv::Reader::from_path(sink.path()).unwrap();
        let ids: Vec<String> = reader.records().map(|r| r.unwrap()[0].to_string()).collect();
        assert_eq!(ids, ["4", "9"]);
    }

    #[test]
    fn test_jsonl_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("out.jsonl"), false);
        sink.append(&json!({"a": 1})).unwrap();
        sink.append(&json!({"a": 2})).unwrap();
        sink.finish().unwrap();
        let text = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
