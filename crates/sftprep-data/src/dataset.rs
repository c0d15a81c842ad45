//! Dataset records and loading.

use crate::error::{DataError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sftprep_core::DataSetConfig;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// One dataset record: column name to value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Lazily produced sequence of records.
pub type RecordStream = Box<dyn Iterator<Item = Result<Record>> + Send>;

/// Loading backends understood for `builder`.
const SUPPORTED_BUILDERS: &[&str] = &["json", "jsonl"];

/// Reads records one line at a time from a JSONL file.
pub struct RecordReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_num: usize,
}

impl RecordReader {
    /// Open a JSONL file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            DataError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open dataset file {}: {}", path.display(), e),
            ))
        })?;

        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_num: 0,
        })
    }
}

impl Iterator for RecordReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_num += 1;

            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(DataError::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to read line {}: {}", self.line_num, e),
                    ))))
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            return Some(parse_record(&line).map_err(|e| {
                DataError::Dataset(format!(
                    "{} line {}: {}",
                    self.path.display(),
                    self.line_num,
                    e
                ))
            }));
        }
    }
}

fn parse_record(line: &str) -> std::result::Result<Record, String> {
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(serde_json::Value::Object(record)) => Ok(record),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(e) => Err(e.to_string()),
    }
}

/// Load every record of a file into memory.
///
/// `.json` files hold a JSON array of objects (a single object is one
/// record); anything else is read as JSONL.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    if !is_json_file(path) {
        return RecordReader::open(path)?.collect();
    }

    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str::<serde_json::Value>(&content)? {
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                serde_json::Value::Object(record) => Ok(record),
                other => Err(DataError::Dataset(format!(
                    "{} item {}: expected a JSON object, got {}",
                    path.display(),
                    i,
                    other
                ))),
            })
            .collect(),
        serde_json::Value::Object(record) => Ok(vec![record]),
        other => Err(DataError::Dataset(format!(
            "{}: expected a JSON array of objects, got {}",
            path.display(),
            other
        ))),
    }
}

fn is_json_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Lazily chain the records of several files.
///
/// JSONL files are streamed line by line; `.json` files are read whole when
/// their turn comes. Files are only opened once the previous one is drained.
pub fn stream_data_paths(paths: Vec<String>) -> RecordStream {
    Box::new(paths.into_iter().flat_map(|path| -> RecordStream {
        if is_json_file(Path::new(&path)) {
            match load_records(&path) {
                Ok(records) => Box::new(records.into_iter().map(Ok)),
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        } else {
            match RecordReader::open(&path) {
                Ok(reader) => Box::new(reader),
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        }
    }))
}

/// Open the records of a configured dataset as a stream.
pub fn stream_dataset(config: &DataSetConfig) -> Result<RecordStream> {
    if let Some(builder) = &config.builder {
        if !SUPPORTED_BUILDERS.contains(&builder.as_str()) {
            return Err(DataError::Dataset(format!(
                "dataset `{}` uses unsupported builder `{}`, supported builders are {:?}",
                config.name, builder, SUPPORTED_BUILDERS
            )));
        }
    }
    tracing::debug!(
        "Streaming dataset {} from {} file(s)",
        config.name,
        config.data_paths.len()
    );
    Ok(stream_data_paths(config.data_paths.clone()))
}

/// Shuffle records and partition them into named splits.
///
/// Each split receives `floor(len * fraction)` records, taken in name
/// order. When the fractions sum to 1.0 the last split also receives the
/// rounding remainder, so no record is lost.
pub fn split_records(
    mut records: Vec<Record>,
    split: &BTreeMap<String, f64>,
    seed: u64,
) -> Result<BTreeMap<String, Vec<Record>>> {
    let total: f64 = split.values().sum();
    if total > 1.0 + 1e-6 {
        return Err(DataError::Sampling(format!(
            "split fractions sum to {total}, expected at most 1.0"
        )));
    }
    let covers_all = (total - 1.0).abs() <= 1e-6;

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    records.shuffle(&mut rng);

    let len = records.len();
    let mut remaining = records.into_iter();
    let mut splits = BTreeMap::new();
    for (i, (name, fraction)) in split.iter().enumerate() {
        let last = i + 1 == split.len();
        let taken: Vec<Record> = if last && covers_all {
            remaining.by_ref().collect()
        } else {
            let count = (len as f64 * fraction).floor() as usize;
            remaining.by_ref().take(count).collect()
        };
        splits.insert(name.clone(), taken);
    }
    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn numbered(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| json!({ "id": i }).as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_jsonl_reader() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"text": "Hello world"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"text": "Another sample", "label": 1}}"#).unwrap();

        let records: Vec<Record> = RecordReader::open(file.path())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["text"], "Hello world");
        assert_eq!(records[1]["label"], 1);
    }

    #[test]
    fn test_jsonl_reader_reports_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"text": "ok"}}"#).unwrap();
        writeln!(file, "[1, 2]").unwrap();

        let mut reader = RecordReader::open(file.path()).unwrap();
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err().to_string();
        assert!(err.contains("line 2"), "{err}");
    }

    #[test]
    fn test_load_json_array() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"a": 1}}, {{"a": 2}}]"#).unwrap();

        let records = load_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["a"], 2);
    }

    #[test]
    fn test_stream_data_paths_chains_files() {
        let mut first = NamedTempFile::new().unwrap();
        writeln!(first, r#"{{"id": 1}}"#).unwrap();
        let mut second = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(second, r#"[{{"id": 2}}, {{"id": 3}}]"#).unwrap();

        let ids: Vec<i64> = stream_data_paths(vec![
            first.path().to_string_lossy().into_owned(),
            second.path().to_string_lossy().into_owned(),
        ])
        .map(|r| r.unwrap()["id"].as_i64().unwrap())
        .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_stream_missing_file_yields_error() {
        let mut stream = stream_data_paths(vec!["/nonexistent/data.jsonl".to_string()]);
        assert!(matches!(stream.next(), Some(Err(DataError::Io(_)))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_unsupported_builder() {
        let config = DataSetConfig {
            name: "remote".to_string(),
            data_paths: vec!["a.parquet".to_string()],
            builder: Some("parquet".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            stream_dataset(&config),
            Err(DataError::Dataset(_))
        ));
    }

    #[test]
    fn test_split_records() {
        let split = BTreeMap::from([("train".to_string(), 0.8), ("validation".to_string(), 0.2)]);
        let splits = split_records(numbered(101), &split, 42).unwrap();

        assert_eq!(splits["train"].len(), 80);
        assert_eq!(splits["validation"].len(), 21);

        let again = split_records(numbered(101), &split, 42).unwrap();
        assert_eq!(splits, again);
    }

    #[test]
    fn test_split_records_partial_and_invalid() {
        let split = BTreeMap::from([("train".to_string(), 0.5)]);
        let splits = split_records(numbered(10), &split, 0).unwrap();
        assert_eq!(splits["train"].len(), 5);

        let split = BTreeMap::from([("a".to_string(), 0.7), ("b".to_string(), 0.7)]);
        assert!(matches!(
            split_records(numbered(10), &split, 0),
            Err(DataError::Sampling(_))
        ));
    }
}
