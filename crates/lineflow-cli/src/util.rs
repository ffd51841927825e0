use std::{
    fs::File,
    io::{self, BufWriter, StdoutLock, Write},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use serde::Serialize;

/// Destination of JSON output: stdout or a file.
///
/// Holds either whole pretty-printed documents ([`write_document`](Self::write_document))
/// or one compact record per line ([`write_record`](Self::write_record)).
#[derive(Debug)]
pub enum JsonSink {
    Stdout(StdoutLock<'static>),
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
}

impl JsonSink {
    /// Writes `value` as a single document to `path`, or to stdout when `path` is `None`.
    pub fn save<T>(value: &T, path: Option<&Path>) -> anyhow::Result<()>
    where
        T: Serialize,
    {
        let mut sink = match path {
            Some(path) => Self::create(path)?,
            None => Self::Stdout(io::stdout().lock()),
        };
        sink.write_document(value)
    }

    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Self::File {
            writer: BufWriter::new(file),
            path: path.to_owned(),
        })
    }

    fn target(&self) -> String {
        match self {
            Self::Stdout(_) => "stdout".to_owned(),
            Self::File { path, .. } => path.display().to_string(),
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(writer) => writer,
            Self::File { writer, .. } => writer,
        }
    }

    /// Writes `value` as pretty JSON followed by a newline, then flushes.
    pub fn write_document<T>(&mut self, value: &T) -> anyhow::Result<()>
    where
        T: Serialize,
    {
        let result = (|| -> io::Result<()> {
            let writer = self.writer();
            serde_json::to_writer_pretty(&mut *writer, value)?;
            writeln!(writer)?;
            writer.flush()
        })();
        result.with_context(|| format!("Failed to write JSON to {}", self.target()))
    }

    /// Appends `value` as one compact JSON line. Buffered until [`flush`](Self::flush).
    pub fn write_record<T>(&mut self, value: &T) -> io::Result<()>
    where
        T: Serialize,
    {
        let writer = self.writer();
        serde_json::to_writer(&mut *writer, value)?;
        writeln!(writer)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer().flush()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "lineflow-sink-{name}-{}-{:08x}",
            std::process::id(),
            rand::random::<u32>()
        ))
    }

    #[test]
    fn test_document_is_pretty_and_terminated() {
        let path = scratch_file("document");
        JsonSink::save(&serde_json::json!({ "n_cells": 3 }), Some(&path)).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.lines().count() > 1);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["n_cells"], 3);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_records_are_one_per_line() {
        let path = scratch_file("records");
        let mut sink = JsonSink::create(&path).unwrap();
        sink.write_record(&serde_json::json!({ "step": 1 })).unwrap();
        sink.write_record(&serde_json::json!({ "step": 2 })).unwrap();
        sink.flush().unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\"step\":1}\n{\"step\":2}\n"
        );
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_create_reports_path() {
        let path = scratch_file("missing").join("out.json");
        let err = JsonSink::create(&path).unwrap_err();
        assert!(err.to_string().contains(&path.display().to_string()));
    }
}
