//! Per-task artifact persistence.
//!
//! Each task owns one file set in the artifact directory, named by its
//! output id `<agent>_<index>`:
//!
//! - `<id>.in.md`: the composed task text, written before the unit starts
//! - `<id>.out.md`: the raw (untruncated) final output
//! - `<id>.jsonl`: optional transcript, one JSON record per session event
//!
//! Writers return errors, but the executor logs and swallows every one of
//! them: a failed write must never fail a task whose agent work succeeded.
//!
//! Transcript writes use synchronous `std::fs` since records are small and
//! flushed one at a time.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use super::types::ArtifactPaths;
use crate::error::ArtifactError;
use crate::session::SessionEvent;

/// Returns the current UTC time as an ISO 8601 string with milliseconds.
fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Directory holding the artifacts of one orchestration call.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    temporary: bool,
}

impl ArtifactStore {
    /// Artifacts that outlive the call.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            temporary: false,
        }
    }

    /// A fresh directory under the system temp dir, removed by [`cleanup`](Self::cleanup).
    pub fn temporary() -> Self {
        let dir = std::env::temp_dir().join(format!("fanout-{}", uuid::Uuid::new_v4()));
        Self {
            dir,
            temporary: true,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn paths(&self, id: &str, with_transcript: bool) -> ArtifactPaths {
        ArtifactPaths {
            input: self.dir.join(format!("{id}.in.md")),
            output: self.dir.join(format!("{id}.out.md")),
            transcript: with_transcript.then(|| self.dir.join(format!("{id}.jsonl"))),
        }
    }

    pub async fn ensure_dir(&self) -> Result<(), ArtifactError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))
    }

    pub async fn write_input(&self, id: &str, text: &str) -> Result<PathBuf, ArtifactError> {
        let path = self.paths(id, false).input;
        tokio::fs::write(&path, text).await.map_err(io_err(&path))?;
        Ok(path)
    }

    pub async fn write_output(&self, id: &str, text: &str) -> Result<PathBuf, ArtifactError> {
        let path = self.paths(id, false).output;
        tokio::fs::write(&path, text).await.map_err(io_err(&path))?;
        Ok(path)
    }

    pub fn open_transcript(&self, id: &str) -> Result<TranscriptWriter, ArtifactError> {
        let path = self.dir.join(format!("{id}.jsonl"));
        TranscriptWriter::create(path)
    }

    /// Remove a temporary directory. Persistent stores are left alone.
    pub async fn cleanup(&self) {
        if !self.temporary {
            return;
        }
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => tracing::debug!("Removed temporary artifacts at {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove temporary artifacts at {}: {}",
                self.dir.display(),
                e
            ),
        }
    }
}

/// One transcript line.
#[derive(Debug, Serialize)]
struct TranscriptRecord<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a SessionEvent,
}

/// Append-only JSONL writer for one task's session events.
pub struct TranscriptWriter {
    writer: BufWriter<fs::File>,
    path: PathBuf,
}

impl TranscriptWriter {
    pub fn create(path: PathBuf) -> Result<Self, ArtifactError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err(&path))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    /// Serialize an event as a single JSON line and flush.
    pub fn record(&mut self, event: &SessionEvent) -> Result<(), ArtifactError> {
        let record = TranscriptRecord {
            timestamp: now_iso(),
            event,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n").map_err(io_err(&self.path))?;
        self.writer.flush().map_err(io_err(&self.path))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read a stored task output by id, optionally restricted to a 1-based
/// inclusive line range.
pub fn read_output(
    dir: &Path,
    id: &str,
    range: Option<(usize, usize)>,
) -> Result<String, ArtifactError> {
    let path = dir.join(format!("{id}.out.md"));
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArtifactError::NotFound {
                id: id.to_string(),
                dir: dir.to_path_buf(),
            });
        }
        Err(e) => return Err(io_err(&path)(e)),
    };

    let Some((start, end)) = range else {
        return Ok(text);
    };
    let start = start.max(1);
    let selected: Vec<&str> = text
        .lines()
        .skip(start - 1)
        .take(end.saturating_sub(start) + 1)
        .collect();
    Ok(selected.join("\n"))
}

/// Parse a `start:end` line range. A bare number selects one line.
pub fn parse_line_range(text: &str) -> Option<(usize, usize)> {
    match text.split_once(':') {
        Some((start, end)) => {
            let start = start.trim().parse().ok()?;
            let end = end.trim().parse().ok()?;
            (start <= end).then_some((start, end))
        }
        None => {
            let line = text.trim().parse().ok()?;
            Some((line, line))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AgentMessage;
    use std::io::BufRead;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_input_and_output_by_id() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::persistent(tmp.path().join("artifacts"));
        store.ensure_dir().await.unwrap();

        let input = store.write_input("explore_0", "find things").await.unwrap();
        let output = store.write_output("explore_0", "found\nthings\n").await.unwrap();

        assert_eq!(input, tmp.path().join("artifacts/explore_0.in.md"));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "found\nthings\n");
        assert_eq!(
            read_output(store.dir(), "explore_0", Some((2, 2))).unwrap(),
            "things"
        );
    }

    #[tokio::test]
    async fn temporary_store_is_removed_on_cleanup() {
        let store = ArtifactStore::temporary();
        store.ensure_dir().await.unwrap();
        store.write_input("task_0", "x").await.unwrap();
        assert!(store.dir().is_dir());

        store.cleanup().await;
        assert!(!store.dir().exists());
    }

    #[tokio::test]
    async fn persistent_store_survives_cleanup() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::persistent(tmp.path());
        store.cleanup().await;
        assert!(tmp.path().is_dir());
    }

    #[test]
    fn missing_output_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = read_output(tmp.path(), "ghost_3", None).unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound { .. }));
    }

    #[test]
    fn transcript_writes_one_line_per_event() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::persistent(tmp.path());
        let mut transcript = store.open_transcript("task_1").unwrap();
        transcript.record(&SessionEvent::AgentStart).unwrap();
        transcript
            .record(&SessionEvent::MessageEnd {
                message: AgentMessage::assistant_text("done"),
            })
            .unwrap();

        let file = std::fs::File::open(transcript.path()).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(Result::unwrap)
            .collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["type"], "agent_start");
        assert!(first["timestamp"].is_string());
    }

    #[test]
    fn line_range_parsing() {
        assert_eq!(parse_line_range("10:40"), Some((10, 40)));
        assert_eq!(parse_line_range("7"), Some((7, 7)));
        assert_eq!(parse_line_range("9:2"), None);
        assert_eq!(parse_line_range("a:b"), None);
    }
}
