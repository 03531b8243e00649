use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Env var naming a JSON-lines file that receives layout and resolver events.
pub const DEBUG_LOG_ENV: &str = "DRAFT_REPORT_DEBUG_LOG";

/// Append-only JSON-lines event sink shared by one exporter and everything it drives.
#[derive(Clone)]
pub struct DebugLogger {
    inner: Arc<Mutex<EventSink>>,
}

struct EventSink {
    out: BufWriter<File>,
    counts: BTreeMap<String, u64>,
}

impl EventSink {
    fn write_line(&mut self, line: &Value) {
        if serde_json::to_writer(&mut self.out, line).is_ok() {
            let _ = self.out.write_all(b"\n");
        }
    }
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(EventSink {
                out: BufWriter::new(file),
                counts: BTreeMap::new(),
            })),
        })
    }

    pub fn from_env() -> Option<Self> {
        let path = std::env::var(DEBUG_LOG_ENV).ok()?;
        let path = path.trim();
        if path.is_empty() {
            return None;
        }
        match Self::new(path) {
            Ok(logger) => Some(logger),
            Err(err) => {
                tracing::warn!(path, %err, "cannot open debug log");
                None
            }
        }
    }

    /// Writes one line `{"type": kind, ..fields}`. Non-object `fields` land under `"data"`.
    pub fn event(&self, kind: &str, fields: Value) {
        let mut line = match fields {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        line.insert("type".to_string(), Value::String(kind.to_string()));
        if let Ok(mut sink) = self.inner.lock() {
            sink.write_line(&Value::Object(line));
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut sink) = self.inner.lock() {
            let count = sink.counts.entry(key.to_string()).or_insert(0);
            *count = count.saturating_add(amount);
        }
    }

    /// Emits the accumulated counters under `context` and starts counting afresh.
    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut sink) = self.inner.lock() {
            let counts = std::mem::take(&mut sink.counts);
            sink.write_line(&json!({
                "type": "debug.summary",
                "context": context,
                "counts": counts,
            }));
        }
    }

    pub fn flush(&self) {
        if let Ok(mut sink) = self.inner.lock() {
            let _ = sink.out.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn summary_lists_counters_and_resets_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.jsonl");
        let logger = DebugLogger::new(&path).unwrap();
        logger.event("layout.page_break", json!({ "to_page": 2 }));
        logger.increment("b.count", 2);
        logger.increment("a.count", 1);
        logger.increment("b.count", 3);
        logger.emit_summary("export");
        logger.emit_summary("again");
        logger.flush();

        let lines = read_lines(&path);
        assert_eq!(lines[0], json!({ "type": "layout.page_break", "to_page": 2 }));
        assert_eq!(
            lines[1],
            json!({
                "type": "debug.summary",
                "context": "export",
                "counts": { "a.count": 1, "b.count": 5 },
            })
        );
        assert_eq!(lines[2]["counts"], json!({}));
    }

    #[test]
    fn control_characters_stay_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.jsonl");
        let logger = DebugLogger::new(&path).unwrap();
        let reference = "scan\u{0c}\u{01}\"x\"\\.png";
        logger.event("resolve.image_skipped", json!({ "reference": reference }));
        logger.flush();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 1);
        assert!(raw.contains("\\f") && raw.contains("\\u0001"));
        let lines = read_lines(&path);
        assert_eq!(lines[0]["reference"], reference);
    }

    #[test]
    fn scalar_fields_are_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.jsonl");
        let logger = DebugLogger::new(&path).unwrap();
        logger.event("note", json!(7));
        logger.event("bare", Value::Null);
        logger.flush();
        let lines = read_lines(&path);
        assert_eq!(lines[0], json!({ "type": "note", "data": 7 }));
        assert_eq!(lines[1], json!({ "type": "bare" }));
    }
}
