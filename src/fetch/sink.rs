use serde_json::Value;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Destination for reassembled records, written strictly in page order.
pub trait RecordSink: Send {
    /// Write one page's records, in order, and make them visible to the reader.
    fn write_page(&mut self, records: &[Value]) -> io::Result<()>;
}

pub type SharedSink = Arc<Mutex<Box<dyn RecordSink>>>;

pub fn shared<S: RecordSink + 'static>(sink: S) -> SharedSink {
    let sink: Box<dyn RecordSink> = Box::new(sink);
    Arc::new(Mutex::new(sink))
}

/// One compact JSON document per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<BufWriter<io::Stdout>> {
    pub fn stdout() -> Self {
        Self::new(BufWriter::new(io::stdout()))
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Create (or truncate) `path` for UTF-8 JSON lines output.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("failed to create output file '{}': {}", path.display(), e),
            )
        })?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn write_page(&mut self, records: &[Value]) -> io::Result<()> {
        for record in records {
            serde_json::to_writer(&mut self.writer, record)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_lines_preserve_key_order() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write_page(&[json!({"zeta": 1, "alpha": 2}), json!({"id": "b"})])
            .unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(output, "{\"zeta\":1,\"alpha\":2}\n{\"id\":\"b\"}\n");
    }

    #[test]
    fn test_empty_page_writes_nothing() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write_page(&[]).unwrap();
        assert!(sink.into_inner().is_empty());
    }
}
