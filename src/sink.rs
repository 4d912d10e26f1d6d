use std::io::Write;

use crate::stats::MetricRecord;

/// Writes records as newline-delimited JSON.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one record as a single line and flushes it.
    ///
    /// # Errors
    ///
    /// Fails if serialization or the underlying writer fails.
    pub fn write(&mut self, record: &MetricRecord) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
