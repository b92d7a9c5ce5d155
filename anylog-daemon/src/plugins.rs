//! Deployment-specific pipeline plug-ins used by the stock binary.
//!
//! The library crates only define the `Processor`/`Writer` extension
//! points; what actually runs in a deployment is wired here. The stock
//! binary annotates each record with its field count and emits it as
//! one JSON line on stdout.

use anylog_core::pipeline::{Processor, Writer};
use anylog_core::types::{LogRecord, Value};

/// Annotates each record with the number of parsed fields.
///
/// The count reflects the record as produced by the parser, before
/// this processor's own annotation is added.
pub struct FieldCountProcessor;

impl Processor for FieldCountProcessor {
    fn process(&self, mut record: LogRecord) -> LogRecord {
        let fields = record.len() as i64;
        record.insert("field_count", Value::Int(fields));
        if let Some(hostname) = record.get_str("hostname") {
            tracing::trace!(hostname, fields, "record annotated");
        }
        record
    }
}

/// Emits each final record as one JSON line on stdout.
///
/// Serialization failures are logged and the record is dropped;
/// writer failures never propagate into the pipeline.
pub struct JsonStdoutWriter;

impl Writer for JsonStdoutWriter {
    fn write(&self, record: &LogRecord) {
        match serde_json::to_string(record) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "failed to serialize record"),
        }
    }
}

/// Dead-letter sink: logs records whose processing chain failed.
///
/// Receives the record as parsed, before any processor ran.
pub struct DeadLetterLogWriter;

impl Writer for DeadLetterLogWriter {
    fn write(&self, record: &LogRecord) {
        match serde_json::to_string(record) {
            Ok(line) => tracing::warn!(record = %line, "record sent to dead letter"),
            Err(e) => tracing::error!(error = %e, "failed to serialize dead-lettered record"),
        }
    }
}
