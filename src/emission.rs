//! Change detection and delivery.
//!
//! A pass that produced a canonical document lands here. The pipeline hashes
//! the rendered text, compares against the last emission, and hands the
//! document to the sink only when the content is new. Sink failure is
//! reported but still advances the record, so a persistently failing sink
//! gets one attempt per distinct content rather than a retry storm.

use crate::notify::Notifier;
use crate::types::{CanonicalDocument, PassOutcome, SinkError};
use tracing::{debug, info, warn};

/// 64-bit FNV-1a content fingerprint
pub fn fingerprint(text: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in text.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Where emitted documents go
pub trait DeliverySink {
    fn deliver(&mut self, text: &str) -> Result<(), SinkError>;
}

impl<F> DeliverySink for F
where
    F: FnMut(&str) -> Result<(), SinkError>,
{
    fn deliver(&mut self, text: &str) -> Result<(), SinkError> {
        self(text)
    }
}

/// Sink that appends rendered documents to stdout with a separator line
pub struct StdoutSink;

impl DeliverySink for StdoutSink {
    fn deliver(&mut self, text: &str) -> Result<(), SinkError> {
        use std::io::Write;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{text}\n---")?;
        Ok(())
    }
}

/// What the last emission looked like
#[derive(Debug, Default)]
struct EmissionRecord {
    fingerprint: Option<u64>,
    raw_snapshot: Option<String>,
}

/// Fingerprint-gated delivery pipeline
pub struct EmissionPipeline<S> {
    sink: S,
    notifier: Notifier,
    record: EmissionRecord,
}

impl<S: DeliverySink> EmissionPipeline<S> {
    pub fn new(sink: S, notifier: Notifier) -> Self {
        Self {
            sink,
            notifier,
            record: EmissionRecord::default(),
        }
    }

    /// Whether `raw` matches the raw region text captured at the last
    /// emission. Used as a cheap pre-canonicalization exit.
    pub fn raw_unchanged(&self, raw: &str) -> bool {
        self.record.raw_snapshot.as_deref() == Some(raw)
    }

    /// Forget the raw snapshot so the next pass re-canonicalizes even if
    /// the region text looks the same. Used after navigation.
    pub fn invalidate_raw(&mut self) {
        self.record.raw_snapshot = None;
    }

    /// Submit a canonical document together with the raw region text it was
    /// extracted from. Delivers at most once per distinct rendered content.
    pub fn submit(&mut self, doc: &CanonicalDocument, raw: &str) -> PassOutcome {
        let rendered = doc.render();
        let print = fingerprint(&rendered);

        if self.record.fingerprint == Some(print) {
            debug!(fingerprint = print, "content unchanged, suppressing");
            // the raw text may still have drifted (attribute churn etc.)
            self.record.raw_snapshot = Some(raw.to_string());
            return PassOutcome::Suppressed;
        }

        // advance the record before attempting delivery
        self.record.fingerprint = Some(print);
        self.record.raw_snapshot = Some(raw.to_string());

        match self.sink.deliver(&rendered) {
            Ok(()) => {
                info!(
                    fingerprint = print,
                    answers = doc.answer_count(),
                    "document emitted"
                );
                PassOutcome::Emitted { delivered: true }
            }
            Err(e) => {
                warn!("delivery failed: {e}");
                self.notifier.notify(format!("delivery failed: {e}"));
                PassOutcome::Emitted { delivered: false }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::notification_channel;
    use crate::types::{BlockKind, CanonicalBlock};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn doc(text: &str) -> CanonicalDocument {
        CanonicalDocument::new(vec![CanonicalBlock::new(BlockKind::Paragraph, text)])
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        delivered: Rc<RefCell<Vec<String>>>,
        fail: Rc<RefCell<bool>>,
    }

    impl DeliverySink for RecordingSink {
        fn deliver(&mut self, text: &str) -> Result<(), SinkError> {
            if *self.fail.borrow() {
                return Err(SinkError::Failed("sink offline".to_string()));
            }
            self.delivered.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_distinct_content_is_delivered_once() {
        let sink = RecordingSink::default();
        let delivered = sink.delivered.clone();
        let (notifier, _rx) = notification_channel();
        let mut pipeline = EmissionPipeline::new(sink, notifier);

        assert_eq!(
            pipeline.submit(&doc("first"), "raw first"),
            PassOutcome::Emitted { delivered: true }
        );
        assert_eq!(
            pipeline.submit(&doc("first"), "raw first"),
            PassOutcome::Suppressed
        );
        assert_eq!(
            pipeline.submit(&doc("second"), "raw second"),
            PassOutcome::Emitted { delivered: true }
        );
        assert_eq!(delivered.borrow().len(), 2);
    }

    #[test]
    fn test_failed_delivery_still_advances_record() {
        let sink = RecordingSink::default();
        let fail = sink.fail.clone();
        let delivered = sink.delivered.clone();
        let (notifier, mut rx) = notification_channel();
        let mut pipeline = EmissionPipeline::new(sink, notifier);

        *fail.borrow_mut() = true;
        assert_eq!(
            pipeline.submit(&doc("content"), "raw"),
            PassOutcome::Emitted { delivered: false }
        );
        assert!(rx.try_recv().unwrap().contains("delivery failed"));

        // the same content is not retried even after the sink recovers
        *fail.borrow_mut() = false;
        assert_eq!(
            pipeline.submit(&doc("content"), "raw"),
            PassOutcome::Suppressed
        );
        assert!(delivered.borrow().is_empty());
    }

    #[test]
    fn test_raw_snapshot_tracks_suppressed_passes() {
        let sink = RecordingSink::default();
        let (notifier, _rx) = notification_channel();
        let mut pipeline = EmissionPipeline::new(sink, notifier);

        pipeline.submit(&doc("stable"), "raw v1");
        assert!(pipeline.raw_unchanged("raw v1"));
        assert!(!pipeline.raw_unchanged("raw v2"));

        // attribute churn changes the raw text but not the canonical form
        pipeline.submit(&doc("stable"), "raw v2");
        assert!(pipeline.raw_unchanged("raw v2"));
    }

    #[test]
    fn test_fingerprint_stability() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_ne!(fingerprint(""), fingerprint(" "));
    }
}
