//! Persistence boundary for experiment history.
//!
//! The loop treats every sink call as best-effort: a failure is logged and
//! the run continues.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::FpaError;
use crate::record::SampleRecord;

pub trait RecordSink {
    /// Persist one row.
    fn append(&mut self, record: &SampleRecord) -> Result<(), FpaError>;

    /// Publish the full history so far (e.g. for a live plot).
    fn snapshot(&mut self, _history: &[SampleRecord]) -> Result<(), FpaError> {
        Ok(())
    }

    /// Flush and close. Called once, after the sentinel row.
    fn finish(&mut self) -> Result<(), FpaError> {
        Ok(())
    }
}

impl<T: RecordSink + ?Sized> RecordSink for Box<T> {
    fn append(&mut self, record: &SampleRecord) -> Result<(), FpaError> {
        (**self).append(record)
    }
    fn snapshot(&mut self, history: &[SampleRecord]) -> Result<(), FpaError> {
        (**self).snapshot(history)
    }
    fn finish(&mut self) -> Result<(), FpaError> {
        (**self).finish()
    }
}

/// Forwards every call to both sinks; reports the first failure after trying both.
#[derive(Debug)]
pub struct Tee<A, B>(pub A, pub B);

impl<A: RecordSink, B: RecordSink> RecordSink for Tee<A, B> {
    fn append(&mut self, record: &SampleRecord) -> Result<(), FpaError> {
        let a = self.0.append(record);
        let b = self.1.append(record);
        a.and(b)
    }
    fn snapshot(&mut self, history: &[SampleRecord]) -> Result<(), FpaError> {
        let a = self.0.snapshot(history);
        let b = self.1.snapshot(history);
        a.and(b)
    }
    fn finish(&mut self) -> Result<(), FpaError> {
        let a = self.0.finish();
        let b = self.1.finish();
        a.and(b)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn append(&mut self, _record: &SampleRecord) -> Result<(), FpaError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryLog {
    rows: Vec<SampleRecord>,
    snapshots: usize,
    finished: bool,
}

/// In-memory sink. Clones share storage, so a test can keep one handle and
/// give the other to the experiment.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    log: Rc<RefCell<MemoryLog>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<SampleRecord> {
        self.log.borrow().rows.clone()
    }

    /// Rows excluding the terminal sentinel.
    pub fn data_rows(&self) -> Vec<SampleRecord> {
        self.log
            .borrow()
            .rows
            .iter()
            .filter(|r| !r.is_sentinel())
            .cloned()
            .collect()
    }

    pub fn snapshots(&self) -> usize {
        self.log.borrow().snapshots
    }

    pub fn is_finished(&self) -> bool {
        self.log.borrow().finished
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: &SampleRecord) -> Result<(), FpaError> {
        self.log.borrow_mut().rows.push(record.clone());
        Ok(())
    }
    fn snapshot(&mut self, _history: &[SampleRecord]) -> Result<(), FpaError> {
        self.log.borrow_mut().snapshots += 1;
        Ok(())
    }
    fn finish(&mut self) -> Result<(), FpaError> {
        self.log.borrow_mut().finished = true;
        Ok(())
    }
}
