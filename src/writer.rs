// incident_ingestor/src/writer.rs
// Accumulates planned operations and applies them to a store in fixed-size batches.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{IngestorError, Result};
use crate::keys::{EntityKeys, PersonSequence};
use crate::normalizer::NormalizedRow;
use crate::plan::{Operation, UpsertPlanner};
use crate::store::GraphStore;

#[derive(Debug)]
struct Pending {
    row:         usize,
    /// Set on the final operation of a row, so commits can be counted in rows.
    closes_row:  bool,
    op:          Operation,
}

/// Counters kept across every source written through one writer.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct WriterStats {
    pub rows_written:       usize,
    pub operations_applied: usize,
    pub batches_committed:  usize,
}

/// Outcome of one source once all of its operations are committed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SourceSummary {
    pub source:          String,
    pub rows_committed:  usize,
    pub last_row:        usize,
}

/// Batches operations for a store and owns the run-wide person sequence.
///
/// Every source of a run has to go through the same writer, otherwise person
/// identifiers restart and collide.
pub struct GraphWriter<'s, S: GraphStore> {
    store:          &'s S,
    batch_size:     usize,
    sequence:       PersonSequence,
    pending:        VecDeque<Pending>,
    source:         String,
    rows_committed: usize,
    last_row:       usize,
    stats:          WriterStats,
}

impl<'s, S: GraphStore> GraphWriter<'s, S> {
    pub fn new(store: &'s S, batch_size: usize) -> Result<Self> {
        Self::with_sequence(store, batch_size, PersonSequence::new())
    }

    pub fn with_sequence(store: &'s S, batch_size: usize, sequence: PersonSequence) -> Result<Self> {
        if batch_size == 0 {
            return Err(IngestorError::ConfigurationError("batch size must be at least 1".into()));
        }
        Ok(Self {
            store,
            batch_size,
            sequence,
            pending: VecDeque::new(),
            source: String::new(),
            rows_committed: 0,
            last_row: 0,
            stats: WriterStats::default(),
        })
    }

    /// Deletes everything in the store. Never called implicitly.
    pub async fn clear_store(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            return Err(IngestorError::Other("cannot clear the store with operations still queued".into()));
        }
        warn!("Clearing the target graph before loading");
        self.store.clear().await
    }

    /// Starts attributing rows to `source`, flushing whatever the previous source left queued.
    pub async fn begin_source(&mut self, source: &str) -> Result<()> {
        self.flush().await?;
        self.source = source.to_string();
        self.rows_committed = 0;
        self.last_row = 0;
        Ok(())
    }

    /// Plans `row` with the writer's sequence and queues the result.
    ///
    /// A missing `protocollo` comes back as [`IngestorError::MissingField`]
    /// with nothing queued and no identifier consumed.
    pub async fn write_row(
        &mut self,
        planner: &UpsertPlanner<'_>,
        row: &NormalizedRow,
        row_no: usize,
    ) -> Result<EntityKeys> {
        let plan = planner.plan(row, row_no, &mut self.sequence)?;
        self.enqueue(row_no, plan.operations).await?;
        Ok(plan.keys)
    }

    /// Queues the operations of one row, committing every full batch.
    pub async fn enqueue(&mut self, row_no: usize, operations: Vec<Operation>) -> Result<()> {
        let count = operations.len();
        for (i, op) in operations.into_iter().enumerate() {
            self.pending.push_back(Pending { row: row_no, closes_row: i + 1 == count, op });
        }
        self.stats.rows_written += 1;

        while self.pending.len() >= self.batch_size {
            self.flush_batch().await?;
        }
        Ok(())
    }

    /// Commits everything queued, in batches of at most `batch_size`.
    pub async fn flush(&mut self) -> Result<()> {
        while !self.pending.is_empty() {
            self.flush_batch().await?;
        }
        Ok(())
    }

    async fn flush_batch(&mut self) -> Result<()> {
        let take = self.batch_size.min(self.pending.len());
        let batch: Vec<Pending> = self.pending.drain(..take).collect();
        let ops: Vec<Operation> = batch.iter().map(|p| p.op.clone()).collect();

        if let Err(e) = self.store.apply_batch(&ops).await {
            error!(
                "Batch of {} operations failed for {}; {} rows committed (last row {}): {}",
                ops.len(),
                self.source,
                self.rows_committed,
                self.last_row,
                e
            );
            self.pending.clear();
            return Err(IngestorError::BatchFailed {
                file:           self.source.clone(),
                rows_committed: self.rows_committed,
                source:         Box::new(e),
            });
        }

        for p in batch.iter().filter(|p| p.closes_row) {
            self.rows_committed += 1;
            self.last_row = p.row;
        }
        self.stats.operations_applied += ops.len();
        self.stats.batches_committed += 1;
        debug!(
            "Committed batch {} ({} operations, {} rows of {} done)",
            self.stats.batches_committed,
            ops.len(),
            self.rows_committed,
            self.source
        );
        Ok(())
    }

    /// Flushes the current source and reports how far it got.
    pub async fn finish_source(&mut self) -> Result<SourceSummary> {
        self.flush().await?;
        info!("Finished {}: {} rows committed", self.source, self.rows_committed);
        Ok(self.summary())
    }

    /// Committed progress of the current source, without flushing.
    pub fn summary(&self) -> SourceSummary {
        SourceSummary {
            source:         self.source.clone(),
            rows_committed: self.rows_committed,
            last_row:       self.last_row,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The identifier the next non-pedestrian row will receive.
    pub fn next_person_id(&self) -> u64 {
        self.sequence.peek()
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }
}
