//! Lazy batch cursor
//!
//! ```text
//! Unexecuted --first pull--> Streaming --last document--> Exhausted
//!      \                         |                          |
//!       `------------------------+---------- close ---------+--> Closed
//! ```
//!
//! Construction does no I/O. The first [`BatchCursor::next_batch`] starts
//! the server-side stream; later pulls only continue it. A one-document
//! look-ahead taken during each pull answers [`BatchCursor::has_more`]
//! without another round trip.

use std::sync::Arc;

use mongodb::bson::Document;
use tracing::{debug, warn};

use crate::error::Result;
use crate::transport::{DocumentStream, Transport};
use crate::translator::QueryDescriptor;

/// Default number of documents per batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPhase {
    Unexecuted,
    Streaming,
    Exhausted,
    Closed,
}

/// Cursor over a query's results, pulled in bounded batches.
pub struct BatchCursor {
    transport: Arc<dyn Transport>,
    db: String,
    query: QueryDescriptor,
    batch_size: usize,
    phase: CursorPhase,
    stream: Option<Box<dyn DocumentStream>>,
    lookahead: Option<Document>,
    docs_returned: u64,
}

impl std::fmt::Debug for BatchCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCursor")
            .field("namespace", &format!("{}.{}", self.db, self.query.collection))
            .field("phase", &self.phase)
            .field("docs_returned", &self.docs_returned)
            .finish()
    }
}

impl BatchCursor {
    pub fn new(
        transport: Arc<dyn Transport>,
        db: impl Into<String>,
        query: QueryDescriptor,
        batch_size: usize,
    ) -> Self {
        Self {
            transport,
            db: db.into(),
            query,
            batch_size: batch_size.max(1),
            phase: CursorPhase::Unexecuted,
            stream: None,
            lookahead: None,
            docs_returned: 0,
        }
    }

    pub fn phase(&self) -> CursorPhase {
        self.phase
    }

    /// Whether the first transport call has been made.
    pub fn executed(&self) -> bool {
        self.phase != CursorPhase::Unexecuted
    }

    /// Result of the last pull. An unexecuted cursor may still have results.
    pub fn has_more(&self) -> bool {
        match self.phase {
            CursorPhase::Unexecuted => true,
            CursorPhase::Streaming => self.lookahead.is_some(),
            CursorPhase::Exhausted | CursorPhase::Closed => false,
        }
    }

    pub fn docs_returned(&self) -> u64 {
        self.docs_returned
    }

    pub fn query(&self) -> &QueryDescriptor {
        &self.query
    }

    /// Pull up to `batch_size` documents.
    ///
    /// A closed or exhausted cursor yields an empty batch. A failed pull
    /// releases the stream and leaves the cursor exhausted.
    pub async fn next_batch(&mut self) -> Result<Vec<Document>> {
        match self.phase {
            CursorPhase::Closed | CursorPhase::Exhausted => return Ok(Vec::new()),
            CursorPhase::Unexecuted => self.start().await?,
            CursorPhase::Streaming => {}
        }

        let mut batch = Vec::with_capacity(self.batch_size);
        if let Some(doc) = self.lookahead.take() {
            batch.push(doc);
        }

        let finished = match self.fill(&mut batch).await {
            Ok(finished) => finished,
            Err(e) => {
                warn!(
                    "cursor on {}.{} failed after {} document(s) of the batch: {}",
                    self.db,
                    self.query.collection,
                    batch.len(),
                    e
                );
                self.phase = CursorPhase::Exhausted;
                self.release_stream();
                return Err(e);
            }
        };

        if finished {
            self.phase = CursorPhase::Exhausted;
            self.release_stream();
        }

        self.docs_returned += batch.len() as u64;
        debug!(
            "cursor on {}.{} returned {} document(s), has_more={}",
            self.db,
            self.query.collection,
            batch.len(),
            self.has_more()
        );
        Ok(batch)
    }

    /// Fill `batch` up to the batch size and take the look-ahead.
    ///
    /// Returns whether the stream ended.
    async fn fill(&mut self, batch: &mut Vec<Document>) -> Result<bool> {
        while batch.len() < self.batch_size {
            match self.pull().await? {
                Some(doc) => batch.push(doc),
                None => return Ok(true),
            }
        }
        self.lookahead = self.pull().await?;
        Ok(self.lookahead.is_none())
    }

    async fn start(&mut self) -> Result<()> {
        debug!("starting cursor on {}.{}", self.db, self.query.collection);
        match self.transport.open_query(&self.db, &self.query).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.phase = CursorPhase::Streaming;
                Ok(())
            }
            Err(e) => {
                // A failed start is final; the cursor never reissues it.
                self.phase = CursorPhase::Exhausted;
                Err(e)
            }
        }
    }

    async fn pull(&mut self) -> Result<Option<Document>> {
        match self.stream.as_mut() {
            Some(stream) => stream.next_document().await,
            None => Ok(None),
        }
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
    }

    /// Release the stream handle. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.phase != CursorPhase::Closed {
            debug!("closing cursor on {}.{}", self.db, self.query.collection);
        }
        self.release_stream();
        self.lookahead = None;
        self.phase = CursorPhase::Closed;
    }
}

impl Drop for BatchCursor {
    fn drop(&mut self) {
        if self.stream.is_some() {
            warn!(
                "cursor on {}.{} dropped while open; releasing",
                self.db, self.query.collection
            );
            self.release_stream();
        }
    }
}
