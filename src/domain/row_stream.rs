// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Row Streams
//!
//! A `RowStream` is what the extractor hands to the serializer: the column
//! layout plus a lazy, forward-only iterator over rows. Rows are pulled from
//! the underlying cursor in batches of at most `batch_size` and buffered in a
//! `VecDeque`, so memory is bounded by the batch, never by the table.

use crate::domain::entities::{Row, TableSchema};
use crate::domain::errors::{ExportError, Result};
use std::collections::VecDeque;

/// Columns plus a finite, non-restartable sequence of rows.
pub struct RowStream<'a> {
    pub schema: TableSchema,
    pub rows: Box<dyn Iterator<Item = Result<Row>> + 'a>,
}

impl<'a> RowStream<'a> {
    pub fn new<I>(schema: TableSchema, rows: I) -> Self
    where
        I: Iterator<Item = Result<Row>> + 'a,
    {
        Self {
            schema,
            rows: Box::new(rows),
        }
    }

    /// Wraps `cursor` so that rows are fetched `batch_size` at a time.
    pub fn batched<I>(schema: TableSchema, cursor: I, batch_size: usize) -> Self
    where
        I: Iterator<Item = Result<Row>> + 'a,
    {
        Self::new(schema, Batched::new(cursor, batch_size))
    }
}

/// Iterator adapter that refills a bounded buffer from `inner` whenever it
/// runs dry.
///
/// An error from the cursor is yielded after the rows already buffered, then
/// the stream ends.
pub struct Batched<I> {
    inner: I,
    buffer: VecDeque<Row>,
    batch_size: usize,
    pending_error: Option<ExportError>,
    exhausted: bool,
    batches_fetched: u64,
}

impl<I> Batched<I>
where
    I: Iterator<Item = Result<Row>>,
{
    pub fn new(inner: I, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            inner,
            buffer: VecDeque::with_capacity(batch_size),
            batch_size,
            pending_error: None,
            exhausted: false,
            batches_fetched: 0,
        }
    }

    pub fn batches_fetched(&self) -> u64 {
        self.batches_fetched
    }

    fn refill(&mut self) {
        while self.buffer.len() < self.batch_size {
            match self.inner.next() {
                Some(Ok(row)) => self.buffer.push_back(row),
                Some(Err(e)) => {
                    self.pending_error = Some(e);
                    self.exhausted = true;
                    break;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        if !self.buffer.is_empty() {
            self.batches_fetched += 1;
            log::debug!(
                "Fetched batch #{} ({} rows)",
                self.batches_fetched,
                self.buffer.len()
            );
        }
    }
}

impl<I> Iterator for Batched<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            self.refill();
        }
        if let Some(row) = self.buffer.pop_front() {
            return Some(Ok(row));
        }
        self.pending_error.take().map(Err)
    }
}

/// Runs `on_abandon` when dropped before `inner` ran to completion, and
/// before `inner` itself is dropped.
///
/// Database cursors use this to stop the server-side query, otherwise
/// dropping the cursor reads the rest of the result set off the wire.
pub struct Interruptible<I, F>
where
    F: FnMut(),
{
    on_abandon: F,
    finished: bool,
    inner: I,
}

impl<I, F> Interruptible<I, F>
where
    I: Iterator<Item = Result<Row>>,
    F: FnMut(),
{
    pub fn new(inner: I, on_abandon: F) -> Self {
        Self {
            on_abandon,
            finished: false,
            inner,
        }
    }
}

impl<I, F> Iterator for Interruptible<I, F>
where
    I: Iterator<Item = Result<Row>>,
    F: FnMut(),
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.inner.next();
        // A fetch error ends the result set as well.
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}

impl<I, F> Drop for Interruptible<I, F>
where
    F: FnMut(),
{
    fn drop(&mut self) {
        if !self.finished {
            (self.on_abandon)();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn row(i: u32) -> Row {
        Row::new(vec![Some(i.to_string())])
    }

    #[test]
    fn test_batched_preserves_order_and_count() {
        let source = (0..25).map(|i| Ok(row(i)));
        let batched = Batched::new(source, 10);
        let out: Vec<Row> = batched.map(|r| r.unwrap()).collect();
        assert_eq!(out.len(), 25);
        assert_eq!(out, (0..25).map(row).collect::<Vec<_>>());
    }

    #[test]
    fn test_batched_never_reads_more_than_one_batch_ahead() {
        let pulled = Rc::new(Cell::new(0u32));
        let counter = pulled.clone();
        let source = (0..100).map(move |i| {
            counter.set(counter.get() + 1);
            Ok(row(i))
        });
        let mut batched = Batched::new(source, 8);

        batched.next().unwrap().unwrap();
        assert_eq!(pulled.get(), 8);
        for _ in 0..7 {
            batched.next().unwrap().unwrap();
        }
        assert_eq!(pulled.get(), 8);
        batched.next().unwrap().unwrap();
        assert_eq!(pulled.get(), 16);
        assert_eq!(batched.batches_fetched(), 2);
    }

    #[test]
    fn test_batched_yields_buffered_rows_before_error() {
        let source = vec![
            Ok(row(1)),
            Ok(row(2)),
            Err(ExportError::extraction("t", "connection lost")),
            Ok(row(3)),
        ]
        .into_iter();
        let mut batched = Batched::new(source, 10);
        assert_eq!(batched.next().unwrap().unwrap(), row(1));
        assert_eq!(batched.next().unwrap().unwrap(), row(2));
        assert!(matches!(
            batched.next(),
            Some(Err(ExportError::Extraction { .. }))
        ));
        assert!(batched.next().is_none());
    }

    #[test]
    fn test_batched_empty_source() {
        let source = std::iter::empty::<Result<Row>>();
        let mut batched = Batched::new(source, 4);
        assert!(batched.next().is_none());
        assert_eq!(batched.batches_fetched(), 0);
    }

    /// Stands in for a driver cursor that drains the rest of its result set
    /// when dropped, unless the query was stopped first.
    struct DrainingCursor {
        next: u32,
        total: u32,
        stopped: Rc<Cell<bool>>,
        pulled: Rc<Cell<u32>>,
    }

    impl Iterator for DrainingCursor {
        type Item = Result<Row>;

        fn next(&mut self) -> Option<Self::Item> {
            if self.stopped.get() || self.next >= self.total {
                return None;
            }
            self.next += 1;
            self.pulled.set(self.pulled.get() + 1);
            Some(Ok(row(self.next)))
        }
    }

    impl Drop for DrainingCursor {
        fn drop(&mut self) {
            while self.next().is_some() {}
        }
    }

    fn draining(total: u32) -> (DrainingCursor, Rc<Cell<bool>>, Rc<Cell<u32>>) {
        let stopped = Rc::new(Cell::new(false));
        let pulled = Rc::new(Cell::new(0));
        let cursor = DrainingCursor {
            next: 0,
            total,
            stopped: stopped.clone(),
            pulled: pulled.clone(),
        };
        (cursor, stopped, pulled)
    }

    #[test]
    fn test_abandoned_stream_stops_query_before_cursor_drains() {
        let (cursor, stopped, pulled) = draining(10_000);
        let flag = stopped.clone();
        let mut batched = Batched::new(Interruptible::new(cursor, move || flag.set(true)), 10);
        for _ in 0..25 {
            batched.next().unwrap().unwrap();
        }
        drop(batched);

        assert!(stopped.get());
        assert_eq!(pulled.get(), 30);
    }

    #[test]
    fn test_exhausted_stream_does_not_stop_query() {
        let (cursor, stopped, _) = draining(5);
        let flag = stopped.clone();
        let stream = Interruptible::new(cursor, move || flag.set(true));
        assert_eq!(stream.count(), 5);
        assert!(!stopped.get());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let source = (0..3).map(|i| Ok(row(i)));
        assert_eq!(Batched::new(source, 0).count(), 3);
    }
}
