//! Row-decoding iterator that resolves thin rows through batched retrieval.
//!
//! Rows that carry their own field data are decoded and returned immediately. Rows that need
//! a data-index lookup are registered with the shared [`BatchedRetrieval`]; a continuation
//! task decodes each one once its batch resolves and pushes the value onto this iterator's
//! completion queue. The pull side drains both streams, so the scanning thread keeps pulling
//! (and submitting) rows while earlier batches are still in flight.
//!
//! # Ordering
//!
//! Output order is not scan order once any row is deferred: deferred values surface when
//! their fetch completes. Every row that survives filtering and decoding is emitted exactly
//! once, and iteration always terminates.
//!
//! # End of stream
//!
//! The completion queue is a bounded `mpsc` channel. The iterator holds one sender until its
//! row source is exhausted and every continuation task holds a clone, so the channel closes
//! exactly when the source is done and the last deferred row has been delivered.

use std::iter::Fuse;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use futures::future::BoxFuture;
use futures::task::noop_waker_ref;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::mpsc;
use crate::decoding::row_decoder::{Decoded, RowDecoder};
use crate::error::{Result, RetrievalError};
use crate::retrieval::batched::BatchedRetrieval;
use crate::row_model::GeoWaveRow;

/// Pull iterator over decoded rows, backed by batched data-index retrieval.
///
/// This is a blocking iterator: once its row source is exhausted it waits for outstanding
/// lookups on the completion queue. Drive it from a plain thread or
/// `tokio::task::spawn_blocking`, never directly from an async task.
///
/// # Panics
///
/// Pulling from this iterator inside an asynchronous execution context panics (the completion
/// queue's blocking receive refuses to block a runtime worker).
pub struct AsyncDecodingIterator<T, I: Iterator<Item = GeoWaveRow>> {
    source: Fuse<I>,
    decoder: RowDecoder<T>,
    retrieval: Arc<BatchedRetrieval>,
    sender: Option<mpsc::Sender<T>>,
    receiver: mpsc::Receiver<T>,
    outstanding_futures: Arc<AtomicUsize>,
    next_value: Option<T>,
    initiated: bool,
    exhaustion_notified: bool,
    finished: bool,
}

impl<T, I> AsyncDecodingIterator<T, I>
where
    T: Send + 'static,
    I: Iterator<Item = GeoWaveRow>,
{
    /// Wrap a row source. `queue_capacity` bounds the completion queue (minimum 1).
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidConfig`] if the retrieval runs on a current-thread
    /// runtime. Nothing drives such a runtime while this iterator blocks on its completion
    /// queue, so deferred rows would never arrive.
    pub fn new(
        source: I,
        decoder: RowDecoder<T>,
        retrieval: Arc<BatchedRetrieval>,
        queue_capacity: usize,
    ) -> Result<Self> {
        if retrieval.runtime().runtime_flavor() == RuntimeFlavor::CurrentThread {
            return Err(RetrievalError::invalid_config(
                "asynchronous decoding needs a multi-threaded runtime for batched retrieval",
            ));
        }
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        Ok(Self {
            source: source.fuse(),
            decoder,
            retrieval,
            sender: Some(sender),
            receiver,
            outstanding_futures: Arc::new(AtomicUsize::new(0)),
            next_value: None,
            initiated: false,
            exhaustion_notified: false,
            finished: false,
        })
    }

    /// Deferred rows whose lookup or decode has not finished yet.
    pub fn outstanding_futures(&self) -> usize {
        self.outstanding_futures.load(Ordering::Acquire)
    }

    /// Whether another value is available, blocking on outstanding lookups if necessary.
    ///
    /// The first call registers this iterator with the shared retrieval.
    pub fn has_next(&mut self) -> bool {
        if !self.initiated {
            self.initiated = true;
            self.retrieval.notify_iterator_initiated();
        }
        if self.next_value.is_none() && !self.finished {
            self.next_value = self.find_next();
            if self.next_value.is_none() {
                self.finished = true;
            }
        }
        self.next_value.is_some()
    }

    fn find_next(&mut self) -> Option<T> {
        // Deferred rows that already resolved go first
        if let Ok(value) = self.receiver.try_recv() {
            return Some(value);
        }

        while let Some(row) = self.source.next() {
            match self.decoder.decode_or_defer(row, &self.retrieval) {
                Decoded::Ready(value) => return Some(value),
                Decoded::Skipped => {}
                Decoded::Pending(pending) => {
                    if let Some(value) = self.defer(pending) {
                        return Some(value);
                    }
                }
            }
        }

        self.source_exhausted();

        match self.receiver.blocking_recv() {
            Some(value) => Some(value),
            None => {
                let outstanding = self.outstanding_futures();
                if outstanding > 0 {
                    tracing::error!(
                        outstanding,
                        "completion queue closed with lookups still outstanding, ending scan early"
                    );
                }
                None
            }
        }
    }

    /// Take the fast path if the lookup has already resolved, otherwise hand the future to a
    /// continuation task that feeds the completion queue.
    fn defer(&mut self, mut pending: BoxFuture<'static, Option<T>>) -> Option<T> {
        let mut cx = Context::from_waker(noop_waker_ref());
        if let Poll::Ready(resolved) = pending.as_mut().poll(&mut cx) {
            return resolved;
        }

        let Some(sender) = self.sender.clone() else {
            tracing::error!("row deferred after the row source was exhausted, dropping it");
            return None;
        };
        self.outstanding_futures.fetch_add(1, Ordering::AcqRel);
        let outstanding = Arc::clone(&self.outstanding_futures);

        self.retrieval.runtime().spawn(async move {
            if let Some(value) = pending.await {
                if sender.send(value).await.is_err() {
                    tracing::debug!("iterator dropped before a deferred row resolved, discarding it");
                }
            }
            outstanding.fetch_sub(1, Ordering::AcqRel);
        });
        None
    }

    /// Runs once: releases this iterator's queue sender and reports exhaustion, which may
    /// trigger the final flush of every partial batch.
    fn source_exhausted(&mut self) {
        if self.exhaustion_notified {
            return;
        }
        self.exhaustion_notified = true;
        self.sender = None;
        self.retrieval.notify_iterator_exhausted();
    }
}

impl<T, I> Iterator for AsyncDecodingIterator<T, I>
where
    T: Send + 'static,
    I: Iterator<Item = GeoWaveRow>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.has_next() {
            self.next_value.take()
        } else {
            None
        }
    }
}

impl<T, I: Iterator<Item = GeoWaveRow>> Drop for AsyncDecodingIterator<T, I> {
    fn drop(&mut self) {
        // An abandoned scan still has to release the shared retrieval, or other iterators'
        // partial batches would never flush
        if self.initiated && !self.exhaustion_notified {
            self.exhaustion_notified = true;
            self.retrieval.notify_iterator_exhausted();
        }
    }
}
