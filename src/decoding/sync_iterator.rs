//! Row-decoding iterator that resolves thin rows inline.

use std::iter::Fuse;
use std::sync::Arc;
use crate::decoding::row_decoder::RowDecoder;
use crate::retrieval::single_key::SingleKeyRetrieval;
use crate::row_model::GeoWaveRow;

/// Pull iterator that decodes each row on the calling thread, in scan order.
///
/// Thin rows are resolved with one blocking point lookup each. With no retrieval configured
/// every row is decoded from its own field data.
pub struct SyncDecodingIterator<T, I: Iterator<Item = GeoWaveRow>> {
    source: Fuse<I>,
    decoder: RowDecoder<T>,
    retrieval: Option<Arc<SingleKeyRetrieval>>,
    next_value: Option<T>,
}

impl<T, I> SyncDecodingIterator<T, I>
where
    T: Send + 'static,
    I: Iterator<Item = GeoWaveRow>,
{
    pub fn new(source: I, decoder: RowDecoder<T>, retrieval: Option<Arc<SingleKeyRetrieval>>) -> Self {
        Self {
            source: source.fuse(),
            decoder,
            retrieval,
            next_value: None,
        }
    }

    pub fn has_next(&mut self) -> bool {
        if self.next_value.is_none() {
            self.next_value = self.find_next();
        }
        self.next_value.is_some()
    }

    fn find_next(&mut self) -> Option<T> {
        let retrieval = self.retrieval.as_deref();
        self.source
            .by_ref()
            .find_map(|row| self.decoder.decode_inline(&row, retrieval))
    }
}

impl<T, I> Iterator for SyncDecodingIterator<T, I>
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
