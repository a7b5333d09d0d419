//! K-way merge and concatenation of message sources.
//!
//! A [`MergeReader`] buffers at most one message per live source. Each call
//! to [`MergeReader::recv`] refills the empty slots, then returns the
//! smallest buffered message under the comparator, preferring the earlier
//! source on ties. Concatenation is the same walk with a comparator that
//! never reports "less", so the first live source always wins.
//!
//! A source is dead once it reports the end of its stream or fails. Failed
//! sources are logged and their errors kept in
//! [`MergeReader::source_errors`]; the merge carries on with the rest.

use super::error::ShuffleError;
use super::framing::MessageSource;
use tracing::{debug, warn};

/// Strict "less than" used to order buffered messages.
pub type LessFn<M> = Box<dyn Fn(&M, &M) -> bool + Send + Sync>;

/// Merges or concatenates several message sources into one stream.
pub struct MergeReader<M, S> {
    sources: Vec<Option<S>>,
    heads: Vec<Option<M>>,
    dead: Vec<S>,
    less: Option<LessFn<M>>,
    errors: Vec<(usize, ShuffleError)>,
}

impl<M, S> std::fmt::Debug for MergeReader<M, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeReader")
            .field("sources", &self.sources.len())
            .field("live", &self.live_sources())
            .field("dead", &self.dead.len())
            .field("sorted", &self.less.is_some())
            .field("errors", &self.errors.len())
            .finish()
    }
}

impl<M, S> MergeReader<M, S> {
    /// Sources that have not yet ended or failed.
    #[must_use]
    pub fn live_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.is_some()).count()
    }

    /// Errors raised by sources, tagged with the source's index.
    #[must_use]
    pub fn source_errors(&self) -> &[(usize, ShuffleError)] {
        &self.errors
    }
}

impl<M, S: MessageSource<M>> MergeReader<M, S> {
    /// Drain `sources` one after another, each to its end.
    pub fn concat(sources: impl IntoIterator<Item = S>) -> Self {
        Self::build(None, sources)
    }

    /// Merge `sources`, each already non-decreasing under `less`, into one
    /// non-decreasing stream.
    pub fn merge_sorted<F>(less: F, sources: impl IntoIterator<Item = S>) -> Self
    where
        F: Fn(&M, &M) -> bool + Send + Sync + 'static,
    {
        Self::build(Some(Box::new(less)), sources)
    }

    fn build(less: Option<LessFn<M>>, sources: impl IntoIterator<Item = S>) -> Self {
        let sources: Vec<Option<S>> = sources.into_iter().map(Some).collect();
        let heads = sources.iter().map(|_| None).collect();
        Self {
            sources,
            heads,
            dead: Vec::new(),
            less,
            errors: Vec::new(),
        }
    }

    /// Return the next message, or `Ok(None)` once every source is done.
    ///
    /// # Errors
    ///
    /// Never fails; failing sources are retired and recorded instead.
    pub fn recv(&mut self) -> Result<Option<M>, ShuffleError> {
        self.refill();

        let mut best: Option<usize> = None;
        for (i, head) in self.heads.iter().enumerate() {
            let Some(candidate) = head else {
                continue;
            };
            best = match best {
                None => Some(i),
                Some(b) => {
                    let current = self.heads[b].as_ref();
                    match (&self.less, current) {
                        (Some(less), Some(current)) if less(candidate, current) => Some(i),
                        _ => Some(b),
                    }
                }
            };
        }

        Ok(best.and_then(|i| self.heads[i].take()))
    }

    /// Close every source that has already ended. Only the last close error
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns the last error reported by a source's close.
    pub fn close(&mut self) -> Result<(), ShuffleError> {
        let mut last = Ok(());
        for mut source in self.dead.drain(..) {
            if let Err(e) = source.close() {
                last = Err(e);
            }
        }
        last
    }

    fn refill(&mut self) {
        for i in 0..self.sources.len() {
            if self.heads[i].is_some() {
                continue;
            }
            let Some(source) = self.sources[i].as_mut() else {
                continue;
            };
            match source.recv() {
                Ok(Some(message)) => self.heads[i] = Some(message),
                Ok(None) => {
                    debug!(source = i, "merge source exhausted");
                    self.retire(i);
                }
                Err(e) => {
                    warn!(source = i, error = %e, "merge source failed; treating it as exhausted");
                    self.errors.push((i, e));
                    self.retire(i);
                }
            }
        }
    }

    fn retire(&mut self, i: usize) {
        if let Some(source) = self.sources[i].take() {
            self.dead.push(source);
        }
    }
}

impl<M, S: MessageSource<M>> MessageSource<M> for MergeReader<M, S> {
    fn recv(&mut self) -> Result<Option<M>, ShuffleError> {
        MergeReader::recv(self)
    }

    fn close(&mut self) -> Result<(), ShuffleError> {
        MergeReader::close(self)
    }
}

impl<M, S: MessageSource<M>> Iterator for MergeReader<M, S> {
    type Item = M;

    fn next(&mut self) -> Option<M> {
        self.recv().ok().flatten()
    }
}
