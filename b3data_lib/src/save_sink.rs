//! Buffered, threshold-driven persistence.
//!
//! Producers push items one at a time; the sink hands them to the persist
//! callback in batches of `threshold`. The final partial batch is written by
//! [`SaveSink::finalize`].

/// Errors raised when building a sink.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SinkError {
    #[error("threshold must be at least 1")]
    InvalidThreshold,
}

type PersistFn<'a, T, E> = Box<dyn FnMut(&[T]) -> Result<(), E> + Send + 'a>;

/// Generic flush-on-threshold sink.
///
/// Not thread-safe: concurrent producers must funnel items through a single
/// owner (the pool's result channel does this).
pub struct SaveSink<'a, T, E> {
    persist: Option<PersistFn<'a, T, E>>,
    threshold: usize,
    buffer: Vec<T>,
}

impl<'a, T, E> SaveSink<'a, T, E> {
    pub fn new<F>(persist: F, threshold: usize) -> Result<Self, SinkError>
    where
        F: FnMut(&[T]) -> Result<(), E> + Send + 'a,
    {
        if threshold == 0 {
            return Err(SinkError::InvalidThreshold);
        }
        Ok(Self {
            persist: Some(Box::new(persist)),
            threshold,
            buffer: Vec::with_capacity(threshold),
        })
    }

    /// A sink without a callback. Items are accepted and discarded on flush.
    pub fn noop(threshold: usize) -> Result<Self, SinkError> {
        if threshold == 0 {
            return Err(SinkError::InvalidThreshold);
        }
        Ok(Self {
            persist: None,
            threshold,
            buffer: Vec::new(),
        })
    }

    /// Buffers `item`, flushing once the buffer reaches the threshold.
    /// `None` is ignored so filtering producers can pass their output straight through.
    pub fn handle(&mut self, item: Option<T>) -> Result<(), E> {
        let Some(item) = item else {
            return Ok(());
        };
        self.buffer.push(item);
        if self.buffer.len() >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Persists the pending buffer. On callback failure the buffer is kept
    /// so the caller can retry.
    pub fn flush(&mut self) -> Result<(), E> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if let Some(persist) = self.persist.as_mut() {
            persist(&self.buffer)?;
        }
        self.buffer.clear();
        Ok(())
    }

    /// Writes whatever is still pending. Call once at end of stream.
    pub fn finalize(&mut self) -> Result<(), E> {
        self.flush()
    }

    /// Number of buffered items not yet persisted.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
