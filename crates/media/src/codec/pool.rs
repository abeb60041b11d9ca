//! Accounting for the device's shared codec instance budget.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use framecut_common::{FramecutError, FramecutResult};

#[derive(Debug)]
struct PoolInner {
    max_instances: usize,
    in_use: AtomicUsize,
}

/// Counts live hardware codec instances against a fixed device limit.
///
/// Every decoder and encoder holds a [`CodecLease`]; creating one past the
/// limit fails with [`FramecutError::DecoderExhausted`].
#[derive(Debug, Clone)]
pub struct HardwareCodecPool {
    inner: Arc<PoolInner>,
}

impl HardwareCodecPool {
    pub fn new(max_instances: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                max_instances,
                in_use: AtomicUsize::new(0),
            }),
        }
    }

    pub fn max_instances(&self) -> usize {
        self.inner.max_instances
    }

    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.max_instances().saturating_sub(self.in_use())
    }

    /// Reserve one instance for `purpose`.
    pub fn acquire(&self, purpose: &str) -> FramecutResult<CodecLease> {
        let max = self.inner.max_instances;
        let acquired = self
            .inner
            .in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            });

        match acquired {
            Ok(previous) => {
                tracing::trace!(purpose, in_use = previous + 1, max, "Codec instance acquired");
                Ok(CodecLease {
                    inner: Arc::clone(&self.inner),
                    released: false,
                })
            }
            Err(in_use) => Err(FramecutError::decoder_exhausted(format!(
                "cannot create {}: {} of {} codec instances in use",
                purpose, in_use, max
            ))),
        }
    }
}

/// One reserved codec instance. Returned to the pool on drop.
#[derive(Debug)]
pub struct CodecLease {
    inner: Arc<PoolInner>,
    released: bool,
}

impl CodecLease {
    /// Return the instance now rather than at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.in_use.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for CodecLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// A codec paired with the lease that pays for it.
pub struct CodecHandle<C> {
    codec: C,
    lease: Option<CodecLease>,
}

impl<C> CodecHandle<C> {
    pub fn new(codec: C, lease: CodecLease) -> Self {
        Self {
            codec,
            lease: Some(lease),
        }
    }

    /// Wrap a codec that does not count against the pool.
    pub fn unpooled(codec: C) -> Self {
        Self { codec, lease: None }
    }

    pub fn is_pooled(&self) -> bool {
        self.lease.is_some()
    }

    /// Tear down the codec and return its instance to the pool.
    pub fn release(self) {
        let Self { codec, lease } = self;
        drop(codec);
        if let Some(lease) = lease {
            lease.release();
        }
    }
}

impl<C> Deref for CodecHandle<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.codec
    }
}

impl<C> DerefMut for CodecHandle<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.codec
    }
}
