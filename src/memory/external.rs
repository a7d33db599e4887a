//! Ledger for decoded pixel buffers held outside ordinary bookkeeping

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Running total of bytes held by decoded image buffers
#[derive(Debug, Default)]
pub struct ExternalMemory {
    current: AtomicU64,
    peak: AtomicU64,
}

impl ExternalMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `size` bytes until the returned guard is dropped
    pub fn track(self: &Arc<Self>, size: u64) -> ExternalAllocation {
        let current = self.current.fetch_add(size, Ordering::Relaxed) + size;
        self.peak.fetch_max(current, Ordering::Relaxed);
        trace!("External +{} bytes (now {})", size, current);

        ExternalAllocation {
            ledger: Arc::clone(self),
            size,
        }
    }

    /// Bytes currently registered
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Highest value `current` has reached
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    fn release(&self, size: u64) {
        // Never wraps below zero
        let _ = self.current.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
            Some(current.saturating_sub(size))
        });
    }
}

/// RAII registration of one buffer in an [`ExternalMemory`] ledger
#[derive(Debug)]
pub struct ExternalAllocation {
    ledger: Arc<ExternalMemory>,
    size: u64,
}

impl ExternalAllocation {
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for ExternalAllocation {
    fn drop(&mut self) {
        self.ledger.release(self.size);
    }
}

/// Size in bytes of a decoded image's pixel buffer
pub fn image_buffer_size(image: &image::DynamicImage) -> u64 {
    image.as_bytes().len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_released_on_drop() {
        let ledger = Arc::new(ExternalMemory::new());

        {
            let _a = ledger.track(50 * 1024 * 1024);
            let b = ledger.track(10);
            assert_eq!(b.size(), 10);
            assert_eq!(ledger.current(), 50 * 1024 * 1024 + 10);
        }

        assert_eq!(ledger.current(), 0);
        assert_eq!(ledger.peak(), 50 * 1024 * 1024 + 10);
    }

    #[test]
    fn test_image_buffer_size() {
        let image = image::DynamicImage::new_rgba8(10, 4);
        assert_eq!(image_buffer_size(&image), 10 * 4 * 4);
    }
}
