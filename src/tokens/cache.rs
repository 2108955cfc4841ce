//! Bounded encoder cache with single-flight construction.

use super::counter::{EncoderHandle, EncoderLoader, TiktokenLoader};
use crate::Result;
use lru::LruCache;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

type Slot = Arc<OnceCell<EncoderHandle>>;

/// Model name → encoder, evicted least-recently-used first.
///
/// The lock only guards lookup; construction happens outside it inside a
/// pending `OnceCell` slot, so concurrent misses for one model build the
/// encoder once while misses for other models proceed in parallel. Only
/// constructed encoders enter the LRU and count toward capacity.
pub struct EncoderCache {
    loader: Arc<dyn EncoderLoader>,
    slots: Mutex<Slots>,
}

struct Slots {
    ready: LruCache<String, EncoderHandle>,
    pending: HashMap<String, Slot>,
}

impl EncoderCache {
    pub const DEFAULT_CAPACITY: usize = 10;

    pub fn new(capacity: usize) -> Self {
        Self::with_loader(capacity, Arc::new(TiktokenLoader::new()))
    }

    pub fn with_loader(capacity: usize, loader: Arc<dyn EncoderLoader>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            loader,
            slots: Mutex::new(Slots {
                ready: LruCache::new(capacity),
                pending: HashMap::new(),
            }),
        }
    }

    /// Returns the cached encoder for `model`, constructing it on first use.
    /// A failed construction leaves nothing behind; the next call retries.
    pub fn get(&self, model: &str) -> Result<EncoderHandle> {
        let slot = {
            let mut slots = self.lock();
            if let Some(handle) = slots.ready.get(model) {
                return Ok(handle.clone());
            }
            slots
                .pending
                .entry(model.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = slot.get_or_try_init(|| self.loader.load(model)).cloned();

        let mut slots = self.lock();
        if slots
            .pending
            .get(model)
            .is_some_and(|pending| Arc::ptr_eq(pending, &slot))
        {
            slots.pending.remove(model);
        }
        if let Ok(handle) = &result {
            if !slots.ready.contains(model) {
                slots.ready.put(model.to_string(), handle.clone());
            }
        }
        result
    }

    /// Whether a constructed encoder for `model` is resident. Does not touch LRU order.
    pub fn contains(&self, model: &str) -> bool {
        self.lock().ready.contains(model)
    }

    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().ready.cap().get()
    }

    // A poisoned lock still holds a consistent map.
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EncoderCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
