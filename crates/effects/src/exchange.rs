//! Buffer exchange: the only path into a processor's arena.
//!
//! Every handle handed out is tracked until it is freed exactly once.
//! Handles are stamped with the issuing exchange and a per-issue serial, so
//! foreign, stale, and already-freed handles are rejected with
//! [`NebulaError::InvalidHandle`] before anything reaches the processor.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use nebula_common::error::{NebulaError, NebulaResult};

use crate::processor::{BufferPtr, NativeEffectProcessor};

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque token for one live buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle {
    exchange_id: u64,
    serial: u64,
    ptr: BufferPtr,
    len: usize,
}

impl BufferHandle {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn ptr(&self) -> BufferPtr {
        self.ptr
    }
}

/// Lifetime counters for an exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    /// Buffers reserved through `allocate`.
    pub allocations: u64,
    /// Processor-produced buffers taken over through `adopt`.
    pub adoptions: u64,
    pub frees: u64,
    /// Handles issued and not yet freed.
    pub live: usize,
}

impl ExchangeStats {
    /// Every issued handle has been freed.
    pub fn is_balanced(&self) -> bool {
        self.live == 0 && self.frees == self.allocations + self.adoptions
    }
}

/// Tracks buffer ownership between the pipeline and one processor.
pub struct BufferExchange<'p> {
    processor: &'p mut dyn NativeEffectProcessor,
    id: u64,
    next_serial: u64,
    live: BTreeMap<u64, (BufferPtr, usize)>,
    stats: ExchangeStats,
}

impl<'p> BufferExchange<'p> {
    pub fn new(processor: &'p mut dyn NativeEffectProcessor) -> Self {
        Self {
            processor,
            id: NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed),
            next_serial: 1,
            live: BTreeMap::new(),
            stats: ExchangeStats::default(),
        }
    }

    /// Reserve `len` bytes in the processor arena.
    pub fn allocate(&mut self, len: usize) -> NebulaResult<BufferHandle> {
        let ptr = self
            .processor
            .malloc(len)
            .ok_or(NebulaError::ResourceExhausted { requested: len })?;
        self.stats.allocations += 1;
        Ok(self.track(ptr, len))
    }

    /// Take ownership of a buffer the processor allocated itself.
    pub fn adopt(&mut self, ptr: BufferPtr, len: usize) -> NebulaResult<BufferHandle> {
        if self.live.values().any(|(p, _)| *p == ptr) {
            return Err(NebulaError::invalid_handle(format!(
                "processor returned pointer {ptr:#x} which is already tracked"
            )));
        }
        self.stats.adoptions += 1;
        Ok(self.track(ptr, len))
    }

    /// Copy pixels into a live buffer.
    pub fn write(&mut self, handle: &BufferHandle, data: &[u8]) -> NebulaResult<()> {
        self.check(handle)?;
        if data.len() != handle.len {
            return Err(NebulaError::invalid_handle(format!(
                "write of {} bytes into a {}-byte buffer",
                data.len(),
                handle.len
            )));
        }
        self.processor.write(handle.ptr, data)
    }

    /// Copy `len` bytes out of a live buffer.
    pub fn read_back(&self, handle: &BufferHandle, len: usize) -> NebulaResult<Vec<u8>> {
        self.check(handle)?;
        if len > handle.len {
            return Err(NebulaError::invalid_handle(format!(
                "read of {len} bytes from a {}-byte buffer",
                handle.len
            )));
        }
        self.processor.read(handle.ptr, len)
    }

    /// Release a buffer. A second free of the same handle is rejected.
    pub fn free(&mut self, handle: BufferHandle) -> NebulaResult<()> {
        self.check(&handle)?;
        self.live.remove(&handle.serial);
        self.processor.free(handle.ptr);
        self.stats.frees += 1;
        self.stats.live = self.live.len();
        Ok(())
    }

    /// Run `f`, then free every handle it left live, whether it succeeded or not.
    pub fn scope<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> NebulaResult<T>,
    ) -> NebulaResult<T> {
        let first_serial = self.next_serial;
        let result = f(self);

        let leftovers: Vec<u64> = self.live.range(first_serial..).map(|(s, _)| *s).collect();
        if !leftovers.is_empty() {
            tracing::trace!(count = leftovers.len(), "Releasing buffers left by scope");
        }
        for serial in leftovers {
            if let Some((ptr, _)) = self.live.remove(&serial) {
                self.processor.free(ptr);
                self.stats.frees += 1;
            }
        }
        self.stats.live = self.live.len();
        result
    }

    /// Free every live handle. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let live = std::mem::take(&mut self.live);
        for (ptr, _) in live.values() {
            self.processor.free(*ptr);
            self.stats.frees += 1;
        }
        self.stats.live = 0;
        if !live.is_empty() {
            tracing::debug!(count = live.len(), "Released live buffers");
        }
        live.len()
    }

    pub fn stats(&self) -> ExchangeStats {
        self.stats
    }

    /// The processor behind this exchange, for operations on tracked buffers.
    pub(crate) fn processor(&mut self) -> &mut dyn NativeEffectProcessor {
        &mut *self.processor
    }

    /// Fail unless `handle` was issued here and is still live.
    pub(crate) fn check(&self, handle: &BufferHandle) -> NebulaResult<()> {
        if handle.exchange_id != self.id {
            return Err(NebulaError::invalid_handle(format!(
                "handle {} belongs to another exchange",
                handle.serial
            )));
        }
        match self.live.get(&handle.serial) {
            Some((ptr, len)) if *ptr == handle.ptr && *len == handle.len => Ok(()),
            _ => Err(NebulaError::invalid_handle(format!(
                "handle {} is not live (already freed?)",
                handle.serial
            ))),
        }
    }

    fn track(&mut self, ptr: BufferPtr, len: usize) -> BufferHandle {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.live.insert(serial, (ptr, len));
        self.stats.live = self.live.len();
        BufferHandle {
            exchange_id: self.id,
            serial,
            ptr,
            len,
        }
    }
}

impl Drop for BufferExchange<'_> {
    fn drop(&mut self) {
        let leaked = self.release_all();
        if leaked > 0 {
            tracing::warn!(leaked, "Buffer exchange dropped with live buffers");
        }
    }
}
