//! Device memory views and the call-scoped scratch allocator.

use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;

use batchmat_core::Result;

/// A typed view of device memory: base address plus element extent.
///
/// Does not own the memory it points at.
pub struct DeviceMemory<T> {
    addr: u64,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DeviceMemory<T> {
    pub fn new(addr: u64, len: usize) -> Self {
        Self {
            addr,
            len,
            _marker: PhantomData,
        }
    }

    /// Zero-capacity stub.
    pub fn null() -> Self {
        Self::new(0, 0)
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_null(&self) -> bool {
        self.addr == 0
    }

    pub fn size_in_bytes(&self) -> usize {
        self.len * size_of::<T>()
    }

    /// Sub-view of `len` elements starting `offset` elements in.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        debug_assert!(offset + len <= self.len, "device slice out of range");
        Self::new(self.addr + (offset * size_of::<T>()) as u64, len)
    }
}

impl<T> Clone for DeviceMemory<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DeviceMemory<T> {}

impl<T> PartialEq for DeviceMemory<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr && self.len == other.len
    }
}

impl<T> Eq for DeviceMemory<T> {}

impl<T> fmt::Debug for DeviceMemory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceMemory({:#x}, len={})", self.addr, self.len)
    }
}

/// Device-scoped temporary allocator supplied by the host framework.
pub trait TempAllocator {
    /// Owning handle for one temporary allocation. Dropping it frees the
    /// memory (stream-ordered on real devices).
    type Buffer;

    fn allocate_temp(&self, byte_size: usize) -> Result<Self::Buffer>;

    fn device_memory(buffer: &Self::Buffer) -> DeviceMemory<u8>;
}

/// Scratch space handed to a BLAS stream for the duration of one launch.
pub trait ScratchAllocator {
    /// Upper bound on a single allocation, if any.
    fn memory_limit_in_bytes(&self) -> Option<usize> {
        None
    }

    /// Allocate `byte_size` bytes. Never fails: on exhaustion this returns
    /// a zero-size stub and the stream must cope without scratch.
    fn allocate_bytes(&mut self, byte_size: usize) -> DeviceMemory<u8>;
}

/// Adapter from a framework [`TempAllocator`] to a [`ScratchAllocator`].
///
/// Holds every buffer it hands out until it is dropped, so temporaries stay
/// alive for the whole (asynchronous) launch.
pub struct BlasScratchAllocator<'a, A: TempAllocator> {
    allocator: &'a A,
    held: Vec<A::Buffer>,
    failed: usize,
}

impl<'a, A: TempAllocator> BlasScratchAllocator<'a, A> {
    pub fn new(allocator: &'a A) -> Self {
        Self {
            allocator,
            held: Vec::new(),
            failed: 0,
        }
    }

    /// Buffers currently retained.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Allocation requests answered with a stub.
    pub fn failed(&self) -> usize {
        self.failed
    }
}

impl<A: TempAllocator> ScratchAllocator for BlasScratchAllocator<'_, A> {
    fn allocate_bytes(&mut self, byte_size: usize) -> DeviceMemory<u8> {
        match self.allocator.allocate_temp(byte_size) {
            Ok(buffer) => {
                let mem = A::device_memory(&buffer);
                self.held.push(buffer);
                mem
            }
            Err(e) => {
                self.failed += 1;
                tracing::warn!(byte_size, error = %e, "scratch allocation failed, continuing without scratch");
                DeviceMemory::null()
            }
        }
    }
}

impl<A: TempAllocator> Drop for BlasScratchAllocator<'_, A> {
    fn drop(&mut self) {
        if !self.held.is_empty() {
            tracing::trace!(buffers = self.held.len(), "releasing scratch");
        }
    }
}
