//! Fixed-size tensor arena with bump-down persistent allocation.
//!
//! The arena is one contiguous byte region split at runtime into a
//! persistent zone that grows downward from the top and a working zone
//! below the boundary established at `begin`. Statically planned tensor
//! data lives in the working zone at build-time offsets that may alias
//! across non-overlapping lifetimes; persistent and scratch allocations
//! carve from the top. When a persistent request cannot fit the remaining
//! headroom it falls back to an individually heap-backed overflow
//! allocation, bounded by a fixed slot count.
//!
//! All handles are offsets into the region, never pointers, so bounds and
//! aliasing can be checked at resolution time.

use smallvec::SmallVec;

use crate::error::{Result, RuntimeError};

/// Alignment of persistent allocations, matching the build-time plan.
const PERSISTENT_ALIGN: usize = 16;

/// A byte range inside the arena region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan {
    pub offset: usize,
    pub len: usize,
}

impl ByteSpan {
    pub const fn new(offset: usize, len: usize) -> Self {
        ByteSpan { offset, len }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn overlaps(&self, other: &ByteSpan) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Resolved location of a tensor's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRef {
    /// Read-only constant data baked into the binary.
    Constant(&'static [u8]),
    /// Mutable data inside the arena region.
    Arena(ByteSpan),
}

/// A persistent or scratch allocation, tagged with its allocation class.
///
/// The class is exposed deliberately: callers that assume arena-relative
/// addressing can detect when a request was served from the heap fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRef {
    Arena(ByteSpan),
    Overflow { slot: usize, len: usize },
}

impl BufferRef {
    pub fn len(&self) -> usize {
        match *self {
            BufferRef::Arena(span) => span.len,
            BufferRef::Overflow { len, .. } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Index of a scratch buffer slot, in request order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchIndex(pub usize);

/// Heap buffer with word alignment, usable for typed element views.
#[derive(Debug)]
pub struct AlignedBuf {
    words: Box<[u64]>,
    len: usize,
}

impl AlignedBuf {
    /// Allocates a zeroed buffer of `len` bytes.
    pub fn new(len: usize) -> Self {
        AlignedBuf {
            words: vec![0u64; len.div_ceil(8)].into_boxed_slice(),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.len) }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr() as *mut u8, self.len) }
    }

    pub fn zero(&mut self) {
        self.words.fill(0);
    }
}

struct ScratchSlot {
    buffer: BufferRef,
}

/// Role tags used when resolving a batch of spans into live borrows.
enum SpanRole {
    Read(usize),
    Write(usize),
    Scratch,
}

/// Borrowed views produced by [`ArenaAllocator::resolve`].
#[derive(Debug)]
pub struct IoSpans<'a> {
    pub reads: SmallVec<[&'a [u8]; 4]>,
    pub writes: SmallVec<[&'a mut [u8]; 4]>,
    pub scratch: Option<&'a mut [u8]>,
}

/// Owns the arena region plus the scratch-slot and overflow tables.
pub struct ArenaAllocator {
    buf: AlignedBuf,
    /// Working-zone high-water mark; persistent allocations never cross it.
    boundary: usize,
    /// Persistent bump-down cursor, as an offset from the region base.
    cursor: usize,
    scratch: Vec<ScratchSlot>,
    overflow: Vec<AlignedBuf>,
    max_scratch: usize,
    max_overflow: usize,
}

impl ArenaAllocator {
    pub fn new(buf: AlignedBuf, max_scratch: usize, max_overflow: usize) -> Self {
        let cursor = buf.len();
        ArenaAllocator {
            buf,
            boundary: 0,
            cursor,
            scratch: Vec::with_capacity(max_scratch),
            overflow: Vec::with_capacity(max_overflow),
            max_scratch,
            max_overflow,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes left between the working-zone boundary and the persistent cursor.
    pub fn headroom(&self) -> usize {
        self.cursor - self.boundary
    }

    pub fn scratch_count(&self) -> usize {
        self.scratch.len()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow.len()
    }

    /// Zeroes the region and installs the working-zone boundary for a new
    /// execution session. Fails when the statically planned data does not
    /// fit the region.
    pub fn begin(&mut self, boundary: usize) -> Result<()> {
        if boundary > self.buf.len() {
            return Err(RuntimeError::ArenaTooSmall {
                needed: boundary,
                capacity: self.buf.len(),
            });
        }
        self.buf.zero();
        self.boundary = boundary;
        self.cursor = self.buf.len();
        Ok(())
    }

    /// Carves a zeroed, 16-byte-aligned allocation from the top of the
    /// region, falling back to a heap-backed overflow allocation when the
    /// request would cross the working-zone boundary.
    pub fn allocate_persistent(&mut self, bytes: usize) -> Result<BufferRef> {
        if let Some(aligned) = self.fit_persistent(bytes) {
            self.cursor = aligned;
            self.buf.bytes_mut()[aligned..aligned + bytes].fill(0);
            return Ok(BufferRef::Arena(ByteSpan::new(aligned, bytes)));
        }

        if self.overflow.len() >= self.max_overflow {
            return Err(RuntimeError::OverflowTableFull {
                requested: bytes,
                capacity: self.max_overflow,
            });
        }
        let slot = self.overflow.len();
        self.overflow.push(AlignedBuf::new(bytes));
        Ok(BufferRef::Overflow { slot, len: bytes })
    }

    fn fit_persistent(&self, bytes: usize) -> Option<usize> {
        let aligned = self.cursor.checked_sub(bytes)? & !(PERSISTENT_ALIGN - 1);
        (aligned >= self.boundary).then_some(aligned)
    }

    /// Records a runtime-sized scratch request, served through the
    /// persistent path. Slots are indexed in request order.
    pub fn request_scratch(&mut self, bytes: usize) -> Result<ScratchIndex> {
        if self.scratch.len() >= self.max_scratch {
            return Err(RuntimeError::ScratchTableFull {
                requested: bytes,
                capacity: self.max_scratch,
            });
        }
        let buffer = self.allocate_persistent(bytes)?;
        let index = self.scratch.len();
        self.scratch.push(ScratchSlot { buffer });
        Ok(ScratchIndex(index))
    }

    /// Looks up a previously requested scratch slot.
    pub fn get_scratch(&self, index: ScratchIndex) -> Result<BufferRef> {
        self.scratch
            .get(index.0)
            .map(|slot| slot.buffer)
            .ok_or(RuntimeError::UnknownScratchSlot { index: index.0 })
    }

    /// Drops every scratch slot and overflow allocation. Arena offsets
    /// consumed by scratch buffers become reusable on the next `begin`.
    pub fn reset_slots(&mut self) {
        self.scratch.clear();
        self.overflow.clear();
    }

    fn check_span(&self, span: ByteSpan) -> Result<()> {
        if span.end() > self.buf.len() {
            return Err(RuntimeError::SpanOutOfBounds {
                offset: span.offset,
                len: span.len,
                capacity: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Read-only view of an arena span.
    pub fn bytes(&self, span: ByteSpan) -> Result<&[u8]> {
        self.check_span(span)?;
        Ok(&self.buf.bytes()[span.offset..span.end()])
    }

    /// Mutable view of an arena span.
    pub fn bytes_mut(&mut self, span: ByteSpan) -> Result<&mut [u8]> {
        self.check_span(span)?;
        Ok(&mut self.buf.bytes_mut()[span.offset..span.end()])
    }

    /// Read-only view of any tensor data location.
    pub fn data_bytes(&self, data: DataRef) -> Result<&[u8]> {
        match data {
            DataRef::Constant(bytes) => Ok(bytes),
            DataRef::Arena(span) => self.bytes(span),
        }
    }

    /// Mutable view of a persistent or scratch allocation.
    pub fn buffer_mut(&mut self, buffer: BufferRef) -> Result<&mut [u8]> {
        match buffer {
            BufferRef::Arena(span) => self.bytes_mut(span),
            BufferRef::Overflow { slot, .. } => Ok(self.overflow[slot].bytes_mut()),
        }
    }

    /// Resolves a batch of read, write, and scratch locations into
    /// simultaneous borrows, verifying that every arena span involved is
    /// pairwise disjoint. Overlap is a plan defect and surfaces as an
    /// error instead of aliased views.
    pub fn resolve<'a>(
        &'a mut self,
        reads: &[DataRef],
        writes: &[ByteSpan],
        scratch: Option<BufferRef>,
    ) -> Result<IoSpans<'a>> {
        let mut spans: SmallVec<[(ByteSpan, SpanRole); 8]> = SmallVec::new();
        for (i, read) in reads.iter().enumerate() {
            if let DataRef::Arena(span) = read {
                self.check_span(*span)?;
                spans.push((*span, SpanRole::Read(i)));
            }
        }
        for (i, span) in writes.iter().enumerate() {
            self.check_span(*span)?;
            spans.push((*span, SpanRole::Write(i)));
        }
        let mut overflow_scratch = None;
        match scratch {
            Some(BufferRef::Arena(span)) => {
                self.check_span(span)?;
                spans.push((span, SpanRole::Scratch));
            }
            Some(BufferRef::Overflow { slot, .. }) => overflow_scratch = Some(slot),
            None => {}
        }

        spans.sort_by_key(|(span, _)| span.offset);
        for pair in spans.windows(2) {
            if pair[0].0.overlaps(&pair[1].0) {
                return Err(RuntimeError::SpanOverlap {
                    a: pair[0].0,
                    b: pair[1].0,
                });
            }
        }

        let mut reads_out: SmallVec<[Option<&'a [u8]>; 4]> =
            SmallVec::from_iter(reads.iter().map(|read| match read {
                DataRef::Constant(bytes) => Some(*bytes),
                DataRef::Arena(_) => None,
            }));
        let mut writes_out: SmallVec<[Option<&'a mut [u8]>; 4]> =
            SmallVec::from_iter(writes.iter().map(|_| None));
        let mut scratch_out: Option<&'a mut [u8]> = None;

        // Carve the sorted, disjoint spans off the region front-to-back.
        let mut rest: &'a mut [u8] = self.buf.bytes_mut();
        let mut consumed = 0usize;
        for (span, role) in spans {
            let (_, tail) = std::mem::take(&mut rest).split_at_mut(span.offset - consumed);
            let (piece, tail) = tail.split_at_mut(span.len);
            consumed = span.end();
            rest = tail;
            match role {
                SpanRole::Read(i) => reads_out[i] = Some(&*piece),
                SpanRole::Write(i) => writes_out[i] = Some(piece),
                SpanRole::Scratch => scratch_out = Some(piece),
            }
        }
        if let Some(slot) = overflow_scratch {
            scratch_out = Some(self.overflow[slot].bytes_mut());
        }

        Ok(IoSpans {
            reads: reads_out.into_iter().map(|r| r.expect("read resolved")).collect(),
            writes: writes_out
                .into_iter()
                .map(|w| w.expect("write resolved"))
                .collect(),
            scratch: scratch_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(capacity: usize) -> ArenaAllocator {
        let mut arena = ArenaAllocator::new(AlignedBuf::new(capacity), 4, 2);
        arena.begin(0).expect("empty plan fits");
        arena
    }

    #[test]
    fn persistent_allocations_bump_down_aligned() {
        let mut arena = arena(256);
        let first = arena.allocate_persistent(10).unwrap();
        let second = arena.allocate_persistent(10).unwrap();
        let (BufferRef::Arena(a), BufferRef::Arena(b)) = (first, second) else {
            panic!("expected arena-class allocations");
        };
        assert_eq!(a.offset % 16, 0);
        assert_eq!(b.offset % 16, 0);
        assert!(b.end() <= a.offset, "second allocation sits below the first");
    }

    #[test]
    fn boundary_crossing_falls_back_to_overflow() {
        let mut arena = ArenaAllocator::new(AlignedBuf::new(64), 4, 1);
        arena.begin(48).unwrap();
        let spill = arena.allocate_persistent(32).unwrap();
        assert!(matches!(spill, BufferRef::Overflow { slot: 0, len: 32 }));
        // Second spill exceeds the overflow table.
        let err = arena.allocate_persistent(32).unwrap_err();
        assert!(matches!(err, RuntimeError::OverflowTableFull { .. }));
    }

    #[test]
    fn scratch_slots_index_in_request_order() {
        let mut arena = arena(256);
        let a = arena.request_scratch(8).unwrap();
        let b = arena.request_scratch(8).unwrap();
        assert_eq!((a.0, b.0), (0, 1));
        assert_ne!(arena.get_scratch(a).unwrap(), arena.get_scratch(b).unwrap());
    }

    #[test]
    fn scratch_table_capacity_is_enforced() {
        let mut arena = ArenaAllocator::new(AlignedBuf::new(256), 2, 2);
        arena.begin(0).unwrap();
        arena.request_scratch(8).unwrap();
        arena.request_scratch(8).unwrap();
        let err = arena.request_scratch(8).unwrap_err();
        assert!(matches!(err, RuntimeError::ScratchTableFull { .. }));
    }

    #[test]
    fn begin_rejects_oversized_plan() {
        let mut arena = ArenaAllocator::new(AlignedBuf::new(64), 4, 4);
        let err = arena.begin(65).unwrap_err();
        assert!(matches!(err, RuntimeError::ArenaTooSmall { needed: 65, capacity: 64 }));
    }

    #[test]
    fn resolve_rejects_overlapping_spans() {
        let mut arena = arena(128);
        let err = arena
            .resolve(
                &[DataRef::Arena(ByteSpan::new(0, 16))],
                &[ByteSpan::new(8, 16)],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, RuntimeError::SpanOverlap { .. }));
    }

    #[test]
    fn resolve_returns_disjoint_views() {
        let mut arena = arena(128);
        arena.bytes_mut(ByteSpan::new(0, 4)).unwrap().fill(7);
        let io = arena
            .resolve(
                &[DataRef::Arena(ByteSpan::new(0, 4))],
                &[ByteSpan::new(64, 4)],
                None,
            )
            .unwrap();
        assert_eq!(io.reads[0], &[7, 7, 7, 7]);
        assert_eq!(io.writes[0].len(), 4);
    }

    #[test]
    fn reset_slots_clears_both_tables() {
        let mut arena = ArenaAllocator::new(AlignedBuf::new(64), 4, 4);
        arena.begin(48).unwrap();
        // 64 - 20 aligns down to 32, below the boundary: heap fallback.
        arena.request_scratch(20).unwrap();
        assert_eq!(arena.scratch_count(), 1);
        assert_eq!(arena.overflow_count(), 1);
        arena.reset_slots();
        assert_eq!(arena.scratch_count(), 0);
        assert_eq!(arena.overflow_count(), 0);
    }
}
