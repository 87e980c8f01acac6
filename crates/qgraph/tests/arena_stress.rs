//! Randomized invariants for the arena's persistent allocation path.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use qgraph::arena::{AlignedBuf, ArenaAllocator};
use qgraph::{BufferRef, ByteSpan, RuntimeError};

#[test]
fn random_allocation_sequences_respect_the_plan() {
    let mut rng = StdRng::seed_from_u64(0x51ab);
    for _ in 0..200 {
        let capacity = rng.gen_range(64..4096usize);
        let boundary = rng.gen_range(0..=capacity);
        let max_overflow = rng.gen_range(1..8usize);
        let mut arena = ArenaAllocator::new(AlignedBuf::new(capacity), 4, max_overflow);
        arena.begin(boundary).expect("boundary within capacity");

        let mut spans: Vec<ByteSpan> = Vec::new();
        loop {
            let request = rng.gen_range(1..512usize);
            match arena.allocate_persistent(request) {
                Ok(BufferRef::Arena(span)) => {
                    assert_eq!(span.offset % 16, 0, "persistent allocations are 16-byte aligned");
                    assert!(span.offset >= boundary, "never crosses the working zone");
                    assert!(span.end() <= capacity);
                    assert!(
                        spans.iter().all(|other| !span.overlaps(other)),
                        "allocations never alias"
                    );
                    assert!(
                        arena.bytes(span).unwrap().iter().all(|&b| b == 0),
                        "allocations are zero-initialized"
                    );
                    spans.push(span);
                }
                Ok(BufferRef::Overflow { len, .. }) => {
                    assert_eq!(len, request);
                    assert!(arena.overflow_count() <= max_overflow);
                }
                Err(RuntimeError::OverflowTableFull { .. }) => break,
                Err(other) => panic!("unexpected arena error: {other}"),
            }
            if arena.overflow_count() == max_overflow {
                break;
            }
        }

        arena.reset_slots();
        assert_eq!(arena.overflow_count(), 0);
        assert_eq!(arena.scratch_count(), 0);
    }
}
