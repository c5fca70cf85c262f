use super::*;
use bytes::Bytes;

#[test]
fn push_assigns_dense_increasing_seq() {
    let mut ring = OutputRing::new(1024);
    let seqs: Vec<u64> = (0..5).map(|i| ring.push(Bytes::from(format!("chunk-{i}")))).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
}

#[test]
fn evicts_oldest_frames_once_over_budget() {
    let mut ring = OutputRing::new(10);
    ring.push(Bytes::from_static(b"12345"));
    ring.push(Bytes::from_static(b"12345"));
    ring.push(Bytes::from_static(b"12345"));

    assert!(ring.oldest_seq() > 0);
    assert!(!ring.can_replay_from(0));
}

#[test]
fn replay_from_returns_frames_after_cursor_in_order() {
    let mut ring = OutputRing::new(1024);
    for i in 0..3 {
        ring.push(Bytes::from(format!("{i}")));
    }
    let replay = ring.replay_from(0);
    assert_eq!(replay.len(), 2);
    assert_eq!(replay[0].0, 1);
    assert_eq!(replay[1].0, 2);
}

#[test]
fn can_replay_from_current_seq_even_when_ring_empty() {
    let ring = OutputRing::new(1024);
    assert!(ring.can_replay_from(0));
}

use proptest::prelude::*;

proptest! {
    // Frame delivery order: whatever mix of chunk sizes and ring budgets,
    // push assigns dense seqs and any replay slice is strictly increasing
    // with no gaps, starting at the retained floor.
    #[test]
    fn replay_is_strictly_increasing_and_gap_free(
        sizes in proptest::collection::vec(1usize..64, 1..40),
        capacity in 16usize..256,
    ) {
        let mut ring = OutputRing::new(capacity);
        for (i, size) in sizes.iter().enumerate() {
            let seq = ring.push(bytes::Bytes::from(vec![b'x'; *size]));
            prop_assert_eq!(seq, i as u64);
        }

        let oldest = ring.oldest_seq();
        let replay = ring.replay_from(oldest.saturating_sub(1));
        if oldest < ring.next_seq() {
            prop_assert_eq!(replay.first().map(|(seq, _)| *seq), Some(oldest));
        }
        for pair in replay.windows(2) {
            prop_assert_eq!(pair[1].0, pair[0].0 + 1);
        }
        prop_assert_eq!(replay.last().map(|(seq, _)| *seq + 1).unwrap_or(oldest), ring.next_seq());
    }
}
