//! Index arithmetic for the reconstruction-surface ring (SPEC_FULL §3, §9).
//!
//! The ring itself (the VA-API surfaces) lives in the encoder; this module
//! only owns the `frame_counter mod RING_LEN` bookkeeping so it can be unit
//! tested without any VA-API dependency.

/// Minimum ring length for a single-reference P-frame scheme. A small power
/// of two, per the design notes; 2 is sufficient here.
pub const RING_LEN: usize = 2;

/// Returns `(current_slot, reference_slot)` for frame index `frame_counter`.
/// `reference_slot` is `None` for the first frame, since there is no prior
/// reconstruction to reference.
pub fn ring_slots(frame_counter: u64) -> (usize, Option<usize>) {
    let current = (frame_counter % RING_LEN as u64) as usize;
    let reference = frame_counter.checked_sub(1).map(|prev| (prev % RING_LEN as u64) as usize);
    (current, reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_has_no_reference() {
        let (current, reference) = ring_slots(0);
        assert_eq!(current, 0);
        assert_eq!(reference, None);
    }

    #[test]
    fn current_and_reference_are_always_distinct_over_ten_thousand_frames() {
        for i in 1..10_000u64 {
            let (current, reference) = ring_slots(i);
            let reference = reference.expect("non-zero frame index always has a reference");
            assert_ne!(current, reference, "frame {i}: current == reference");
            assert_eq!(current, (i % RING_LEN as u64) as usize);
        }
    }
}
