//! Byte ring buffer with Ogg page alignment
//!
//! Each mount point keeps one `OggRing` holding the most recent stretch of
//! the live stream. New listeners are seeded from it so playback can start
//! mid-broadcast, which only works if the replayed bytes begin on an Ogg
//! page boundary ("OggS").

use crate::constants::OGG_PAGE_MARKER;

/// Fixed-capacity byte ring that remembers where the last Ogg page began.
///
/// Positions are tracked as absolute stream offsets (total bytes ever
/// written), not ring indices. A recorded page marker is only usable while
/// its bytes are still retained; once the ring wraps past it, the offset
/// arithmetic reports it stale and it is ignored.
///
/// No internal locking. The owning mount state guards the ring together
/// with the rest of its fields.
pub struct OggRing {
    storage: Vec<u8>,
    /// Ring index the next byte lands at
    write_pos: usize,
    /// Retained byte count, saturating at capacity
    size: usize,
    /// Total bytes written over the ring's lifetime
    total_written: u64,
    /// Absolute stream offset of the last observed "OggS", if any
    last_marker: Option<u64>,
}

impl OggRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            storage: vec![0u8; capacity],
            write_pos: 0,
            size: 0,
            total_written: 0,
            last_marker: None,
        }
    }

    /// Append `data`, overwriting the oldest bytes once full.
    ///
    /// Scans the chunk for "OggS" and records the last occurrence. A marker
    /// split across two `write` calls is not detected here; the seed path
    /// rescans the whole retained region and still finds it.
    pub fn write(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if let Some(idx) = find_last_marker(data) {
            self.last_marker = Some(self.total_written + idx as u64);
        }

        let capacity = self.storage.len();
        let mut offset = 0;
        while offset < data.len() {
            let run = (capacity - self.write_pos).min(data.len() - offset);
            self.storage[self.write_pos..self.write_pos + run]
                .copy_from_slice(&data[offset..offset + run]);
            self.write_pos = (self.write_pos + run) % capacity;
            offset += run;
        }

        self.total_written += data.len() as u64;
        self.size = (self.size + data.len()).min(capacity);
    }

    /// Up to `max_bytes` of the most recent data.
    ///
    /// Starts at the last page marker when one is retained and fits within
    /// `max_bytes`; otherwise returns the plain tail. Empty ring gives an
    /// empty result.
    pub fn recent(&self, max_bytes: usize) -> Vec<u8> {
        let avail = self.size.min(max_bytes);
        if avail == 0 {
            return Vec::new();
        }
        let take = match self.marker_age() {
            Some(age) if age <= max_bytes => age,
            _ => avail,
        };
        self.copy_tail(take)
    }

    /// Every retained byte, oldest first.
    pub fn all_data(&self) -> Vec<u8> {
        self.copy_tail(self.size)
    }

    /// The retained bytes from the last Ogg page boundary to the write
    /// cursor. Falls back to everything retained when no marker is present.
    ///
    /// Rescans the linearized region, so it also catches markers that
    /// straddled a `write` call boundary.
    pub fn page_aligned_tail(&self) -> Vec<u8> {
        let data = self.all_data();
        match find_last_marker(&data) {
            Some(idx) => data[idx..].to_vec(),
            None => data,
        }
    }

    /// The bytes written after absolute offset `offset`, oldest first.
    ///
    /// `None` when the range is not fully retained: the ring wrapped past
    /// it, or the offset predates a `clear` that reset the counter. The
    /// caller falls back to an aligned seed in that case.
    pub fn since(&self, offset: u64) -> Option<Vec<u8>> {
        let span = self.total_written.checked_sub(offset)?;
        if span > self.size as u64 {
            return None;
        }
        Some(self.copy_tail(span as usize))
    }

    /// Reset to empty. Old contents stay in the allocation as garbage.
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.size = 0;
        self.total_written = 0;
        self.last_marker = None;
    }

    /// Retained byte count
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Total bytes written since creation or the last `clear`
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Distance in bytes from the last marker to the write cursor, if the
    /// marker's bytes are still retained
    fn marker_age(&self) -> Option<usize> {
        let marker = self.last_marker?;
        let age = self.total_written - marker;
        if age <= self.size as u64 {
            Some(age as usize)
        } else {
            None
        }
    }

    /// Copy the newest `count` bytes, joining the two regions when the
    /// ring has wrapped
    fn copy_tail(&self, count: usize) -> Vec<u8> {
        if count == 0 {
            return Vec::new();
        }
        let capacity = self.storage.len();
        let start = (self.write_pos + capacity - count) % capacity;
        let mut out = Vec::with_capacity(count);
        if start + count <= capacity {
            out.extend_from_slice(&self.storage[start..start + count]);
        } else {
            out.extend_from_slice(&self.storage[start..]);
            out.extend_from_slice(&self.storage[..count - (capacity - start)]);
        }
        out
    }
}

/// Index of the last "OggS" in `data`, if any
fn find_last_marker(data: &[u8]) -> Option<usize> {
    if data.len() < OGG_PAGE_MARKER.len() {
        return None;
    }
    data.windows(OGG_PAGE_MARKER.len())
        .rposition(|window| window == OGG_PAGE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ring() {
        let ring = OggRing::new(16);
        assert!(ring.is_empty());
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.capacity(), 16);
        assert!(ring.all_data().is_empty());
        assert!(ring.recent(100).is_empty());
        assert!(ring.page_aligned_tail().is_empty());
    }

    #[test]
    fn test_write_and_read_back() {
        let mut ring = OggRing::new(64);
        ring.write(b"hello world");
        assert_eq!(ring.len(), 11);
        assert_eq!(ring.all_data(), b"hello world");
        assert_eq!(ring.total_written(), 11);
    }

    #[test]
    fn test_wrap_around_keeps_newest() {
        let mut ring = OggRing::new(8);
        ring.write(b"abcdef");
        ring.write(b"ghij");
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.all_data(), b"cdefghij");
        assert_eq!(ring.total_written(), 10);
    }

    #[test]
    fn test_oversized_write_keeps_tail() {
        let mut ring = OggRing::new(8);
        ring.write(b"abcdefghijklmnopqrst");
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.all_data(), b"mnopqrst");
    }

    #[test]
    fn test_recent_without_marker_is_plain_tail() {
        let mut ring = OggRing::new(8);
        ring.write(b"abcdef");
        ring.write(b"ghij");
        assert_eq!(ring.recent(4), b"ghij");
        assert_eq!(ring.recent(100), b"cdefghij");
        assert_eq!(ring.recent(0), b"");
    }

    #[test]
    fn test_recent_starts_at_marker_when_it_fits() {
        let mut ring = OggRing::new(64);
        ring.write(b"junkOggSpage1");
        // marker 9 bytes back, fits in 32
        assert_eq!(ring.recent(32), b"OggSpage1");
        // marker does not fit in 4, plain tail instead
        assert_eq!(ring.recent(4), b"age1");
    }

    #[test]
    fn test_overwritten_marker_goes_stale() {
        let mut ring = OggRing::new(8);
        ring.write(b"OggS");
        ring.write(b"12345678");
        assert_eq!(ring.recent(8), b"12345678");
        assert_eq!(ring.page_aligned_tail(), b"12345678");
    }

    #[test]
    fn test_marker_inside_oversized_write() {
        let mut ring = OggRing::new(8);
        ring.write(b"abcdefghOggS");
        assert_eq!(ring.all_data(), b"efghOggS");
        assert_eq!(ring.recent(8), b"OggS");
    }

    #[test]
    fn test_tail_finds_marker_split_across_writes() {
        let mut ring = OggRing::new(64);
        ring.write(b"xxOg");
        ring.write(b"gSyy");
        // write-time scan misses the straddling marker, the tail rescan does not
        assert_eq!(ring.recent(64), b"xxOggSyy");
        assert_eq!(ring.page_aligned_tail(), b"OggSyy");
    }

    #[test]
    fn test_tail_without_marker_is_all_data() {
        let mut ring = OggRing::new(16);
        ring.write(b"no pages here");
        assert_eq!(ring.page_aligned_tail(), b"no pages here");
    }

    #[test]
    fn test_tail_uses_last_marker() {
        let mut ring = OggRing::new(64);
        ring.write(b"OggSfirstOggSsecond");
        assert_eq!(ring.page_aligned_tail(), b"OggSsecond");
    }

    #[test]
    fn test_since_returns_retained_range() {
        let mut ring = OggRing::new(16);
        ring.write(b"abcdef");
        assert_eq!(ring.since(0).as_deref(), Some(&b"abcdef"[..]));
        assert_eq!(ring.since(2).as_deref(), Some(&b"cdef"[..]));
        assert_eq!(ring.since(6).as_deref(), Some(&b""[..]));
    }

    #[test]
    fn test_since_rejects_lost_or_future_offsets() {
        let mut ring = OggRing::new(8);
        ring.write(b"abcdefghij");
        // exactly the retained window is still answerable
        assert_eq!(ring.since(2).as_deref(), Some(&b"cdefghij"[..]));
        // one byte further back has been overwritten
        assert_eq!(ring.since(1), None);
        // offsets the stream has not reached yet are unanswerable too
        assert_eq!(ring.since(11), None);
    }

    #[test]
    fn test_since_rejects_offsets_from_before_a_clear() {
        let mut ring = OggRing::new(16);
        ring.write(b"old stream");
        ring.clear();
        ring.write(b"xy");
        assert_eq!(ring.since(5), None);
        assert_eq!(ring.since(0).as_deref(), Some(&b"xy"[..]));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut ring = OggRing::new(16);
        ring.write(b"OggSdata");
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.total_written(), 0);
        assert!(ring.page_aligned_tail().is_empty());

        ring.write(b"fresh");
        assert_eq!(ring.all_data(), b"fresh");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn chunk_strategy() -> impl Strategy<Value = Vec<u8>> {
            prop_oneof![
                3 => proptest::collection::vec(any::<u8>(), 1..48),
                1 => Just(b"OggS".to_vec()),
            ]
        }

        proptest! {
            #[test]
            fn retains_exactly_the_newest_bytes(
                chunks in proptest::collection::vec(chunk_strategy(), 0..24),
                capacity in 4usize..96,
            ) {
                let mut ring = OggRing::new(capacity);
                let mut reference: Vec<u8> = Vec::new();
                for chunk in &chunks {
                    ring.write(chunk);
                    reference.extend_from_slice(chunk);
                }
                let keep = reference.len().min(capacity);
                prop_assert_eq!(ring.len(), keep);
                prop_assert_eq!(ring.all_data(), &reference[reference.len() - keep..]);
            }

            #[test]
            fn tail_begins_at_the_last_retained_marker(
                chunks in proptest::collection::vec(chunk_strategy(), 0..24),
                capacity in 4usize..96,
            ) {
                let mut ring = OggRing::new(capacity);
                for chunk in &chunks {
                    ring.write(chunk);
                }
                let all = ring.all_data();
                let tail = ring.page_aligned_tail();
                prop_assert!(all.ends_with(&tail));
                match (0..all.len().saturating_sub(3))
                    .rev()
                    .find(|&i| &all[i..i + 4] == b"OggS")
                {
                    Some(idx) => prop_assert_eq!(tail.len(), all.len() - idx),
                    None => prop_assert_eq!(tail.len(), all.len()),
                }
            }

            #[test]
            fn recent_is_a_bounded_suffix(
                chunks in proptest::collection::vec(chunk_strategy(), 0..24),
                capacity in 4usize..96,
                max_bytes in 0usize..128,
            ) {
                let mut ring = OggRing::new(capacity);
                for chunk in &chunks {
                    ring.write(chunk);
                }
                let all = ring.all_data();
                let recent = ring.recent(max_bytes);
                prop_assert!(recent.len() <= max_bytes.min(ring.len()));
                prop_assert!(all.ends_with(&recent));
            }
        }
    }
}
