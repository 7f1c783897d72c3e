//! Sample ring: fixed pre-allocated circular buffer for raw EEG samples.
//! Capacity is a compile-time power of two. No dynamic allocation.

/// Fixed-size ring of the most recent `N` raw samples. Overwrites the oldest
/// sample once full; never reports full or empty.
///
/// `N` must be a power of two and at least 2. Anything else fails to build:
///
/// ```compile_fail
/// let _ = mindrover::acquisition::ring_buffer::SampleRing::<100>::new();
/// ```
#[derive(Debug, Clone)]
pub struct SampleRing<const N: usize> {
    buffer: [i16; N],
    head: usize,
}

impl<const N: usize> SampleRing<N> {
    const VALID_CAPACITY: () = assert!(
        N >= 2 && N.is_power_of_two(),
        "ring capacity must be a power of two and at least 2"
    );

    /// Zero-filled ring with head at slot 0.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_CAPACITY;
        Self {
            buffer: [0; N],
            head: 0,
        }
    }

    /// Store `sample` at the head and advance it. Called from the producer
    /// context: O(1), never fails, never allocates.
    /// Returns true when the head wrapped back to slot 0.
    #[inline]
    pub fn write(&mut self, sample: i16) -> bool {
        self.buffer[self.head] = sample;
        self.head = (self.head + 1) & (N - 1);
        self.head == 0
    }

    /// Copy the ring oldest-first into `out`, starting at the head and wrapping.
    /// Each sample becomes a `[re, 0]` pair.
    #[inline]
    pub(crate) fn linearize_into(&self, out: &mut [[i16; 2]; N]) {
        let (newer, older) = self.buffer.split_at(self.head);
        for (slot, &s) in out.iter_mut().zip(older.iter().chain(newer)) {
            *slot = [s, 0];
        }
    }

    /// Index of the next write, which is also the oldest retained sample.
    pub fn head(&self) -> usize {
        self.head
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for SampleRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
