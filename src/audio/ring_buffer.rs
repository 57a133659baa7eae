// RingBuffer - fixed-capacity, overwrite-aware circular sample store
//
// This is the only shared-memory primitive in the pipeline: the ingestion
// callback pushes packets in, the analysis worker drains them out. The buffer
// itself is not synchronized; callers guard it with a mutex scoped to the
// individual operation (push, drain, resize) and never hold the guard across
// a processing pass.

/// Fixed-capacity circular buffer that evicts the oldest element when full
///
/// `push` never blocks and never grows the capacity. `drain_ordered` returns
/// everything oldest-first and empties the buffer. `resize` is a destructive
/// reset. Capacity 0 is legal: pushes are dropped and drains are empty.
#[derive(Debug, Clone)]
pub struct RingBuffer<T: Copy + Default> {
    data: Vec<T>,
    /// Index of the oldest element
    head: usize,
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity() && self.capacity() > 0
    }

    /// Append one element, evicting the oldest once full
    pub fn push(&mut self, value: T) {
        let cap = self.data.len();
        if cap == 0 {
            return;
        }
        if self.len < cap {
            self.data[(self.head + self.len) % cap] = value;
            self.len += 1;
        } else {
            self.data[self.head] = value;
            self.head = (self.head + 1) % cap;
        }
    }

    /// Append a slice element by element
    pub fn push_slice(&mut self, values: &[T]) {
        for &v in values {
            self.push(v);
        }
    }

    /// Copy the buffered elements in chronological order without consuming them
    pub fn snapshot_ordered(&self) -> Vec<T> {
        let cap = self.data.len();
        let mut out = Vec::with_capacity(self.len);
        for i in 0..self.len {
            out.push(self.data[(self.head + i) % cap]);
        }
        out
    }

    /// Return all buffered elements oldest-first and empty the buffer
    pub fn drain_ordered(&mut self) -> Vec<T> {
        let out = self.snapshot_ordered();
        self.clear();
        out
    }

    /// Discard the contents, keeping the capacity
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Change the capacity, discarding all contents
    pub fn resize(&mut self, capacity: usize) {
        self.data = vec![T::default(); capacity];
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_drain_preserves_order() {
        let mut buf = RingBuffer::new(8);
        buf.push_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.drain_ordered(), vec![1.0, 2.0, 3.0]);
        assert!(buf.is_empty(), "drain must empty the buffer");
    }

    #[test]
    fn test_overflow_evicts_oldest_first() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(buf.len(), 4, "length never exceeds capacity");
        assert_eq!(buf.drain_ordered(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_interleaved_pushes_and_drains() {
        // The concatenation of all drains equals the pushed sequence
        // restricted to the most recent `capacity` elements at drain time.
        let mut buf = RingBuffer::new(3);
        buf.push_slice(&[1, 2]);
        assert_eq!(buf.drain_ordered(), vec![1, 2]);
        buf.push_slice(&[3, 4, 5, 6]);
        assert_eq!(buf.drain_ordered(), vec![4, 5, 6]);
        buf.push(7);
        assert_eq!(buf.drain_ordered(), vec![7]);
        assert_eq!(buf.drain_ordered(), Vec::<i32>::new());
    }

    #[test]
    fn test_snapshot_does_not_consume() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1, 2, 3]);
        assert_eq!(buf.snapshot_ordered(), vec![1, 2, 3]);
        assert_eq!(buf.len(), 3, "snapshot must not consume");
        assert_eq!(buf.drain_ordered(), vec![1, 2, 3]);
    }

    #[test]
    fn test_snapshot_after_wraparound() {
        let mut buf = RingBuffer::new(3);
        buf.push_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(buf.snapshot_ordered(), vec![3, 4, 5]);
    }

    #[test]
    fn test_zero_capacity_is_legal() {
        let mut buf: RingBuffer<f64> = RingBuffer::new(0);
        buf.push(1.0);
        buf.push_slice(&[2.0, 3.0]);
        assert_eq!(buf.len(), 0);
        assert!(buf.drain_ordered().is_empty());
    }

    #[test]
    fn test_resize_is_destructive() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1, 2, 3]);
        buf.resize(8);
        assert_eq!(buf.capacity(), 8);
        assert!(buf.is_empty(), "resize must discard contents");
        buf.push(9);
        assert_eq!(buf.drain_ordered(), vec![9]);
    }

    #[test]
    fn test_is_full_tracks_capacity() {
        let mut buf = RingBuffer::new(2);
        assert!(!buf.is_full());
        buf.push_slice(&[1, 2]);
        assert!(buf.is_full());
        buf.push(3);
        assert!(buf.is_full(), "overwriting keeps the buffer full");
    }
}
