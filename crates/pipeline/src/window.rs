//! Fixed-capacity sliding windows over filtered samples.

/// Ring of the most recent `capacity` values of one channel.
///
/// Storage is allocated once; pushing into a full window overwrites the
/// oldest value.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    data: Vec<f32>,
    head: usize,
    len: usize,
}

impl WindowBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be positive");
        Self {
            data: vec![0.0; capacity],
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
        self.len == self.data.len()
    }

    pub fn push(&mut self, value: f32) {
        self.data[self.head] = value;
        self.head = (self.head + 1) % self.data.len();
        if self.len < self.data.len() {
            self.len += 1;
        }
    }

    /// Iterate over the held values, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &f32> + '_ {
        let cap = self.data.len();
        let start = (self.head + cap - self.len) % cap;
        (0..self.len).map(move |i| &self.data[(start + i) % cap])
    }

    /// Copy the held values out, oldest first.
    pub fn snapshot(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len);
        out.extend(self.iter().copied());
        out
    }
}
