// -------------------------------------------------------------------------------------------------

/// Copy the first `frame_count` frames of the given planar buffer into an interleaved one.
/// The planar buffer's layout defines the channel count of the interleaved buffer.
pub fn planar_to_interleaved(planar: &[Vec<f32>], frame_count: usize, interleaved: &mut [f32]) {
    let channel_count = planar.len();
    debug_assert!(interleaved.len() >= frame_count * channel_count);
    match channel_count {
        1 => {
            interleaved[..frame_count].copy_from_slice(&planar[0][..frame_count]);
        }
        2 => {
            let left = &planar[0][..frame_count];
            let right = &planar[1][..frame_count];
            for (index, (l, r)) in left.iter().zip(right.iter()).enumerate() {
                interleaved[index * 2] = *l;
                interleaved[index * 2 + 1] = *r;
            }
        }
        _ => {
            for (channel_index, channel_values) in planar.iter().enumerate() {
                for (frame_index, value) in channel_values[..frame_count].iter().enumerate() {
                    interleaved[frame_index * channel_count + channel_index] = *value;
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Copy the first `frame_count` frames of the given interleaved buffer into a planar one.
/// The planar buffer's layout defines the channel count of the interleaved buffer.
pub fn interleaved_to_planar(interleaved: &[f32], frame_count: usize, planar: &mut [Vec<f32>]) {
    let channel_count = planar.len();
    debug_assert!(interleaved.len() >= frame_count * channel_count);
    match channel_count {
        1 => {
            planar[0][..frame_count].copy_from_slice(&interleaved[..frame_count]);
        }
        2 => {
            let left = &mut planar[0];
            for (index, l) in left[..frame_count].iter_mut().enumerate() {
                *l = interleaved[index * 2];
            }
            let right = &mut planar[1];
            for (index, r) in right[..frame_count].iter_mut().enumerate() {
                *r = interleaved[index * 2 + 1];
            }
        }
        _ => {
            for (channel_index, channel_values) in planar.iter_mut().enumerate() {
                for (frame_index, value) in channel_values[..frame_count].iter_mut().enumerate() {
                    *value = interleaved[frame_index * channel_count + channel_index];
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A preallocated interleaved sample FIFO with a movable valid range.
///
/// Appending compacts consumed space first and only reallocates when the pending content
/// really outgrows the buffer, so a properly pre-sized instance stays allocation-free in use.
#[derive(Debug, Default)]
pub struct TempBuffer {
    buffer: Vec<f32>,
    start: usize,
    end: usize,
}

impl TempBuffer {
    /// Create a new buffer with the given sample capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity],
            start: 0,
            end: 0,
        }
    }

    /// Total sample capacity.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of pending samples.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True when there are no pending samples.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Drop all pending samples.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Grow the underlying buffer to at least the given sample capacity.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.buffer.len() {
            self.buffer.resize(capacity, 0.0);
        }
    }

    /// Access the pending samples.
    pub fn get(&self) -> &[f32] {
        &self.buffer[self.start..self.end]
    }

    /// Append samples behind the pending ones, compacting or growing as needed.
    pub fn append(&mut self, samples: &[f32]) {
        if self.end + samples.len() > self.buffer.len() {
            // move pending samples to the front to make room at the back
            self.buffer.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
            self.reserve(self.end + samples.len());
        }
        self.buffer[self.end..self.end + samples.len()].copy_from_slice(samples);
        self.end += samples.len();
    }

    /// Copy as many pending samples as fit into the given target buffer.
    /// Returns the number of copied samples. Does not consume.
    pub fn copy_to(&self, target: &mut [f32]) -> usize {
        let count = self.len().min(target.len());
        target[..count].copy_from_slice(&self.buffer[self.start..self.start + count]);
        count
    }

    /// Mark the given number of pending samples as read.
    pub fn consume(&mut self, count: usize) {
        debug_assert!(count <= self.len());
        self.start += count;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }
}

// -------------------------------------------------------------------------------------------------
