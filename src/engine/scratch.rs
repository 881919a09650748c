// -------------------------------------------------------------------------------------------------

/// Planar per-channel input and output scratch for the block pipeline.
///
/// Capacity grows on demand and never shrinks during a session, so a host which settles
/// on a large block size once doesn't cause repeated reallocation churn afterwards.
#[derive(Debug, Default)]
pub struct ScratchBuffers {
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
    capacity: usize,
}

impl ScratchBuffers {
    /// Create scratch buffers for the given channel count with an initial frame capacity.
    pub fn new(channel_count: usize, capacity: usize) -> Self {
        Self {
            input: vec![vec![0.0; capacity]; channel_count],
            output: vec![vec![0.0; capacity]; channel_count],
            capacity,
        }
    }

    /// Number of scratch channels.
    pub fn channel_count(&self) -> usize {
        self.input.len()
    }

    /// Current frame capacity of each channel.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grow-only resize. Must run before any sample of the triggering block is copied.
    /// Returns true when the buffers actually grew.
    pub fn ensure_capacity(&mut self, frame_count: usize) -> bool {
        if frame_count <= self.capacity {
            return false;
        }
        for channel in self.input.iter_mut().chain(self.output.iter_mut()) {
            channel.resize(frame_count, 0.0);
        }
        self.capacity = frame_count;
        true
    }

    pub fn input(&self) -> &[Vec<f32>] {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.input
    }

    pub fn output(&self) -> &[Vec<f32>] {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.output
    }
}

// -------------------------------------------------------------------------------------------------
