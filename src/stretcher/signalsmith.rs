use signalsmith_stretch::Stretch;

use super::{StretchProfile, StretchQuality, StretcherConfig, StretcherFactory, TimeStretcher};
use crate::{
    utils::buffer::{interleaved_to_planar, planar_to_interleaved, TempBuffer},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Creates [`SignalsmithStretcher`] instances.
#[derive(Debug, Default)]
pub struct SignalsmithStretcherFactory;

impl StretcherFactory for SignalsmithStretcherFactory {
    fn create(&self, config: &StretcherConfig) -> Result<Box<dyn TimeStretcher>, Error> {
        Ok(Box::new(SignalsmithStretcher::new(config)?))
    }
}

// -------------------------------------------------------------------------------------------------

/// Signalsmith Stretch based [`TimeStretcher`] implementation.
///
/// Signalsmith's API is synchronous with equally sized input and output blocks, delayed
/// by the stretcher's internal latency. To provide the buffered available/retrieve
/// contract, the first latency frames of raw output get skipped and everything after that
/// is staged in an interleaved FIFO which the engine drains at its own block rate.
pub struct SignalsmithStretcher {
    stretch: Stretch,
    channel_count: usize,
    latency_frames: usize,
    pending_skip_frames: usize,
    input_scratch: Vec<f32>,
    output_scratch: Vec<f32>,
    pending_output: TempBuffer,
}

impl SignalsmithStretcher {
    pub fn new(config: &StretcherConfig) -> Result<Self, Error> {
        if config.sample_rate == 0 || config.channel_count == 0 {
            return Err(Error::UnsupportedConfiguration(format!(
                "can't create a stretcher for {} Hz with {} channel(s)",
                config.sample_rate, config.channel_count
            )));
        }

        let channel_count = config.channel_count;
        let mut stretch = match config.quality {
            StretchQuality::LowLatency => {
                Stretch::preset_cheaper(channel_count as u32, config.sample_rate)
            }
            StretchQuality::HighQuality => {
                Stretch::preset_default(channel_count as u32, config.sample_rate)
            }
        };
        let latency_frames = stretch.input_latency() + stretch.output_latency();

        Self::apply_pitch_scale(&mut stretch, config.pitch_scale);
        Self::apply_formant(&mut stretch, config.formant_preserved);

        let mut stretcher = Self {
            stretch,
            channel_count,
            latency_frames,
            pending_skip_frames: latency_frames,
            input_scratch: Vec::new(),
            output_scratch: Vec::new(),
            pending_output: TempBuffer::new(0),
        };
        stretcher.set_max_block_size(config.max_block_size.max(1));
        Ok(stretcher)
    }

    fn apply_pitch_scale(stretch: &mut Stretch, pitch_scale: f64) {
        let semitones = 12.0 * pitch_scale.log2();
        stretch.set_transpose_factor_semitones(semitones as f32, None);
    }

    fn apply_formant(stretch: &mut Stretch, preserved: bool) {
        // a zero semitone formant shift with pitch compensation keeps the spectral
        // envelope in place while the pitch moves
        stretch.set_formant_factor_semitones(0.0, preserved);
    }
}

impl TimeStretcher for SignalsmithStretcher {
    fn set_pitch_scale(&mut self, pitch_scale: f64) {
        Self::apply_pitch_scale(&mut self.stretch, pitch_scale);
    }

    fn set_formant_preserved(&mut self, preserved: bool) -> bool {
        Self::apply_formant(&mut self.stretch, preserved);
        true
    }

    fn set_profile(&mut self, _profile: StretchProfile) -> bool {
        // block and interval sizes are baked into the preset at construction time
        false
    }

    fn set_max_block_size(&mut self, max_block_size: usize) {
        let samples = max_block_size * self.channel_count;
        let flush_samples = self.stretch.output_latency() * self.channel_count;
        if self.input_scratch.len() < samples {
            self.input_scratch.resize(samples, 0.0);
        }
        if self.output_scratch.len() < samples.max(flush_samples) {
            self.output_scratch.resize(samples.max(flush_samples), 0.0);
        }
        // keep the FIFO large enough for the steady-state bound of one pending block
        // plus one fed block, so appends stay allocation-free
        self.pending_output
            .reserve((self.latency_frames + 2 * max_block_size) * self.channel_count);
    }

    fn process(&mut self, input: &[Vec<f32>], frame_count: usize, is_final: bool) {
        debug_assert_eq!(input.len(), self.channel_count);

        let samples = frame_count * self.channel_count;
        if samples > self.input_scratch.len() {
            self.set_max_block_size(frame_count);
        }

        if frame_count > 0 {
            planar_to_interleaved(input, frame_count, &mut self.input_scratch[..samples]);
            self.stretch.process(
                &self.input_scratch[..samples],
                &mut self.output_scratch[..samples],
            );

            // hold back the initial latency fill: those frames contain no usable signal
            let skip_frames = self.pending_skip_frames.min(frame_count);
            self.pending_skip_frames -= skip_frames;
            if frame_count > skip_frames {
                self.pending_output
                    .append(&self.output_scratch[skip_frames * self.channel_count..samples]);
            }
        }

        if is_final {
            let flush_samples = self.stretch.output_latency() * self.channel_count;
            self.stretch.flush(&mut self.output_scratch[..flush_samples]);
            self.pending_output
                .append(&self.output_scratch[..flush_samples]);
        }
    }

    fn available(&self) -> usize {
        self.pending_output.len() / self.channel_count
    }

    fn retrieve(&mut self, output: &mut [Vec<f32>], frame_count: usize) -> usize {
        debug_assert_eq!(output.len(), self.channel_count);

        let frames = frame_count.min(self.available());
        if frames == 0 {
            return 0;
        }
        let samples = frames * self.channel_count;
        interleaved_to_planar(&self.pending_output.get()[..samples], frames, output);
        self.pending_output.consume(samples);
        frames
    }

    fn reset(&mut self) {
        self.stretch.reset();
        self.pending_output.clear();
        self.pending_skip_frames = self.latency_frames;
    }

    fn latency(&self) -> usize {
        self.latency_frames
    }
}

// -------------------------------------------------------------------------------------------------
