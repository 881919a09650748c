//! Time/pitch stretching capability interface consumed by the engine.

use crate::Error;

// -------------------------------------------------------------------------------------------------

mod signalsmith;
pub use signalsmith::{SignalsmithStretcher, SignalsmithStretcherFactory};

// -------------------------------------------------------------------------------------------------

/// Latency/quality tradeoff for a stretcher instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StretchQuality {
    /// Lowest practical latency with cheaper analysis.
    #[default]
    LowLatency,
    /// Deeper buffering for higher fidelity output.
    HighQuality,
}

// -------------------------------------------------------------------------------------------------

/// Transient handling profile of a stretcher instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransientsProfile {
    #[default]
    Crisp,
    Smooth,
}

/// Phase continuity profile of a stretcher instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PhaseProfile {
    #[default]
    Laminar,
    Independent,
}

/// Transient detector profile of a stretcher instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectorProfile {
    #[default]
    Compound,
    Soft,
}

/// Quality tuning knobs of a stretcher instance. How (and whether) each knob maps onto the
/// underlying algorithm is backend defined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StretchProfile {
    pub transients: TransientsProfile,
    pub phase: PhaseProfile,
    pub detector: DetectorProfile,
}

impl StretchProfile {
    /// Crisp transients, laminar phase and a compound detector: tuned for low artifacts
    /// at low latency.
    pub fn low_latency() -> Self {
        Self::default()
    }

    /// Smoother settings used when the quality mode favors fidelity over latency.
    pub fn high_quality() -> Self {
        Self {
            transients: TransientsProfile::Smooth,
            phase: PhaseProfile::Independent,
            detector: DetectorProfile::Soft,
        }
    }

    pub fn for_quality(quality: StretchQuality) -> Self {
        match quality {
            StretchQuality::LowLatency => Self::low_latency(),
            StretchQuality::HighQuality => Self::high_quality(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Construction options for a [`TimeStretcher`] instance.
#[derive(Debug, Clone, Copy)]
pub struct StretcherConfig {
    pub sample_rate: u32,
    pub channel_count: usize,
    pub max_block_size: usize,
    pub pitch_scale: f64,
    pub formant_preserved: bool,
    pub quality: StretchQuality,
    pub profile: StretchProfile,
}

impl Default for StretcherConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channel_count: 2,
            max_block_size: 1024,
            pitch_scale: 1.0,
            formant_preserved: false,
            quality: StretchQuality::default(),
            profile: StretchProfile::default(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A buffered real-time pitch stretcher working on planar `f32` audio.
///
/// Stretchers are latent: the number of output frames available after feeding a block is
/// data dependent and generally differs from the number of fed frames, so consumers must
/// poll [`TimeStretcher::available`] and cope with partial or empty output.
///
/// Setters which can't be applied on a live instance return `false` instead of applying,
/// in which case the caller is expected to construct a replacement instance with the
/// changed configuration.
pub trait TimeStretcher: Send + Sync {
    /// Change the pitch scale ratio of the live instance.
    fn set_pitch_scale(&mut self, pitch_scale: f64);

    /// Try to toggle formant preservation on the live instance. Returns `false` when the
    /// backend only supports this at construction time.
    fn set_formant_preserved(&mut self, preserved: bool) -> bool;

    /// Try to change the quality tuning profile on the live instance. Returns `false`
    /// when the backend only supports this at construction time.
    fn set_profile(&mut self, profile: StretchProfile) -> bool;

    /// Announce the maximum number of frames a single `process` call will feed.
    fn set_max_block_size(&mut self, max_block_size: usize);

    /// Feed `frame_count` frames from the given planar input buffers. `is_final` flushes
    /// the instance's remaining internal buffers into the pending output.
    fn process(&mut self, input: &[Vec<f32>], frame_count: usize, is_final: bool);

    /// Number of processed frames which are ready to be retrieved.
    fn available(&self) -> usize;

    /// Move up to `frame_count` pending frames into the given planar output buffers.
    /// Returns the number of frames written; surplus frames remain pending.
    fn retrieve(&mut self, output: &mut [Vec<f32>], frame_count: usize) -> usize;

    /// Clear all internal buffering state without changing the configuration.
    fn reset(&mut self);

    /// The instance's processing latency in frames.
    fn latency(&self) -> usize;
}

// -------------------------------------------------------------------------------------------------

/// Creates [`TimeStretcher`] instances for a given configuration.
///
/// This is the engine's reconstruction seam: configuration changes a backend can't apply
/// in place go through here, and tests inject deterministic stretcher mocks with it.
pub trait StretcherFactory: Send {
    fn create(&self, config: &StretcherConfig) -> Result<Box<dyn TimeStretcher>, Error>;
}
