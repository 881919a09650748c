use crate::{
    parameter::ParameterStore,
    stretcher::{
        StretchProfile, StretchQuality, StretcherConfig, StretcherFactory, TimeStretcher,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Owns construction, reconfiguration and reset of the engine's [`TimeStretcher`]
/// instance.
///
/// Pitch scale changes mutate the live instance. Formant and quality/profile changes are
/// applied in place when the backend supports that and fall back to a full reconstruction
/// otherwise, so callers never see the difference. At most one reconstruction happens per
/// [`StretcherLifecycle::reconfigure`] call.
pub struct StretcherLifecycle {
    factory: Box<dyn StretcherFactory>,
    stretcher: Option<Box<dyn TimeStretcher>>,
    config: StretcherConfig,
}

impl StretcherLifecycle {
    pub fn new(factory: Box<dyn StretcherFactory>) -> Self {
        Self {
            factory,
            stretcher: None,
            config: StretcherConfig::default(),
        }
    }

    /// Construct the stretcher for the given stream format, applying the current
    /// parameter values.
    pub fn initialize(
        &mut self,
        sample_rate: u32,
        channel_count: usize,
        max_block_size: usize,
        params: &ParameterStore,
    ) -> Result<(), Error> {
        let quality = Self::quality_for(params);
        let config = StretcherConfig {
            sample_rate,
            channel_count,
            max_block_size,
            pitch_scale: params.pitch_scale(),
            formant_preserved: params.formant_preserved(),
            quality,
            profile: StretchProfile::for_quality(quality),
        };
        self.stretcher = Some(self.factory.create(&config)?);
        self.config = config;
        Ok(())
    }

    /// Destroy the stretcher instance.
    pub fn cleanup(&mut self) {
        self.stretcher = None;
    }

    pub fn stretcher_mut(&mut self) -> Option<&mut (dyn TimeStretcher + 'static)> {
        self.stretcher.as_deref_mut()
    }

    /// The stretcher's processing latency in frames, 0 when uninitialized.
    pub fn latency(&self) -> usize {
        self.stretcher.as_deref().map_or(0, |s| s.latency())
    }

    /// Apply pending structural parameter changes to the stretcher.
    ///
    /// Runs in the render context at the start of a block. Clears the store's dirty flags
    /// on success only, so a failed reconstruction stays visible and gets retried with
    /// the next block.
    pub fn reconfigure(&mut self, params: &mut ParameterStore) -> Result<(), Error> {
        let dirty = params.dirty();
        let Some(stretcher) = self.stretcher.as_deref_mut() else {
            params.clear_dirty();
            return Ok(());
        };

        let mut rebuild = false;

        if dirty.quality {
            let quality = Self::quality_for(params);
            if quality != self.config.quality {
                self.config.quality = quality;
                self.config.profile = StretchProfile::for_quality(quality);
                if !stretcher.set_profile(self.config.profile) {
                    rebuild = true;
                }
            }
        }
        if dirty.formant {
            let preserved = params.formant_preserved();
            if preserved != self.config.formant_preserved {
                self.config.formant_preserved = preserved;
                if !stretcher.set_formant_preserved(preserved) {
                    rebuild = true;
                }
            }
        }
        if dirty.pitch {
            self.config.pitch_scale = params.pitch_scale();
            if !rebuild {
                stretcher.set_pitch_scale(self.config.pitch_scale);
            }
        }

        if rebuild {
            log::debug!(
                "Rebuilding stretcher (quality: {:?}, formants preserved: {})",
                self.config.quality,
                self.config.formant_preserved
            );
            self.stretcher = Some(self.factory.create(&self.config)?);
        }

        params.clear_dirty();
        Ok(())
    }

    /// Clear the stretcher's internal buffering without reconstruction, e.g. on a host
    /// transport discontinuity.
    pub fn reset(&mut self) {
        if let Some(stretcher) = self.stretcher.as_deref_mut() {
            stretcher.reset();
        }
    }

    /// Announce a grown maximum block size to the stretcher.
    pub fn grow_block_size(&mut self, max_block_size: usize) {
        if max_block_size > self.config.max_block_size {
            self.config.max_block_size = max_block_size;
            if let Some(stretcher) = self.stretcher.as_deref_mut() {
                stretcher.set_max_block_size(max_block_size);
            }
        }
    }

    fn quality_for(params: &ParameterStore) -> StretchQuality {
        if params.high_quality() {
            StretchQuality::HighQuality
        } else {
            StretchQuality::LowLatency
        }
    }
}
