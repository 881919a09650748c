use super::{FloatParameterValue, ParameterId};
use crate::utils::semitones_to_pitch_scale;

// -------------------------------------------------------------------------------------------------

/// One pending-change flag per structural parameter.
///
/// Any set flag means the stretcher configuration no longer matches the stored parameter
/// values and must be reconciled at the start of the next processed block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirtyFlags {
    pub pitch: bool,
    pub formant: bool,
    pub quality: bool,
}

impl DirtyFlags {
    /// True when any structural parameter changed since the last reconfiguration.
    pub fn any(&self) -> bool {
        self.pitch || self.formant || self.quality
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// -------------------------------------------------------------------------------------------------

/// Holds the current, clamped values of all engine parameters and tracks which structural
/// parameters changed since the stretcher got (re)configured.
///
/// The store never touches the stretcher itself: writes only clamp, store and flag, so
/// control-thread setters stay cheap and the actual reconfiguration work happens at block
/// boundaries in the render context.
#[derive(Debug)]
pub struct ParameterStore {
    pitch_shift: FloatParameterValue,
    mix: FloatParameterValue,
    formant: FloatParameterValue,
    latency_mode: FloatParameterValue,
    dirty: DirtyFlags,
}

impl ParameterStore {
    /// Create a new store with all parameters at their default values.
    pub fn new() -> Self {
        Self {
            pitch_shift: FloatParameterValue::from_description(
                ParameterId::PitchShift.descriptor(),
            ),
            mix: FloatParameterValue::from_description(ParameterId::Mix.descriptor()),
            formant: FloatParameterValue::from_description(ParameterId::Formant.descriptor()),
            latency_mode: FloatParameterValue::from_description(
                ParameterId::LatencyMode.descriptor(),
            ),
            dirty: DirtyFlags::default(),
        }
    }

    /// Clamp and store a new parameter value, marking the parameter's dirty flag when it
    /// is structural.
    pub fn set(&mut self, id: ParameterId, value: f32) {
        self.slot_mut(id).set_value_clamped(value);
        match id {
            ParameterId::PitchShift => self.dirty.pitch = true,
            ParameterId::Formant => self.dirty.formant = true,
            ParameterId::LatencyMode => self.dirty.quality = true,
            ParameterId::Mix => (),
        }
    }

    /// The current, clamped value of the given parameter.
    pub fn get(&self, id: ParameterId) -> f32 {
        self.slot(id).value()
    }

    /// Pending structural changes.
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    /// True when a structural parameter changed since the last reconfiguration.
    pub fn needs_reconfigure(&self) -> bool {
        self.dirty.any()
    }

    /// Mark all structural changes as applied. Called by the stretcher lifecycle after a
    /// successful reconfiguration only.
    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Pitch scale ratio derived from the pitch shift semitones.
    pub fn pitch_scale(&self) -> f64 {
        semitones_to_pitch_scale(self.pitch_shift.value())
    }

    /// Formant preservation flag derived from the formant amount.
    pub fn formant_preserved(&self) -> bool {
        self.formant.value() > 50.0
    }

    /// True when the latency mode dial selects the high quality profile.
    pub fn high_quality(&self) -> bool {
        self.latency_mode.value() >= 0.5
    }

    /// Wet amount of the dry/wet mix as a 0.0-1.0 factor.
    pub fn wet_mix(&self) -> f32 {
        self.mix.value() / 100.0
    }

    fn slot(&self, id: ParameterId) -> &FloatParameterValue {
        match id {
            ParameterId::PitchShift => &self.pitch_shift,
            ParameterId::Mix => &self.mix,
            ParameterId::Formant => &self.formant,
            ParameterId::LatencyMode => &self.latency_mode,
        }
    }

    fn slot_mut(&mut self, id: ParameterId) -> &mut FloatParameterValue {
        match id {
            ParameterId::PitchShift => &mut self.pitch_shift,
            ParameterId::Mix => &mut self.mix,
            ParameterId::Formant => &mut self.formant,
            ParameterId::LatencyMode => &mut self.latency_mode,
        }
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------
