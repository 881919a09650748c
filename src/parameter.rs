//! Engine parameter identifiers, descriptors and value storage.

use four_cc::FourCC;
use strum::{EnumIter, FromRepr, IntoStaticStr};

// -------------------------------------------------------------------------------------------------

mod float;
pub use float::{FloatParameter, FloatParameterValue};

mod store;
pub use store::{DirtyFlags, ParameterStore};

// -------------------------------------------------------------------------------------------------

/// Identifies one of the engine's control parameters.
///
/// The discriminants are the host-facing parameter indices: hosts address parameters by
/// raw `u32` id and the conversion is validated once via [`ParameterId::from_repr`] at the
/// adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, FromRepr, IntoStaticStr)]
#[repr(u32)]
pub enum ParameterId {
    /// Pitch shift amount in semitones.
    PitchShift = 0,
    /// Dry/wet mix in percent.
    Mix,
    /// Formant preservation amount in percent.
    Formant,
    /// Latency/quality tradeoff dial.
    LatencyMode,
}

impl ParameterId {
    /// Structural parameters invalidate the stretcher configuration when written and are
    /// applied at the start of the next processed block. Cosmetic parameters apply at mix
    /// time without touching the stretcher.
    pub fn is_structural(self) -> bool {
        !matches!(self, Self::Mix)
    }

    /// Host-facing descriptor with range, default, unit and display conversions.
    pub fn descriptor(self) -> FloatParameter {
        match self {
            Self::PitchShift => {
                FloatParameter::new(FourCC(*b"ptch"), "Pitch Shift", -24.0..=24.0, 0.0)
                    .with_unit("st")
                    .with_display(
                        |value| format!("{value:+.1}"),
                        |string| string.trim_start_matches('+').parse().ok(),
                    )
            }
            Self::Mix => {
                FloatParameter::new(FourCC(*b"mix "), "Mix", 0.0..=100.0, 100.0).with_unit("%")
            }
            Self::Formant => {
                FloatParameter::new(FourCC(*b"frmt"), "Formant Preservation", 0.0..=100.0, 0.0)
                    .with_unit("%")
            }
            Self::LatencyMode => {
                FloatParameter::new(FourCC(*b"ltcy"), "Quality Mode", 0.0..=1.0, 0.0)
                    .with_display(
                        |value| {
                            if value >= 0.5 {
                                "high quality".to_string()
                            } else {
                                "low latency".to_string()
                            }
                        },
                        |string| match string {
                            "high quality" => Some(1.0),
                            "low latency" => Some(0.0),
                            other => other.parse().ok(),
                        },
                    )
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn id_conversion() {
        for id in ParameterId::iter() {
            assert_eq!(ParameterId::from_repr(id as u32), Some(id));
        }
        assert_eq!(ParameterId::from_repr(4), None);
        assert_eq!(ParameterId::from_repr(u32::MAX), None);
    }

    #[test]
    fn structural_classification() {
        assert!(ParameterId::PitchShift.is_structural());
        assert!(ParameterId::Formant.is_structural());
        assert!(ParameterId::LatencyMode.is_structural());
        assert!(!ParameterId::Mix.is_structural());
    }

    #[test]
    fn descriptor_defaults_are_in_range() {
        for id in ParameterId::iter() {
            let descriptor = id.descriptor();
            assert!(descriptor.range().contains(&descriptor.default_value()));
        }
    }
}
