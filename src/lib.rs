#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod engine;
mod error;
mod parameter;
mod stretcher;

// public, flat re-exports
pub use error::Error;

pub use engine::PitchShiftEngine;

pub use parameter::{FloatParameter, FloatParameterValue, ParameterId};

pub use stretcher::{
    DetectorProfile, PhaseProfile, SignalsmithStretcher, SignalsmithStretcherFactory,
    StretchProfile, StretchQuality, StretcherConfig, StretcherFactory, TimeStretcher,
    TransientsProfile,
};

// public mods
pub mod utils;
