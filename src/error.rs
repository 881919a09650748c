use std::{error, fmt};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by repitch.
#[derive(Debug)]
pub enum Error {
    /// A parameter id outside the known parameter set was addressed.
    InvalidParameter(String),
    /// Invalid stream properties (sample rate, channel count or block size) were passed
    /// to the engine.
    InvalidConfiguration(String),
    /// The stretcher backend declined to construct an instance for the requested
    /// configuration.
    UnsupportedConfiguration(String),
    /// Block processing was requested before the engine got successfully initialized.
    EngineUninitialized,
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(str) => write!(f, "Invalid parameter: {str}"),
            Self::InvalidConfiguration(str) => write!(f, "Invalid configuration: {str}"),
            Self::UnsupportedConfiguration(str) => {
                write!(f, "Unsupported configuration: {str}")
            }
            Self::EngineUninitialized => write!(f, "Engine is not initialized"),
        }
    }
}
