//! Error type for the pasture species engine.
//!
//! Configuration problems are raised at setup time. Invariant violations
//! (turnover rates out of range, mass balance loss, allocation with no
//! weights) abort the plant's day. Nothing here is recoverable locally.

use std::path::PathBuf;
use thiserror::Error;

/// Crate result alias.
pub type Result<T> = std::result::Result<T, PastureError>;

#[derive(Error, Debug)]
pub enum PastureError {
    /// Invalid or inconsistent parameter set
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A root zone referred to by name is not known to the soil set
    #[error("cannot find zone: {zone}")]
    ZoneNotFound { zone: String },

    /// No default removal fractions and none supplied for an organ
    #[error("could not find biomass removal defaults for {removal_type} and no removal fractions were supplied for {organ}")]
    MissingRemovalDefaults { removal_type: String, organ: String },

    #[error("unknown biomass removal type: {0}")]
    UnknownRemovalType(String),

    #[error("type of amount to remove on graze not recognised (use 'SetResidueAmount' or 'SetRemoveAmount'): {0}")]
    UnknownGrazeType(String),

    #[error("cannot find organ to remove biomass from: {0}")]
    UnknownOrgan(String),

    /// A turnover rate fell outside [0, 1] before any bounding
    #[error("{species}: computed tissue turnover rate {name}={value} is outside [0, 1]")]
    TurnoverRateOutOfRange {
        species: String,
        name: &'static str,
        value: f64,
    },

    /// DM or N was created or lost during an update
    #[error("{context}: loss of {quantity} mass balance (difference {difference:e})")]
    MassBalance {
        context: String,
        quantity: &'static str,
        difference: f64,
    },

    /// Weights used to split new N over organs summed to zero
    #[error("{species}: allocation of new growth could not be completed")]
    AllocationFailed { species: String },

    /// Path that the engine explicitly refuses to run
    #[error("not implemented: {feature}")]
    NotImplemented { feature: String },

    #[error("failed to parse parameters: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PastureError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn not_implemented(feature: impl Into<String>) -> Self {
        Self::NotImplemented {
            feature: feature.into(),
        }
    }

    pub fn mass_balance(context: impl Into<String>, quantity: &'static str, difference: f64) -> Self {
        Self::MassBalance {
            context: context.into(),
            quantity,
            difference,
        }
    }

    /// True for the invariant-violation class (model state is inconsistent).
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::TurnoverRateOutOfRange { .. } | Self::MassBalance { .. } | Self::AllocationFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_class_is_detected() {
        let err = PastureError::mass_balance("leaves", "DM", 1e-6);
        assert!(err.is_invariant_violation());
        assert!(!PastureError::config("bad").is_invariant_violation());
        assert!(err.to_string().contains("leaves"));
    }
}
