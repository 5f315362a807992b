use thiserror::Error;

/// Rejections raised before any actuator is touched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("target mass {target_kg} kg must lie in (0, {max_kg}]")]
    TargetOutOfRange { target_kg: f64, max_kg: f64 },

    #[error("fraction for {component} must be greater than zero, got {value}")]
    NonPositiveFraction { component: String, value: f64 },

    #[error("fraction for {component} must not be negative, got {value}")]
    NegativeFraction { component: String, value: f64 },

    #[error("split fractions must sum to 1.0 (within {epsilon}), got {sum}")]
    SplitSum { sum: f64, epsilon: f64 },

    #[error("pin {pin} is assigned to more than one role")]
    PinConflict { pin: u8 },

    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}
