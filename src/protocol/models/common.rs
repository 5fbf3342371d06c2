use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";
pub const DEFAULT_VOICE: &str = "shimmer";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    InProgress,
    Completed,
    Incomplete,
}

/// Sampling temperature, validated to `[0.0, 2.0]` on construction and on decode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "f32", into = "f32")]
pub struct Temperature(f32);

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("temperature must be between 0.0 and 2.0, got {0}")]
pub struct TemperatureError(pub f32);

impl Temperature {
    /// # Errors
    /// Returns [`TemperatureError`] when `val` falls outside `[0.0, 2.0]`.
    pub fn new(val: f32) -> Result<Self, TemperatureError> {
        if (0.0..=2.0).contains(&val) { Ok(Self(val)) } else { Err(TemperatureError(val)) }
    }

    #[must_use]
    pub const fn value(self) -> f32 {
        self.0
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Self(0.8)
    }
}

impl TryFrom<f32> for Temperature {
    type Error = TemperatureError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Temperature> for f32 {
    fn from(t: Temperature) -> Self {
        t.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_rejects_out_of_range() {
        assert!(Temperature::new(2.5).is_err());
        assert!(serde_json::from_str::<Temperature>("-0.1").is_err());
        let ok: Temperature = serde_json::from_str("0.8").unwrap();
        assert!((ok.value() - 0.8).abs() < f32::EPSILON);
    }
}
