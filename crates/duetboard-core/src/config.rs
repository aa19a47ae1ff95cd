//! Canvas configuration.

use crate::stroke::{
    BACKGROUND, Brush, DEFAULT_COLOR, DEFAULT_WIDTH, ERASER_DOT_MULTIPLIER,
    ERASER_WIDTH_MULTIPLIER, PALETTE, STROKE_WIDTHS, SerializableColor, UserName,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default auto-expiry window.
pub const DEFAULT_EXPIRY_HOURS: u64 = 24;

/// Delay before re-measuring after an orientation change.
pub const ORIENTATION_RECHECK_MS: u64 = 100;

/// Delay before the first resize after mount.
pub const MOUNT_SETTLE_MS: u64 = 50;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Everything a canvas session needs to know that is not in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Local identity.
    pub me: UserName,
    /// The other participant.
    pub partner: UserName,
    pub background: SerializableColor,
    pub palette: Vec<SerializableColor>,
    pub widths: Vec<f64>,
    pub default_color: SerializableColor,
    pub default_width: f64,
    pub eraser_width_multiplier: f64,
    pub eraser_dot_multiplier: f64,
    pub expiry_hours: u64,
    pub orientation_recheck_ms: u64,
    pub mount_settle_ms: u64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            me: UserName::new("Lena"),
            partner: UserName::new("Mohamed"),
            background: BACKGROUND,
            palette: PALETTE.to_vec(),
            widths: STROKE_WIDTHS.to_vec(),
            default_color: DEFAULT_COLOR,
            default_width: DEFAULT_WIDTH,
            eraser_width_multiplier: ERASER_WIDTH_MULTIPLIER,
            eraser_dot_multiplier: ERASER_DOT_MULTIPLIER,
            expiry_hours: DEFAULT_EXPIRY_HOURS,
            orientation_recheck_ms: ORIENTATION_RECHECK_MS,
            mount_settle_ms: MOUNT_SETTLE_MS,
        }
    }
}

impl CanvasConfig {
    /// Default configuration seen from `me`'s side.
    pub fn for_user(me: impl Into<String>, partner: impl Into<String>) -> Self {
        Self {
            me: UserName::new(me),
            partner: UserName::new(partner),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.me.as_str().trim().is_empty() || self.partner.as_str().trim().is_empty() {
            return invalid("identities must not be empty");
        }
        if self.me == self.partner {
            return invalid("me and partner must differ");
        }
        let positive = |w: f64| w.is_finite() && w > 0.0;
        if !positive(self.default_width) || !self.widths.iter().copied().all(positive) {
            return invalid("stroke widths must be positive");
        }
        if !(self.eraser_width_multiplier >= 1.0 && self.eraser_dot_multiplier >= 1.0) {
            return invalid("eraser multipliers must be at least 1");
        }
        if self.expiry_hours == 0 {
            return invalid("expiry_hours must be greater than zero");
        }
        Ok(())
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_hours.saturating_mul(3600))
    }

    pub fn orientation_recheck(&self) -> Duration {
        Duration::from_millis(self.orientation_recheck_ms)
    }

    pub fn mount_settle(&self) -> Duration {
        Duration::from_millis(self.mount_settle_ms)
    }

    /// Starting brush for a session.
    pub fn brush(&self) -> Brush {
        Brush {
            color: self.default_color,
            base_width: self.default_width,
            eraser: false,
            background: self.background,
            eraser_width_multiplier: self.eraser_width_multiplier,
            eraser_dot_multiplier: self.eraser_dot_multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_app_constants() {
        let config = CanvasConfig::default();
        assert_eq!(config.background.to_hex(), "#fafafa");
        assert_eq!(config.palette.len(), 12);
        assert_eq!(config.widths, vec![2.0, 5.0, 10.0, 18.0]);
        assert_eq!(config.expiry(), Duration::from_secs(24 * 3600));
        assert_eq!(config.orientation_recheck(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = CanvasConfig::from_json(r#"{"me": "Mohamed", "partner": "Lena", "expiry_hours": 48}"#)
            .unwrap();
        assert_eq!(config.me.as_str(), "Mohamed");
        assert_eq!(config.expiry_hours, 48);
        assert_eq!(config.default_width, 5.0);
    }

    #[test]
    fn test_rejects_same_identities() {
        let err = CanvasConfig::from_json(r#"{"me": "Lena", "partner": "Lena"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = CanvasConfig::default();
        config.widths.push(0.0);
        assert!(config.validate().is_err());

        let mut config = CanvasConfig::default();
        config.eraser_width_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = CanvasConfig::default();
        config.expiry_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            CanvasConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            CanvasConfig::from_json(r#"{"background": "fafafa"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_brush_from_config() {
        let mut config = CanvasConfig::default();
        config.default_width = 10.0;
        let brush = config.brush();
        assert_eq!(brush.stroke_width(), 10.0);
        assert_eq!(brush.stroke_color(), config.default_color);
    }

    #[test]
    fn test_json_round_trip() {
        let config = CanvasConfig::for_user("Mohamed", "Lena");
        let back = CanvasConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
