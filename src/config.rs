//! Validator configuration.
//!
//! # Example
//!
//! ```
//! use netcode_rpc::ValidatorConfig;
//!
//! let config = ValidatorConfig::from_json(r#"{ "channel_prefix": "Game" }"#).unwrap();
//! assert_eq!(config.channel_name("Door"), "Game.Door");
//! assert_eq!(config.scratch_buffer_size, 1024);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::{CHANNEL_PREFIX, DEFAULT_FRAME_BYTES_PER_PARAMETER, DEFAULT_SCRATCH_BUFFER_SIZE};

/// Settings shared by registration and dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Channels are named `"<prefix>.<TypeName>"`.
    pub channel_prefix: String,
    /// Fixed scratch size for self-describing parameters.
    pub scratch_buffer_size: usize,
    /// Outbound frames start at `(parameters + 1) * frame_bytes_per_parameter` bytes.
    pub frame_bytes_per_parameter: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            channel_prefix: CHANNEL_PREFIX.to_string(),
            scratch_buffer_size: DEFAULT_SCRATCH_BUFFER_SIZE,
            frame_bytes_per_parameter: DEFAULT_FRAME_BYTES_PER_PARAMETER,
        }
    }
}

impl ValidatorConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Channel name for an owning type.
    pub fn channel_name(&self, type_name: &str) -> String {
        format!("{}.{}", self.channel_prefix, type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;

    #[test]
    fn test_defaults() {
        let config = ValidatorConfig::default();
        assert_eq!(config.channel_prefix, "Net");
        assert_eq!(config.scratch_buffer_size, 1024);
        assert_eq!(config.frame_bytes_per_parameter, 128);
        assert_eq!(config.channel_name("T"), "Net.T");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ValidatorConfig::from_json(r#"{ "scratch_buffer_size": 64 }"#).unwrap();
        assert_eq!(config.scratch_buffer_size, 64);
        assert_eq!(config.channel_prefix, "Net");
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ValidatorConfig {
            channel_prefix: "Rpc".into(),
            scratch_buffer_size: 2048,
            frame_bytes_per_parameter: 32,
        };
        let json = config.to_json().unwrap();
        assert_eq!(ValidatorConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_extreme_sizes_are_safe_to_use() {
        use crate::codec::{Args, Parameter};
        use crate::protocol::{encode_call, FrameHeader};

        let json = format!(
            r#"{{ "scratch_buffer_size": {0}, "frame_bytes_per_parameter": {0} }}"#,
            usize::MAX
        );
        let config = ValidatorConfig::from_json(&json).unwrap();
        assert_eq!(config.frame_bytes_per_parameter, usize::MAX);

        let frame = encode_call(
            &FrameHeader::new(1, 0, "PingServerRpc"),
            &[Parameter::of::<i32>("x")],
            &Args::new().with(1i32),
            config.scratch_buffer_size,
            config.frame_bytes_per_parameter,
        )
        .unwrap();
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_invalid_json() {
        let err = ValidatorConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, RpcError::Json(_)));
    }
}
