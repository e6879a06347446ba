//! Resource configuration
//!
//! Every field has a default matching the stock device behaviour, so an
//! empty JSON object is a valid configuration.
//!
//! ```rust
//! use oic_sp::SpConfig;
//!
//! let config = SpConfig::from_json(r#"{ "buffer": { "initial": 256 } }"#).unwrap();
//! assert_eq!(config.buffer.initial, 256);
//! assert_eq!(config.buffer.max, 4400);
//! assert_eq!(config.store_key, "sp");
//! ```

use crate::codec::{BufferLimits, SpCodec};
use crate::error::SpError;
use crate::profile::{CredentialPolicy, PropertySet, SecurityProfile, BLACK_PROFILE, BLUE_PROFILE};
use crate::validate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name the resource is persisted under
pub const SP_STORE_KEY: &str = "sp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpConfig {
    /// Encode buffer sizing
    pub buffer: BufferLimits,

    /// Key of the persisted representation
    pub store_key: String,

    /// Profiles that require a credential when active
    pub credential_required_profiles: Vec<String>,

    /// Profile used when nothing valid is persisted
    pub default_profile: SecurityProfile,
}

impl Default for SpConfig {
    fn default() -> Self {
        Self {
            buffer: BufferLimits::default(),
            store_key: SP_STORE_KEY.to_string(),
            credential_required_profiles: vec![BLACK_PROFILE.to_string(), BLUE_PROFILE.to_string()],
            default_profile: SecurityProfile::baseline(),
        }
    }
}

impl SpConfig {
    /// Parses and validates a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, SpError> {
        let config: SpConfig = serde_json::from_str(json)
            .map_err(|e| SpError::Config(format!("invalid configuration JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SpError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SpError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn credential_policy(&self) -> CredentialPolicy {
        CredentialPolicy::new(self.credential_required_profiles.iter().cloned())
    }

    pub fn codec(&self) -> SpCodec {
        SpCodec::new(self.buffer, self.credential_policy())
    }

    pub fn validate(&self) -> Result<(), SpError> {
        if self.buffer.initial == 0 {
            return Err(SpError::Config(
                "buffer.initial must be greater than zero".to_string(),
            ));
        }
        if self.buffer.initial > self.buffer.max {
            return Err(SpError::Config(format!(
                "buffer.initial ({}) exceeds buffer.max ({})",
                self.buffer.initial, self.buffer.max
            )));
        }
        if self.store_key.is_empty() {
            return Err(SpError::Config("store_key must not be empty".to_string()));
        }

        let policy = self.credential_policy();
        // the default must be usable as-is, so credid counts as present
        validate::required_props_present_and_valid(
            &self.default_profile,
            PropertySet::all(),
            &policy,
        )
        .map_err(|e| SpError::Config(format!("default_profile is invalid: {}", e)))?;
        Ok(())
    }
}
