//! CBOR codec for the `/oic/sec/sp` representation
//!
//! # Wire format
//!
//! A single CBOR map with text keys:
//!
//! | Key                  | Value                      | Presence                          |
//! |----------------------|----------------------------|-----------------------------------|
//! | `supported_profiles` | array of text              | optional                          |
//! | `active_profile`     | text                       | optional                          |
//! | `credid`             | unsigned integer           | credential-requiring active only  |
//! | `rt`                 | `["oic.r.sp"]`             | always                            |
//! | `if`                 | `["oic.if.baseline"]`      | always                            |
//!
//! # Example
//!
//! ```rust
//! use oic_sp::{SecurityProfile, SpCodec, SpProperty};
//!
//! # fn main() -> Result<(), oic_sp::SpError> {
//! let codec = SpCodec::default();
//! let bytes = codec.encode(&SecurityProfile::baseline())?;
//!
//! let decoded = codec.decode(&bytes)?;
//! assert_eq!(decoded.profile, SecurityProfile::baseline());
//! assert!(!decoded.present.contains(SpProperty::CredId));
//! # Ok(())
//! # }
//! ```

use crate::cbor::{self, value_kind, BoundedBuffer, DecodeError, SELF_DESCRIBE_TAG};
use crate::error::SpError;
use crate::profile::{CredentialPolicy, PropertySet, SecurityProfile, SpProperty};
use ciborium::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Resource type tag name
pub const RT_NAME: &str = "rt";
/// Interface tag name
pub const IF_NAME: &str = "if";
/// Resource type of the security profile resource
pub const SP_RESOURCE_TYPE: &str = "oic.r.sp";
/// Default (baseline) interface
pub const DEFAULT_INTERFACE: &str = "oic.if.baseline";

/// Default size of the first encode attempt
pub const CBOR_SIZE: usize = 512;
/// Hard ceiling for the encode buffer
pub const CBOR_MAX_SIZE: usize = 4400;
/// `rt` and `if` are always present
pub const SP_MIN_MAP_SIZE: usize = 2;

// ============================================================================
// Buffer limits
// ============================================================================

/// Sizing of the grow-and-retry encode loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferLimits {
    /// Capacity of the first attempt
    pub initial: usize,
    /// Capacity no attempt may exceed
    pub max: usize,
}

impl BufferLimits {
    /// Upper bound on encode attempts
    ///
    /// Each retry grows the buffer by at least one byte and never past
    /// `max`, and an exact overflow count means two attempts normally
    /// suffice. The bound only guards against a misbehaving writer.
    pub fn max_attempts(&self) -> usize {
        let step = self.initial.max(1);
        self.max.div_ceil(step).clamp(2, 16) + 1
    }
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            initial: CBOR_SIZE,
            max: CBOR_MAX_SIZE,
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Result of decoding a profile: the values plus which of them were on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedProfile {
    pub profile: SecurityProfile,
    pub present: PropertySet,
}

/// Encoder/decoder for security profiles
#[derive(Debug, Clone, Default)]
pub struct SpCodec {
    limits: BufferLimits,
    policy: CredentialPolicy,
}

impl SpCodec {
    pub fn new(limits: BufferLimits, policy: CredentialPolicy) -> Self {
        Self { limits, policy }
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    pub fn policy(&self) -> &CredentialPolicy {
        &self.policy
    }

    /// Properties a full encode of `profile` includes
    ///
    /// `credid` is only meaningful, and only emitted, when the active
    /// profile requires a credential.
    pub fn included_properties(&self, profile: &SecurityProfile) -> PropertySet {
        let all = PropertySet::all();
        if self.policy.requires_credential(&profile.active_profile) {
            all
        } else {
            all.without(SpProperty::CredId)
        }
    }

    /// Encodes every meaningful property of `profile`
    pub fn encode(&self, profile: &SecurityProfile) -> Result<Vec<u8>, SpError> {
        self.encode_partial(profile, self.included_properties(profile))
    }

    /// Encodes exactly the properties in `include`
    pub fn encode_partial(
        &self,
        profile: &SecurityProfile,
        include: PropertySet,
    ) -> Result<Vec<u8>, SpError> {
        self.encode_with_size_hint(profile, include, 0)
    }

    /// Encodes `include`, starting with a buffer of `size_hint` bytes
    ///
    /// A `size_hint` of zero uses the configured initial size; no hint may
    /// start above the ceiling. On overflow
    /// the buffer grows by the reported shortfall, capped at the ceiling;
    /// overflowing a buffer already at the ceiling is terminal.
    pub fn encode_with_size_hint(
        &self,
        profile: &SecurityProfile,
        include: PropertySet,
        size_hint: usize,
    ) -> Result<Vec<u8>, SpError> {
        let map = build_map(profile, include)?;

        let mut capacity = if size_hint == 0 {
            self.limits.initial
        } else {
            size_hint
        }
        .min(self.limits.max);

        for attempt in 1..=self.limits.max_attempts() {
            match encode_attempt(&map, capacity) {
                Ok(bytes) => {
                    debug!(
                        attempt,
                        capacity,
                        size = bytes.len(),
                        "encoded security profile"
                    );
                    return Ok(bytes);
                }
                Err(SpError::EncodeOverflow { needed }) if capacity < self.limits.max => {
                    let next = capacity.saturating_add(needed).min(self.limits.max);
                    debug!(attempt, capacity, needed, next, "encode buffer overflow, retrying");
                    capacity = next;
                }
                Err(SpError::EncodeOverflow { needed }) => {
                    error!(capacity, needed, "security profile exceeds maximum encoded size");
                    return Err(SpError::EncodeFailure(format!(
                        "encoded profile needs {} bytes, ceiling is {}",
                        capacity + needed,
                        self.limits.max
                    )));
                }
                Err(e) => return Err(e),
            }
        }

        Err(SpError::EncodeFailure(format!(
            "gave up after {} attempts",
            self.limits.max_attempts()
        )))
    }

    /// Decodes a security profile and records which properties were present
    ///
    /// Keys may come in any order. Unknown keys, textual or not, are dropped
    /// together with their entire value. Duplicate keys resolve to the last
    /// occurrence. A missing known property is not an
    /// error here; it is simply absent from [`DecodedProfile::present`].
    pub fn decode(&self, data: &[u8]) -> Result<DecodedProfile, SpError> {
        if data.is_empty() {
            return Err(SpError::InvalidArgument(
                "security profile payload is empty".to_string(),
            ));
        }
        decode_profile(data).map_err(|e| {
            error!("failed to decode security profile: {}", e);
            SpError::DecodeFailure(e)
        })
    }
}

fn text_array(values: &[&str]) -> Value {
    Value::Array(values.iter().map(|v| Value::Text(v.to_string())).collect())
}

/// Builds the map for `include`, entries in canonical order
fn build_map(profile: &SecurityProfile, include: PropertySet) -> Result<Value, SpError> {
    let mut map = Vec::with_capacity(SP_MIN_MAP_SIZE + include.len());

    if include.contains(SpProperty::SupportedProfiles) {
        if profile.supported_profiles.is_empty() {
            return Err(SpError::EncodeFailure(
                "list of supported security profiles can't be empty".to_string(),
            ));
        }
        map.push((
            Value::Text(SpProperty::SupportedProfiles.name().to_string()),
            Value::Array(
                profile
                    .supported_profiles
                    .iter()
                    .map(|p| Value::Text(p.clone()))
                    .collect(),
            ),
        ));
    }

    if include.contains(SpProperty::ActiveProfile) {
        map.push((
            Value::Text(SpProperty::ActiveProfile.name().to_string()),
            Value::Text(profile.active_profile.clone()),
        ));
    }

    if include.contains(SpProperty::CredId) {
        map.push((
            Value::Text(SpProperty::CredId.name().to_string()),
            Value::Integer(profile.credid.into()),
        ));
    }

    map.push((
        Value::Text(RT_NAME.to_string()),
        text_array(&[SP_RESOURCE_TYPE]),
    ));
    map.push((
        Value::Text(IF_NAME.to_string()),
        text_array(&[DEFAULT_INTERFACE]),
    ));

    Ok(Value::Map(map))
}

fn encode_attempt(map: &Value, capacity: usize) -> Result<Vec<u8>, SpError> {
    let mut buffer = BoundedBuffer::with_capacity(capacity);
    ciborium::into_writer(map, &mut buffer)
        .map_err(|e| SpError::EncodeFailure(format!("CBOR encoding error: {}", e)))?;

    let needed = buffer.overflow();
    buffer
        .into_inner()
        .ok_or(SpError::EncodeOverflow { needed })
}

fn decode_profile(data: &[u8]) -> Result<DecodedProfile, DecodeError> {
    let value = match cbor::read_value(data)? {
        Value::Tag(SELF_DESCRIBE_TAG, inner) => *inner,
        other => other,
    };
    let entries = match value {
        Value::Map(entries) => entries,
        other => {
            return Err(DecodeError::TypeMismatch {
                field: "security profile",
                expected: "map",
                found: value_kind(&other),
            })
        }
    };

    let mut profile = SecurityProfile {
        supported_profiles: Vec::new(),
        active_profile: String::new(),
        credid: 0,
    };
    let mut present = PropertySet::empty();

    for (key, value) in entries {
        // unknown and non-text keys are dropped with their whole value
        let Some(property) = key.as_text().and_then(SpProperty::from_name) else {
            continue;
        };
        match property {
            SpProperty::SupportedProfiles => {
                profile.supported_profiles = read_supported_profiles(value)?;
            }
            SpProperty::ActiveProfile => {
                profile.active_profile = match value {
                    Value::Text(name) => name,
                    other => {
                        return Err(DecodeError::TypeMismatch {
                            field: property.name(),
                            expected: "text string",
                            found: value_kind(&other),
                        })
                    }
                };
            }
            SpProperty::CredId => profile.credid = read_credid(value)?,
        }
        present.insert(property);
    }

    Ok(DecodedProfile { profile, present })
}

fn read_supported_profiles(value: Value) -> Result<Vec<String>, DecodeError> {
    let field = SpProperty::SupportedProfiles.name();
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(DecodeError::TypeMismatch {
                field,
                expected: "array",
                found: value_kind(&other),
            })
        }
    };

    let declared = items.len() as u64;
    let profiles: Vec<String> = items
        .into_iter()
        .map_while(|item| match item {
            Value::Text(name) => Some(name),
            _ => None,
        })
        .collect();

    let extracted = profiles.len() as u64;
    if extracted != declared {
        return Err(DecodeError::ArrayLengthMismatch {
            field,
            declared,
            extracted,
        });
    }
    Ok(profiles)
}

fn read_credid(value: Value) -> Result<u16, DecodeError> {
    let field = SpProperty::CredId.name();
    let number = match value {
        Value::Integer(n) if i128::from(n) >= 0 => i128::from(n),
        other => {
            return Err(DecodeError::TypeMismatch {
                field,
                expected: "unsigned integer",
                found: value_kind(&other),
            })
        }
    };
    u16::try_from(number).map_err(|_| DecodeError::OutOfRange {
        field,
        value: number as u64,
    })
}

impl SecurityProfile {
    /// Full encode with the stock codec
    pub fn to_cbor(&self) -> Result<Vec<u8>, SpError> {
        SpCodec::default().encode(self)
    }

    /// Decode with the stock codec
    pub fn from_cbor(data: &[u8]) -> Result<DecodedProfile, SpError> {
        SpCodec::default().decode(data)
    }
}
