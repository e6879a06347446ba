//! The `/oic/sec/sp` resource: stored state, GET/POST handling and updates
//!
//! [`SpResource`] owns the live [`SecurityProfile`]. Readers get an encoding or
//! a borrow, never a handle they could mutate. An update builds a separate
//! candidate, validates it, persists it, and only then swaps it in, so a
//! rejected update leaves nothing behind.
//!
//! # Example
//!
//! ```rust
//! use oic_sp::{MemoryStore, SecurityProfile, SpConfig, SpResource};
//!
//! # fn main() -> Result<(), oic_sp::SpError> {
//! let mut resource = SpResource::init(SpConfig::default(), MemoryStore::new())?;
//! assert_eq!(resource.profile(), &SecurityProfile::baseline());
//!
//! // switch the active profile, keeping the supported list
//! let update = SecurityProfile::new(
//!     ["oic.sec.sp.baseline", "oic.sec.sp.black"],
//!     "oic.sec.sp.black",
//!     5,
//! );
//! let payload = resource.codec().encode(&update)?;
//! resource.update(&payload)?;
//! assert_eq!(resource.profile().active_profile, "oic.sec.sp.black");
//! # Ok(())
//! # }
//! ```

use crate::codec::{DecodedProfile, SpCodec};
use crate::config::SpConfig;
use crate::error::SpError;
use crate::profile::{PropertySet, SecurityProfile, SpProperty};
use crate::query::validate_query;
use crate::store::PersistentStore;
use crate::validate::{self, ValidationError};
use std::fmt;
use tracing::{debug, info, warn, Level};

/// URI the resource is registered under
pub const SP_RESOURCE_URI: &str = "/oic/sec/sp";

// ============================================================================
// Update state machine
// ============================================================================

/// Stages of one update
///
/// `Idle → Decoding → Merging → Validating → Persisting → Committed`; any
/// stage can end in `Rejected`, which leaves the stored profile untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateStage {
    Idle,
    Decoding,
    Merging,
    Validating,
    Persisting,
    Committed,
    Rejected,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateStage::Idle => "idle",
            UpdateStage::Decoding => "decoding",
            UpdateStage::Merging => "merging",
            UpdateStage::Validating => "validating",
            UpdateStage::Persisting => "persisting",
            UpdateStage::Committed => "committed",
            UpdateStage::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Requests and responses
// ============================================================================

/// Result code handed back to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityHandlerResult {
    Ok,
    Error,
    NotAcceptable,
}

/// A request delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpRequest {
    Get { query: Option<String> },
    Post { payload: Vec<u8> },
    /// Any other method, answered with an error
    Unsupported { method: String },
}

/// Response returned to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpResponse {
    pub result: EntityHandlerResult,
    pub payload: Option<Vec<u8>>,
}

impl SpResponse {
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            result: EntityHandlerResult::Ok,
            payload,
        }
    }

    /// A result code with no body
    pub fn empty(result: EntityHandlerResult) -> Self {
        Self {
            result,
            payload: None,
        }
    }
}

// ============================================================================
// SpResource
// ============================================================================

/// The security profile resource and its stored state
#[derive(Debug)]
pub struct SpResource<S: PersistentStore> {
    profile: SecurityProfile,
    last_update: UpdateStage,
    config: SpConfig,
    codec: SpCodec,
    store: S,
}

impl<S: PersistentStore> SpResource<S> {
    /// Creates the resource with the configured default profile, without
    /// reading the store
    pub fn new(config: SpConfig, store: S) -> Result<Self, SpError> {
        config.validate()?;
        let codec = config.codec();
        Ok(Self {
            profile: config.default_profile.clone(),
            last_update: UpdateStage::Idle,
            config,
            codec,
            store,
        })
    }

    /// Creates the resource from persisted state
    ///
    /// A persisted profile is adopted only if it decodes and validates.
    /// A missing, unreadable, malformed or incomplete blob falls back to the
    /// default profile.
    pub fn init(config: SpConfig, store: S) -> Result<Self, SpError> {
        let mut resource = Self::new(config, store)?;
        if let Some(loaded) = resource.load_persisted() {
            resource.profile = loaded;
        }
        resource.profile.log(
            Level::DEBUG,
            resource.codec.policy(),
            "SP resource after startup initialization",
        );
        Ok(resource)
    }

    fn load_persisted(&self) -> Option<SecurityProfile> {
        let key = &self.config.store_key;
        let data = match self.store.load(key) {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(key = %key, "no persisted security profile, using default");
                return None;
            }
            Err(e) => {
                warn!(key = %key, "failed to read persisted security profile: {}", e);
                return None;
            }
        };

        let DecodedProfile { profile, present } = match self.codec.decode(&data) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("persisted security profile is malformed, using default: {}", e);
                return None;
            }
        };

        if !validate::is_valid(&profile, present, self.codec.policy()) {
            warn!("one or more required sp properties missing from initialization database");
            return None;
        }
        Some(profile)
    }

    /// The live profile
    pub fn profile(&self) -> &SecurityProfile {
        &self.profile
    }

    /// A deep copy of the live profile
    pub fn snapshot(&self) -> SecurityProfile {
        self.profile.clone()
    }

    /// Properties of the live profile that carry meaning
    ///
    /// `credid` counts only while the active profile requires a credential.
    pub fn stored_properties(&self) -> PropertySet {
        self.codec.included_properties(&self.profile)
    }

    /// Outcome of the most recent update: `Idle` before any, then
    /// `Committed` or `Rejected`
    pub fn last_update(&self) -> UpdateStage {
        self.last_update
    }

    pub fn config(&self) -> &SpConfig {
        &self.config
    }

    pub fn codec(&self) -> &SpCodec {
        &self.codec
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Full encoding of the live profile
    pub fn encode(&self) -> Result<Vec<u8>, SpError> {
        self.codec.encode(&self.profile)
    }

    /// Replaces the live profile with a copy of `profile`, bypassing
    /// validation and persistence
    pub fn install(&mut self, profile: &SecurityProfile) {
        self.profile = profile.clone();
        self.profile
            .log(Level::DEBUG, self.codec.policy(), "installed SP resource");
    }

    /// Merges a (possibly partial) incoming profile over the live one
    ///
    /// Each property comes from `incoming` when `present` has it, otherwise
    /// from the live profile. `credid` is forced to zero unless the resolved
    /// active profile requires a credential. The returned presence set always
    /// has both list properties; it has `credid` only if one of the two
    /// sources actually carried a meaningful value.
    pub fn merge(
        &self,
        incoming: &SecurityProfile,
        present: PropertySet,
    ) -> Result<(SecurityProfile, PropertySet), SpError> {
        let stored = &self.profile;
        let stored_present = self.stored_properties();

        let supported_profiles = if present.contains(SpProperty::SupportedProfiles) {
            incoming.supported_profiles.clone()
        } else {
            stored.supported_profiles.clone()
        };
        let active_profile = if present.contains(SpProperty::ActiveProfile) {
            incoming.active_profile.clone()
        } else {
            stored.active_profile.clone()
        };

        let mut candidate = SecurityProfile {
            supported_profiles,
            active_profile,
            credid: 0,
        };
        let mut candidate_present = PropertySet::empty()
            .with(SpProperty::SupportedProfiles)
            .with(SpProperty::ActiveProfile);

        if candidate.profile_index(&candidate.active_profile).is_none() {
            return Err(ValidationError::ActiveNotSupported {
                active: candidate.active_profile,
            }
            .into());
        }

        if self
            .codec
            .policy()
            .requires_credential(&candidate.active_profile)
        {
            if present.contains(SpProperty::CredId) {
                candidate.credid = incoming.credid;
                candidate_present.insert(SpProperty::CredId);
            } else {
                candidate.credid = stored.credid;
                candidate_present.set(
                    SpProperty::CredId,
                    stored_present.contains(SpProperty::CredId),
                );
            }
        }

        Ok((candidate, candidate_present))
    }

    /// Applies an update payload
    ///
    /// On success the merged profile has been persisted and is now live. On
    /// failure the error is [`SpError::UpdateRejected`] naming the stage, and
    /// the live profile is exactly what it was before.
    pub fn update(&mut self, payload: &[u8]) -> Result<(), SpError> {
        let outcome = self.apply_update(payload);
        self.last_update = match outcome {
            Ok(()) => UpdateStage::Committed,
            Err(_) => UpdateStage::Rejected,
        };
        outcome
    }

    fn apply_update(&mut self, payload: &[u8]) -> Result<(), SpError> {
        debug!(size = payload.len(), stage = %UpdateStage::Decoding, "sp update");
        let DecodedProfile { profile, present } = self
            .codec
            .decode(payload)
            .map_err(|e| reject(UpdateStage::Decoding, e))?;

        debug!(present = %present, stage = %UpdateStage::Merging, "sp update");
        let (candidate, candidate_present) = self
            .merge(&profile, present)
            .map_err(|e| reject(UpdateStage::Merging, e))?;

        debug!(stage = %UpdateStage::Validating, "sp update");
        validate::required_props_present_and_valid(
            &candidate,
            candidate_present,
            self.codec.policy(),
        )
        .map_err(|e| reject(UpdateStage::Validating, e.into()))?;

        debug!(stage = %UpdateStage::Persisting, "sp update");
        let encoded = self
            .codec
            .encode(&candidate)
            .map_err(|e| reject(UpdateStage::Persisting, e))?;
        self.store
            .save(&self.config.store_key, &encoded)
            .map_err(|e| reject(UpdateStage::Persisting, e.into()))?;

        self.profile = candidate;
        info!(stage = %UpdateStage::Committed, "security profile updated");
        self.profile.log(
            Level::DEBUG,
            self.codec.policy(),
            "State of SP resource after being updated by POST",
        );
        Ok(())
    }

    /// Dispatches one transport request
    pub fn handle(&mut self, request: SpRequest) -> SpResponse {
        match request {
            SpRequest::Get { query } => self.handle_get(query.as_deref()),
            SpRequest::Post { payload } => self.handle_post(&payload),
            SpRequest::Unsupported { method } => {
                warn!(method = %method, "unsupported method on {}", SP_RESOURCE_URI);
                SpResponse::empty(EntityHandlerResult::Error)
            }
        }
    }

    fn handle_get(&self, query: Option<&str>) -> SpResponse {
        info!("processing GET request on {}", SP_RESOURCE_URI);
        if let Some(query) = query {
            debug!(query = %query, "GET query");
            if !validate_query(query) {
                return SpResponse::empty(EntityHandlerResult::Error);
            }
        }

        match self.encode() {
            Ok(payload) => {
                self.profile.log(
                    Level::DEBUG,
                    self.codec.policy(),
                    "SP resource being sent in response to GET",
                );
                SpResponse::ok(Some(payload))
            }
            Err(e) => {
                warn!("failed to encode security profile for GET: {}", e);
                SpResponse::empty(EntityHandlerResult::Error)
            }
        }
    }

    fn handle_post(&mut self, payload: &[u8]) -> SpResponse {
        info!(size = payload.len(), "processing POST request on {}", SP_RESOURCE_URI);
        match self.update(payload) {
            Ok(()) => SpResponse::empty(EntityHandlerResult::Ok),
            Err(_) => SpResponse::empty(EntityHandlerResult::NotAcceptable),
        }
    }
}

fn reject(stage: UpdateStage, error: SpError) -> SpError {
    if error.is_validation_error() {
        warn!(stage = %stage, code = error.error_code(), "sp update rejected: {}", error);
    } else {
        warn!(stage = %stage, "sp update rejected: {}", error);
    }
    error.rejected_at(stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{BASELINE_PROFILE, BLACK_PROFILE, BLUE_PROFILE};
    use crate::store::MemoryStore;
    use crate::validate::is_same;

    fn resource_with(profile: &SecurityProfile) -> SpResource<MemoryStore> {
        let mut resource = SpResource::new(SpConfig::default(), MemoryStore::new()).unwrap();
        resource.install(profile);
        resource
    }

    fn partial(profile: &SecurityProfile, include: PropertySet) -> Vec<u8> {
        SpCodec::default().encode_partial(profile, include).unwrap()
    }

    fn three_profiles(active: &str, credid: u16) -> SecurityProfile {
        SecurityProfile::new([BASELINE_PROFILE, BLACK_PROFILE, BLUE_PROFILE], active, credid)
    }

    #[test]
    fn test_merge_takes_present_fields() {
        let resource = resource_with(&three_profiles(BLUE_PROFILE, 11));
        let incoming = SecurityProfile::new(Vec::<String>::new(), BASELINE_PROFILE, 99);
        let present = PropertySet::empty().with(SpProperty::ActiveProfile);

        let (candidate, candidate_present) = resource.merge(&incoming, present).unwrap();
        assert_eq!(candidate, three_profiles(BASELINE_PROFILE, 0));
        assert!(!candidate_present.contains(SpProperty::CredId));
    }

    #[test]
    fn test_merge_credid_sources() {
        let resource = resource_with(&three_profiles(BLUE_PROFILE, 11));

        // credid omitted: carried over from the stored profile
        let incoming = SecurityProfile::new(Vec::<String>::new(), BLACK_PROFILE, 0);
        let only_active = PropertySet::empty().with(SpProperty::ActiveProfile);
        let (candidate, present) = resource.merge(&incoming, only_active).unwrap();
        assert_eq!(candidate.credid, 11);
        assert!(present.contains(SpProperty::CredId));

        // credid supplied: incoming wins
        let incoming = SecurityProfile::new(Vec::<String>::new(), BLACK_PROFILE, 4);
        let (candidate, _) = resource
            .merge(&incoming, only_active.with(SpProperty::CredId))
            .unwrap();
        assert_eq!(candidate.credid, 4);
    }

    #[test]
    fn test_merge_rejects_unsupported_active() {
        let resource = resource_with(&SecurityProfile::baseline());
        let incoming = SecurityProfile::new(Vec::<String>::new(), BLUE_PROFILE, 1);
        let present = PropertySet::all().without(SpProperty::SupportedProfiles);
        let err = resource.merge(&incoming, present).unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_update_commits_and_persists() {
        let mut resource = resource_with(&three_profiles(BASELINE_PROFILE, 0));
        let update = three_profiles(BLACK_PROFILE, 8);
        resource.update(&SpCodec::default().encode(&update).unwrap()).unwrap();

        assert_eq!(resource.profile(), &update);
        let stored = resource.store().get("sp").unwrap();
        assert_eq!(SecurityProfile::from_cbor(stored).unwrap().profile, update);
    }

    #[test]
    fn test_update_rejected_stages() {
        let before = three_profiles(BASELINE_PROFILE, 0);
        let mut resource = resource_with(&before);

        let err = resource.update(&[0x01]).unwrap_err();
        assert_eq!(err.stage(), Some(UpdateStage::Decoding));

        let err = resource.update(&[]).unwrap_err();
        assert_eq!(err.stage(), Some(UpdateStage::Decoding));

        let bad_active = SecurityProfile::new(Vec::<String>::new(), "oic.sec.sp.unknown", 0);
        let err = resource
            .update(&partial(&bad_active, PropertySet::empty().with(SpProperty::ActiveProfile)))
            .unwrap_err();
        assert_eq!(err.stage(), Some(UpdateStage::Merging));

        let black_no_cred = three_profiles(BLACK_PROFILE, 0);
        let err = resource
            .update(&partial(&black_no_cred, PropertySet::empty().with(SpProperty::ActiveProfile)))
            .unwrap_err();
        assert_eq!(err.stage(), Some(UpdateStage::Validating));

        resource.store_mut().set_reject_writes(true);
        let err = resource
            .update(&SpCodec::default().encode(&three_profiles(BLUE_PROFILE, 2)).unwrap())
            .unwrap_err();
        assert_eq!(err.stage(), Some(UpdateStage::Persisting));

        assert!(is_same(resource.profile(), &before, None));
        assert_eq!(resource.store().write_count(), 0);
    }

    #[test]
    fn test_last_update_outcome() {
        let mut resource = resource_with(&three_profiles(BASELINE_PROFILE, 0));
        assert_eq!(resource.last_update(), UpdateStage::Idle);

        resource.update(&[0xFF]).unwrap_err();
        assert_eq!(resource.last_update(), UpdateStage::Rejected);

        let update = three_profiles(BLUE_PROFILE, 2);
        resource.update(&SpCodec::default().encode(&update).unwrap()).unwrap();
        assert_eq!(resource.last_update(), UpdateStage::Committed);
    }

    #[test]
    fn test_handle_get() {
        let mut resource = resource_with(&SecurityProfile::baseline());

        let response = resource.handle(SpRequest::Get { query: None });
        assert_eq!(response.result, EntityHandlerResult::Ok);
        let payload = response.payload.unwrap();
        assert_eq!(
            SecurityProfile::from_cbor(&payload).unwrap().profile,
            SecurityProfile::baseline()
        );

        let response = resource.handle(SpRequest::Get {
            query: Some("if=oic.if.baseline".to_string()),
        });
        assert_eq!(response.result, EntityHandlerResult::Ok);

        let response = resource.handle(SpRequest::Get {
            query: Some("if=oic.if.rw".to_string()),
        });
        assert_eq!(response, SpResponse::empty(EntityHandlerResult::Error));
    }

    #[test]
    fn test_handle_get_unencodable_profile() {
        let mut resource = resource_with(&SecurityProfile::new(Vec::<String>::new(), "a", 0));
        let response = resource.handle(SpRequest::Get { query: None });
        assert_eq!(response, SpResponse::empty(EntityHandlerResult::Error));
    }

    #[test]
    fn test_handle_post_and_unsupported() {
        let mut resource = resource_with(&three_profiles(BASELINE_PROFILE, 0));
        let payload = partial(
            &three_profiles(BLUE_PROFILE, 3),
            PropertySet::empty()
                .with(SpProperty::ActiveProfile)
                .with(SpProperty::CredId),
        );
        let response = resource.handle(SpRequest::Post { payload });
        assert_eq!(response, SpResponse::empty(EntityHandlerResult::Ok));
        assert_eq!(resource.profile(), &three_profiles(BLUE_PROFILE, 3));

        let response = resource.handle(SpRequest::Post {
            payload: vec![0xFF],
        });
        assert_eq!(response, SpResponse::empty(EntityHandlerResult::NotAcceptable));

        let response = resource.handle(SpRequest::Unsupported {
            method: "DELETE".to_string(),
        });
        assert_eq!(response, SpResponse::empty(EntityHandlerResult::Error));
    }

    #[test]
    fn test_init_from_store() {
        let persisted = three_profiles(BLUE_PROFILE, 21);
        let store = MemoryStore::with_entry("sp", persisted.to_cbor().unwrap());
        let resource = SpResource::init(SpConfig::default(), store).unwrap();
        assert_eq!(resource.profile(), &persisted);
        assert_eq!(resource.stored_properties(), PropertySet::all());
    }

    #[test]
    fn test_init_falls_back_to_default() {
        // malformed
        let store = MemoryStore::with_entry("sp", vec![0x83]);
        let resource = SpResource::init(SpConfig::default(), store).unwrap();
        assert_eq!(resource.profile(), &SecurityProfile::baseline());

        // well-formed but missing the required credid
        let black = three_profiles(BLACK_PROFILE, 5);
        let bytes = SpCodec::default()
            .encode_partial(&black, PropertySet::all().without(SpProperty::CredId))
            .unwrap();
        let resource =
            SpResource::init(SpConfig::default(), MemoryStore::with_entry("sp", bytes)).unwrap();
        assert_eq!(resource.profile(), &SecurityProfile::baseline());

        // nothing stored
        let resource = SpResource::init(SpConfig::default(), MemoryStore::new()).unwrap();
        assert_eq!(resource.profile(), &SecurityProfile::baseline());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = SpConfig {
            store_key: String::new(),
            ..SpConfig::default()
        };
        assert!(SpResource::new(config, MemoryStore::new()).is_err());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(UpdateStage::Persisting.to_string(), "persisting");
        assert_eq!(UpdateStage::Committed.to_string(), "committed");
    }
}
