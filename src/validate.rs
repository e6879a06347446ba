//! Security profile validation and comparison
//!
//! Validation is a pure function of the profile, the presence set and the
//! credential policy. It never fails because of how the bytes looked on the
//! wire; that is the codec's job.

use crate::profile::{CredentialPolicy, PropertySet, SecurityProfile, SpProperty};
use thiserror::Error;
use tracing::warn;

/// Why a profile was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required property supported_profiles not present")]
    SupportedProfilesMissing,

    #[error("supported_profiles list is empty")]
    SupportedProfilesEmpty,

    #[error("required property active_profile not present")]
    ActiveProfileMissing,

    #[error("active_profile is empty")]
    ActiveProfileEmpty,

    #[error("active_profile '{active}' is not contained in supported_profiles")]
    ActiveNotSupported { active: String },

    #[error("active_profile '{active}' requires a credential, but none is present")]
    CredentialMissing { active: String },
}

impl ValidationError {
    /// The property the failed rule is about
    pub fn property(&self) -> SpProperty {
        match self {
            ValidationError::SupportedProfilesMissing | ValidationError::SupportedProfilesEmpty => {
                SpProperty::SupportedProfiles
            }
            ValidationError::ActiveProfileMissing
            | ValidationError::ActiveProfileEmpty
            | ValidationError::ActiveNotSupported { .. } => SpProperty::ActiveProfile,
            ValidationError::CredentialMissing { .. } => SpProperty::CredId,
        }
    }

    /// Returns a stable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::SupportedProfilesMissing => "OIC_SP_E_SUPPORTED_MISSING",
            ValidationError::SupportedProfilesEmpty => "OIC_SP_E_SUPPORTED_EMPTY",
            ValidationError::ActiveProfileMissing => "OIC_SP_E_ACTIVE_MISSING",
            ValidationError::ActiveProfileEmpty => "OIC_SP_E_ACTIVE_EMPTY",
            ValidationError::ActiveNotSupported { .. } => "OIC_SP_E_ACTIVE_NOT_SUPPORTED",
            ValidationError::CredentialMissing { .. } => "OIC_SP_E_CREDENTIAL_MISSING",
        }
    }
}

/// Checks that every required property is present and consistent
///
/// Rules, in order:
/// 1. `supported_profiles` present and non-empty
/// 2. `active_profile` present and non-empty
/// 3. `active_profile` is one of `supported_profiles`
/// 4. if `active_profile` requires a credential, `credid` is present
pub fn required_props_present_and_valid(
    profile: &SecurityProfile,
    present: PropertySet,
    policy: &CredentialPolicy,
) -> Result<(), ValidationError> {
    if !present.contains(SpProperty::SupportedProfiles) {
        return Err(ValidationError::SupportedProfilesMissing);
    }
    if profile.supported_profiles.is_empty() {
        return Err(ValidationError::SupportedProfilesEmpty);
    }
    if !present.contains(SpProperty::ActiveProfile) {
        return Err(ValidationError::ActiveProfileMissing);
    }
    if profile.active_profile.is_empty() {
        return Err(ValidationError::ActiveProfileEmpty);
    }
    if profile.profile_index(&profile.active_profile).is_none() {
        return Err(ValidationError::ActiveNotSupported {
            active: profile.active_profile.clone(),
        });
    }
    if policy.requires_credential(&profile.active_profile) && !present.contains(SpProperty::CredId)
    {
        return Err(ValidationError::CredentialMissing {
            active: profile.active_profile.clone(),
        });
    }
    Ok(())
}

/// Like [`required_props_present_and_valid`], logging the reason on failure
pub fn is_valid(
    profile: &SecurityProfile,
    present: PropertySet,
    policy: &CredentialPolicy,
) -> bool {
    match required_props_present_and_valid(profile, present, policy) {
        Ok(()) => true,
        Err(e) => {
            warn!(code = e.error_code(), "security profile rejected: {}", e);
            false
        }
    }
}

/// Compares the properties selected by `mask` (all of them if `None`)
///
/// Supported lists compare as sets: same length, and every name in `a`
/// appears somewhere in `b`.
pub fn is_same(a: &SecurityProfile, b: &SecurityProfile, mask: Option<PropertySet>) -> bool {
    let mask = mask.unwrap_or_else(PropertySet::all);

    if mask.contains(SpProperty::SupportedProfiles) {
        if a.supported_profiles.len() != b.supported_profiles.len() {
            return false;
        }
        if !a.supported_profiles.iter().all(|name| b.supports(name)) {
            return false;
        }
    }

    if mask.contains(SpProperty::ActiveProfile) && a.active_profile != b.active_profile {
        return false;
    }

    if mask.contains(SpProperty::CredId) && a.credid != b.credid {
        return false;
    }

    true
}
