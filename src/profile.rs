//! Security profile model
//!
//! A device advertises the security profiles it supports, designates one of
//! them as active and, for profiles that mandate it, references a credential.
//! [`PropertySet`] records which of the three fields an encode included or a
//! decode observed, which is what makes partial updates possible.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::Level;

/// Baseline profile, the built-in default of every device
pub const BASELINE_PROFILE: &str = "oic.sec.sp.baseline";
/// Black profile, requires a credential
pub const BLACK_PROFILE: &str = "oic.sec.sp.black";
/// Blue profile, requires a credential
pub const BLUE_PROFILE: &str = "oic.sec.sp.blue";

lazy_static! {
    static ref STANDARD_POLICY: CredentialPolicy = CredentialPolicy::default();
}

// ============================================================================
// Properties and presence
// ============================================================================

/// The three properties of a security profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpProperty {
    SupportedProfiles,
    ActiveProfile,
    CredId,
}

impl SpProperty {
    pub const ALL: [SpProperty; 3] = [
        SpProperty::SupportedProfiles,
        SpProperty::ActiveProfile,
        SpProperty::CredId,
    ];

    /// Wire name of the property
    pub fn name(self) -> &'static str {
        match self {
            SpProperty::SupportedProfiles => "supported_profiles",
            SpProperty::ActiveProfile => "active_profile",
            SpProperty::CredId => "credid",
        }
    }

    /// Looks a property up by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    fn bit(self) -> u8 {
        match self {
            SpProperty::SupportedProfiles => 0b001,
            SpProperty::ActiveProfile => 0b010,
            SpProperty::CredId => 0b100,
        }
    }
}

impl fmt::Display for SpProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-cardinality set over [`SpProperty`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PropertySet(u8);

impl PropertySet {
    const MASK: u8 = 0b111;

    pub const fn empty() -> Self {
        PropertySet(0)
    }

    pub const fn all() -> Self {
        PropertySet(Self::MASK)
    }

    pub fn contains(self, property: SpProperty) -> bool {
        self.0 & property.bit() != 0
    }

    pub fn insert(&mut self, property: SpProperty) {
        self.0 |= property.bit();
    }

    pub fn remove(&mut self, property: SpProperty) {
        self.0 &= !property.bit();
    }

    /// Sets or clears `property` depending on `present`
    pub fn set(&mut self, property: SpProperty, present: bool) {
        if present {
            self.insert(property);
        } else {
            self.remove(property);
        }
    }

    /// Sets every property to `present`
    pub fn set_all(&mut self, present: bool) {
        self.0 = if present { Self::MASK } else { 0 };
    }

    pub fn with(mut self, property: SpProperty) -> Self {
        self.insert(property);
        self
    }

    pub fn without(mut self, property: SpProperty) -> Self {
        self.remove(property);
        self
    }

    pub fn intersection(self, other: PropertySet) -> Self {
        PropertySet(self.0 & other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = SpProperty> {
        SpProperty::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl FromIterator<SpProperty> for PropertySet {
    fn from_iter<I: IntoIterator<Item = SpProperty>>(iter: I) -> Self {
        let mut set = PropertySet::empty();
        for property in iter {
            set.insert(property);
        }
        set
    }
}

impl fmt::Display for PropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(SpProperty::name).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

// ============================================================================
// Credential policy
// ============================================================================

/// The set of profile names that require a credential when active
///
/// Membership depends on the name alone; a name that is not listed never
/// requires a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPolicy {
    profiles: Vec<String>,
}

impl CredentialPolicy {
    pub fn new<I, T>(profiles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            profiles: profiles.into_iter().map(Into::into).collect(),
        }
    }

    /// The stock policy: black and blue require a credential
    pub fn standard() -> &'static CredentialPolicy {
        &STANDARD_POLICY
    }

    pub fn requires_credential(&self, profile: &str) -> bool {
        self.profiles.iter().any(|p| p == profile)
    }

    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self::new([BLACK_PROFILE, BLUE_PROFILE])
    }
}

/// Whether `profile` requires a credential under the stock policy
pub fn requires_credential(profile: &str) -> bool {
    CredentialPolicy::standard().requires_credential(profile)
}

/// Index of the first entry of `supported` equal to `profile`
pub fn profile_index(supported: &[String], profile: &str) -> Option<usize> {
    supported.iter().position(|p| p == profile)
}

// ============================================================================
// SecurityProfile
// ============================================================================

/// In-memory representation of the `/oic/sec/sp` resource
///
/// Every instance owns its strings; `clone()` is a deep copy, so decoded,
/// merged and stored profiles never share storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityProfile {
    /// Names of the profiles the device supports, in advertised order
    pub supported_profiles: Vec<String>,

    /// Name of the active profile
    pub active_profile: String,

    /// Credential reference, meaningful only for credential-requiring profiles
    #[serde(default)]
    pub credid: u16,
}

impl SecurityProfile {
    pub fn new<I, T>(supported_profiles: I, active_profile: impl Into<String>, credid: u16) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            supported_profiles: supported_profiles.into_iter().map(Into::into).collect(),
            active_profile: active_profile.into(),
            credid,
        }
    }

    /// The built-in default: only baseline supported, baseline active
    pub fn baseline() -> Self {
        Self::new([BASELINE_PROFILE], BASELINE_PROFILE, 0)
    }

    pub fn profile_index(&self, profile: &str) -> Option<usize> {
        profile_index(&self.supported_profiles, profile)
    }

    pub fn supports(&self, profile: &str) -> bool {
        self.profile_index(profile).is_some()
    }

    /// Dumps the profile to the log at `level`
    pub fn log(&self, level: Level, policy: &CredentialPolicy, msg: &str) {
        let requires = if policy.requires_credential(&self.active_profile) {
            "yes"
        } else {
            "no"
        };
        let supported = self
            .supported_profiles
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}: {}", i, p))
            .collect::<Vec<_>>()
            .join(", ");
        let supported_count = self.supported_profiles.len();
        let active = self.active_profile.as_str();
        let credid = self.credid;

        macro_rules! emit {
            ($mac:ident) => {
                tracing::$mac!(
                    supported_count,
                    supported = %supported,
                    active = %active,
                    requires_cred = requires,
                    credid,
                    "{}",
                    msg
                )
            };
        }

        match level {
            Level::ERROR => emit!(error),
            Level::WARN => emit!(warn),
            Level::INFO => emit!(info),
            Level::DEBUG => emit!(debug),
            _ => emit!(trace),
        }
    }
}

impl Default for SecurityProfile {
    fn default() -> Self {
        Self::baseline()
    }
}

impl fmt::Display for SecurityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active={} supported=[{}] credid={}",
            self.active_profile,
            self.supported_profiles.join(", "),
            self.credid
        )
    }
}
