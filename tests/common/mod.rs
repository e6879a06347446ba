//! Common helpers for the integration tests

#![allow(dead_code)]

use oic_sp::{PropertySet, SecurityProfile, SpCodec, SpProperty, BASELINE_PROFILE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Names the random generators draw from, standard ones first
pub const PROFILE_NAMES: &[&str] = &[
    "oic.sec.sp.baseline",
    "oic.sec.sp.black",
    "oic.sec.sp.blue",
    "oic.sec.sp.purple",
    "x.com.example.sp.gold",
    "x.com.example.sp.silver",
];

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A valid profile: unique non-empty names, active among them
pub fn random_valid_profile(rng: &mut StdRng) -> SecurityProfile {
    let count = rng.gen_range(1..=PROFILE_NAMES.len());
    let mut names: Vec<&str> = PROFILE_NAMES.to_vec();
    // Fisher-Yates on a prefix
    for i in 0..count {
        let j = rng.gen_range(i..names.len());
        names.swap(i, j);
    }
    names.truncate(count);
    let active = names[rng.gen_range(0..count)];
    SecurityProfile::new(names, active, rng.gen())
}

/// Any presence set
pub fn random_presence(rng: &mut StdRng) -> PropertySet {
    SpProperty::ALL
        .into_iter()
        .filter(|_| rng.gen_bool(0.5))
        .collect()
}

/// Payload carrying only `include` of `profile`
pub fn partial_payload(profile: &SecurityProfile, include: PropertySet) -> Vec<u8> {
    SpCodec::default()
        .encode_partial(profile, include)
        .expect("partial encode")
}

/// Baseline plus the two credential profiles
pub fn standard_profile(active: &str, credid: u16) -> SecurityProfile {
    SecurityProfile::new(
        [BASELINE_PROFILE, "oic.sec.sp.black", "oic.sec.sp.blue"],
        active,
        credid,
    )
}
