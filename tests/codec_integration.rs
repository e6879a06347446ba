mod common;

use ciborium::Value;
use common::{random_valid_profile, seeded_rng};
use oic_sp::{
    CredentialPolicy, PropertySet, SecurityProfile, SpCodec, SpError, SpProperty,
    BASELINE_PROFILE, CBOR_MAX_SIZE, CBOR_SIZE,
};

fn has_key(bytes: &[u8], key: &str) -> bool {
    let value: Value = ciborium::from_reader(bytes).expect("valid CBOR");
    match value {
        Value::Map(entries) => entries.iter().any(|(k, _)| k.as_text() == Some(key)),
        _ => false,
    }
}

#[test]
fn test_baseline_scenario() -> Result<(), SpError> {
    let profile = SecurityProfile::new([BASELINE_PROFILE], BASELINE_PROFILE, 0);
    let bytes = profile.to_cbor()?;

    assert!(!has_key(&bytes, "credid"));
    assert!(has_key(&bytes, "rt"));
    assert!(has_key(&bytes, "if"));

    let decoded = SecurityProfile::from_cbor(&bytes)?;
    assert_eq!(decoded.profile, profile);
    Ok(())
}

#[test]
fn test_random_roundtrips_preserve_fields_and_presence() -> Result<(), SpError> {
    let codec = SpCodec::default();
    let mut rng = seeded_rng(0x5350);

    for _ in 0..200 {
        let profile = random_valid_profile(&mut rng);
        let included = codec.included_properties(&profile);
        let bytes = codec.encode(&profile)?;
        let decoded = codec.decode(&bytes)?;

        assert_eq!(decoded.present, included);
        assert_eq!(
            decoded.profile.supported_profiles,
            profile.supported_profiles
        );
        assert_eq!(decoded.profile.active_profile, profile.active_profile);
        if included.contains(SpProperty::CredId) {
            assert_eq!(decoded.profile.credid, profile.credid);
        } else {
            assert!(!has_key(&bytes, "credid"));
        }
    }
    Ok(())
}

#[test]
fn test_partial_roundtrip_presence_matches_inclusion() -> Result<(), SpError> {
    let codec = SpCodec::default();
    let profile = SecurityProfile::new(
        [BASELINE_PROFILE, "oic.sec.sp.blue"],
        "oic.sec.sp.blue",
        77,
    );
    for bits in 0..8u8 {
        let include: PropertySet = SpProperty::ALL
            .into_iter()
            .enumerate()
            .filter(|(i, _)| bits & (1u8 << *i) != 0)
            .map(|(_, p)| p)
            .collect();
        let decoded = codec.decode(&codec.encode_partial(&profile, include)?)?;
        assert_eq!(decoded.present, include);
    }
    Ok(())
}

fn profile_of_size(names: usize) -> SecurityProfile {
    let supported: Vec<String> = (0..names)
        .map(|i| format!("x.com.example.sp.generated.{:08}", i))
        .collect();
    let active = supported[0].clone();
    SecurityProfile::new(supported, active, 0)
}

fn unbounded_len(profile: &SecurityProfile) -> usize {
    let generous = SpCodec::new(
        oic_sp::BufferLimits {
            initial: 64 * 1024,
            max: 64 * 1024,
        },
        CredentialPolicy::default(),
    );
    generous.encode(profile).expect("fits in 64 KiB").len()
}

#[test]
fn test_growth_between_initial_and_ceiling() -> Result<(), SpError> {
    let profile = profile_of_size(60);
    let expected = unbounded_len(&profile);
    assert!(expected > CBOR_SIZE && expected <= CBOR_MAX_SIZE);

    let bytes = profile.to_cbor()?;
    assert_eq!(bytes.len(), expected);
    assert_eq!(SecurityProfile::from_cbor(&bytes)?.profile, profile);
    Ok(())
}

#[test]
fn test_growth_beyond_ceiling_fails() {
    let profile = profile_of_size(200);
    assert!(unbounded_len(&profile) > CBOR_MAX_SIZE);

    match profile.to_cbor() {
        Err(SpError::EncodeFailure(msg)) => assert!(msg.contains("ceiling")),
        other => panic!("expected EncodeFailure, got {:?}", other),
    }
}

#[test]
fn test_decode_skips_unknown_nested_values() -> Result<(), SpError> {
    let mut entries = vec![(
        Value::Text("x.vendor.blob".into()),
        Value::Array(vec![
            Value::Map(vec![(
                Value::Text("active_profile".into()),
                Value::Text("decoy".into()),
            )]),
            Value::Bytes(vec![0; 32]),
        ]),
    )];
    entries.push((
        Value::Text("active_profile".into()),
        Value::Text(BASELINE_PROFILE.into()),
    ));
    let mut bytes = Vec::new();
    ciborium::into_writer(&Value::Map(entries), &mut bytes).expect("encode");

    let decoded = SecurityProfile::from_cbor(&bytes)?;
    assert_eq!(decoded.profile.active_profile, BASELINE_PROFILE);
    assert_eq!(
        decoded.present,
        PropertySet::empty().with(SpProperty::ActiveProfile)
    );
    Ok(())
}
