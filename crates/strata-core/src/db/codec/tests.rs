use super::*;
use crate::{
    error::{ErrorClass, InternalError},
    key::{EntityKey, IdOrName, KeyPath, PathElement},
};
use proptest::prelude::*;
use std::cmp::Ordering;

fn arb_key_path() -> impl Strategy<Value = KeyPath> {
    let id_or_name = prop_oneof![
        any::<i64>().prop_map(IdOrName::Id),
        "[a-c]{0,3}".prop_map(IdOrName::Name),
    ];
    prop::collection::vec(("[A-C]{1,3}", id_or_name), 1..4).prop_map(KeyPath::from_pairs)
}

fn arb_double() -> impl Strategy<Value = f64> {
    any::<f64>().prop_filter("NaN has no canonical equality", |v| !v.is_nan())
}

fn arb_value() -> impl Strategy<Value = Value> {
    let optional = || prop::option::of("[a-z]{0,4}");
    prop_oneof![
        Just(Value::Null),
        any::<i64>().prop_map(Value::Int64),
        any::<bool>().prop_map(Value::Boolean),
        "\\PC{0,12}".prop_map(Value::String),
        arb_double().prop_map(Value::Double),
        (arb_double(), arb_double()).prop_map(|(x, y)| Value::Point(PointValue::new(x, y))),
        ("[a-z]{0,4}", "[a-z]{0,4}", optional(), optional(), optional()).prop_map(
            |(email, auth_domain, nickname, federated_identity, federated_provider)| {
                Value::User(UserValue {
                    email,
                    auth_domain,
                    nickname,
                    federated_identity,
                    federated_provider,
                })
            }
        ),
        ("[a-b]{0,2}", "[a-b]{0,2}", arb_key_path()).prop_map(|(project, namespace, path)| {
            Value::Reference(EntityKey::new(project, namespace, path))
        }),
    ]
}

fn encode(value: &Value, descending: bool) -> Vec<u8> {
    encode_value(value, descending).expect("value should encode")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1024))]

    #[test]
    fn every_value_round_trips_in_both_directions(
        value in arb_value(),
        descending in any::<bool>(),
    ) {
        let bytes = encode(&value, descending);
        let decoded = decode_value_exact(&bytes, descending).expect("encoding should decode");
        prop_assert_eq!(decoded.canonical_cmp(&value), Ordering::Equal);
    }

    #[test]
    fn byte_order_matches_value_order(lhs in arb_value(), rhs in arb_value()) {
        let expected = lhs.canonical_cmp(&rhs);
        prop_assert_eq!(encode(&lhs, false).cmp(&encode(&rhs, false)), expected);
        prop_assert_eq!(encode(&lhs, true).cmp(&encode(&rhs, true)), expected.reverse());
    }

    #[test]
    fn descending_prefix_sorts_after_its_extensions(base in "\\PC{0,8}", suffix in "\\PC{1,4}") {
        let short = encode(&Value::String(base.clone()), true);
        let long = encode(&Value::String(format!("{base}{suffix}")), true);
        prop_assert!(long < short);
    }

    #[test]
    fn packed_paths_round_trip_and_keep_path_order(lhs in arb_key_path(), rhs in arb_key_path()) {
        let lhs_bytes = encode_path(&lhs).expect("path should encode");
        let rhs_bytes = encode_path(&rhs).expect("path should encode");
        prop_assert_eq!(decode_path(&lhs_bytes).expect("path should decode"), lhs.clone());
        prop_assert_eq!(lhs_bytes.cmp(&rhs_bytes), lhs.cmp(&rhs));
    }
}

#[test]
fn int_direction_changes_the_bytes_but_not_the_value() {
    let ascending = encode(&Value::Int64(42), false);
    let descending = encode(&Value::Int64(42), true);
    assert_ne!(ascending, descending);
    assert!(encode(&Value::Int64(43), false) > ascending);
    assert!(encode(&Value::Int64(43), true) < descending);
}

#[test]
fn decode_value_reports_the_next_offset() {
    let mut bytes = encode(&Value::from("ab"), false);
    let second_start = bytes.len();
    bytes.extend(encode(&Value::Int64(-7), true));

    let (first, next) = decode_value(&bytes, 0, false).expect("first value should decode");
    assert_eq!(first, Value::from("ab"));
    assert_eq!(next, second_start);

    let (second, end) = decode_value(&bytes, next, true).expect("second value should decode");
    assert_eq!(second, Value::Int64(-7));
    assert_eq!(end, bytes.len());
}

#[test]
fn incomplete_path_element_is_a_validation_error() {
    let path = KeyPath::new(vec![
        PathElement::with_name("Parent", "p"),
        PathElement::incomplete("Child"),
    ]);
    let err = encode_path(&path).expect_err("incomplete path should not encode");
    assert_eq!(
        err,
        CodecError::IncompletePathElement {
            kind: "Child".to_string()
        }
    );
    assert_eq!(InternalError::from(err).class, ErrorClass::Validation);
}

#[test]
fn oversized_string_fails_before_encoding() {
    let value = Value::String("x".repeat(crate::MAX_INDEXED_STRING_BYTES + 1));
    let err = encode_value(&value, false).expect_err("oversized string should be rejected");
    assert!(
        matches!(err, CodecError::ValueTooLarge { .. }),
        "unexpected error: {err:?}"
    );
}

#[test]
fn oversized_user_and_reference_text_is_rejected() {
    let long = "x".repeat(crate::MAX_INDEXED_STRING_BYTES + 1);
    let user = |email: &str, nickname: Option<&str>| {
        Value::User(UserValue {
            email: email.to_string(),
            auth_domain: "gmail.com".to_string(),
            nickname: nickname.map(str::to_string),
            federated_identity: None,
            federated_provider: None,
        })
    };
    let reference = |name: &str| {
        Value::Reference(EntityKey::new(
            "guestbook",
            "",
            KeyPath::from_pairs([("Book", IdOrName::Name(name.to_string()))]),
        ))
    };

    for value in [user(&long, None), user("ana@example.com", Some(&long)), reference(&long)] {
        let err = encode_value(&value, true).expect_err("oversized text should be rejected");
        assert!(
            matches!(err, CodecError::ValueTooLarge { .. }),
            "unexpected error: {err:?}"
        );
    }

    encode_value(&user("ana@example.com", Some("ana")), false).expect("short user should encode");
    encode_value(&reference("shelf"), false).expect("short reference should encode");
}

#[test]
fn malformed_bytes_are_corruption() {
    let err = decode_value_exact(&[0x7F], false).expect_err("unknown marker should fail");
    assert_eq!(err, CodecError::UnknownMarker { marker: 0x7F, offset: 0 });

    let mut bytes = encode(&Value::Boolean(true), false);
    bytes.push(0x00);
    let err = decode_value_exact(&bytes, false).expect_err("trailing bytes should fail");
    assert_eq!(err, CodecError::TrailingBytes { len: 1 });

    let truncated = &encode(&Value::from("abc"), false)[..2];
    let err = decode_value_exact(truncated, false).expect_err("missing terminator should fail");
    assert_eq!(InternalError::from(err).class, ErrorClass::Corruption);
}

#[test]
fn ancestor_range_excludes_sibling_kinds_with_extended_names() {
    let prefix = b"kind-index/".to_vec();
    let ancestor = KeyPath::from_pairs([("A", IdOrName::Id(1))]);
    let (begin, end) = ancestor_range(&prefix, &ancestor).expect("range should encode");

    let key_for = |path: KeyPath| {
        let mut key = prefix.clone();
        key.extend(encode_path(&path).expect("path should encode"));
        key
    };

    let itself = key_for(ancestor.clone());
    let child = key_for(KeyPath::from_pairs([
        ("A", IdOrName::Id(1)),
        ("B", IdOrName::Name("x".to_string())),
    ]));
    let sibling_id = key_for(KeyPath::from_pairs([("A", IdOrName::Id(2))]));
    let longer_kind = key_for(KeyPath::from_pairs([("AB", IdOrName::Id(1))]));

    for inside in [&itself, &child] {
        assert!(inside.as_slice() >= begin.key() && inside.as_slice() < end.key());
    }
    for outside in [&sibling_id, &longer_kind] {
        assert!(outside.as_slice() < begin.key() || outside.as_slice() >= end.key());
    }
}
