//! Snapshot text codec
//!
//! Records are flat JSON objects: a `kind` discriminator, the header fields and
//! the service fields side by side. Pure transformation, no I/O.
//!
//! Failure split:
//! - text that is not JSON at all, or is truncated, is `Malformed`;
//! - JSON that parses but cannot be this snapshot type (not an object, wrong
//!   `kind`, a field of the wrong type, an unknown role) is `TypeMismatch`.

use super::Snapshot;
use serde_json::{Map, Value};

/// Field carrying the snapshot kind in encoded records
pub const KIND_FIELD: &str = "kind";

/// Snapshot encoding and decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The text cannot be parsed
    #[error("Malformed snapshot record: {reason}")]
    Malformed {
        /// Parser message
        reason: String,
    },

    /// The text parses but is not the requested snapshot type
    #[error("Snapshot record is not a valid {expected}: {reason}")]
    TypeMismatch {
        /// Requested snapshot kind
        expected: &'static str,
        /// What did not fit
        reason: String,
    },
}

/// Encode a snapshot as a flat text record
pub fn encode<S: Snapshot>(snapshot: &S) -> Result<String, CodecError> {
    let value = serde_json::to_value(snapshot).map_err(|e| mismatch::<S>(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(mismatch::<S>("snapshot did not serialize to an object"));
    };

    let mut record = Map::with_capacity(fields.len() + 1);
    record.insert(KIND_FIELD.to_string(), Value::String(S::KIND.to_string()));
    record.extend(fields);

    serde_json::to_string(&Value::Object(record)).map_err(|e| mismatch::<S>(e.to_string()))
}

/// Decode a text record as snapshot type `S`
pub fn decode<S: Snapshot>(raw: &str) -> Result<S, CodecError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        if e.is_syntax() || e.is_eof() || e.is_io() {
            CodecError::Malformed {
                reason: e.to_string(),
            }
        } else {
            mismatch::<S>(e.to_string())
        }
    })?;

    let Value::Object(mut record) = value else {
        return Err(mismatch::<S>("record is not an object"));
    };

    match record.remove(KIND_FIELD) {
        Some(Value::String(kind)) if kind == S::KIND => {}
        Some(other) => {
            return Err(mismatch::<S>(format!("record kind is {other}")));
        }
        None => return Err(mismatch::<S>("record has no kind")),
    }

    serde_json::from_value(Value::Object(record)).map_err(|e| mismatch::<S>(e.to_string()))
}

fn mismatch<S: Snapshot>(reason: impl Into<String>) -> CodecError {
    CodecError::TypeMismatch {
        expected: S::KIND,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AccessToken, RefreshToken, Role, Specialty};
    use crate::snapshot::{BootstrapSnapshot, IdentitySnapshot, SnapshotHeader};
    use crate::time::PhysicalTime;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn identity_snapshot() -> IdentitySnapshot {
        IdentitySnapshot {
            header: SnapshotHeader::stamped(IdentitySnapshot::KIND, PhysicalTime::from_secs(42))
                .with_tag("after-renewal"),
            application_id: Some("app-7".into()),
            access_token: Some(AccessToken::new("a1")),
            refresh_token: Some(RefreshToken::new("r1")),
            expires_at: Some(PhysicalTime::from_secs(3600)),
            role: Some(Role::Crew),
            capabilities: Some(["gate.open".to_string()].into_iter().collect()),
            specialties: Some(vec![Specialty::new("sound", "Sound")]),
        }
    }

    #[test]
    fn encoded_record_is_flat() {
        let raw = encode(&identity_snapshot()).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["kind"], "identity");
        assert_eq!(value["taken_on"], 42_000);
        assert_eq!(value["tag"], "after-renewal");
        assert_eq!(value["role"], "crew");
        assert_eq!(value["access_token"], "a1");
    }

    #[test]
    fn garbage_is_malformed() {
        assert_matches!(
            decode::<IdentitySnapshot>("{not json"),
            Err(CodecError::Malformed { .. })
        );
        assert_matches!(
            decode::<IdentitySnapshot>(""),
            Err(CodecError::Malformed { .. })
        );
    }

    #[test]
    fn wrong_kind_is_type_mismatch() {
        let raw = encode(&identity_snapshot()).unwrap();
        assert_matches!(
            decode::<BootstrapSnapshot>(&raw),
            Err(CodecError::TypeMismatch {
                expected: "bootstrap",
                ..
            })
        );
    }

    #[test]
    fn ill_typed_field_is_type_mismatch() {
        let raw = encode(&identity_snapshot()).unwrap().replace("\"crew\"", "\"pilot\"");
        assert_matches!(
            decode::<IdentitySnapshot>(&raw),
            Err(CodecError::TypeMismatch { .. })
        );
        assert_matches!(
            decode::<IdentitySnapshot>("[1, 2]"),
            Err(CodecError::TypeMismatch { .. })
        );
    }

    #[test]
    fn missing_service_fields_still_decode() {
        let raw = r#"{"kind":"identity","id":"2f1b0d43-3c9e-5a1e-9c53-8a3c4e0c2a11","taken_on":1,"role":"member"}"#;
        let snapshot = decode::<IdentitySnapshot>(raw).unwrap();
        assert_eq!(snapshot.role, Some(Role::Member));
        assert!(snapshot.access_token.is_none());
        assert!(snapshot.validate().is_err());
    }

    fn token() -> impl Strategy<Value = String> {
        "[A-Za-z0-9._~+/=-]{1,48}"
    }

    fn role() -> impl Strategy<Value = Role> {
        prop_oneof![Just(Role::Member), Just(Role::Crew), Just(Role::Management)]
    }

    prop_compose! {
        fn arb_identity_snapshot()(
            taken_on in 0u64..4_000_000_000_000,
            tag in proptest::option::of("[a-z -]{0,12}"),
            application_id in "[a-z0-9-]{1,16}",
            access in token(),
            refresh in token(),
            expires_at in 0u64..4_000_000_000_000,
            role in role(),
            capabilities in proptest::collection::btree_set("[a-z.]{1,12}", 0..6),
            specialties in proptest::collection::vec(("[a-z]{1,8}", ".{0,16}"), 0..4),
        ) -> IdentitySnapshot {
            let mut header = SnapshotHeader::stamped(IdentitySnapshot::KIND, PhysicalTime::from_millis(taken_on));
            header.tag = tag;
            IdentitySnapshot {
                header,
                application_id: Some(application_id),
                access_token: Some(AccessToken::new(access)),
                refresh_token: Some(RefreshToken::new(refresh)),
                expires_at: Some(PhysicalTime::from_millis(expires_at)),
                role: Some(role),
                capabilities: Some(capabilities.into_iter().collect::<BTreeSet<_>>()),
                specialties: Some(
                    specialties
                        .into_iter()
                        .map(|(id, name)| Specialty::new(id, name))
                        .collect(),
                ),
            }
        }
    }

    proptest! {
        #[test]
        fn identity_snapshot_round_trips(snapshot in arb_identity_snapshot()) {
            let raw = encode(&snapshot).unwrap();
            prop_assert_eq!(decode::<IdentitySnapshot>(&raw).unwrap(), snapshot);
        }
    }
}
