//! Credential decoding.
//!
//! Credentials are `header.payload.signature` tokens issued by the backend.
//! The client holds no signing secret, so the signature is never checked;
//! only the payload segment is decoded and structurally validated.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Credential has {0} segment(s), expected at least 2")]
    MissingSegments(usize),

    #[error("Payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Payload is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is missing `{0}`")]
    MissingField(&'static str),

    #[error("Payload field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Account role. Matching is case-sensitive: `"technician"` is not a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Role {
    Technician,
    Dentist,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Technician, Role::Dentist];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Technician => "Technician",
            Role::Dentist => "Dentist",
        }
    }

    /// Landing page for this role.
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Technician => "/technician",
            Role::Dentist => "/dentist",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| DecodeError::InvalidField {
                field: "role",
                reason: format!("unknown role {:?}", s),
            })
    }
}

/// Validated payload of a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject_id: String,
    pub role: Role,
    /// Unix seconds
    pub expires_at: u64,
    pub email: Option<String>,
}

impl Claims {
    /// Whether the credential has expired at `now_millis` (Unix milliseconds).
    ///
    /// `expires_at` is in seconds; the comparison happens in milliseconds.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        expired_at(self.expires_at, now_millis)
    }
}

/// `exp` seconds against a millisecond clock, widened so nothing overflows.
pub(crate) fn expired_at(expires_at: u64, now_millis: i64) -> bool {
    i128::from(expires_at) * 1000 <= i128::from(now_millis)
}

/// Payload fields as they arrive, before validation.
#[derive(Debug, Deserialize)]
struct RawPayload {
    id: Option<Value>,
    role: Option<Value>,
    exp: Option<Value>,
    email: Option<String>,
}

/// Decode and validate the payload of `raw`. Never panics.
pub fn decode(raw: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = raw.trim().split('.').collect();
    if segments.len() < 2 {
        return Err(DecodeError::MissingSegments(segments.len()));
    }

    let bytes = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;
    let payload: RawPayload = serde_json::from_slice(&bytes)?;

    let subject_id = match payload.id {
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(Value::String(_)) => {
            return Err(DecodeError::InvalidField {
                field: "id",
                reason: "empty subject id".to_string(),
            })
        }
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
        Some(Value::Null) | None => return Err(DecodeError::MissingField("id")),
        Some(other) => {
            return Err(DecodeError::InvalidField {
                field: "id",
                reason: format!("expected string or integer, got {}", other),
            })
        }
    };

    let role = match payload.role {
        Some(Value::String(role)) => role.parse::<Role>()?,
        Some(Value::Null) | None => return Err(DecodeError::MissingField("role")),
        Some(other) => {
            return Err(DecodeError::InvalidField {
                field: "role",
                reason: format!("expected string, got {}", other),
            })
        }
    };

    let expires_at = match payload.exp {
        Some(Value::Number(n)) => match n.as_u64() {
            Some(exp) if exp > 0 => exp,
            _ => {
                return Err(DecodeError::InvalidField {
                    field: "exp",
                    reason: format!("expected positive integer, got {}", n),
                })
            }
        },
        Some(Value::Null) | None => return Err(DecodeError::MissingField("exp")),
        Some(other) => {
            return Err(DecodeError::InvalidField {
                field: "exp",
                reason: format!("expected positive integer, got {}", other),
            })
        }
    };

    Ok(Claims {
        subject_id,
        role,
        expires_at,
        email: payload.email,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Build an unsigned token around an arbitrary payload.
    pub(crate) fn token_with(payload: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{}.{}.signature", header, body)
    }

    #[test]
    fn test_decode_valid() {
        let token = token_with(&json!({
            "id": "64f1c0ffee",
            "role": "Dentist",
            "exp": 4_102_444_800u64,
            "email": "dentist@oralvis.com",
            "iat": 1_700_000_000u64,
        }));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.subject_id, "64f1c0ffee");
        assert_eq!(claims.role, Role::Dentist);
        assert_eq!(claims.expires_at, 4_102_444_800);
        assert_eq!(claims.email.as_deref(), Some("dentist@oralvis.com"));
    }

    #[test]
    fn test_decode_numeric_id_and_two_segments() {
        let token = token_with(&json!({"id": 42, "role": "Technician", "exp": 10}));
        let two_segments: String = token.rsplit_once('.').unwrap().0.to_string();
        let claims = decode(&two_segments).unwrap();
        assert_eq!(claims.subject_id, "42");
        assert_eq!(claims.role, Role::Technician);
    }

    #[test]
    fn test_decode_tolerates_padding() {
        let body = base64::engine::general_purpose::URL_SAFE
            .encode(json!({"id": "a", "role": "Dentist", "exp": 5}).to_string());
        let claims = decode(&format!("h.{}.s", body)).unwrap();
        assert_eq!(claims.expires_at, 5);
    }

    #[test]
    fn test_decode_segment_count() {
        assert!(matches!(decode(""), Err(DecodeError::MissingSegments(1))));
        assert!(matches!(decode("nodots"), Err(DecodeError::MissingSegments(1))));
    }

    #[test]
    fn test_decode_bad_payload_encoding() {
        assert!(matches!(decode("a.!!!not-base64!!!.c"), Err(DecodeError::Base64(_))));
        let not_json = URL_SAFE_NO_PAD.encode("hello");
        assert!(matches!(decode(&format!("a.{}.c", not_json)), Err(DecodeError::Json(_))));
        let scalar = URL_SAFE_NO_PAD.encode("5");
        assert!(matches!(decode(&format!("a.{}.c", scalar)), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_missing_fields() {
        let cases = [
            (json!({"role": "Dentist", "exp": 5}), "id"),
            (json!({"id": "a", "exp": 5}), "role"),
            (json!({"id": "a", "role": "Dentist"}), "exp"),
            (json!({"id": "a", "role": null, "exp": 5}), "role"),
        ];
        for (payload, field) in cases {
            match decode(&token_with(&payload)) {
                Err(DecodeError::MissingField(missing)) => assert_eq!(missing, field),
                other => panic!("expected missing {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_decode_rejects_malformed_fields() {
        let cases = [
            json!({"id": "a", "role": "technician", "exp": 5}),
            json!({"id": "a", "role": "Admin", "exp": 5}),
            json!({"id": "a", "role": 1, "exp": 5}),
            json!({"id": "a", "role": "Dentist", "exp": 0}),
            json!({"id": "a", "role": "Dentist", "exp": -5}),
            json!({"id": "a", "role": "Dentist", "exp": 1.5}),
            json!({"id": "a", "role": "Dentist", "exp": "5"}),
            json!({"id": true, "role": "Dentist", "exp": 5}),
        ];
        for payload in cases {
            assert!(
                matches!(decode(&token_with(&payload)), Err(DecodeError::InvalidField { .. })),
                "accepted {}",
                payload
            );
        }
    }

    #[test]
    fn test_decode_empty_subject_id() {
        let token = token_with(&json!({"id": "", "role": "Dentist", "exp": 5}));
        match decode(&token) {
            Err(DecodeError::InvalidField { field, reason }) => {
                assert_eq!(field, "id");
                assert_eq!(reason, "empty subject id");
            }
            other => panic!("expected invalid id, got {:?}", other),
        }
    }

    #[test]
    fn test_is_expired_uses_milliseconds() {
        let claims = Claims {
            subject_id: "a".into(),
            role: Role::Technician,
            expires_at: 1_700_000_000,
            email: None,
        };
        assert!(!claims.is_expired(1_699_999_999_999));
        assert!(claims.is_expired(1_700_000_000_000));
        assert!(claims.is_expired(1_700_000_000_001));
        // A seconds-valued clock must not look expired
        assert!(!claims.is_expired(1_700_000_000));
    }

    #[test]
    fn test_is_expired_huge_exp_does_not_overflow() {
        let claims = Claims {
            subject_id: "a".into(),
            role: Role::Dentist,
            expires_at: u64::MAX,
            email: None,
        };
        assert!(!claims.is_expired(i64::MAX));
    }

    #[test]
    fn test_role_home_paths() {
        assert_eq!(Role::Technician.home_path(), "/technician");
        assert_eq!(Role::Dentist.home_path(), "/dentist");
        assert_eq!("Dentist".parse::<Role>().unwrap(), Role::Dentist);
        assert!("dentist".parse::<Role>().is_err());
    }
}
