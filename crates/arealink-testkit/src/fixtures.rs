//! Identity and grant fixtures

use arealink_core::{
    AccessToken, CredentialGrant, Credentials, EntryApplication, EntryField, EntryForm,
    EntryGrant, PhysicalTime, RefreshToken, Role, SessionIdentity, Specialty,
};
use std::collections::BTreeSet;

/// Application id used by fixture identities
pub const APPLICATION_ID: &str = "app-0001";

/// Area name used by fixture forms and applications
pub const AREA_NAME: &str = "North Dock";

/// Capabilities granted to fixture identities
pub fn capabilities() -> BTreeSet<String> {
    ["tickets.read", "tickets.scan"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Specialties granted to fixture identities
pub fn specialties() -> Vec<Specialty> {
    vec![Specialty::new("forklift", "Forklift operator")]
}

/// Credential triple expiring at `expires_at_ms`
pub fn credentials(access: &str, refresh: &str, expires_at_ms: u64) -> Credentials {
    Credentials {
        access_token: AccessToken::new(access),
        refresh_token: RefreshToken::new(refresh),
        expires_at: PhysicalTime::from_millis(expires_at_ms),
    }
}

/// Paired identity with tokens `access-0`/`refresh-0`
pub fn identity(role: Role, expires_at_ms: u64) -> SessionIdentity {
    SessionIdentity::new(
        APPLICATION_ID,
        role,
        capabilities(),
        specialties(),
        credentials("access-0", "refresh-0", expires_at_ms),
    )
}

/// Renewal grant that rotates the access token only
pub fn credential_grant(access: &str, expires_at_ms: u64) -> CredentialGrant {
    CredentialGrant {
        access_token: AccessToken::new(access),
        refresh_token: None,
        expires_at: PhysicalTime::from_millis(expires_at_ms),
    }
}

/// Entry form with one required and one optional field
pub fn entry_form() -> EntryForm {
    EntryForm {
        area_name: AREA_NAME.to_string(),
        fields: vec![
            EntryField {
                key: "name".to_string(),
                label: "Full name".to_string(),
                required: true,
            },
            EntryField {
                key: "company".to_string(),
                label: "Company".to_string(),
                required: false,
            },
        ],
    }
}

/// Pending application expiring at `expires_at_ms`
pub fn entry_application(expires_at_ms: u64) -> EntryApplication {
    EntryApplication {
        application_id: APPLICATION_ID.to_string(),
        area_name: AREA_NAME.to_string(),
        expires_at: PhysicalTime::from_millis(expires_at_ms),
    }
}

/// Granted verdict for `role`
pub fn entry_grant(role: Role, expires_at_ms: u64) -> EntryGrant {
    EntryGrant {
        credentials: CredentialGrant {
            access_token: AccessToken::new("access-0"),
            refresh_token: Some(RefreshToken::new("refresh-0")),
            expires_at: PhysicalTime::from_millis(expires_at_ms),
        },
        role,
        capabilities: capabilities(),
        specialties: specialties(),
    }
}
