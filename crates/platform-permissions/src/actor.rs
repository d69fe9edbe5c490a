//! Actor identity
//!
//! An actor is an opaque JSON object of claims describing who is making a
//! request (an `id`, group memberships, restriction allowlists). Anonymous
//! requests carry no actor at all.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::restrictions::ActorRestrictions;

/// Fingerprint shared by every anonymous actor.
pub const ANONYMOUS_FINGERPRINT: &str = "anonymous";

/// An already-authenticated requester, or the anonymous actor.
///
/// # Example
///
/// ```
/// use platform_permissions::actor::Actor;
/// use serde_json::json;
///
/// let actor = Actor::from_value(json!({"id": "alice", "groups": ["staff"]}));
/// assert_eq!(actor.id(), Some("alice"));
/// assert!(!actor.is_anonymous());
///
/// assert!(Actor::anonymous().is_anonymous());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor {
    claims: Option<Map<String, Value>>,
}

impl Actor {
    /// The anonymous actor.
    pub fn anonymous() -> Self {
        Self { claims: None }
    }

    /// An actor from a claims map.
    pub fn new(claims: Map<String, Value>) -> Self {
        Self {
            claims: Some(claims),
        }
    }

    /// An actor with only an `id` claim.
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut claims = Map::new();
        claims.insert("id".to_string(), Value::String(id.into()));
        Self::new(claims)
    }

    /// Build from an arbitrary JSON value.
    ///
    /// Objects become actors; `null` and every other shape is anonymous.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(claims) => Self::new(claims),
            _ => Self::anonymous(),
        }
    }

    /// Whether this is the anonymous actor.
    ///
    /// An empty claims object is treated as anonymous too.
    pub fn is_anonymous(&self) -> bool {
        self.claims.as_ref().map_or(true, Map::is_empty)
    }

    /// The claims map, if any.
    pub fn claims(&self) -> Option<&Map<String, Value>> {
        self.claims.as_ref()
    }

    /// Look up a claim.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.claims.as_ref().and_then(|claims| claims.get(key))
    }

    /// The `id` claim when it is a string.
    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    /// Parsed `_r` restriction allowlist, if present.
    pub fn restrictions(&self) -> Option<ActorRestrictions> {
        self.get("_r").map(ActorRestrictions::from_value)
    }

    /// Stable digest of the actor's claims.
    ///
    /// Claims are serialized with sorted keys so equal actors always
    /// fingerprint identically.
    pub fn fingerprint(&self) -> String {
        if self.is_anonymous() {
            return ANONYMOUS_FINGERPRINT.to_string();
        }
        let canonical = serde_json::to_string(&self.claims).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl From<Value> for Actor {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl From<Option<Map<String, Value>>> for Actor {
    fn from(claims: Option<Map<String, Value>>) -> Self {
        Self { claims }
    }
}
