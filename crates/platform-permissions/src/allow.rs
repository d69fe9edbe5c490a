//! Allow blocks
//!
//! The small matching language used by permission configuration to describe
//! which actors a block applies to:
//!
//! - `true` / `false` - everyone / no-one
//! - `{"id": "alice"}` - actors whose `id` is `alice`
//! - `{"id": ["alice", "bob"]}` - either id
//! - `{"roles": "staff"}` - list-valued claims match on intersection
//! - `{"id": "*"}` - any actor that has an `id` claim
//! - `{"unauthenticated": true}` - the anonymous actor

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::actor::Actor;

/// An allow block from permission configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowBlock {
    /// Unconditional allow or deny.
    Flag(bool),
    /// Claim-matching conditions; any matching key grants.
    Conditions(Map<String, Value>),
}

impl AllowBlock {
    /// Whether `actor` satisfies this block.
    pub fn matches(&self, actor: &Actor) -> bool {
        let conditions = match self {
            AllowBlock::Flag(flag) => return *flag,
            AllowBlock::Conditions(conditions) => conditions,
        };

        if actor.is_anonymous()
            && conditions.get("unauthenticated").and_then(Value::as_bool) == Some(true)
        {
            return true;
        }

        conditions.iter().any(|(key, expected)| {
            let Some(actual) = actor.get(key) else {
                return false;
            };
            if expected.as_str() == Some("*") {
                return true;
            }
            let expected = as_list(expected);
            as_list(actual).iter().any(|value| expected.contains(value))
        })
    }
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Evaluate an optional allow block; an absent block allows everyone.
pub fn actor_matches_allow(actor: &Actor, allow: Option<&AllowBlock>) -> bool {
    allow.map_or(true, |block| block.matches(actor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block(value: Value) -> AllowBlock {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_flags() {
        let alice = Actor::with_id("alice");
        assert!(block(json!(true)).matches(&alice));
        assert!(!block(json!(false)).matches(&alice));
        assert!(actor_matches_allow(&alice, None));
    }

    #[test]
    fn test_id_matching() {
        let alice = Actor::with_id("alice");
        assert!(block(json!({"id": "alice"})).matches(&alice));
        assert!(block(json!({"id": ["bob", "alice"]})).matches(&alice));
        assert!(!block(json!({"id": "bob"})).matches(&alice));
        assert!(block(json!({"id": "*"})).matches(&alice));
    }

    #[test]
    fn test_list_claims_intersect() {
        let actor = Actor::from_value(json!({"id": "carol", "roles": ["staff", "analyst"]}));
        assert!(block(json!({"roles": "analyst"})).matches(&actor));
        assert!(block(json!({"roles": ["admin", "staff"]})).matches(&actor));
        assert!(!block(json!({"roles": ["admin"]})).matches(&actor));
    }

    #[test]
    fn test_unauthenticated() {
        let anon = Actor::anonymous();
        assert!(block(json!({"unauthenticated": true})).matches(&anon));
        assert!(!block(json!({"id": "*"})).matches(&anon));
        assert!(!block(json!({"unauthenticated": true})).matches(&Actor::with_id("alice")));
    }
}
