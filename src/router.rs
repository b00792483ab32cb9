//! Conversation router
//!
//! Maps an addressing target to its canonical conversation key. Direct
//! messages are keyed at write time by the sorted participant pair, so both
//! sides of a conversation always land on the same ledger entry.

use tracing::debug;

use crate::error::SessionError;
use crate::registry::Registry;
use crate::room::{ConversationKey, Target};
use crate::types::UserId;

/// Resolve a target to a conversation key on behalf of `requester`
///
/// No side effects. Fails with `UnknownTarget` if the target user is not
/// registered.
pub fn resolve(
    registry: &Registry,
    target: Target,
    requester: UserId,
) -> Result<ConversationKey, SessionError> {
    let key = match target {
        Target::Room(room) => ConversationKey::public(room),
        Target::User(user_id) => {
            if !registry.contains(user_id) {
                return Err(SessionError::UnknownTarget(user_id.to_string()));
            }
            if user_id == requester {
                return Err(SessionError::SelfConversation);
            }
            ConversationKey::direct(requester, user_id)
        }
    };

    debug!(%requester, %key, "Resolved conversation");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomTag;

    #[test]
    fn test_resolve_room() {
        let registry = Registry::new();
        let key = resolve(&registry, Target::Room(RoomTag::General), UserId::new()).unwrap();
        assert_eq!(key, ConversationKey::public(RoomTag::General));
        assert!(key.is_public());
    }

    #[test]
    fn test_resolve_is_symmetric() {
        let registry = Registry::new();
        let a = registry.login("Alice").unwrap().id;
        let b = registry.login("Bob").unwrap().id;

        let from_a = resolve(&registry, Target::User(b), a).unwrap();
        let from_b = resolve(&registry, Target::User(a), b).unwrap();
        assert_eq!(from_a, from_b);
        assert!(from_a.is_direct());
    }

    #[test]
    fn test_resolve_unknown_user() {
        let registry = Registry::new();
        let a = registry.login("Alice").unwrap().id;
        let result = resolve(&registry, Target::User(UserId::new()), a);
        assert!(matches!(result, Err(SessionError::UnknownTarget(_))));
    }

    #[test]
    fn test_resolve_self() {
        let registry = Registry::new();
        let a = registry.login("Alice").unwrap().id;
        assert_eq!(
            resolve(&registry, Target::User(a), a),
            Err(SessionError::SelfConversation)
        );
    }
}
