//! Fire-and-forget notifications about authentication activity.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationMethod {
    Email,
    Ldap,
    ExternalToken,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum AuthEvent {
    UserLoggedIn {
        user_id: Uuid,
        email: String,
        authentication_method: AuthenticationMethod,
    },
    UserLoginFailed {
        identifier: String,
    },
    UserInviteClick {
        inviter_id: Uuid,
        invitee_id: Uuid,
    },
}

/// Consumer of authentication events. Emission must never fail the request
/// that produced the event.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: AuthEvent);
}

#[derive(Clone, Debug)]
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: AuthEvent) {}
}

/// Emitter that writes events to the log stream as structured JSON.
#[derive(Clone, Debug)]
pub struct TracingEventEmitter;

impl EventEmitter for TracingEventEmitter {
    fn emit(&self, event: AuthEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(target: "gardisto::events", %payload, "auth event"),
            Err(err) => info!(target: "gardisto::events", "unserializable auth event: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthEvent, AuthenticationMethod, EventEmitter, NoopEventEmitter};
    use uuid::Uuid;

    #[test]
    fn events_serialize_with_kebab_case_tags() {
        let event = AuthEvent::UserLoggedIn {
            user_id: Uuid::nil(),
            email: "alice@example.com".to_string(),
            authentication_method: AuthenticationMethod::ExternalToken,
        };
        let value = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(value.get("event"), Some(&serde_json::json!("user-logged-in")));
        assert_eq!(
            value.get("authentication_method"),
            Some(&serde_json::json!("external_token"))
        );
    }

    #[test]
    fn invite_click_carries_both_parties() {
        let inviter_id = Uuid::new_v4();
        let invitee_id = Uuid::new_v4();
        let event = AuthEvent::UserInviteClick {
            inviter_id,
            invitee_id,
        };
        let value = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(
            value.get("inviter_id"),
            Some(&serde_json::json!(inviter_id.to_string()))
        );
        assert_eq!(value.get("event"), Some(&serde_json::json!("user-invite-click")));
    }

    #[test]
    fn noop_emitter_accepts_events() {
        NoopEventEmitter.emit(AuthEvent::UserLoginFailed {
            identifier: "alice@example.com".to_string(),
        });
    }
}
