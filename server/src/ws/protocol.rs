//! Inbound frame decoding and dispatch.
//!
//! Every client frame decodes into the closed [`ClientEvent`] enum and is
//! routed by one exhaustive match. Failures are reported to the
//! originating session as an `error` event; the connection stays open.

use crate::dm::receipts;
use crate::error::{AppError, ErrorKind};
use crate::presence::SessionId;
use crate::state::AppState;
use crate::ws::broadcast::send_to_session;
use crate::ws::events::{ClientEvent, ServerEvent};

/// Identity of the session a frame arrived on.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub user_id: String,
}

pub fn decode_client_event(text: &str) -> Result<ClientEvent, AppError> {
    serde_json::from_str(text).map_err(|e| AppError::validation(format!("Invalid event: {}", e)))
}

/// Handle an incoming text frame.
pub async fn handle_text_message(text: &str, state: &AppState, session: &SessionContext) {
    let result = match decode_client_event(text) {
        Ok(event) => dispatch(event, state, session).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::debug!(
            user_id = %session.user_id,
            session_id = %session.session_id,
            error = %e,
            "Client event failed"
        );
        send_error(state, session, &e);
    }
}

async fn dispatch(event: ClientEvent, state: &AppState, session: &SessionContext) -> Result<(), AppError> {
    match event {
        ClientEvent::Typing { receiver_id } => {
            state.typing.started(&session.user_id, &receiver_id);
        }
        ClientEvent::StopTyping { receiver_id } => {
            state.typing.stopped(&session.user_id, &receiver_id);
        }
        ClientEvent::MarkRead { sender_id } => {
            receipts::mark_read(state, &session.user_id, &sender_id).await?;
        }
        ClientEvent::MessageDelivered { message_ids } => {
            receipts::acknowledge_delivered(state, &session.user_id, message_ids).await?;
        }
    }
    Ok(())
}

pub fn send_error(state: &AppState, session: &SessionContext, err: &AppError) {
    send_error_kind(state, session, err.kind(), err.public_message());
}

pub fn send_error_kind(state: &AppState, session: &SessionContext, kind: ErrorKind, message: String) {
    send_to_session(&state.presence, session.session_id, &ServerEvent::Error { kind, message });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_failures_are_validation_errors() {
        for raw in ["", "not json", r#"{"event":"typing"}"#, r#"{"event":"nope","data":{}}"#] {
            let err = decode_client_event(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{raw}");
        }
    }

    #[test]
    fn decodes_known_events() {
        let event = decode_client_event(r#"{"event":"mark_read","data":{"sender_id":"u2"}}"#).unwrap();
        assert_eq!(event, ClientEvent::MarkRead { sender_id: "u2".into() });
    }
}
