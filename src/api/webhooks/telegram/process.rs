//! Routing of an accepted Telegram message

use crate::api::ApiState;
use crate::commands::Command;
use crate::topic;
use crate::turn::{InboundMessage, TurnOutcome, TurnTicket};

/// What happened to an inbound message
#[derive(Debug)]
pub enum Handled {
    /// Answered as a slash command
    Command(Command),
    /// Rejected by the topic gate with a nudge
    Nudged,
    /// Ran as a generation turn
    Turn(TurnOutcome),
}

/// Route chosen for a message before any I/O happens
#[derive(Debug)]
pub enum Dispatch {
    Command(Command),
    Nudge,
    /// Generation turn with its epoch already claimed
    Turn(TurnTicket),
}

/// Classify a message, claiming a turn epoch when it needs a generation
///
/// Runs synchronously on the request path so epochs follow arrival order.
/// Commands and nudges never touch the conversation, so they do not cancel a
/// running generation.
pub fn dispatch(state: &ApiState, message: &InboundMessage) -> Dispatch {
    if let Some(command) = Command::parse(&message.text) {
        return Dispatch::Command(command);
    }

    if state.topic_gate && topic::is_off_topic(&message.text) {
        return Dispatch::Nudge;
    }

    Dispatch::Turn(state.coordinator.begin(message.chat_id))
}

/// Carry out a dispatched message
pub async fn execute(state: &ApiState, message: InboundMessage, route: Dispatch) -> Handled {
    let coordinator = &state.coordinator;
    let sink = coordinator.sink();
    let chat_id = message.chat_id;

    match route {
        Dispatch::Command(command) => {
            tracing::debug!(chat_id, command = ?command, "handling command");
            let reply = command.reply(coordinator.matcher());
            if let Err(e) = sink.send(chat_id, &reply, message.message_id).await {
                tracing::warn!(chat_id, error = %e, "failed to send command reply");
            }
            Handled::Command(command)
        }
        Dispatch::Nudge => {
            tracing::debug!(chat_id, "off-topic message, sending nudge");
            if let Err(e) = sink.send(chat_id, &topic::nudge_text(), message.message_id).await {
                tracing::warn!(chat_id, error = %e, "failed to send nudge");
            }
            Handled::Nudged
        }
        Dispatch::Turn(ticket) => {
            let outcome = coordinator.run(ticket, message).await;
            match &outcome {
                TurnOutcome::Completed { suggested, .. } => {
                    tracing::debug!(chat_id, suggestions = suggested.len(), "reply delivered");
                }
                TurnOutcome::Failed { error } => {
                    tracing::warn!(chat_id, error = %error, "reply failed");
                }
                TurnOutcome::Superseded => {
                    tracing::debug!(chat_id, "reply superseded");
                }
            }
            Handled::Turn(outcome)
        }
    }
}

/// Answer a command, nudge an off-topic message, or run a turn
pub async fn process_message(state: &ApiState, message: InboundMessage) -> Handled {
    let route = dispatch(state, &message);
    execute(state, message, route).await
}
