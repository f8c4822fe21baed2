//! Stateless lifecycle commands.
//!
//! Lifecycle state belongs to the external scheduler, so a command never
//! predicts the resulting row. Whatever the outcome, the caller refetches.

use crate::api::NodeApi;
use crate::config::RowActions;
use crate::error::TableError;
use crate::model::{ActionCommand, Notice, Pk, Row};

const TERMINAL_STATES: &[&str] = &["finished", "failed", "excepted", "killed"];

fn process_state(row: &Row) -> Option<String> {
    row.get_str("process_state")
        .or_else(|| row.get_str("state"))
        .map(str::to_ascii_lowercase)
}

fn is_paused(row: &Row) -> bool {
    row.fields
        .get("paused")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

/// Actions a row offers in its current state.
pub fn available_actions(row: &Row, policy: RowActions) -> Vec<ActionCommand> {
    if policy == RowActions::DeleteOnly {
        return vec![ActionCommand::Delete];
    }
    let Some(state) = process_state(row) else {
        return vec![ActionCommand::Delete];
    };
    if TERMINAL_STATES.iter().any(|s| state.contains(s)) {
        return vec![ActionCommand::Delete];
    }
    if is_paused(row) {
        vec![
            ActionCommand::Resume,
            ActionCommand::Terminate,
            ActionCommand::Delete,
        ]
    } else {
        vec![
            ActionCommand::Pause,
            ActionCommand::Terminate,
            ActionCommand::Delete,
        ]
    }
}

/// Sends one lifecycle command. `Delete` goes through the deletion workflow
/// and is refused here.
pub async fn dispatch(api: &dyn NodeApi, command: ActionCommand, pk: Pk) -> Result<(), TableError> {
    if command == ActionCommand::Delete {
        return Err(TableError::InvariantViolation(
            "delete must go through the deletion workflow".into(),
        ));
    }
    tracing::debug!(pk = %pk, verb = command.endpoint_verb(), "dispatching lifecycle command");
    api.lifecycle(command, pk).await
}

pub fn outcome_notice(command: ActionCommand, pk: Pk, result: &Result<(), TableError>) -> Notice {
    match result {
        Ok(()) => Notice::success(format!("{} sent to PK {pk}", command.label())),
        Err(e) => Notice::error(format!("{} failed for PK {pk}: {e}", command.label())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(state: &str, paused: bool) -> Row {
        Row::new(Pk(1))
            .with_field("process_state", state)
            .with_field("paused", paused)
    }

    #[test]
    fn finished_processes_only_offer_delete() {
        for state in ["Finished", "failed", "Excepted"] {
            assert_eq!(
                available_actions(&process(state, false), RowActions::Lifecycle),
                vec![ActionCommand::Delete]
            );
        }
    }

    #[test]
    fn paused_process_offers_resume() {
        let actions = available_actions(&process("Waiting", true), RowActions::Lifecycle);
        assert_eq!(actions[0], ActionCommand::Resume);
        assert!(actions.contains(&ActionCommand::Terminate));
    }

    #[test]
    fn running_process_offers_pause() {
        let actions = available_actions(&process("Running", false), RowActions::Lifecycle);
        assert_eq!(actions[0], ActionCommand::Pause);
    }

    #[test]
    fn state_alias_is_recognised() {
        let row = Row::new(Pk(2)).with_field("state", "Finished");
        assert_eq!(
            available_actions(&row, RowActions::Lifecycle),
            vec![ActionCommand::Delete]
        );
    }

    #[test]
    fn data_nodes_only_offer_delete() {
        let row = process("Running", false);
        assert_eq!(
            available_actions(&row, RowActions::DeleteOnly),
            vec![ActionCommand::Delete]
        );
        assert_eq!(
            available_actions(&Row::new(Pk(3)), RowActions::Lifecycle),
            vec![ActionCommand::Delete]
        );
    }

    #[test]
    fn notices_name_the_command() {
        let ok = outcome_notice(ActionCommand::Pause, Pk(4), &Ok(()));
        assert_eq!(ok.message, "Pause sent to PK 4");
        let err = outcome_notice(
            ActionCommand::Terminate,
            Pk(4),
            &Err(TableError::ServerRejection {
                status: 500,
                detail: Some("not running".into()),
            }),
        );
        assert!(err.message.contains("not running"));
    }
}
