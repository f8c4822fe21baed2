//! Table run loop.
//!
//! Owns the controller on a single task and performs its effects on spawned
//! tasks. Results come back over a channel and are applied on the loop, so
//! state is only ever touched from one place.

use super::table::{Completion, Effect, Step, TableCommand, TableController};
use crate::actions;
use crate::api::NodeApi;
use crate::model::TableEvent;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Spawned network work for one controller.
struct EffectRunner {
    api: Arc<dyn NodeApi>,
    done_tx: UnboundedSender<Completion>,
    event_tx: UnboundedSender<TableEvent>,
    query_task: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl EffectRunner {
    fn apply(&mut self, step: Step) {
        for event in step.events {
            let _ = self.event_tx.send(event);
        }
        for effect in step.effects {
            self.spawn(effect);
        }
    }

    fn spawn(&mut self, effect: Effect) {
        let api = Arc::clone(&self.api);
        let done = self.done_tx.clone();
        match effect {
            Effect::Query(ticket) => {
                // A superseded query can never be applied; stop paying for it.
                if let Some(prev) = self.query_task.take() {
                    prev.abort();
                }
                self.query_task = Some(tokio::spawn(async move {
                    let result = api.query(&ticket.query).await;
                    let _ = done.send(Completion::Query {
                        token: ticket.token,
                        result,
                    });
                }));
            }
            Effect::Update { pk, delta } => self.track(tokio::spawn(async move {
                let result = api.update(pk, &delta).await;
                let _ = done.send(Completion::Update { pk, result });
            })),
            Effect::DeletePreview(pk) => self.track(tokio::spawn(async move {
                let result = api.delete_preview(pk).await;
                let _ = done.send(Completion::Preview { pk, result });
            })),
            Effect::Delete(pk) => self.track(tokio::spawn(async move {
                let result = api.delete(pk).await;
                let _ = done.send(Completion::Delete { pk, result });
            })),
            Effect::Lifecycle { command, pk } => self.track(tokio::spawn(async move {
                let result = actions::dispatch(api.as_ref(), command, pk).await;
                let _ = done.send(Completion::Lifecycle {
                    command,
                    pk,
                    result,
                });
            })),
        }
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.tasks.retain(|h| !h.is_finished());
        self.tasks.push(handle);
    }

    fn shutdown(&mut self) {
        // Dropping a JoinHandle does not cancel the task; abort explicitly.
        if let Some(h) = self.query_task.take() {
            h.abort();
        }
        for h in self.tasks.drain(..) {
            h.abort();
        }
    }
}

/// Drive a table controller from UI commands until `Quit` or the command
/// channel closes. Returns the controller in its final state.
pub async fn run_controller(
    api: Arc<dyn NodeApi>,
    mut controller: TableController,
    event_tx: UnboundedSender<TableEvent>,
    mut cmd_rx: UnboundedReceiver<TableCommand>,
) -> TableController {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    let mut runner = EffectRunner {
        api,
        done_tx,
        event_tx,
        query_task: None,
        tasks: Vec::new(),
    };

    runner.apply(controller.mount());

    loop {
        let deadline = controller.quick_filter_deadline();
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TableCommand::Quit) | None => break,
                    Some(cmd) => {
                        tracing::debug!(?cmd, "table command");
                        let step = controller.handle(cmd, Instant::now());
                        runner.apply(step);
                    }
                }
            }
            Some(done) = done_rx.recv() => {
                let step = controller.complete(done);
                runner.apply(step);
            }
            // Quick-filter debounce; parked when nothing is pending.
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => futures::future::pending::<()>().await,
                }
            } => {
                let step = controller.tick(Instant::now());
                runner.apply(step);
            }
        }
    }

    runner.shutdown();
    controller
}
