//! Single event loop that owns the [`SessionController`].
//!
//! User commands, capture frames, connection events and playback completions
//! are all handled on one task, one at a time. A stop (or disposal of every
//! handle) that arrives while a start is still acquiring resources cancels
//! that start and unwinds whatever it had acquired.

use std::collections::VecDeque;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session::SessionController;
use super::stats::SessionSnapshot;
use super::transcript::Transcript;
use crate::error::{LiveError, Result};

enum Command {
    Start(oneshot::Sender<Result<SessionSnapshot>>),
    Stop(oneshot::Sender<SessionSnapshot>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Transcript(oneshot::Sender<Transcript>),
    Shutdown(oneshot::Sender<SessionSnapshot>),
}

/// Cloneable handle to a running session loop.
///
/// Dropping the last handle disposes of the session: it is stopped and the
/// loop exits.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Move the controller onto its own task
    pub fn spawn(controller: SessionController) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let task = tokio::spawn(run(controller, rx));
        (Self { commands: tx }, task)
    }

    /// Start a session. Resolves once resources are acquired and the
    /// connection is requested; the session opens when the remote accepts.
    pub async fn start(&self) -> Result<SessionSnapshot> {
        self.request(Command::Start).await?
    }

    pub async fn stop(&self) -> Result<SessionSnapshot> {
        self.request(Command::Stop).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(Command::Snapshot).await
    }

    pub async fn transcript(&self) -> Result<Transcript> {
        self.request(Command::Transcript).await
    }

    /// Stop any session and end the loop
    pub async fn shutdown(&self) -> Result<SessionSnapshot> {
        self.request(Command::Shutdown).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| LiveError::RunnerStopped)?;
        rx.await.map_err(|_| LiveError::RunnerStopped)
    }
}

async fn run(mut controller: SessionController, mut commands: mpsc::Receiver<Command>) {
    info!("Session loop started");
    let mut deferred: VecDeque<Command> = VecDeque::new();

    loop {
        let command = match deferred.pop_front() {
            Some(command) => Some(command),
            None => tokio::select! {
                command = commands.recv() => command,
                event = controller.next_event() => {
                    controller.handle_event(event).await;
                    continue;
                }
            },
        };

        let Some(command) = command else {
            info!("All session handles dropped, disposing of session");
            controller.stop().await;
            break;
        };

        match command {
            Command::Start(reply) => {
                match start_cancellable(&mut controller, &mut commands, &mut deferred).await {
                    Ok(result) => {
                        let _ = reply.send(result.map(|()| controller.snapshot()));
                    }
                    Err(interrupt) => {
                        warn!("Start cancelled before the session opened");
                        controller.stop().await;
                        let _ = reply.send(Err(LiveError::Aborted));
                        match interrupt {
                            Some(command) => deferred.push_front(command),
                            None => {
                                info!("All session handles dropped during start");
                                break;
                            }
                        }
                    }
                }
            }
            Command::Stop(reply) => {
                controller.stop().await;
                let _ = reply.send(controller.snapshot());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(controller.snapshot());
            }
            Command::Transcript(reply) => {
                let _ = reply.send(controller.transcript().clone());
            }
            Command::Shutdown(reply) => {
                controller.stop().await;
                let _ = reply.send(controller.snapshot());
                break;
            }
        }
    }

    info!("Session loop stopped");
}

/// Drive `controller.start()` while still listening for commands.
///
/// Returns the start result, or `Err` with the command that cancelled it
/// (`None` when every handle was dropped). Other commands are deferred.
async fn start_cancellable(
    controller: &mut SessionController,
    commands: &mut mpsc::Receiver<Command>,
    deferred: &mut VecDeque<Command>,
) -> std::result::Result<Result<()>, Option<Command>> {
    let start = controller.start();
    tokio::pin!(start);

    loop {
        tokio::select! {
            result = &mut start => return Ok(result),
            command = commands.recv() => match command {
                Some(command @ (Command::Stop(_) | Command::Shutdown(_))) => {
                    return Err(Some(command));
                }
                Some(other) => {
                    debug!("Deferring command until start settles");
                    deferred.push_back(other);
                }
                None => return Err(None),
            },
        }
    }
}
