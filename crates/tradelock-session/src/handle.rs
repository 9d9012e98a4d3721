//! Mounting sessions and talking to them.

use crate::config::SessionConfig;
use crate::controller::{SessionCommand, SessionController, SessionExit, SessionInputs};
use crate::error::{SessionError, SessionResult};
use crate::view::SessionView;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};
use tradelock_client::{CompletionSubscription, SharedGateway};
use tradelock_core::{Party, PushEvent, TradeId};
use uuid::Uuid;

/// Collaborators and identity for one session.
pub struct SessionMount {
    pub trade_id: TradeId,
    /// Side the local user acts for.
    pub party: Party,
    pub gateway: SharedGateway,
    /// Push deltas routed by the host; `None` runs on polling alone.
    pub push: Option<mpsc::Receiver<PushEvent>>,
    /// Cross-view completion signal.
    pub completion: Option<CompletionSubscription>,
}

/// Mount a session and start its controller task.
///
/// Must be called from within a tokio runtime.
pub fn mount(config: SessionConfig, mount: SessionMount) -> SessionResult<SessionHandle> {
    config.validate()?;

    let session_id = Uuid::new_v4();
    let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
    let (view_tx, view_rx) = watch::channel(SessionView::initial(mount.trade_id.clone()));
    let shutdown = CancellationToken::new();

    let span = info_span!(
        "trade_session",
        trade_id = %mount.trade_id,
        session_id = %session_id
    );

    let controller = SessionController::new(
        session_id,
        mount.trade_id.clone(),
        mount.party,
        config,
        mount.gateway,
        shutdown.clone(),
        view_tx,
    );
    let inputs = SessionInputs {
        commands: command_rx,
        push: mount.push,
        completion: mount.completion,
    };
    let task = tokio::spawn(controller.run(inputs).instrument(span));

    Ok(SessionHandle {
        session_id,
        trade_id: mount.trade_id,
        commands: command_tx,
        view_rx,
        shutdown,
        task: Some(task),
    })
}

/// Owner-side handle of a mounted session.
///
/// Dropping the handle unmounts the session.
pub struct SessionHandle {
    session_id: Uuid,
    trade_id: TradeId,
    commands: mpsc::Sender<SessionCommand>,
    view_rx: watch::Receiver<SessionView>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<SessionExit>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn trade_id(&self) -> &TradeId {
        &self.trade_id
    }

    /// Latest published view.
    pub fn view(&self) -> SessionView {
        self.view_rx.borrow().clone()
    }

    /// Receiver notified on every published view change.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view_rx.clone()
    }

    /// Ask to lock the trade for the local party.
    ///
    /// Returns false if the session already ended; that is a no-op, not an
    /// error.
    pub async fn request_lock(&self) -> bool {
        self.send(SessionCommand::RequestLock).await
    }

    /// Report a visibility change of the hosting view.
    pub async fn set_visibility(&self, visible: bool) -> bool {
        self.send(SessionCommand::SetVisibility(visible)).await
    }

    /// Report user activity (resets the idle timer).
    pub async fn record_interaction(&self) -> bool {
        self.send(SessionCommand::Interaction).await
    }

    /// Whether the controller task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the session to end on its own (completion or expiry).
    pub async fn wait(&mut self) -> SessionResult<SessionExit> {
        let task = self.task.take().ok_or(SessionError::Unmounted)?;
        Ok(task.await?)
    }

    /// Cancel every timer and in-flight request and wait for the controller
    /// to exit. No view is published after this returns.
    pub async fn unmount(mut self) -> SessionResult<SessionExit> {
        self.shutdown.cancel();
        let task = self.task.take().ok_or(SessionError::Unmounted)?;
        Ok(task.await?)
    }

    async fn send(&self, cmd: SessionCommand) -> bool {
        match self.commands.send(cmd).await {
            Ok(()) => true,
            Err(e) => {
                debug!(command = ?e.0, "Session already ended, command ignored");
                false
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
