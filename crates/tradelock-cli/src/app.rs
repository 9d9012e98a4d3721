//! Terminal host for one trade session.
//!
//! Reads commands line by line from stdin:
//! - `lock`: request the lock for the local party
//! - `show` / `hide`: visibility of the hosting view
//! - `touch`: user interaction (keeps the session out of idle)
//! - `push <json>`: feed a push event frame
//! - `complete`: announce completion on the cross-view bus
//!
//! Every view change is printed to stdout as one JSON line.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tradelock_client::{CompletionBus, HttpTradeGateway, SharedGateway};
use tradelock_core::{Party, PushEvent, TradeId};
use tradelock_session::{mount, SessionExit, SessionHandle, SessionMount, SessionView};

/// Buffered push frames between stdin and the session.
const PUSH_BUFFER: usize = 32;

/// One parsed stdin command.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Lock,
    Show,
    Hide,
    Touch,
    Push(PushEvent),
    Complete,
}

impl FromStr for HostCommand {
    type Err = AppError;

    fn from_str(line: &str) -> AppResult<Self> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));

        match word {
            "lock" => Ok(Self::Lock),
            "show" => Ok(Self::Show),
            "hide" => Ok(Self::Hide),
            "touch" => Ok(Self::Touch),
            "complete" => Ok(Self::Complete),
            "push" => Ok(Self::Push(PushEvent::from_json(rest)?)),
            other => Err(AppError::UnknownCommand(other.to_string())),
        }
    }
}

/// A view as printed on stdout.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewLine<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    view: &'a SessionView,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    trade_id: TradeId,
    party: Party,
    gateway: SharedGateway,
    completion: CompletionBus,
}

impl Application {
    pub fn new(config: AppConfig, trade_id: TradeId, party: Party) -> AppResult<Self> {
        let gateway: SharedGateway = Arc::new(HttpTradeGateway::new(&config.gateway)?);
        Ok(Self {
            config,
            trade_id,
            party,
            gateway,
            completion: CompletionBus::default(),
        })
    }

    /// Run the session until it ends, stdin closes or Ctrl-C.
    pub async fn run(self) -> AppResult<SessionExit> {
        let (push_tx, push_rx) = mpsc::channel(PUSH_BUFFER);
        let mut handle = mount(
            self.config.session.clone(),
            SessionMount {
                trade_id: self.trade_id.clone(),
                party: self.party,
                gateway: self.gateway.clone(),
                push: Some(push_rx),
                completion: Some(self.completion.subscribe(self.trade_id.clone())),
            },
        )?;
        info!(
            trade_id = %self.trade_id,
            party = %self.party,
            session_id = %handle.session_id(),
            "Session mounted"
        );

        let mut views = handle.subscribe();
        print_view(&views.borrow_and_update())?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        let exit = loop {
            tokio::select! {
                changed = views.changed() => {
                    if changed.is_err() {
                        // Sender dropped: the session reached a terminal phase.
                        break handle.wait().await?;
                    }
                    let view = views.borrow_and_update().clone();
                    print_view(&view)?;
                }

                line = lines.next_line() => match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match line.parse::<HostCommand>() {
                        Ok(cmd) => self.dispatch(&handle, &push_tx, cmd).await,
                        Err(e) => warn!(error = %e, "Ignoring input line"),
                    },
                    None => {
                        info!("Input closed, unmounting");
                        break handle.unmount().await?;
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break handle.unmount().await?;
                }
            }
        };

        info!(
            reason = ?exit.reason,
            reconciliations = exit.reconciliations,
            "Session finished"
        );
        Ok(exit)
    }

    async fn dispatch(
        &self,
        handle: &SessionHandle,
        push_tx: &mpsc::Sender<PushEvent>,
        cmd: HostCommand,
    ) {
        debug!(?cmd, "Host command");
        let delivered = match cmd {
            HostCommand::Lock => handle.request_lock().await,
            HostCommand::Show => handle.set_visibility(true).await,
            HostCommand::Hide => handle.set_visibility(false).await,
            HostCommand::Touch => handle.record_interaction().await,
            HostCommand::Push(event) => push_tx.send(event).await.is_ok(),
            HostCommand::Complete => {
                self.completion.publish(self.trade_id.clone());
                true
            }
        };
        if !delivered {
            debug!("Session already ended, command dropped");
        }
    }
}

fn print_view(view: &SessionView) -> AppResult<()> {
    let line = ViewLine {
        at: Utc::now(),
        view,
    };
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}
