//! Engine digest loop
//!
//! The engine owns the dashboard and is the only place that mutates it.
//! Transport frames, UI actions, and catalog-fetch completions all funnel
//! through one loop, so every mutation is a single uninterrupted digest
//! and arrival order is processing order.

use crate::catalog::ServiceProposal;
use crate::codec::{self, Arg};
use crate::dispatch::Dispatcher;
use crate::protocol::{ClientCommand, Inbound, ProviderServices, ServerCommand, ServiceDescriptor};
use crate::state::{AddServiceOutcome, Dashboard, NotificationAction};
use crate::transport::{self, Sender};
use crate::{FeedboardConfig, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Actions the UI layer feeds into the digest loop
#[derive(Debug, Clone)]
pub enum UiAction {
    AddColumn,
    ToggleEdit {
        column: usize,
    },
    AddService {
        column: usize,
        proposal: ServiceProposal,
    },
    DeleteService {
        column: usize,
        service: String,
        arg: Option<Arg>,
    },
    CommitColumn {
        column: usize,
    },
    DeleteColumn {
        column: usize,
    },
    ClickNotification {
        index: usize,
    },
    /// The account-linking flow finished. Refresh the catalog and, when a
    /// target column was recorded, append the linked service to it. This
    /// is the typed replacement for the popup's callback entry point.
    LinkCompleted {
        service: ServiceDescriptor,
        column: Option<String>,
    },
    PageVisible(bool),
    RefreshCatalog,
}

/// Signals the engine emits back to its embedder
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Start the account-linking flow for a provider. `service` and
    /// `column` should come back in [`UiAction::LinkCompleted`] when the
    /// flow succeeds.
    LinkRequested {
        social_network: String,
        service: Option<ServiceDescriptor>,
        column: Option<String>,
    },
}

pub struct Engine {
    config: FeedboardConfig,
    dashboard: Arc<RwLock<Dashboard>>,
    dispatcher: Dispatcher,
    http: reqwest::Client,
}

impl Engine {
    pub fn new(config: FeedboardConfig) -> Self {
        Self {
            config,
            dashboard: Arc::new(RwLock::new(Dashboard::new())),
            dispatcher: Dispatcher::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Shared handle to the dashboard for the UI layer to render from.
    /// Mutation stays inside the digest loop.
    pub fn dashboard(&self) -> Arc<RwLock<Dashboard>> {
        self.dashboard.clone()
    }

    /// Connect the transport and run the digest loop until both input
    /// channels close.
    pub async fn run(
        &self,
        mut actions_rx: mpsc::Receiver<UiAction>,
        events_tx: mpsc::Sender<EngineEvent>,
    ) -> Result<()> {
        let (inbound_tx, mut inbound_rx) = mpsc::channel::<Inbound>(64);
        let sender = transport::connect(&self.config, inbound_tx.clone()).await;
        info!("Engine digest loop running");
        loop {
            tokio::select! {
                inbound = inbound_rx.recv() => match inbound {
                    Some(inbound) => self.digest(inbound).await,
                    None => break,
                },
                action = actions_rx.recv() => match action {
                    Some(action) => {
                        self.handle_action(action, &sender, &inbound_tx, &events_tx)
                            .await;
                    }
                    None => break,
                },
            }
        }
        info!("Engine digest loop ended");
        Ok(())
    }

    /// Apply one inbound frame as a single digest.
    pub async fn digest(&self, inbound: Inbound) {
        if self.config.verbose {
            debug!(?inbound, "digest");
        }
        let mut dashboard = self.dashboard.write().await;
        self.dispatcher.execute(&mut dashboard, inbound);
    }

    async fn handle_action(
        &self,
        action: UiAction,
        sender: &Sender,
        inbound_tx: &mpsc::Sender<Inbound>,
        events_tx: &mpsc::Sender<EngineEvent>,
    ) {
        match action {
            UiAction::AddColumn => {
                let needs_catalog = {
                    let mut dashboard = self.dashboard.write().await;
                    dashboard.add_column();
                    dashboard.proposals.is_none()
                };
                if needs_catalog {
                    self.spawn_catalog_fetch(inbound_tx.clone());
                }
            }
            UiAction::ToggleEdit { column } => {
                let needs_catalog = {
                    let mut dashboard = self.dashboard.write().await;
                    let editing = dashboard.toggle_edit(column);
                    editing && dashboard.proposals.is_none()
                };
                if needs_catalog {
                    self.spawn_catalog_fetch(inbound_tx.clone());
                }
            }
            UiAction::AddService { column, proposal } => {
                let mut dashboard = self.dashboard.write().await;
                if dashboard.add_service(column, &proposal) == AddServiceOutcome::LinkRequired {
                    let column_title = dashboard.columns.get(column).map(|c| c.title.clone());
                    drop(dashboard);
                    let _ = events_tx
                        .send(EngineEvent::LinkRequested {
                            social_network: proposal.social_network.clone(),
                            service: Some(proposal.service.clone()),
                            column: column_title,
                        })
                        .await;
                }
            }
            UiAction::DeleteService {
                column,
                service,
                arg,
            } => {
                self.dashboard
                    .write()
                    .await
                    .delete_service(column, &service, arg.as_ref());
            }
            UiAction::CommitColumn { column } => {
                let command = self.dashboard.write().await.commit_column(column);
                if let Some(command) = command {
                    self.send(sender, &command).await;
                }
            }
            UiAction::DeleteColumn { column } => {
                let command = self.dashboard.write().await.delete_column(column);
                if let Some(command) = command {
                    self.send(sender, &command).await;
                }
            }
            UiAction::ClickNotification { index } => {
                let action = self.dashboard.write().await.click_notification(index);
                if let Some(NotificationAction::Reconnect(social_network)) = action {
                    let _ = events_tx
                        .send(EngineEvent::LinkRequested {
                            social_network,
                            service: None,
                            column: None,
                        })
                        .await;
                }
            }
            UiAction::LinkCompleted { service, column } => {
                self.spawn_catalog_fetch(inbound_tx.clone());
                if let Some(title) = column {
                    let mut dashboard = self.dashboard.write().await;
                    if let Some(column) = dashboard.column_by_title_mut(&title) {
                        column.unified_requests.push(codec::for_sending(&service));
                    }
                }
            }
            UiAction::PageVisible(visible) => {
                self.dashboard.write().await.set_page_visible(visible);
            }
            UiAction::RefreshCatalog => self.spawn_catalog_fetch(inbound_tx.clone()),
        }
    }

    async fn send(&self, sender: &Sender, command: &ClientCommand) {
        if let Err(e) = sender.send(command).await {
            warn!(error = %e, "Failed to send command");
        }
    }

    /// Fire-and-forget catalog fetch; the result re-enters the dispatcher
    /// as a synthetic `allUnifiedRequests`. A stale response simply
    /// overwrites the catalog on arrival.
    fn spawn_catalog_fetch(&self, inbound_tx: mpsc::Sender<Inbound>) {
        let http = self.http.clone();
        let url = self.config.catalog_url.clone();
        tokio::spawn(async move {
            match fetch_catalog(&http, &url).await {
                Ok(records) => {
                    let _ = inbound_tx
                        .send(Inbound::Command(ServerCommand::AllUnifiedRequests(records)))
                        .await;
                }
                Err(e) => warn!(error = %e, "Catalog fetch failed"),
            }
        });
    }
}

async fn fetch_catalog(http: &reqwest::Client, url: &str) -> Result<Vec<ProviderServices>> {
    Ok(http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?)
}
