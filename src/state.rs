//! Dashboard state container and column editing
//!
//! All shared mutable state lives here: the column list, placeholder
//! buffers for messages that arrive before their column does,
//! notifications, per-provider identities, and the service catalog. The
//! engine owns one `Dashboard` and mutates it only from inside its digest
//! loop, so no locking discipline beyond that single owner is needed.

use crate::catalog::ServiceProposal;
use crate::codec::{self, Arg, SubscriptionRequest};
use crate::ingest::Message;
use crate::protocol::{ClientCommand, ColumnPayload};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Base window title; unread messages prefix it with a counter
pub const APP_TITLE: &str = "Feedboard";

/// Inline validation flags surfaced on a column during an edit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFlags {
    pub blank_arg: bool,
    pub duplicate_subscription: bool,
    pub title_required: bool,
    pub title_taken: bool,
}

/// A user-defined view aggregating messages from subscribed services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub title: String,
    /// Title as it was when the current edit opened; the server keys
    /// `modColumn` by it
    pub old_title: String,
    pub unified_requests: Vec<SubscriptionRequest>,
    pub messages: Vec<Message>,
    /// Whether the edit panel is open
    pub editing: bool,
    /// Whether the column has never been committed to the server
    pub new_column: bool,
    pub flags: ValidationFlags,
}

impl Column {
    /// A column as rebuilt from a server snapshot.
    pub fn from_snapshot(
        title: String,
        unified_requests: Vec<SubscriptionRequest>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            old_title: title.clone(),
            title,
            unified_requests,
            messages,
            editing: false,
            new_column: false,
            flags: ValidationFlags::default(),
        }
    }
}

/// A dismissible banner, deduplicated by provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub provider_name: String,
    pub title: String,
    pub message: String,
    pub footer: String,
    pub is_error: bool,
}

/// Per-provider identity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub social_type: String,
    pub name: String,
    pub avatar: String,
}

/// Result of trying to add a catalog service to a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddServiceOutcome {
    Added,
    /// The provider has no auth token yet; the caller should start the
    /// account-linking flow
    LinkRequired,
    /// No parser for this service, or the column does not exist
    Ignored,
}

/// Result of clicking a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationAction {
    Dismissed,
    /// Re-link the named provider
    Reconnect(String),
}

/// The single UI-state container
pub struct Dashboard {
    pub columns: Vec<Column>,
    pub notifications: Vec<Notification>,
    pub user_infos: Vec<UserInfo>,
    /// Service catalog; `None` until the first fetch or push arrives
    pub proposals: Option<Vec<ServiceProposal>>,
    /// Title of the most recently requested column deletion, awaiting ack
    pub pending_deletion: Option<String>,
    /// Messages buffered per title for columns the client has not built yet
    placeholders: HashMap<String, Vec<Message>>,
    page_visible: bool,
    unread: u32,
    clean_re: Regex,
}

impl Dashboard {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            notifications: Vec::new(),
            user_infos: Vec::new(),
            proposals: None,
            pending_deletion: None,
            placeholders: HashMap::new(),
            page_visible: true,
            unread: 0,
            clean_re: Regex::new(r#"[&/\\#,+()$~%'":*?<>{}]"#).unwrap(),
        }
    }

    // ── Column editing ──────────────────────────────

    /// Append a fresh editing column with a Greek-letter placeholder title.
    /// Returns its index.
    pub fn add_column(&mut self) -> usize {
        let letter = char::from_u32(945 + self.columns.len() as u32).unwrap_or('α');
        self.columns.push(Column {
            title: format!("{letter}) What is here ? "),
            old_title: String::new(),
            unified_requests: Vec::new(),
            messages: Vec::new(),
            editing: true,
            new_column: true,
            flags: ValidationFlags::default(),
        });
        self.columns.len() - 1
    }

    /// Open or cancel an edit. Cancelling restores the title and drops any
    /// subscriptions added locally during the aborted edit. Returns whether
    /// the column is now in editing state.
    pub fn toggle_edit(&mut self, index: usize) -> bool {
        let Some(column) = self.columns.get_mut(index) else {
            return false;
        };
        column.editing = !column.editing;
        if column.editing {
            column.old_title = column.title.clone();
        } else {
            column.title = column.old_title.clone();
            column.flags.blank_arg = false;
            column.unified_requests.retain(|request| request.from_server);
        }
        column.editing
    }

    /// Add a catalog service to a column's subscription list.
    pub fn add_service(&mut self, index: usize, proposal: &ServiceProposal) -> AddServiceOutcome {
        if !proposal.has_parser {
            return AddServiceOutcome::Ignored;
        }
        if !proposal.social_network_token {
            return AddServiceOutcome::LinkRequired;
        }
        match self.columns.get_mut(index) {
            Some(column) => {
                column
                    .unified_requests
                    .push(codec::for_sending(&proposal.service));
                AddServiceOutcome::Added
            }
            None => AddServiceOutcome::Ignored,
        }
    }

    /// Remove the first subscription matching the service id and, when
    /// given, the (key, value) argument pair; argless subscriptions match
    /// only when no argument is given.
    pub fn delete_service(&mut self, index: usize, service_id: &str, arg: Option<&Arg>) {
        let Some(column) = self.columns.get_mut(index) else {
            return;
        };
        let position = column.unified_requests.iter().position(|request| {
            if request.service != service_id {
                return false;
            }
            match arg {
                Some(arg) => request
                    .args
                    .iter()
                    .any(|a| a.key == arg.key && a.value == arg.value),
                None => request.args.is_empty(),
            }
        });
        if let Some(position) = position {
            column.unified_requests.remove(position);
        }
    }

    /// Validate and commit an edit. On success the edit panel closes, the
    /// message list resets, and the outbound command is returned; on any
    /// validation failure the matching inline flag is set and nothing is
    /// sent.
    pub fn commit_column(&mut self, index: usize) -> Option<ClientCommand> {
        if index >= self.columns.len() {
            return None;
        }
        let clean_re = self.clean_re.clone();

        // Argument values are cleaned in place so the UI shows them.
        {
            let column = &mut self.columns[index];
            column.flags.title_taken = false;
            column.flags.title_required = false;
            column.flags.blank_arg = false;
            column.flags.duplicate_subscription = false;
            for request in &mut column.unified_requests {
                for arg in &mut request.args {
                    arg.value = clean_re.replace_all(&arg.value, "").into_owned();
                    if arg.value.is_empty() {
                        column.flags.blank_arg = true;
                    }
                }
            }
            if column.flags.blank_arg {
                return None;
            }
            column.flags.duplicate_subscription =
                detect_duplicate_subscription(&column.unified_requests);
            if column.flags.duplicate_subscription {
                return None;
            }
            if column.title.is_empty() {
                column.flags.title_required = true;
                return None;
            }
        }

        let title = self.columns[index].title.clone();
        let taken = self
            .columns
            .iter()
            .enumerate()
            .any(|(i, column)| i != index && column.title == title);
        let column = &mut self.columns[index];
        if taken {
            column.flags.title_taken = true;
            return None;
        }

        let payload = ColumnPayload {
            title: column.title.clone(),
            unified_requests: column.unified_requests.iter().map(codec::to_server).collect(),
        };
        let command = if column.new_column {
            column.new_column = false;
            ClientCommand::AddColumn(payload)
        } else {
            ClientCommand::ModColumn {
                title: column.old_title.clone(),
                column: payload,
            }
        };
        column.messages.clear();
        column.editing = false;
        Some(command)
    }

    /// Request deletion of a column. The column stays until the server
    /// acknowledges; the title is recorded for the ack to match.
    pub fn delete_column(&mut self, index: usize) -> Option<ClientCommand> {
        let column = self.columns.get(index)?;
        let title = column.title.clone();
        self.pending_deletion = Some(title.clone());
        Some(ClientCommand::DelColumn { title })
    }

    /// Apply a `delColumn` acknowledgment: remove the column matching the
    /// most recently requested deletion.
    pub fn acknowledge_deletion(&mut self) {
        match self.pending_deletion.take() {
            Some(title) => {
                if let Some(position) = self.columns.iter().position(|c| c.title == title) {
                    self.columns.remove(position);
                }
            }
            None => warn!("delColumn ack received with no deletion pending"),
        }
    }

    // ── Notifications and identities ──────────────────────────────

    /// Error notifications dismiss on click; provider-disconnect ones ask
    /// for a re-link instead.
    pub fn click_notification(&mut self, index: usize) -> Option<NotificationAction> {
        let notification = self.notifications.get(index)?;
        if notification.is_error {
            let provider_name = notification.provider_name.clone();
            let message = notification.message.clone();
            let position = self
                .notifications
                .iter()
                .position(|n| n.provider_name == provider_name && n.message == message)?;
            self.notifications.remove(position);
            Some(NotificationAction::Dismissed)
        } else {
            Some(NotificationAction::Reconnect(
                notification.provider_name.clone(),
            ))
        }
    }

    pub fn upsert_user_info(&mut self, info: UserInfo) {
        if let Some(existing) = self
            .user_infos
            .iter_mut()
            .find(|u| u.social_type == info.social_type)
        {
            *existing = info;
        } else {
            self.user_infos.push(info);
        }
    }

    // ── Message routing ──────────────────────────────

    pub fn column_by_title_mut(&mut self, title: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.title == title)
    }

    /// Placeholder buffer for a column the client has not built yet.
    pub fn placeholder_mut(&mut self, title: &str) -> &mut Vec<Message> {
        self.placeholders.entry(title.to_string()).or_default()
    }

    /// Drain the placeholder buffer for a title, if any.
    pub fn take_placeholder(&mut self, title: &str) -> Vec<Message> {
        self.placeholders.remove(title).unwrap_or_default()
    }

    pub fn has_placeholder(&self, title: &str) -> bool {
        self.placeholders.contains_key(title)
    }

    // ── Unread counter ──────────────────────────────

    /// Visibility transitions reset the counter in both directions.
    pub fn set_page_visible(&mut self, visible: bool) {
        self.page_visible = visible;
        self.unread = 0;
    }

    pub fn note_new_message(&mut self) {
        if !self.page_visible {
            self.unread += 1;
        }
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    pub fn window_title(&self) -> String {
        if self.unread > 0 {
            format!("({}) {APP_TITLE}", self.unread)
        } else {
            APP_TITLE.to_string()
        }
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

/// Duplicate-subscription detector.
///
/// A column may not hold the same service with the same argument value
/// twice, nor the same argless service twice. Counting pairs across the
/// whole list keeps the check symmetric: each entry matches itself once,
/// so any count above one means a true duplicate.
fn detect_duplicate_subscription(requests: &[SubscriptionRequest]) -> bool {
    for request in requests {
        let mut service_found = 0;
        for other in requests {
            if !request.args.is_empty() {
                let mut arg_found = 0;
                for arg in &request.args {
                    for other_arg in &other.args {
                        if request.service == other.service && arg.value == other_arg.value {
                            arg_found += 1;
                        }
                    }
                    if arg_found > 1 {
                        return true;
                    }
                }
            } else if request.service == other.service {
                service_found += 1;
            }
        }
        if service_found > 1 {
            return true;
        }
    }
    false
}
