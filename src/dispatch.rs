//! Inbound command dispatch
//!
//! One multiplexer for everything the server pushes. Each command is one
//! atomic digest: the dashboard is mutated completely before the next
//! frame is looked at. Replaying a `tokenInvalid` or `newToken` frame is
//! harmless; notifications stay deduplicated by provider.

use crate::catalog;
use crate::codec;
use crate::ingest::{self, Sanitizer};
use crate::protocol::{Inbound, MsgBody, ServerColumn, ServerCommand};
use crate::state::{Column, Dashboard, Notification, UserInfo};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

pub struct Dispatcher {
    sanitizer: Sanitizer,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            sanitizer: Sanitizer::new(),
        }
    }

    pub fn execute(&self, dashboard: &mut Dashboard, inbound: Inbound) {
        self.execute_at(dashboard, inbound, Utc::now());
    }

    /// Dispatch one frame at an explicit instant (tests pin the clock).
    pub fn execute_at(&self, dashboard: &mut Dashboard, inbound: Inbound, now: DateTime<Utc>) {
        let command = match inbound {
            Inbound::Command(command) => command,
            Inbound::Raw(text) => {
                warn!(frame = %text, "Command not yet implemented");
                return;
            }
        };
        match command {
            ServerCommand::AllUnifiedRequests(records) => {
                let proposals = catalog::build_catalog(&records);
                debug!(services = proposals.len(), "Rebuilt service catalog");
                dashboard.proposals = Some(proposals);
            }
            ServerCommand::Msg(body) => self.ingest_message(dashboard, body, now),
            ServerCommand::AllColumns(snapshot) => rebuild_columns(dashboard, snapshot),
            ServerCommand::DelColumnAck => dashboard.acknowledge_deletion(),
            ServerCommand::UserInfos(body) => {
                dashboard.upsert_user_info(UserInfo {
                    social_type: body.social_type,
                    name: body.name,
                    avatar: ingest::fix_avatar(&body.avatar),
                });
            }
            ServerCommand::TokenInvalid(provider) => {
                let exists = dashboard
                    .notifications
                    .iter()
                    .any(|n| n.provider_name == provider.provider_name);
                if !exists {
                    dashboard.notifications.push(Notification {
                        provider_name: provider.provider_name,
                        title: "You have been disconnected from".to_string(),
                        message: provider.msg,
                        footer: "Click here to be connected again.".to_string(),
                        is_error: false,
                    });
                }
            }
            ServerCommand::NewToken(provider) => {
                if let Some(proposals) = dashboard.proposals.as_mut() {
                    for proposal in proposals.iter_mut() {
                        let (provider_name, _) =
                            codec::split_service_id(&proposal.service.service);
                        if provider_name == provider.provider_name {
                            proposal.social_network_token = true;
                        }
                    }
                }
                dashboard
                    .notifications
                    .retain(|n| n.provider_name != provider.provider_name);
            }
            ServerCommand::Error(error) => {
                dashboard.notifications.push(Notification {
                    provider_name: error.provider_name,
                    title: error.msg,
                    message: String::new(),
                    footer: "Click here to hide error.".to_string(),
                    is_error: true,
                });
            }
            ServerCommand::ModColumnAck(_) => {}
            ServerCommand::Unimplemented(value) => {
                warn!(command = %value, "Command not yet implemented");
            }
        }
    }

    /// Route a message to its column, or buffer it under the title when
    /// the client has not built that column yet.
    fn ingest_message(&self, dashboard: &mut Dashboard, body: MsgBody, now: DateTime<Utc>) {
        let message = self.sanitizer.sanitize(&body.msg, now);
        if let Some(column) = dashboard.column_by_title_mut(&body.column) {
            ingest::insert_message(&mut column.messages, message, now);
        } else {
            let buffer = dashboard.placeholder_mut(&body.column);
            ingest::insert_message(buffer, message, now);
        }
        dashboard.note_new_message();
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace the whole column list with a server snapshot.
///
/// Placeholder buffers created before the snapshot are absorbed into the
/// column whose title matches exactly; buffers matching no snapshot title
/// stay put and wait for a later snapshot.
fn rebuild_columns(dashboard: &mut Dashboard, snapshot: Vec<ServerColumn>) {
    let mut columns = Vec::with_capacity(snapshot.len());
    for server_column in snapshot {
        let unified_requests = server_column
            .unified_requests
            .iter()
            .map(codec::for_display)
            .collect();
        let messages = dashboard.take_placeholder(&server_column.title);
        columns.push(Column::from_snapshot(
            server_column.title,
            unified_requests,
            messages,
        ));
    }
    dashboard.columns = columns;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch(dashboard: &mut Dashboard, frame: &str) {
        Dispatcher::new().execute(dashboard, Inbound::parse(frame));
    }

    fn msg_frame(column: &str, text: &str, created_at: i64) -> String {
        format!(
            r#"{{"cmd":"msg","body":{{"column":"{column}","msg":{{
                "from":"tw-1","author":"a","authorAvatar":"",
                "message":"{text}","createdAt":{created_at}}}}}}}"#
        )
    }

    #[test]
    fn test_catalog_rebuild_replaces_wholesale() {
        let mut dashboard = Dashboard::new();
        dispatch(
            &mut dashboard,
            r#"{"cmd":"allUnifiedRequests","body":[
                {"endpoint":"twitter","hasToken":true,"services":[
                    {"service":"twitter.user","args":["user"],"hasParser":true}]}]}"#,
        );
        assert_eq!(dashboard.proposals.as_ref().unwrap().len(), 1);

        dispatch(
            &mut dashboard,
            r#"{"cmd":"allUnifiedRequests","body":[]}"#,
        );
        assert!(dashboard.proposals.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_msg_before_snapshot_lands_in_placeholder() {
        let mut dashboard = Dashboard::new();
        dispatch(&mut dashboard, &msg_frame("A", "early", 10));
        assert!(dashboard.columns.is_empty());
        assert!(dashboard.has_placeholder("A"));

        dispatch(
            &mut dashboard,
            r#"{"cmd":"allColumns","body":[{"title":"A","unifiedRequests":[]}]}"#,
        );
        assert_eq!(dashboard.columns.len(), 1);
        assert_eq!(dashboard.columns[0].messages.len(), 1);
        assert_eq!(dashboard.columns[0].messages[0].original, "early");
        assert!(!dashboard.has_placeholder("A"));
    }

    #[test]
    fn test_msg_after_snapshot_appends_to_same_column() {
        let mut dashboard = Dashboard::new();
        dispatch(
            &mut dashboard,
            r#"{"cmd":"allColumns","body":[{"title":"A","unifiedRequests":[]}]}"#,
        );
        dispatch(&mut dashboard, &msg_frame("A", "first", 10));
        dispatch(&mut dashboard, &msg_frame("A", "second", 20));

        assert_eq!(dashboard.columns.len(), 1, "no duplicate column A");
        let stamps: Vec<i64> = dashboard.columns[0]
            .messages
            .iter()
            .map(|m| m.created_at)
            .collect();
        assert_eq!(stamps, vec![20, 10]);
        assert!(!dashboard.has_placeholder("A"));
    }

    #[test]
    fn test_placeholder_survives_nonmatching_snapshot() {
        let mut dashboard = Dashboard::new();
        dispatch(&mut dashboard, &msg_frame("B", "buffered", 10));
        dispatch(
            &mut dashboard,
            r#"{"cmd":"allColumns","body":[{"title":"A","unifiedRequests":[]}]}"#,
        );
        assert!(dashboard.has_placeholder("B"));

        dispatch(
            &mut dashboard,
            r#"{"cmd":"allColumns","body":[{"title":"B","unifiedRequests":[]}]}"#,
        );
        assert_eq!(dashboard.columns[0].messages.len(), 1);
    }

    #[test]
    fn test_snapshot_expands_unified_requests() {
        let mut dashboard = Dashboard::new();
        dispatch(
            &mut dashboard,
            r#"{"cmd":"allColumns","body":[{"title":"A","unifiedRequests":[
                {"service":"twitter.user","args":{"user":"alice"}}]}]}"#,
        );
        let request = &dashboard.columns[0].unified_requests[0];
        assert_eq!(request.provider_name, "twitter");
        assert_eq!(request.service_name, "user");
        assert!(request.from_server);
        assert_eq!(request.args[0].value, "alice");
    }

    #[test]
    fn test_token_invalid_is_idempotent() {
        let mut dashboard = Dashboard::new();
        for _ in 0..2 {
            dispatch(
                &mut dashboard,
                r#"{"cmd":"tokenInvalid","body":{"providerName":"twitter"}}"#,
            );
        }
        assert_eq!(dashboard.notifications.len(), 1);
        let notification = &dashboard.notifications[0];
        assert_eq!(notification.title, "You have been disconnected from");
        assert!(!notification.is_error);
    }

    #[test]
    fn test_new_token_marks_catalog_and_clears_notification() {
        let mut dashboard = Dashboard::new();
        dispatch(
            &mut dashboard,
            r#"{"cmd":"allUnifiedRequests","body":[
                {"endpoint":"twitter","hasToken":false,"services":[
                    {"service":"twitter.user","args":[],"hasParser":true}]},
                {"endpoint":"facebook","hasToken":false,"services":[
                    {"service":"facebook.user","args":[],"hasParser":true}]}]}"#,
        );
        dispatch(
            &mut dashboard,
            r#"{"cmd":"tokenInvalid","body":{"providerName":"twitter"}}"#,
        );

        dispatch(
            &mut dashboard,
            r#"{"cmd":"newToken","body":{"providerName":"twitter"}}"#,
        );
        assert!(dashboard.notifications.is_empty());
        let proposals = dashboard.proposals.as_ref().unwrap();
        assert!(proposals
            .iter()
            .find(|p| p.social_network == "twitter")
            .unwrap()
            .social_network_token);
        assert!(!proposals
            .iter()
            .find(|p| p.social_network == "facebook")
            .unwrap()
            .social_network_token);
    }

    #[test]
    fn test_error_notification_is_dismissible() {
        let mut dashboard = Dashboard::new();
        dispatch(
            &mut dashboard,
            r#"{"cmd":"error","body":{"msg":"rate limited","providerName":"twitter"}}"#,
        );
        assert_eq!(dashboard.notifications.len(), 1);
        assert!(dashboard.notifications[0].is_error);
        assert_eq!(dashboard.notifications[0].title, "rate limited");
        assert_eq!(
            dashboard.notifications[0].footer,
            "Click here to hide error."
        );
    }

    #[test]
    fn test_user_infos_upsert_and_avatar_fixup() {
        let mut dashboard = Dashboard::new();
        dispatch(
            &mut dashboard,
            r#"{"cmd":"userInfos","body":{"socialType":"twitter","name":"alice","avatar":""}}"#,
        );
        dispatch(
            &mut dashboard,
            r#"{"cmd":"userInfos","body":{"socialType":"twitter","name":"alice","avatar":"www.x.org/a.png"}}"#,
        );
        assert_eq!(dashboard.user_infos.len(), 1);
        assert_eq!(dashboard.user_infos[0].avatar, "http://www.x.org/a.png");
    }

    #[test]
    fn test_del_column_ack_without_pending_is_harmless() {
        let mut dashboard = Dashboard::new();
        dispatch(&mut dashboard, r#"{"cmd":"delColumn","body":"Ok"}"#);
        assert!(dashboard.columns.is_empty());
    }

    #[test]
    fn test_raw_and_unknown_frames_do_not_mutate_state() {
        let mut dashboard = Dashboard::new();
        dispatch(&mut dashboard, "garbage {{{");
        dispatch(&mut dashboard, r#"{"cmd":"mystery","body":{}}"#);
        dispatch(&mut dashboard, r#"{"cmd":"modColumn","body":"Ok"}"#);
        assert!(dashboard.columns.is_empty());
        assert!(dashboard.notifications.is_empty());
        assert!(dashboard.proposals.is_none());
    }
}
