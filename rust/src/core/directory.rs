// Conversation list building: directory lookup plus one history fetch per
// counterpart. Pull-only — no push channel is involved here.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use crate::state::{now_millis, ConversationSummary, Participant, Role};
use crate::transport::{ChatTransport, DirectoryEntry, WireMessage};
use crate::updates::{CoreMsg, InternalEvent};

use super::AppCore;

const NO_MESSAGES_PLACEHOLDER: &str = "No messages yet";

impl AppCore {
    pub(super) fn refresh_conversations(&mut self) {
        let Some(sess) = self.session.as_ref() else {
            tracing::debug!("conversation refresh ignored: not logged in");
            return;
        };
        let transport = sess.transport.clone();
        let self_id = sess.user.id.clone();
        let wanted = sess.user.role.counterpart();

        // Overlapping refreshes resolve to the newest request only.
        self.directory_token = self.directory_token.wrapping_add(1);
        let token = self.directory_token;
        self.set_busy(|b| b.refreshing_conversations = true);

        if !self.network_enabled() {
            let done = InternalEvent::DirectoryRefreshed {
                token,
                conversations: Some(vec![]),
                error: None,
            };
            let _ = self.core_sender.send(CoreMsg::Internal(Box::new(done)));
            return;
        }

        let last_read = self.last_read_ms.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let internal = match build_summaries(transport, self_id, wanted, last_read).await {
                Ok(conversations) => InternalEvent::DirectoryRefreshed {
                    token,
                    conversations: Some(conversations),
                    error: None,
                },
                Err(error) => InternalEvent::DirectoryRefreshed {
                    token,
                    conversations: None,
                    error: Some(error),
                },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(internal)));
        });
    }

    pub(super) fn on_directory_refreshed(
        &mut self,
        token: u64,
        conversations: Option<Vec<ConversationSummary>>,
        error: Option<String>,
    ) {
        if token != self.directory_token {
            tracing::debug!(token, "stale directory refresh dropped");
            return;
        }
        self.set_busy(|b| b.refreshing_conversations = false);
        match conversations {
            Some(list) => {
                self.state.conversations = list;
                self.emit_conversations();
            }
            None => {
                // Nothing can be shown at all, so this failure is loud.
                let reason = error.unwrap_or_else(|| "directory fetch failed".to_string());
                self.toast(format!("Couldn't load conversations: {reason}"));
            }
        }
    }
}

/// The N+1 fetch is deliberate: directories here are a handful of
/// pathologists or farmers, and per-pair failures must degrade one row, not
/// the whole screen.
async fn build_summaries(
    transport: Arc<dyn ChatTransport>,
    self_id: String,
    wanted: Role,
    last_read: HashMap<String, i64>,
) -> Result<Vec<ConversationSummary>, String> {
    let entries = transport
        .fetch_directory(wanted.clone())
        .await
        .map_err(|e| e.to_string())?;

    let mut list = Vec::with_capacity(entries.len());
    for entry in entries {
        let history = match transport.fetch_history(&self_id, &entry.id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(counterpart = %entry.id, %e, "preview fetch failed");
                vec![]
            }
        };
        let unread = match last_read.get(&entry.id) {
            Some(read_ts) => history
                .iter()
                .filter(|m| m.sender == entry.id)
                .filter(|m| m.created_at_ms.map(|ts| ts > *read_ts).unwrap_or(false))
                .count() as u32,
            None => 0,
        };
        let preview = history.into_iter().last();
        list.push(summary_from(entry, preview, unread, wanted.clone()));
    }

    // Missing preview timestamps sort as "now": untouched pairs float to the
    // top of the list.
    let now = now_millis();
    list.sort_by_key(|c| Reverse(c.last_message_at_ms.unwrap_or(now)));
    Ok(list)
}

fn summary_from(
    entry: DirectoryEntry,
    preview: Option<WireMessage>,
    unread: u32,
    role: Role,
) -> ConversationSummary {
    ConversationSummary {
        counterpart: Participant {
            id: entry.id,
            role,
            name: entry.name,
            avatar_url: entry.avatar_url,
        },
        last_message: preview
            .as_ref()
            .map(|m| m.body.clone())
            .unwrap_or_else(|| NO_MESSAGES_PLACEHOLDER.to_string()),
        last_message_at_ms: preview.and_then(|m| m.created_at_ms),
        unread_count: unread,
        online: entry.is_online.unwrap_or(false),
    }
}
