// Conversation sync: the dual-channel engine behind the open chat screen.
//
// Polling and the push socket run concurrently for the whole life of an open
// conversation and race freely; MessageStore's id-based dedup is the single
// safety mechanism that makes that redundancy harmless. Teardown bumps the
// sync epoch, and every async result is fenced on (conversation_id, epoch)
// before it may touch state.

use crate::room::room_id;
use crate::state::{
    now_millis, ChatMessage, ConnectionState, MessageDeliveryState, Participant,
};
use crate::store::MessageStore;
use crate::transport::{
    PushAuth, PushCommand, PushEvent, SendAck, SendMessageRequest, WireMessage,
};
use crate::updates::{CoreMsg, InternalEvent};

use super::{AppCore, ConversationSync};

fn sync_for_event<'a>(
    slot: &'a mut Option<ConversationSync>,
    conversation_id: &str,
    epoch: u64,
) -> Option<&'a mut ConversationSync> {
    match slot.as_mut() {
        Some(sync) if sync.conversation_id == conversation_id && sync.epoch == epoch => Some(sync),
        _ => None,
    }
}

fn wire_to_chat(wire: WireMessage, conversation_id: &str, self_id: &str) -> ChatMessage {
    let is_mine = wire.sender == self_id;
    ChatMessage {
        id: wire.id,
        conversation_id: conversation_id.to_string(),
        sender_id: wire.sender,
        receiver_id: wire.receiver,
        body: wire.body,
        created_at_ms: wire.created_at_ms,
        delivery: MessageDeliveryState::Sent,
        is_mine,
    }
}

fn newest_counterpart_ts(store: &MessageStore, counterpart_id: &str) -> Option<i64> {
    store
        .messages()
        .iter()
        .filter(|m| m.sender_id == counterpart_id)
        .filter_map(|m| m.created_at_ms)
        .max()
}

impl AppCore {
    pub(super) fn open_conversation(&mut self, counterpart: Participant) {
        // Both identities must be resolved before any transport activity
        // starts; anything missing is a quiet no-op, never an error.
        let Some(sess) = self.session.as_ref() else {
            tracing::debug!("open_conversation ignored: not logged in");
            return;
        };
        if counterpart.id.trim().is_empty() {
            tracing::debug!("open_conversation ignored: counterpart id missing");
            return;
        }

        let self_user = sess.user.clone();
        let transport = sess.transport.clone();

        self.teardown_conversation();

        let conversation_id = room_id(
            &self_user.id,
            self_user.role.clone(),
            &counterpart.id,
            counterpart.role.clone(),
        );
        self.epoch = self.epoch.wrapping_add(1);
        let epoch = self.epoch;
        tracing::info!(
            conversation = %conversation_id,
            counterpart = %counterpart.id,
            "conversation opened"
        );

        // Opening marks the pair as read up to whatever history is about to
        // arrive.
        self.last_read_ms.entry(counterpart.id.clone()).or_insert(0);

        let mut sync = ConversationSync {
            conversation_id: conversation_id.clone(),
            counterpart,
            epoch,
            store: MessageStore::new(),
            connection: ConnectionState::Connecting,
            history_loaded: false,
            load_error_shown: false,
            fetch_in_flight: false,
            poll_task: None,
            push_forward_task: None,
            push: None,
        };

        if !self.network_enabled() {
            // Deterministic offline mode: nothing to fetch, nothing to join.
            sync.history_loaded = true;
            sync.connection = ConnectionState::Disconnected;
            self.sync = Some(sync);
            self.emit_current_conversation();
            return;
        }

        // Poll loop: one immediate tick, then the fixed interval. A tick is
        // only a request — the actor skips it while a fetch is in flight, so
        // slow responses never stack concurrent requests.
        let tx = self.core_sender.clone();
        let conv = conversation_id.clone();
        let interval = self.poll_interval();
        sync.poll_task = Some(self.runtime.spawn(async move {
            loop {
                let tick = InternalEvent::PollTick {
                    conversation_id: conv.clone(),
                    epoch,
                };
                if tx.send(CoreMsg::Internal(Box::new(tick))).is_err() {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        }));

        let auth = PushAuth {
            user_id: self_user.id.clone(),
            role: self_user.role.clone(),
        };
        let push = transport.open_push(self.runtime.handle(), auth, &conversation_id);

        let events = push.events.clone();
        let tx = self.core_sender.clone();
        let conv = conversation_id.clone();
        sync.push_forward_task = Some(self.runtime.spawn(async move {
            while let Ok(event) = events.recv_async().await {
                let internal = match event {
                    PushEvent::Connected => InternalEvent::PushStatus {
                        conversation_id: conv.clone(),
                        epoch,
                        connected: true,
                        exhausted: false,
                    },
                    PushEvent::Disconnected { exhausted } => InternalEvent::PushStatus {
                        conversation_id: conv.clone(),
                        epoch,
                        connected: false,
                        exhausted,
                    },
                    PushEvent::Message(message) => InternalEvent::PushMessageReceived {
                        conversation_id: conv.clone(),
                        epoch,
                        message,
                    },
                };
                if tx.send(CoreMsg::Internal(Box::new(internal))).is_err() {
                    break;
                }
            }
        }));
        sync.push = Some(push);

        self.sync = Some(sync);
        self.emit_current_conversation();
    }

    pub(super) fn close_conversation(&mut self) {
        self.teardown_conversation();
        self.emit_current_conversation();
    }

    /// Stop all transport activity for the open conversation. After this no
    /// state mutation for it may occur; the epoch bump fences out async
    /// results that are still in flight.
    pub(super) fn teardown_conversation(&mut self) {
        if let Some(sync) = self.sync.take() {
            tracing::debug!(conversation = %sync.conversation_id, "conversation torn down");
            if let Some(task) = sync.poll_task {
                task.abort();
            }
            if let Some(task) = sync.push_forward_task {
                task.abort();
            }
            // Dropping the handle disconnects the push worker.
            drop(sync.push);
        }
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Ask for an immediate poll of the open conversation (app foregrounded).
    pub(super) fn kick_poll(&mut self) {
        if let Some(sync) = self.sync.as_ref() {
            let tick = InternalEvent::PollTick {
                conversation_id: sync.conversation_id.clone(),
                epoch: sync.epoch,
            };
            let _ = self.core_sender.send(CoreMsg::Internal(Box::new(tick)));
        }
    }

    pub(super) fn on_poll_tick(&mut self, conversation_id: String, epoch: u64) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let transport = sess.transport.clone();
        let self_id = sess.user.id.clone();
        let Some(sync) = sync_for_event(&mut self.sync, &conversation_id, epoch) else {
            return;
        };
        if sync.fetch_in_flight {
            tracing::debug!(conversation = %conversation_id, "poll tick skipped: fetch in flight");
            return;
        }
        sync.fetch_in_flight = true;
        let other_id = sync.counterpart.id.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let internal = match transport.fetch_history(&self_id, &other_id).await {
                Ok(messages) => InternalEvent::HistoryFetched {
                    conversation_id,
                    epoch,
                    messages,
                },
                Err(e) => InternalEvent::HistoryFetchFailed {
                    conversation_id,
                    epoch,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(internal)));
        });
    }

    pub(super) fn on_history_fetched(
        &mut self,
        conversation_id: String,
        epoch: u64,
        messages: Vec<WireMessage>,
    ) {
        let Some(self_id) = self.session.as_ref().map(|s| s.user.id.clone()) else {
            return;
        };
        let Some(sync) = sync_for_event(&mut self.sync, &conversation_id, epoch) else {
            tracing::debug!(conversation = %conversation_id, "history for closed conversation dropped");
            return;
        };
        sync.fetch_in_flight = false;
        let snapshot: Vec<ChatMessage> = messages
            .into_iter()
            .map(|w| wire_to_chat(w, &conversation_id, &self_id))
            .collect();
        sync.store.merge_snapshot(snapshot);
        if !sync.history_loaded {
            sync.history_loaded = true;
            tracing::debug!(
                conversation = %conversation_id,
                messages = sync.store.len(),
                "history loaded"
            );
        }
        let counterpart_id = sync.counterpart.id.clone();
        let newest = newest_counterpart_ts(&sync.store, &counterpart_id);
        self.note_read(&counterpart_id, newest);
        self.emit_current_conversation();
    }

    pub(super) fn on_history_fetch_failed(
        &mut self,
        conversation_id: String,
        epoch: u64,
        error: String,
    ) {
        let Some(sync) = sync_for_event(&mut self.sync, &conversation_id, epoch) else {
            return;
        };
        sync.fetch_in_flight = false;
        let first_load = !sync.history_loaded && !sync.load_error_shown;
        if first_load {
            sync.load_error_shown = true;
            // Nothing to display yet, so this one failure is user-visible.
            self.toast(format!("Couldn't load messages: {error}"));
        } else {
            // Transient: previous messages stay on screen, the next tick
            // retries on its own.
            tracing::warn!(conversation = %conversation_id, %error, "history poll failed");
        }
    }

    pub(super) fn send_message(&mut self, body: String) {
        let body = body.trim().to_string();
        if body.is_empty() {
            return;
        }
        if self.session.is_none() {
            self.toast("Please log in first");
            return;
        }
        let ready = self
            .sync
            .as_ref()
            .map(|s| s.history_loaded)
            .unwrap_or(false);
        if !ready {
            // Sends are only valid once the conversation is Ready.
            tracing::debug!("send ignored: conversation not ready");
            return;
        }
        self.start_send(body);
    }

    pub(super) fn retry_message(&mut self, message_id: String) {
        if self.session.is_none() {
            self.toast("Please log in first");
            return;
        }
        let body = {
            let Some(sync) = self.sync.as_ref() else {
                tracing::debug!("retry ignored: no open conversation");
                return;
            };
            match sync.store.get(&message_id) {
                Some(m)
                    if m.is_mine
                        && matches!(m.delivery, MessageDeliveryState::Failed { .. }) =>
                {
                    Some(m.body.clone())
                }
                _ => None,
            }
        };
        let Some(body) = body else {
            self.toast("Nothing to retry");
            return;
        };
        // The failed entry stays visible; the retry is a fresh message with
        // its own temp id.
        self.start_send(body);
    }

    fn next_outgoing_ts_ms(&mut self) -> i64 {
        // Rapid sends can share a millisecond; keep optimistic timestamps
        // monotonic so their relative order stays deterministic.
        let now = now_millis();
        if now <= self.last_outgoing_ts_ms {
            self.last_outgoing_ts_ms += 1;
        } else {
            self.last_outgoing_ts_ms = now;
        }
        self.last_outgoing_ts_ms
    }

    fn start_send(&mut self, body: String) {
        let ts = self.next_outgoing_ts_ms();
        self.temp_seq = self.temp_seq.wrapping_add(1);
        let temp_id = format!("temp_{}_{}", ts, self.temp_seq);

        let Some((transport, sender_id)) = self
            .session
            .as_ref()
            .map(|s| (s.transport.clone(), s.user.id.clone()))
        else {
            return;
        };
        let Some((conversation_id, epoch, receiver_id)) = self
            .sync
            .as_ref()
            .map(|s| (s.conversation_id.clone(), s.epoch, s.counterpart.id.clone()))
        else {
            return;
        };

        // Optimistic: the message shows as Pending before the wire sees it.
        let message = ChatMessage {
            id: temp_id.clone(),
            conversation_id: conversation_id.clone(),
            sender_id: sender_id.clone(),
            receiver_id: receiver_id.clone(),
            body: body.clone(),
            created_at_ms: Some(ts),
            delivery: MessageDeliveryState::Pending,
            is_mine: true,
        };
        if let Some(sync) = self.sync.as_mut() {
            sync.store.append(message);
        }
        self.emit_current_conversation();

        if !self.network_enabled() {
            // Deterministic offline mode: immediate bare acknowledgment.
            let done = InternalEvent::SendFinished {
                conversation_id,
                epoch,
                temp_id,
                ack: Some(SendAck { message: None }),
                error: None,
            };
            let _ = self.core_sender.send(CoreMsg::Internal(Box::new(done)));
            return;
        }

        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let request = SendMessageRequest {
                sender: sender_id,
                receiver: receiver_id,
                message: body,
            };
            let internal = match transport.post_message(request).await {
                Ok(ack) => InternalEvent::SendFinished {
                    conversation_id,
                    epoch,
                    temp_id,
                    ack: Some(ack),
                    error: None,
                },
                Err(e) => InternalEvent::SendFinished {
                    conversation_id,
                    epoch,
                    temp_id,
                    ack: None,
                    error: Some(e.to_string()),
                },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(internal)));
        });
    }

    pub(super) fn on_send_finished(
        &mut self,
        conversation_id: String,
        epoch: u64,
        temp_id: String,
        ack: Option<SendAck>,
        error: Option<String>,
    ) {
        let Some(self_id) = self.session.as_ref().map(|s| s.user.id.clone()) else {
            return;
        };
        let Some(sync) = sync_for_event(&mut self.sync, &conversation_id, epoch) else {
            tracing::debug!(conversation = %conversation_id, "send result for closed conversation dropped");
            return;
        };
        if let Some(ack) = ack {
            let (pending_body, pending_ts) = match sync.store.get(&temp_id) {
                Some(m) => (m.body.clone(), m.created_at_ms),
                None => (String::new(), None),
            };
            let wire = match ack.message {
                Some(mut wire) => {
                    if wire.created_at_ms.is_none() {
                        wire.created_at_ms = pending_ts;
                    }
                    wire
                }
                // Bare acknowledgment: synthesize an id locally and keep the
                // optimistic timestamp.
                None => WireMessage {
                    id: format!("local_{}", uuid::Uuid::new_v4()),
                    sender: self_id.clone(),
                    receiver: sync.counterpart.id.clone(),
                    body: pending_body,
                    created_at_ms: pending_ts,
                },
            };
            let final_message = wire_to_chat(wire.clone(), &conversation_id, &self_id);
            sync.store.replace(&temp_id, final_message);
            // Fan the confirmed message out over the push channel so the
            // counterpart sees it before their next poll.
            if sync.connection == ConnectionState::Connected {
                if let Some(push) = sync.push.as_ref() {
                    let _ = push.commands.send(PushCommand::EmitRoomMessage {
                        message: wire,
                        room_id: conversation_id.clone(),
                    });
                }
            }
            self.emit_current_conversation();
        } else {
            let reason = error.unwrap_or_else(|| "send failed".to_string());
            sync.store.mark_failed(&temp_id, reason.as_str());
            self.emit_current_conversation();
            self.toast(format!("Message failed to send: {reason}"));
        }
    }

    pub(super) fn on_push_status(
        &mut self,
        conversation_id: String,
        epoch: u64,
        connected: bool,
        exhausted: bool,
    ) {
        let Some(sync) = sync_for_event(&mut self.sync, &conversation_id, epoch) else {
            return;
        };
        sync.connection = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        if exhausted {
            tracing::info!(conversation = %conversation_id, "push channel exhausted retries; polling only");
        }
        self.emit_current_conversation();
    }

    pub(super) fn on_push_message(
        &mut self,
        conversation_id: String,
        epoch: u64,
        message: WireMessage,
    ) {
        let Some(self_id) = self.session.as_ref().map(|s| s.user.id.clone()) else {
            return;
        };
        // Self-echo suppression: the local copy was already appended
        // optimistically when the send started.
        if message.sender == self_id {
            tracing::debug!(conversation = %conversation_id, "self echo dropped");
            return;
        }
        let Some(sync) = sync_for_event(&mut self.sync, &conversation_id, epoch) else {
            tracing::debug!(conversation = %conversation_id, "push message for closed conversation dropped");
            return;
        };
        let chat = wire_to_chat(message, &conversation_id, &self_id);
        let counterpart_id = sync.counterpart.id.clone();
        sync.store.append(chat);
        let newest = newest_counterpart_ts(&sync.store, &counterpart_id);
        self.note_read(&counterpart_id, newest);
        self.emit_current_conversation();
    }

    /// The open conversation counts as read up to the newest counterpart
    /// message on screen; directory refreshes derive unread counts from this.
    pub(super) fn note_read(&mut self, counterpart_id: &str, newest_ts: Option<i64>) {
        if let Some(ts) = newest_ts {
            let entry = self
                .last_read_ms
                .entry(counterpart_id.to_string())
                .or_insert(ts);
            if *entry < ts {
                *entry = ts;
            }
        }
    }
}
