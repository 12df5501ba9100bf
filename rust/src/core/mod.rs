mod config;
mod conversation;
mod directory;
mod session;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::state::{
    AppState, BusyState, ConnectionState, ConversationViewState, Participant,
};
use crate::store::MessageStore;
use crate::transport::{ChatTransport, PushHandle};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use config::{load_app_config, AppConfig};

pub(crate) use config::default_app_config_json;

/// Test seam: when set, sessions use this transport instead of building the
/// REST one from config.
pub(crate) type SharedTransportOverride = Arc<RwLock<Option<Arc<dyn ChatTransport>>>>;

struct Session {
    user: Participant,
    transport: Arc<dyn ChatTransport>,
}

/// Everything tied to the one open conversation. Torn down wholesale on
/// close; the `epoch` fences out async results that land afterwards.
struct ConversationSync {
    conversation_id: String,
    counterpart: Participant,
    epoch: u64,
    store: MessageStore,
    connection: ConnectionState,
    history_loaded: bool,
    load_error_shown: bool,
    fetch_in_flight: bool,
    poll_task: Option<tokio::task::JoinHandle<()>>,
    push_forward_task: Option<tokio::task::JoinHandle<()>>,
    push: Option<PushHandle>,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    data_dir: String,
    config: AppConfig,
    runtime: tokio::runtime::Runtime,
    transport_override: SharedTransportOverride,

    session: Option<Session>,
    sync: Option<ConversationSync>,
    epoch: u64,

    // Actor-internal bookkeeping.
    temp_seq: u64,
    last_outgoing_ts_ms: i64,
    // counterpart id -> newest counterpart message millis seen while the
    // conversation was open; directory refreshes derive unread counts from it.
    last_read_ms: HashMap<String, i64>,
    directory_token: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        transport_override: SharedTransportOverride,
    ) -> Self {
        let config = load_app_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            data_dir,
            config,
            runtime,
            transport_override,
            session: None,
            sync: None,
            epoch: 0,
            temp_seq: 0,
            last_outgoing_ts_ms: 0,
            last_read_ms: HashMap::new(),
            directory_token: 0,
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        this.commit_state();
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn emit(&mut self, update: AppUpdate) {
        self.commit_state();
        let _ = self.update_sender.send(update);
    }

    fn commit_state(&self) {
        let snapshot = self.state.clone();
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot,
            Err(poison) => *poison.into_inner() = snapshot,
        }
    }

    fn emit_auth(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::AuthChanged {
            rev,
            auth: self.state.auth.clone(),
        });
    }

    fn emit_busy(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::BusyChanged {
            rev,
            busy: self.state.busy.clone(),
        });
    }

    fn emit_conversations(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::ConversationListChanged {
            rev,
            conversations: self.state.conversations.clone(),
        });
    }

    fn emit_current_conversation(&mut self) {
        self.state.current_conversation = self.project_current_conversation();
        let rev = self.next_rev();
        self.emit(AppUpdate::CurrentConversationChanged {
            rev,
            current_conversation: self.state.current_conversation.clone(),
        });
    }

    fn emit_toast(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::ToastChanged {
            rev,
            toast: self.state.toast.clone(),
        });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Keep the toast in state until the UI explicitly clears it, so a
        // rev-gap resync through state() still shows it.
        self.state.toast = Some(msg.into());
        self.emit_toast();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_busy();
        }
    }

    fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    fn project_current_conversation(&self) -> Option<ConversationViewState> {
        self.sync.as_ref().map(|sync| ConversationViewState {
            conversation_id: sync.conversation_id.clone(),
            counterpart: sync.counterpart.clone(),
            messages: sync.store.messages().to_vec(),
            connection: sync.connection.clone(),
            history_loaded: sync.history_loaded,
        })
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::RestoreSession => self.restore_session(),
            AppAction::Logout => self.logout(),

            AppAction::RefreshConversations => self.refresh_conversations(),

            AppAction::OpenConversation { counterpart } => self.open_conversation(counterpart),
            AppAction::CloseConversation => self.close_conversation(),
            AppAction::SendMessage { body } => self.send_message(body),
            AppAction::RetryMessage { message_id } => self.retry_message(message_id),

            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_toast();
                }
            }
            AppAction::Foregrounded => {
                // Native sends lifecycle signals as actions; Rust owns all
                // state changes.
                if self.is_logged_in() {
                    self.refresh_conversations();
                    self.kick_poll();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::PollTick {
                conversation_id,
                epoch,
            } => self.on_poll_tick(conversation_id, epoch),
            InternalEvent::HistoryFetched {
                conversation_id,
                epoch,
                messages,
            } => self.on_history_fetched(conversation_id, epoch, messages),
            InternalEvent::HistoryFetchFailed {
                conversation_id,
                epoch,
                error,
            } => self.on_history_fetch_failed(conversation_id, epoch, error),
            InternalEvent::SendFinished {
                conversation_id,
                epoch,
                temp_id,
                ack,
                error,
            } => self.on_send_finished(conversation_id, epoch, temp_id, ack, error),
            InternalEvent::PushStatus {
                conversation_id,
                epoch,
                connected,
                exhausted,
            } => self.on_push_status(conversation_id, epoch, connected, exhausted),
            InternalEvent::PushMessageReceived {
                conversation_id,
                epoch,
                message,
            } => self.on_push_message(conversation_id, epoch, message),
            InternalEvent::DirectoryRefreshed {
                token,
                conversations,
                error,
            } => self.on_directory_refreshed(token, conversations, error),
        }
    }
}
