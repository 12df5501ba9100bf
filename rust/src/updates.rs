use crate::state::{
    AppState, AuthState, BusyState, ConversationSummary, ConversationViewState,
};
use crate::transport::{SendAck, WireMessage};

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    AuthChanged {
        rev: u64,
        auth: AuthState,
    },
    BusyChanged {
        rev: u64,
        busy: BusyState,
    },
    ConversationListChanged {
        rev: u64,
        conversations: Vec<ConversationSummary>,
    },
    CurrentConversationChanged {
        rev: u64,
        current_conversation: Option<ConversationViewState>,
    },
    ToastChanged {
        rev: u64,
        toast: Option<String>,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::AuthChanged { rev, .. } => *rev,
            AppUpdate::BusyChanged { rev, .. } => *rev,
            AppUpdate::ConversationListChanged { rev, .. } => *rev,
            AppUpdate::CurrentConversationChanged { rev, .. } => *rev,
            AppUpdate::ToastChanged { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(crate::AppAction),
    Internal(Box<InternalEvent>),
}

/// Results posted back to the actor by its async tasks. Conversation-scoped
/// events carry the sync epoch they were started under; the actor drops any
/// that arrive after that conversation was torn down.
#[derive(Debug)]
pub enum InternalEvent {
    PollTick {
        conversation_id: String,
        epoch: u64,
    },
    HistoryFetched {
        conversation_id: String,
        epoch: u64,
        messages: Vec<WireMessage>,
    },
    HistoryFetchFailed {
        conversation_id: String,
        epoch: u64,
        error: String,
    },
    SendFinished {
        conversation_id: String,
        epoch: u64,
        temp_id: String,
        ack: Option<SendAck>,
        error: Option<String>,
    },
    PushStatus {
        conversation_id: String,
        epoch: u64,
        connected: bool,
        exhausted: bool,
    },
    PushMessageReceived {
        conversation_id: String,
        epoch: u64,
        message: WireMessage,
    },
    DirectoryRefreshed {
        token: u64,
        conversations: Option<Vec<ConversationSummary>>,
        error: Option<String>,
    },
}
