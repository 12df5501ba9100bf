#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub auth: AuthState,
    pub busy: BusyState,
    pub conversations: Vec<ConversationSummary>,
    pub current_conversation: Option<ConversationViewState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            auth: AuthState::LoggedOut,
            busy: BusyState::idle(),
            conversations: vec![],
            current_conversation: None,
            toast: None,
        }
    }
}

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AuthState {
    LoggedOut,
    LoggedIn { user: Participant },
}

/// "In flight" flags for long-ish operations the UI should reflect. Ephemeral
/// native UI state (scroll position, focus) stays native; async operation
/// state lives in Rust so the shell never has to guess.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub restoring_session: bool,
    pub refreshing_conversations: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            restoring_session: false,
            refreshing_conversations: false,
        }
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Farmer,
    Buyer,
    PlantPathologist,
}

impl Role {
    /// Canonical wire name used in API paths and push-channel auth.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Role::Farmer => "farmer",
            Role::Buyer => "buyer",
            Role::PlantPathologist => "plant_pathologist",
        }
    }

    /// Parse a stored or server-provided role name. The deployed backend has
    /// emitted both `plant_pathologist` and the older `plant pathologist`
    /// spelling; both must keep resolving.
    pub fn from_wire(input: &str) -> Option<Role> {
        match input.trim().to_ascii_lowercase().as_str() {
            "farmer" => Some(Role::Farmer),
            "buyer" => Some(Role::Buyer),
            "plant_pathologist" | "plant pathologist" => Some(Role::PlantPathologist),
            _ => None,
        }
    }

    /// Which role a user of this role talks to on the conversation list
    /// screen. Farmers consult pathologists; pathologists answer farmers;
    /// buyers reach out to farmers.
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Farmer => Role::PlantPathologist,
            Role::PlantPathologist => Role::Farmer,
            Role::Buyer => Role::Farmer,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    /// Epoch millis; absent when the server row carried no usable timestamp.
    pub created_at_ms: Option<i64>,
    pub delivery: MessageDeliveryState,
    pub is_mine: bool,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum MessageDeliveryState {
    Pending,
    Sent,
    Failed { reason: String },
}

/// Push-channel status for the open conversation. Polling runs in every
/// state; this only reflects the realtime socket.
#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ConversationSummary {
    pub counterpart: Participant,
    pub last_message: String,
    pub last_message_at_ms: Option<i64>,
    pub unread_count: u32,
    pub online: bool,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ConversationViewState {
    pub conversation_id: String,
    pub counterpart: Participant,
    pub messages: Vec<ChatMessage>,
    pub connection: ConnectionState,
    /// False until the first successful history fetch; the shell renders a
    /// loading indicator while false.
    pub history_loaded: bool,
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
