use crate::state::Participant;

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Session
    RestoreSession,
    Logout,

    // Conversation list
    RefreshConversations,

    // Conversation
    OpenConversation { counterpart: Participant },
    CloseConversation,
    SendMessage { body: String },
    RetryMessage { message_id: String },

    // UI
    ClearToast,

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes message bodies).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::RestoreSession => "RestoreSession",
            AppAction::Logout => "Logout",

            // Conversation list
            AppAction::RefreshConversations => "RefreshConversations",

            // Conversation
            AppAction::OpenConversation { .. } => "OpenConversation",
            AppAction::CloseConversation => "CloseConversation",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",

            // UI
            AppAction::ClearToast => "ClearToast",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}
