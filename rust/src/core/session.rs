// Session identity handling. The native shell owns the key-value store that
// holds the auth token, the user id and the stringified profile document;
// this module only reads it — logout never touches the file.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use serde::Deserialize;

use super::{AppCore, Session};
use crate::state::{AuthState, BusyState, Participant, Role};
use crate::transport::http::RestTransport;
use crate::transport::ChatTransport;

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SessionFile {
    auth_token: Option<String>,
    user_id: Option<String>,
    /// The shell stores the profile as a JSON-serialized string, not a
    /// nested object; it is parsed in a second step.
    user_profile: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileDoc {
    role: Option<String>,
    name: Option<String>,
    avatar: Option<String>,
}

pub(super) struct SessionIdentity {
    pub(super) token: String,
    pub(super) user: Participant,
}

/// Resolve the stored identity. `Ok(None)` means no (or an incomplete)
/// identity is stored — a normal state, not an error. `Err` means the store
/// exists but cannot be read.
pub(super) fn load_session(data_dir: &str) -> anyhow::Result<Option<SessionIdentity>> {
    let path = Path::new(data_dir).join(SESSION_FILE);
    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context("reading session store"),
    };
    let file: SessionFile =
        serde_json::from_slice(&bytes).context("parsing session store")?;

    let Some(token) = file.auth_token.filter(|t| !t.trim().is_empty()) else {
        return Ok(None);
    };
    let Some(user_id) = file.user_id.filter(|id| !id.trim().is_empty()) else {
        return Ok(None);
    };
    let Some(raw_profile) = file.user_profile else {
        return Ok(None);
    };
    let profile: ProfileDoc =
        serde_json::from_str(&raw_profile).context("parsing profile document")?;
    let Some(role_name) = profile.role else {
        return Ok(None);
    };
    let Some(role) = Role::from_wire(&role_name) else {
        anyhow::bail!("unknown role {role_name:?} in profile");
    };

    Ok(Some(SessionIdentity {
        token,
        user: Participant {
            id: user_id,
            role,
            name: profile.name.unwrap_or_default(),
            avatar_url: profile.avatar,
        },
    }))
}

impl AppCore {
    pub(super) fn restore_session(&mut self) {
        self.set_busy(|b| b.restoring_session = true);

        let identity = match load_session(&self.data_dir) {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                // No stored identity: stay logged out quietly. The shell
                // shows the login screen; nothing here may throw or toast.
                tracing::debug!("no stored session identity");
                self.set_busy(|b| b.restoring_session = false);
                return;
            }
            Err(e) => {
                // Corrupt session storage reads as logged out; the login
                // flow owns rewriting it.
                tracing::warn!("session restore failed: {e:#}");
                self.set_busy(|b| b.restoring_session = false);
                return;
            }
        };

        // Re-login replaces any live conversation wholesale.
        self.close_conversation();

        let override_transport = match self.transport_override.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        };
        let transport: Arc<dyn ChatTransport> = match override_transport {
            Some(t) => t,
            None => Arc::new(RestTransport::new(
                self.api_base_url(),
                self.socket_url(),
                identity.token.clone(),
            )),
        };

        tracing::info!(
            user = %identity.user.id,
            role = identity.user.role.wire_name(),
            "session restored"
        );
        self.session = Some(Session {
            user: identity.user.clone(),
            transport,
        });
        self.state.auth = AuthState::LoggedIn {
            user: identity.user,
        };
        self.set_busy(|b| b.restoring_session = false);
        self.emit_auth();
        self.refresh_conversations();
    }

    pub(super) fn logout(&mut self) {
        self.teardown_conversation();
        self.session = None;
        self.last_read_ms.clear();
        self.directory_token = self.directory_token.wrapping_add(1);
        self.state.auth = AuthState::LoggedOut;
        self.state.conversations = vec![];
        self.state.busy = BusyState::idle();
        self.emit_auth();
        self.emit_busy();
        self.emit_conversations();
        self.emit_current_conversation();
    }
}
