#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use farmlink_core::{
    AppReconciler, AppUpdate, ChatTransport, DirectoryEntry, PushAuth, PushCommand, PushEvent,
    PushHandle, Role, SendAck, SendMessageRequest, TransportError, WireMessage,
};

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn write_config(data_dir: &Path, poll_interval_ms: u64) {
    let v = serde_json::json!({
        "poll_interval_ms": poll_interval_ms,
        // Dead addresses: every test goes through the injected transport.
        "api_base_url": "http://127.0.0.1:1/api",
        "socket_url": "ws://127.0.0.1:1/chat",
    });
    std::fs::write(
        data_dir.join("farmlink_config.json"),
        serde_json::to_vec(&v).unwrap(),
    )
    .unwrap();
}

pub fn write_session(data_dir: &Path, user_id: &str, role: &str, name: &str) {
    let profile = serde_json::json!({ "role": role, "name": name }).to_string();
    let v = serde_json::json!({
        "auth_token": "test-token",
        "user_id": user_id,
        "user_profile": profile,
    });
    std::fs::write(
        data_dir.join("session.json"),
        serde_json::to_vec(&v).unwrap(),
    )
    .unwrap();
}

pub struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    pub fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

pub fn wire(id: &str, sender: &str, receiver: &str, body: &str, ts: Option<i64>) -> WireMessage {
    WireMessage {
        id: id.to_string(),
        sender: sender.to_string(),
        receiver: receiver.to_string(),
        body: body.to_string(),
        created_at_ms: ts,
    }
}

pub fn directory_entry(id: &str, name: &str, online: bool) -> DirectoryEntry {
    DirectoryEntry {
        id: id.to_string(),
        name: name.to_string(),
        avatar_url: None,
        is_online: Some(online),
        expertise: None,
    }
}

pub enum PostScript {
    Fail(String),
    BareAck,
    /// Echo like the default, but only after the given delay — for racing a
    /// later send's acknowledgment past an earlier one.
    SlowEcho(u64),
}

/// The created row as the backend echoes it. No `createdAt`: the deployed
/// service omits it on the create path, and the client keeps the optimistic
/// timestamp.
fn echo_row(seq: u32, request: SendMessageRequest) -> WireMessage {
    WireMessage {
        id: format!("srv_{seq}"),
        sender: request.sender,
        receiver: request.receiver,
        body: request.message,
        created_at_ms: None,
    }
}

/// The mock side of an opened push channel: tests feed events in and observe
/// outgoing room messages.
#[derive(Clone)]
pub struct PushRig {
    pub auth: PushAuth,
    pub room_id: String,
    pub events: flume::Sender<PushEvent>,
    pub commands: flume::Receiver<PushCommand>,
}

#[derive(Default)]
struct MockState {
    directory: Option<Result<Vec<DirectoryEntry>, String>>,
    histories: HashMap<String, Result<Vec<WireMessage>, String>>,
    history_calls: HashMap<String, u32>,
    post_scripts: Vec<PostScript>,
    posts: Vec<SendMessageRequest>,
    post_seq: u32,
    push_rig: Option<PushRig>,
}

/// Scripted transport injected through the same slot production wiring uses,
/// so test flows exercise the real actor end to end.
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState::default()),
        })
    }

    pub fn set_directory(&self, entries: Vec<DirectoryEntry>) {
        self.state.lock().unwrap().directory = Some(Ok(entries));
    }

    pub fn set_directory_error(&self, error: &str) {
        self.state.lock().unwrap().directory = Some(Err(error.to_string()));
    }

    pub fn set_history(&self, other_id: &str, messages: Vec<WireMessage>) {
        self.state
            .lock()
            .unwrap()
            .histories
            .insert(other_id.to_string(), Ok(messages));
    }

    pub fn set_history_error(&self, other_id: &str, error: &str) {
        self.state
            .lock()
            .unwrap()
            .histories
            .insert(other_id.to_string(), Err(error.to_string()));
    }

    /// Queue a scripted outcome for the next post; unscripted posts echo the
    /// created row back with a fresh server id.
    pub fn script_post(&self, script: PostScript) {
        self.state.lock().unwrap().post_scripts.push(script);
    }

    pub fn posts(&self) -> Vec<SendMessageRequest> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn history_calls(&self, other_id: &str) -> u32 {
        *self
            .state
            .lock()
            .unwrap()
            .history_calls
            .get(other_id)
            .unwrap_or(&0)
    }

    pub fn push_rig(&self) -> Option<PushRig> {
        self.state.lock().unwrap().push_rig.clone()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn fetch_history(
        &self,
        _self_id: &str,
        other_id: &str,
    ) -> Result<Vec<WireMessage>, TransportError> {
        let mut st = self.state.lock().unwrap();
        *st.history_calls.entry(other_id.to_string()).or_insert(0) += 1;
        match st.histories.get(other_id) {
            Some(Ok(messages)) => Ok(messages.clone()),
            Some(Err(e)) => Err(TransportError::Network(e.clone())),
            None => Ok(vec![]),
        }
    }

    async fn post_message(&self, request: SendMessageRequest) -> Result<SendAck, TransportError> {
        let script = {
            let mut st = self.state.lock().unwrap();
            st.posts.push(request.clone());
            if st.post_scripts.is_empty() {
                None
            } else {
                Some(st.post_scripts.remove(0))
            }
        };
        match script {
            Some(PostScript::Fail(reason)) => Err(TransportError::Network(reason)),
            Some(PostScript::BareAck) => Ok(SendAck { message: None }),
            Some(PostScript::SlowEcho(delay_ms)) => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let mut st = self.state.lock().unwrap();
                st.post_seq += 1;
                Ok(SendAck {
                    message: Some(echo_row(st.post_seq, request)),
                })
            }
            None => {
                let mut st = self.state.lock().unwrap();
                st.post_seq += 1;
                Ok(SendAck {
                    message: Some(echo_row(st.post_seq, request)),
                })
            }
        }
    }

    async fn fetch_directory(&self, _role: Role) -> Result<Vec<DirectoryEntry>, TransportError> {
        match &self.state.lock().unwrap().directory {
            Some(Ok(entries)) => Ok(entries.clone()),
            Some(Err(e)) => Err(TransportError::Network(e.clone())),
            None => Ok(vec![]),
        }
    }

    fn open_push(
        &self,
        _runtime: &tokio::runtime::Handle,
        auth: PushAuth,
        room_id: &str,
    ) -> PushHandle {
        let (event_tx, event_rx) = flume::unbounded();
        let (command_tx, command_rx) = flume::unbounded();
        let rig = PushRig {
            auth,
            room_id: room_id.to_string(),
            events: event_tx,
            commands: command_rx,
        };
        self.state.lock().unwrap().push_rig = Some(rig);
        PushHandle {
            events: event_rx,
            commands: command_tx,
        }
    }
}
