use async_trait::async_trait;

use crate::state::Role;

use super::{
    socket, ChatTransport, DirectoryEntry, DirectoryEntryDto, MessageDto, PushAuth, PushHandle,
    SendAck, SendMessageRequest, TransportError, WireMessage,
};

/// Production transport: REST over `reqwest` for the pull side, a JSON
/// websocket (see [`socket`]) for the push side.
pub struct RestTransport {
    http: reqwest::Client,
    api_base_url: String,
    socket_url: String,
    token: String,
}

impl RestTransport {
    pub fn new(
        api_base_url: impl Into<String>,
        socket_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            api_base_url,
            socket_url: socket_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }
}

fn network(err: reqwest::Error) -> TransportError {
    TransportError::Network(err.to_string())
}

fn decode(err: reqwest::Error) -> TransportError {
    TransportError::Decode(err.to_string())
}

fn check_status(resp: &reqwest::Response) -> Result<(), TransportError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::Status {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl ChatTransport for RestTransport {
    async fn fetch_history(
        &self,
        self_id: &str,
        other_id: &str,
    ) -> Result<Vec<WireMessage>, TransportError> {
        let resp = self
            .http
            .get(self.url("/chats"))
            .query(&[("user1", self_id), ("user2", other_id)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(network)?;
        check_status(&resp)?;
        let rows: Vec<MessageDto> = resp.json().await.map_err(decode)?;
        Ok(rows.into_iter().filter_map(MessageDto::into_wire).collect())
    }

    async fn post_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<SendAck, TransportError> {
        let resp = self
            .http
            .post(self.url("/chats"))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "sender": request.sender,
                "receiver": request.receiver,
                "message": request.message,
            }))
            .send()
            .await
            .map_err(network)?;
        check_status(&resp)?;
        // The backend either echoes the created row or answers with a bare
        // acknowledgment; only a row carrying `_id` counts as the former.
        let body: serde_json::Value = resp.json().await.map_err(decode)?;
        let message = serde_json::from_value::<MessageDto>(body)
            .ok()
            .and_then(MessageDto::into_wire);
        Ok(SendAck { message })
    }

    async fn fetch_directory(&self, role: Role) -> Result<Vec<DirectoryEntry>, TransportError> {
        let resp = self
            .http
            .get(self.url(&format!("/users/role/{}", role.wire_name())))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(network)?;
        check_status(&resp)?;
        let rows: Vec<DirectoryEntryDto> = resp.json().await.map_err(decode)?;
        Ok(rows.into_iter().map(DirectoryEntryDto::into_entry).collect())
    }

    fn open_push(
        &self,
        runtime: &tokio::runtime::Handle,
        auth: PushAuth,
        room_id: &str,
    ) -> PushHandle {
        socket::open_push_channel(runtime, self.socket_url.clone(), auth, room_id.to_string())
    }
}
