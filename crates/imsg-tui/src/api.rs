use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use imsg_types::api::{
    ChatResponse, ErrorResponse, HealthResponse, HistoryResponse, PollResponse, SearchResponse,
    SendRequest, SendResponse,
};
use imsg_types::models::ErrorType;

/// Sends can wait on the server's own 30 s AppleScript timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(40);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot reach server: {0}")]
    Connection(String),
    #[error("{message}")]
    Api {
        status: u16,
        kind: Option<ErrorType>,
        message: String,
    },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ClientError {
    pub fn kind(&self) -> Option<ErrorType> {
        match self {
            ClientError::Api { kind, .. } => *kind,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Connection(e.to_string())
    }
}

/// Which side of a history page to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryCursor {
    Latest,
    Before(i64),
}

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Live channel URL; `None` subscribes to every chat.
    pub fn ws_url(&self, chat_id: Option<i64>) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        match chat_id {
            Some(id) => format!("{}/ws?chat_id={}", base, id),
            None => format!("{}/ws", base),
        }
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.get("/health", &[]).await
    }

    pub async fn chats(&self, limit: u32) -> Result<Vec<ChatResponse>, ClientError> {
        self.get("/chats", &[("limit", limit.to_string())]).await
    }

    pub async fn history(
        &self,
        chat_id: i64,
        cursor: HistoryCursor,
        limit: u32,
    ) -> Result<HistoryResponse, ClientError> {
        let mut query = vec![
            ("chat_id", chat_id.to_string()),
            ("limit", limit.to_string()),
        ];
        match cursor {
            HistoryCursor::Latest => {}
            HistoryCursor::Before(id) => query.push(("before_rowid", id.to_string())),
        }
        self.get("/messages", &query).await
    }

    pub async fn poll(
        &self,
        after_rowid: i64,
        chat_id: Option<i64>,
        limit: u32,
    ) -> Result<PollResponse, ClientError> {
        let mut query = vec![
            ("after_rowid", after_rowid.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(id) = chat_id {
            query.push(("chat_id", id.to_string()));
        }
        self.get("/poll", &query).await
    }

    pub async fn search(
        &self,
        q: &str,
        chat_id: Option<i64>,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResponse, ClientError> {
        let mut query = vec![
            ("q", q.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(id) = chat_id {
            query.push(("chat_id", id.to_string()));
        }
        self.get("/search", &query).await
    }

    pub async fn send(&self, recipient: &str, message: &str) -> Result<(), ClientError> {
        let body = SendRequest {
            recipient: recipient.to_string(),
            message: message.to_string(),
        };
        let resp = self
            .http
            .post(format!("{}/send", self.base_url))
            .json(&body)
            .send()
            .await?;
        let sent: SendResponse = decode(resp).await?;
        if sent.success {
            Ok(())
        } else {
            Err(ClientError::Api {
                status: 200,
                kind: Some(ErrorType::Unknown),
                message: "Server reported the send as unsuccessful".into(),
            })
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;

    if !status.is_success() {
        return Err(match serde_json::from_slice::<ErrorResponse>(&bytes) {
            Ok(body) => ClientError::Api {
                status: status.as_u16(),
                kind: Some(body.error_type),
                message: body.error,
            },
            Err(_) => ClientError::Api {
                status: status.as_u16(),
                kind: None,
                message: String::from_utf8_lossy(&bytes).trim().to_string(),
            },
        });
    }

    serde_json::from_slice(&bytes).map_err(|e| ClientError::MalformedResponse(e.to_string()))
}
