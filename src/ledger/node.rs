/// Node boundary: the trait the ledger client talks to and its REST implementation
use crate::error::{DidError, DidResult};
use crate::ledger::message::{LedgerMessage, MessageId, MessageStatus, NodeInfo, SubmitRequest};
use crate::network::NetworkProfile;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Operations the client needs from a ledger node
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Network id and proof-of-work parameters
    async fn network_info(&self) -> DidResult<NodeInfo>;

    /// Submit a message and return its id
    async fn submit(&self, request: &SubmitRequest) -> DidResult<MessageId>;

    /// Inclusion state of a message
    async fn message_status(&self, id: &MessageId) -> DidResult<MessageStatus>;

    /// Ids of all messages filed under an index
    async fn query_index(&self, index: &str) -> DidResult<Vec<MessageId>>;

    /// Full message with its confirmation data
    async fn message(&self, id: &MessageId) -> DidResult<LedgerMessage>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoBody {
    network_id: String,
    min_pow_difficulty: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody {
    index: String,
    data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataBody {
    referenced_by_milestone_index: Option<u32>,
    milestone_timestamp: Option<i64>,
    conflict_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexBody {
    message_ids: Vec<MessageId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageBody {
    payload: PayloadBody,
}

#[derive(Debug, Deserialize)]
struct PayloadBody {
    index: String,
    data: String,
}

/// REST client for a node's `/api/v1` endpoints
#[derive(Clone)]
pub struct HttpNode {
    base_url: String,
    http_client: Client,
}

impl HttpNode {
    /// Create a client for the profile's node
    pub fn new(profile: &NetworkProfile, timeout: Duration) -> DidResult<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("tangle-identity/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| DidError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: profile.node_url().as_str().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> DidResult<T> {
        let url = self.endpoint(path);
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| DidError::transport(operation, e))?;

        read_json::<T>(operation, response).await
    }

    async fn metadata(&self, id: &MessageId) -> DidResult<MetadataBody> {
        self.get_json("message_status", &format!("messages/{}/metadata", id), &[])
            .await
    }
}

/// Map the response status and decode the `data` envelope
async fn read_json<T: DeserializeOwned>(operation: &str, response: Response) -> DidResult<T> {
    let status = response.status();
    if status.is_success() {
        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            DidError::rejected(format!("{} returned an unreadable body: {}", operation, e))
        })?;
        return Ok(envelope.data);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    Err(match status {
        StatusCode::NOT_FOUND => DidError::NotFound(format!("{}: {}", operation, body)),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            DidError::transport(operation, format!("node returned {}: {}", status, body))
        }
        s if s.is_server_error() => {
            DidError::transport(operation, format!("node returned {}: {}", status, body))
        }
        _ => DidError::rejected(format!(
            "node returned {} for {}: {}",
            status, operation, body
        )),
    })
}

#[async_trait]
impl NodeApi for HttpNode {
    async fn network_info(&self) -> DidResult<NodeInfo> {
        let info: InfoBody = self.get_json("network_info", "info", &[]).await?;
        Ok(NodeInfo {
            network_id: info.network_id,
            min_pow_difficulty: info.min_pow_difficulty,
        })
    }

    async fn submit(&self, request: &SubmitRequest) -> DidResult<MessageId> {
        let url = self.endpoint("messages");
        let body = SubmitBody {
            index: hex::encode(request.index.as_bytes()),
            data: hex::encode(&request.data),
            nonce: request.nonce.map(|n| n.to_string()),
        };

        debug!("POST {} ({} bytes)", url, request.data.len());

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DidError::transport("submit", e))?;

        let submitted: SubmitResponse = read_json("submit", response).await?;
        Ok(submitted.message_id)
    }

    async fn message_status(&self, id: &MessageId) -> DidResult<MessageStatus> {
        let metadata = self.metadata(id).await?;
        Ok(MessageStatus {
            included: metadata.referenced_by_milestone_index.is_some()
                && metadata.conflict_reason.is_none(),
            milestone_index: metadata.referenced_by_milestone_index,
            conflict: metadata.conflict_reason,
        })
    }

    async fn query_index(&self, index: &str) -> DidResult<Vec<MessageId>> {
        let body: IndexBody = self
            .get_json(
                "query_index",
                "messages",
                &[("index", hex::encode(index.as_bytes()))],
            )
            .await?;
        Ok(body.message_ids)
    }

    async fn message(&self, id: &MessageId) -> DidResult<LedgerMessage> {
        let path = format!("messages/{}", id);
        let (message, metadata) = futures::try_join!(
            self.get_json::<MessageBody>("message", &path, &[]),
            self.metadata(id)
        )?;

        let index = hex::decode(&message.payload.index)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| DidError::rejected(format!("message {} has a malformed index", id)))?;
        let data = hex::decode(&message.payload.data)
            .map_err(|e| DidError::rejected(format!("message {} has malformed data: {}", id, e)))?;

        Ok(LedgerMessage {
            id: *id,
            index,
            data,
            milestone_index: metadata
                .referenced_by_milestone_index
                .filter(|_| metadata.conflict_reason.is_none()),
            timestamp: metadata.milestone_timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn node_for(server: &mockito::ServerGuard) -> HttpNode {
        let profile = NetworkProfile::builder()
            .name("tangle")
            .node_url(server.url())
            .build()
            .unwrap();
        HttpNode::new(&profile, Duration::from_secs(5)).unwrap()
    }

    fn id(byte: u8) -> MessageId {
        MessageId::new([byte; 32])
    }

    #[tokio::test]
    async fn test_network_info() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/info")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"networkId":"private-tangle","minPowDifficulty":4}}"#)
            .create_async()
            .await;

        let info = node_for(&server).network_info().await.unwrap();
        assert_eq!(info.network_id, "private-tangle");
        assert_eq!(info.min_pow_difficulty, 4);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_sends_hex_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/messages")
            .match_body(Matcher::Json(serde_json::json!({
                "index": hex::encode("tag"),
                "data": hex::encode(b"doc"),
                "nonce": "7",
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"data":{{"messageId":"{}"}}}}"#, id(1)))
            .create_async()
            .await;

        let request = SubmitRequest {
            index: "tag".to_string(),
            data: b"doc".to_vec(),
            nonce: Some(7),
        };
        let message_id = node_for(&server).submit(&request).await.unwrap();
        assert_eq!(message_id, id(1));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_bad_request_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/messages")
            .with_status(400)
            .with_body("invalid payload")
            .create_async()
            .await;

        let request = SubmitRequest {
            index: "tag".to_string(),
            data: vec![],
            nonce: None,
        };
        let result = node_for(&server).submit(&request).await;
        assert!(matches!(result, Err(DidError::RejectedMessage { .. })));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/info")
            .with_status(503)
            .create_async()
            .await;

        let err = node_for(&server).network_info().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_message_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", format!("/api/v1/messages/{}/metadata", id(2)).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"referencedByMilestoneIndex":12,"milestoneTimestamp":1000}}"#)
            .create_async()
            .await;

        let status = node_for(&server).message_status(&id(2)).await.unwrap();
        assert!(status.included);
        assert_eq!(status.milestone_index, Some(12));
    }

    #[tokio::test]
    async fn test_query_index_and_fetch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/messages")
            .match_query(Matcher::UrlEncoded("index".into(), hex::encode("tag")))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"data":{{"messageIds":["{}"]}}}}"#, id(3)))
            .create_async()
            .await;
        server
            .mock("GET", format!("/api/v1/messages/{}", id(3)).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"data":{{"payload":{{"index":"{}","data":"{}"}}}}}}"#,
                hex::encode("tag"),
                hex::encode(b"doc")
            ))
            .create_async()
            .await;
        server
            .mock("GET", format!("/api/v1/messages/{}/metadata", id(3)).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"referencedByMilestoneIndex":5,"milestoneTimestamp":77}}"#)
            .create_async()
            .await;

        let node = node_for(&server);
        let ids = node.query_index("tag").await.unwrap();
        assert_eq!(ids, vec![id(3)]);

        let message = node.message(&id(3)).await.unwrap();
        assert_eq!(message.index, "tag");
        assert_eq!(message.data, b"doc");
        assert_eq!(message.milestone_index, Some(5));
        assert_eq!(message.timestamp, Some(77));
    }

    #[tokio::test]
    async fn test_missing_message_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let result = node_for(&server).message(&id(4)).await;
        assert!(matches!(result, Err(DidError::NotFound(_))));
    }
}
