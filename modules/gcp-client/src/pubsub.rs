use base64::Engine;
use serde::Deserialize;

use crate::error::{GcpError, Result};
use crate::session::{check_status, GcpSession};

const BASE_URL: &str = "https://pubsub.googleapis.com/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

pub struct PubSubClient {
    session: GcpSession,
}

impl PubSubClient {
    pub fn new(session: GcpSession) -> Self {
        Self { session }
    }

    /// Publish one message and return its server-assigned id.
    pub async fn publish(&self, project_id: &str, topic_id: &str, data: &[u8]) -> Result<String> {
        let token = self.session.bearer().await?;
        let body = publish_body(data);

        let resp = self
            .session
            .http()
            .post(format!("{BASE_URL}/projects/{project_id}/topics/{topic_id}:publish"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let resp = check_status(resp, &format!("topic {topic_id}")).await?;
        let parsed: PublishResponse = resp.json().await?;
        parsed
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| GcpError::Parse("publish response had no message id".to_string()))
    }
}

fn publish_body(data: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "messages": [{ "data": base64::engine::general_purpose::STANDARD.encode(data) }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_body_base64_encodes_payload() {
        let body = publish_body(b"ebay_thirdPartyIncluded_mobile");
        assert_eq!(
            body["messages"][0]["data"],
            "ZWJheV90aGlyZFBhcnR5SW5jbHVkZWRfbW9iaWxl"
        );
    }
}
