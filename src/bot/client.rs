//! Thin Telegram Bot API client over `ureq`.

use std::io::Read;
use std::time::Duration;

use serde::Deserialize;

use super::{BotError, Update};

/// Long-poll wait requested from getUpdates. The agent timeout sits above
/// it so a full-length poll is not cut off mid-wait.
const POLL_WAIT: Duration = Duration::from_secs(30);

// Missing `result`/`description` deserialize as None; no `default` attr,
// which would force a `Default` bound onto the payload type.
#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

pub struct BotClient {
    agent: ureq::Agent,
    base_url: String,
}

impl BotClient {
    pub fn new(token: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(POLL_WAIT + Duration::from_secs(10))
            .build();
        Self {
            agent,
            base_url: format!("https://api.telegram.org/bot{token}"),
        }
    }

    fn call<T: for<'de> Deserialize<'de>>(
        &self,
        request: ureq::Request,
        body: Option<&serde_json::Value>,
    ) -> Result<T, BotError> {
        let result = match body {
            Some(body) => request
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
            None => request.call(),
        };
        let resp = match result {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, resp)) => {
                let body = read_body(resp).unwrap_or_default();
                return Err(BotError::Api(format!("status {status}: {body}")));
            }
            Err(e) => return Err(BotError::Http(e.to_string())),
        };
        let body = read_body(resp)?;
        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(BotError::Decode)?;
        if !parsed.ok {
            return Err(BotError::Api(
                parsed.description.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        parsed
            .result
            .ok_or_else(|| BotError::Api("ok response without result".to_string()))
    }

    pub fn get_updates(&self, offset: i64) -> Result<Vec<Update>, BotError> {
        let url = format!(
            "{}/getUpdates?timeout={}&offset={offset}",
            self.base_url,
            POLL_WAIT.as_secs()
        );
        self.call(self.agent.get(&url), None)
    }

    pub fn send_message(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let url = format!("{}/sendMessage", self.base_url);
        let _: serde_json::Value = self.call(self.agent.post(&url), Some(&body))?;
        Ok(())
    }

    /// Point Telegram at our webhook route. Used by the webhook transport.
    pub fn set_webhook(&self, webhook_url: &str) -> Result<(), BotError> {
        let body = serde_json::json!({ "url": webhook_url });
        let url = format!("{}/setWebhook", self.base_url);
        let _: serde_json::Value = self.call(self.agent.post(&url), Some(&body))?;
        Ok(())
    }

    /// Drop any existing webhook. Required before long polling can work.
    pub fn delete_webhook(&self) -> Result<(), BotError> {
        let url = format!("{}/deleteWebhook", self.base_url);
        let _: serde_json::Value = self.call(self.agent.get(&url), None)?;
        Ok(())
    }
}

fn read_body(resp: ureq::Response) -> Result<String, BotError> {
    let mut body = String::new();
    resp.into_reader()
        .read_to_string(&mut body)
        .map_err(|e| BotError::Http(format!("failed to read response: {e}")))?;
    Ok(body)
}
