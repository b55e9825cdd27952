//! Remote row-store backend (Supabase-style REST).
//!
//! Each save is one network round trip: an upsert of the changed row keyed
//! by user id, with `Prefer: resolution=merge-duplicates` so a duplicate key
//! merges instead of erroring. Load pulls the whole table once at startup.
//! All calls are bounded by the agent timeout; a failed save is the caller's
//! to log, never to surface.

use std::io::Read;
use std::time::Duration;

use super::{Backend, PersistError};
use crate::config::RemoteConfig;
use crate::core::UserRecord;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RemoteStore {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl RemoteStore {
    pub fn new(cfg: &RemoteConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        }
    }

    fn rows_url(&self) -> String {
        format!("{}/rest/v1/users", self.base_url)
    }

    fn authed(&self, req: ureq::Request) -> ureq::Request {
        req.set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
    }

    fn read_body(resp: ureq::Response) -> Result<String, PersistError> {
        let mut body = String::new();
        resp.into_reader()
            .read_to_string(&mut body)
            .map_err(|e| PersistError::Http(format!("failed to read response: {e}")))?;
        Ok(body)
    }
}

impl Backend for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn load(&self) -> Result<Vec<UserRecord>, PersistError> {
        let url = format!("{}?select=*", self.rows_url());
        let resp = match self.authed(self.agent.get(&url)).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, resp)) => {
                return Err(PersistError::Status {
                    status,
                    body: Self::read_body(resp).unwrap_or_default(),
                });
            }
            Err(e) => return Err(PersistError::Http(e.to_string())),
        };
        let body = Self::read_body(resp)?;
        serde_json::from_str(&body)
            .map_err(|e| PersistError::Http(format!("failed to parse rows: {e}")))
    }

    fn save(&self, changed: &UserRecord, _all: &[UserRecord]) -> Result<(), PersistError> {
        let body = serde_json::to_string(changed).map_err(PersistError::Encode)?;
        let result = self
            .authed(self.agent.post(&self.rows_url()))
            .set("Content-Type", "application/json")
            .set("Prefer", "resolution=merge-duplicates")
            .send_string(&body);
        match result {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, resp)) => Err(PersistError::Status {
                status,
                body: Self::read_body(resp).unwrap_or_default(),
            }),
            Err(e) => Err(PersistError::Http(e.to_string())),
        }
    }
}
