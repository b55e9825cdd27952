//! Telegram bot front end.
//!
//! Renders the three ledger operations as chat commands. Two transports:
//! a long-polling loop on a dedicated thread, or a webhook route on the
//! HTTP server (`POST /bot`). Both feed updates through [`dispatch`], which
//! is pure over the ledger and easy to test.

mod client;

pub use client::BotClient;

use thiserror::Error;

use serde::Deserialize;

use crate::core::UserId;
use crate::error::Transience;
use crate::ledger::Ledger;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("telegram request failed: {0}")]
    Http(String),

    #[error("telegram api error: {0}")]
    Api(String),

    #[error("failed to decode telegram response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl BotError {
    pub fn transience(&self) -> Transience {
        match self {
            BotError::Http(_) => Transience::Retryable,
            BotError::Api(_) => Transience::Unknown,
            BotError::Decode(_) => Transience::Permanent,
        }
    }
}

/// Incoming update, reduced to the fields the command handler needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// Outgoing reply to one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
}

const START_TEXT: &str = "Welcome to Dots Rewards! 🎉\n\n\
    Earn dots daily and exchange them for tokens later.\n\n\
    Commands:\n\
    /checkin - Get 10 dots daily\n\
    /share - Get 20 dots for sharing\n\
    /balance - Check your dots balance";

const UNKNOWN_TEXT: &str =
    "I don't understand that command. Try /start, /checkin, /share, or /balance.";

/// Turn one update into a reply, applying ledger operations as needed.
///
/// Updates without a message, sender, or text are ignored (edited messages,
/// joins, stickers).
pub fn dispatch(ledger: &Ledger, update: &Update) -> Option<Reply> {
    let message = update.message.as_ref()?;
    let from = message.from.as_ref()?;
    let text = message.text.as_deref()?;

    let user = UserId(from.id);
    let username = from.username.as_deref().unwrap_or("");

    // Commands in groups arrive as "/checkin@BotName".
    let command = text.split('@').next().unwrap_or(text).trim();

    let text = match command {
        "/start" => START_TEXT.to_string(),
        "/checkin" => {
            let outcome = ledger.claim_daily(user, username);
            if outcome.claimed {
                format!(
                    "✅ Daily check-in successful! You received 10 dots.\nYour balance: {} dots",
                    outcome.dots
                )
            } else {
                "❌ You've already claimed your daily reward. Come back after 01:00 GMT+1!"
                    .to_string()
            }
        }
        "/share" => {
            let outcome = ledger.claim_share(user, username);
            if outcome.claimed {
                format!(
                    "✅ Thanks for sharing! You received 20 dots.\nYour balance: {} dots",
                    outcome.dots
                )
            } else {
                "❌ You've already claimed your share reward today. Come back after 01:00 GMT+1!"
                    .to_string()
            }
        }
        "/balance" => format!("💰 Your current balance: {} dots", ledger.balance(user)),
        _ => UNKNOWN_TEXT.to_string(),
    };

    Some(Reply {
        chat_id: message.chat.id,
        text,
    })
}

/// Long-polling loop. Runs on its own thread until the process exits.
pub fn run_poll_loop(client: &BotClient, ledger: &Ledger) {
    let mut offset: i64 = 0;
    loop {
        let updates = match client.get_updates(offset) {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!("getUpdates failed, backing off: {e}");
                std::thread::sleep(std::time::Duration::from_secs(3));
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            if let Some(reply) = dispatch(ledger, &update)
                && let Err(e) = client.send_message(reply.chat_id, &reply.text)
            {
                tracing::warn!(chat = reply.chat_id, "failed to send reply: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::WindowRule;
    use crate::persist::SnapshotStore;

    fn test_ledger(dir: &std::path::Path) -> Ledger {
        Ledger::new(
            WindowRule::fixed_default(),
            Arc::new(SnapshotStore::new(dir.join("users.json"))),
        )
    }

    fn update(text: &str) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "message": {
                "chat": { "id": 99 },
                "from": { "id": 42, "username": "ada" },
                "text": text,
            }
        }))
        .expect("update json")
    }

    #[test]
    fn checkin_then_balance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = test_ledger(dir.path());

        let reply = dispatch(&ledger, &update("/checkin")).expect("reply");
        assert_eq!(reply.chat_id, 99);
        assert!(reply.text.contains("10 dots"), "got: {}", reply.text);

        let reply = dispatch(&ledger, &update("/balance")).expect("reply");
        assert_eq!(reply.text, "💰 Your current balance: 10 dots");
    }

    #[test]
    fn second_checkin_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = test_ledger(dir.path());

        dispatch(&ledger, &update("/checkin"));
        let reply = dispatch(&ledger, &update("/checkin")).expect("reply");
        assert!(reply.text.starts_with('❌'), "got: {}", reply.text);
        assert_eq!(ledger.balance(UserId(42)), 10);
    }

    #[test]
    fn group_command_suffix_is_stripped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = test_ledger(dir.path());
        let reply = dispatch(&ledger, &update("/balance@DotsBot")).expect("reply");
        assert!(reply.text.starts_with('💰'));
    }

    #[test]
    fn unknown_command_gets_help() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = test_ledger(dir.path());
        let reply = dispatch(&ledger, &update("hello")).expect("reply");
        assert_eq!(reply.text, UNKNOWN_TEXT);
    }

    #[test]
    fn non_message_updates_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = test_ledger(dir.path());
        let update: Update = serde_json::from_value(serde_json::json!({ "update_id": 5 }))
            .expect("update json");
        assert!(dispatch(&ledger, &update).is_none());
    }
}
