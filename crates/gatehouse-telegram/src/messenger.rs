//! The teloxide-backed adapter.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_messenger::{
    ApprovalPrompt, ApprovalSink, MessengerAdapter, MessengerError, MessengerResult, Verdict,
};
use teloxide::dispatching::UpdateFilterExt;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::callback::{
    decode_callback, decode_message_ref, encode_callback, encode_message_ref, prompt_text,
    CallbackAction,
};

/// Shared state between the adapter handle and the dispatcher task.
struct Inner {
    bot: Bot,
    chat_id: ChatId,
    allowed_users: HashSet<u64>,
    sink: RwLock<Option<Arc<dyn ApprovalSink>>>,
}

impl Inner {
    /// Handle one callback query from a button tap.
    async fn handle_callback(&self, query: CallbackQuery) {
        let Some((request_id, action)) = query.data.as_deref().and_then(decode_callback) else {
            return;
        };

        let answer = self.bot.answer_callback_query(&query.id);

        if !self.allowed_users.contains(&query.from.id.0) {
            warn!(user = %query.from.id, request_id = %request_id, "unauthorized approval callback");
            let _ = answer.text("You are not authorized to resolve approvals").await;
            return;
        }

        let sink = { self.sink.read().await.clone() };
        let Some(sink) = sink else {
            let _ = answer.text("Gateway is not ready").await;
            return;
        };

        let guardian = query.from.id.to_string();
        let verdict = match action {
            CallbackAction::Allow => Verdict::Approved { by: guardian },
            CallbackAction::Deny => Verdict::Denied { by: guardian },
        };

        let won = sink.resolve(&request_id, verdict).await;
        if won {
            let text = match action {
                CallbackAction::Allow => "Approved",
                CallbackAction::Deny => "Denied",
            };
            let _ = answer.text(text).await;
        } else {
            // Stale prompt (expired, restarted gateway) or duplicate tap.
            let _ = answer.text("Expired").await;
        }
    }
}

/// Telegram implementation of the messenger contract.
pub struct TelegramMessenger {
    inner: Arc<Inner>,
    shutdown: Mutex<Option<teloxide::dispatching::ShutdownToken>>,
}

impl TelegramMessenger {
    /// Create the adapter.
    ///
    /// `allowed_users` is the guardian allow-list; callbacks from any
    /// other principal are rejected.
    #[must_use]
    pub fn new(bot_token: &str, chat_id: i64, allowed_users: impl IntoIterator<Item = u64>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bot: Bot::new(bot_token),
                chat_id: ChatId(chat_id),
                allowed_users: allowed_users.into_iter().collect(),
                sink: RwLock::new(None),
            }),
            shutdown: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MessengerAdapter for TelegramMessenger {
    async fn send_approval(&self, prompt: &ApprovalPrompt) -> MessengerResult<String> {
        let keyboard = InlineKeyboardMarkup::new([[
            InlineKeyboardButton::callback(
                "Allow",
                encode_callback(&prompt.request_id, CallbackAction::Allow),
            ),
            InlineKeyboardButton::callback(
                "Deny",
                encode_callback(&prompt.request_id, CallbackAction::Deny),
            ),
        ]]);

        let message = self
            .inner
            .bot
            .send_message(self.inner.chat_id, prompt_text(prompt))
            .reply_markup(keyboard)
            .await
            .map_err(|e| MessengerError::Send(e.to_string()))?;

        Ok(encode_message_ref(self.inner.chat_id.0, message.id.0))
    }

    async fn update_approval(&self, message_ref: &str, status: &str) -> MessengerResult<()> {
        let Some((chat_id, message_id)) = decode_message_ref(message_ref) else {
            return Err(MessengerError::Send(format!(
                "malformed message ref: {message_ref}"
            )));
        };

        self.inner
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), status)
            .await
            .map_err(|e| MessengerError::Send(e.to_string()))?;
        Ok(())
    }

    async fn start(&self, sink: Arc<dyn ApprovalSink>) -> MessengerResult<()> {
        *self.inner.sink.write().await = Some(sink);

        let inner = Arc::clone(&self.inner);
        let handler = Update::filter_callback_query().endpoint(
            move |query: CallbackQuery, inner: Arc<Inner>| async move {
                inner.handle_callback(query).await;
                respond(())
            },
        );

        let mut dispatcher = Dispatcher::builder(self.inner.bot.clone(), handler)
            .dependencies(dptree::deps![inner])
            .default_handler(|_| async {})
            .build();

        *self.shutdown.lock().await = Some(dispatcher.shutdown_token());
        tokio::spawn(async move {
            dispatcher.dispatch().await;
        });

        info!("telegram messenger started");
        Ok(())
    }

    async fn stop(&self) -> MessengerResult<()> {
        let token = self.shutdown.lock().await.take();
        if let Some(token) = token {
            if let Ok(wait) = token.shutdown() {
                wait.await;
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.inner.bot.get_me().await.is_ok()
    }
}

impl std::fmt::Debug for TelegramMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramMessenger")
            .field("chat_id", &self.inner.chat_id)
            .field("guardians", &self.inner.allowed_users.len())
            .finish_non_exhaustive()
    }
}
