use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    replywatch_alerts::DigestSink,
    replywatch_config::TelegramConfig,
    secrecy::ExposeSecret,
    teloxide::{
        RequestError,
        payloads::SendMessageSetters,
        prelude::*,
        types::{ParseMode, Recipient},
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use replywatch_metrics::{counter, telegram as tg_metrics};

use crate::{
    chunk::{TELEGRAM_MAX_MESSAGE_LEN, split_message},
    error::{Error, Result},
};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Numeric ids address chats directly; anything else is a public channel
/// username.
fn parse_recipient(chat_id: &str) -> Recipient {
    let chat_id = chat_id.trim();
    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if chat_id.starts_with('@') => Recipient::ChannelUsername(chat_id.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{chat_id}")),
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

struct Target {
    bot: Bot,
    recipient: Recipient,
    chat_label: String,
}

/// Delivers digests to one Telegram chat.
///
/// Without a token or chat id the notifier is disabled and drops messages,
/// logging that it did.
pub struct TelegramNotifier {
    target: Option<Target>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if !config.is_configured() {
            info!("telegram token or chat id not set, digests will not be delivered");
            return Ok(Self::disabled());
        }

        let mut bot = Bot::new(config.token.expose_secret().trim());
        if let Some(api_url) = config.api_url.as_deref().filter(|u| !u.trim().is_empty()) {
            let url = url::Url::parse(api_url.trim()).map_err(|source| Error::ApiUrl {
                url: api_url.to_string(),
                source,
            })?;
            bot = bot.set_api_url(url);
        }

        Ok(Self {
            target: Some(Target {
                bot,
                recipient: parse_recipient(&config.chat_id),
                chat_label: config.chat_id.trim().to_string(),
            }),
        })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { target: None }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Send `text` as one or more HTML messages.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        let Some(target) = &self.target else {
            debug!(text_len = text.len(), "telegram disabled, message dropped");
            return Ok(());
        };

        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LEN);
        for chunk in &chunks {
            if let Err(e) = self.send_chunk_with_fallback(target, chunk).await {
                #[cfg(feature = "metrics")]
                counter!(tg_metrics::SEND_ERRORS_TOTAL).increment(1);
                return Err(e);
            }
            #[cfg(feature = "metrics")]
            counter!(tg_metrics::MESSAGES_SENT_TOTAL).increment(1);
        }

        info!(
            chat_id = %target.chat_label,
            text_len = text.len(),
            chunk_count = chunks.len(),
            "telegram digest sent"
        );
        Ok(())
    }

    async fn send_chunk_with_fallback(&self, target: &Target, chunk: &str) -> Result<()> {
        let bot = &target.bot;
        let recipient = &target.recipient;
        let html = self
            .run_with_retry(target, "send message (html)", || {
                let req = bot
                    .send_message(recipient.clone(), chunk)
                    .parse_mode(ParseMode::Html);
                async move { req.await }
            })
            .await;

        match html {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(
                    chat_id = %target.chat_label,
                    error = %e,
                    "telegram HTML send failed, retrying as plain text"
                );
                self.run_with_retry(target, "send message (plain)", || {
                    let req = bot.send_message(recipient.clone(), chunk);
                    async move { req.await }
                })
                .await?;
                Ok(())
            },
        }
    }

    async fn run_with_retry<T, F, Fut>(
        &self,
        target: &Target,
        operation: &'static str,
        mut request: F,
    ) -> std::result::Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut retries = 0usize;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err);
                    };
                    if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            chat_id = %target.chat_label,
                            operation,
                            retries,
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }
                    retries += 1;
                    warn!(
                        chat_id = %target.chat_label,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }
}

#[async_trait]
impl DigestSink for TelegramNotifier {
    async fn send(&self, text: &str) -> replywatch_alerts::Result<()> {
        self.send_text(text)
            .await
            .map_err(|e| replywatch_alerts::Error::external("telegram delivery failed", e))
    }
}
