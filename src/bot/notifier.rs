use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::bot::commands::reminders::reminder_message;
use crate::database::models::Reminder;
use crate::error::DeliveryError;
use crate::services::reminder::{DeliveryFuture, Notifier};

/// Delivers due reminders to the owner's private chat.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl Notifier for TelegramNotifier {
    fn deliver<'a>(&'a self, reminder: &'a Reminder) -> DeliveryFuture<'a> {
        Box::pin(async move {
            self.bot
                .send_message(ChatId(reminder.user_id), reminder_message(reminder))
                .parse_mode(ParseMode::MarkdownV2)
                .await
                .map(|_| ())
                .map_err(|e| DeliveryError(e.to_string()))
        })
    }
}
