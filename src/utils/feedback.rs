use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::error::TodoError;
use crate::utils::markdown::escape_markdown;

/// Feedback types for different command outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackType {
    Success,
    Warning,
    Error,
    Info,
}

impl FeedbackType {
    pub fn emoji(&self) -> &'static str {
        match self {
            FeedbackType::Success => "✅",
            FeedbackType::Warning => "⚠️",
            FeedbackType::Error => "❌",
            FeedbackType::Info => "ℹ️",
        }
    }
}

/// Builds the MarkdownV2 body of a feedback message.
pub fn format_feedback(feedback_type: FeedbackType, message: &str) -> String {
    format!("{} {}", feedback_type.emoji(), escape_markdown(message))
}

/// A hint shown under a failed operation.
pub fn suggestion_for(error: &TodoError) -> &'static str {
    match error {
        TodoError::EmptyText => "Send some text for the task, for example: buy milk",
        TodoError::TaskNotFound { .. } => "The list may have changed. Use /list to see the current numbers.",
        TodoError::TaskCompleted { .. } => "Tap the task in /list to reopen it first.",
        TodoError::NotInFuture(_) => "Pick a time that has not passed yet.",
        TodoError::TimeNotRecognized => {
            "Try: tomorrow at 15:30, today at 18:00, in 2 hours, in 30 minutes, in 3 days, 31.12.2024 23:59 or 15:30"
        }
        TodoError::Persistence(_) => "Something went wrong on our side. Please try again in a moment.",
    }
}

/// Centralized feedback for bot replies in one chat
pub struct CommandFeedback {
    bot: Bot,
    chat_id: ChatId,
}

impl CommandFeedback {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }

    pub async fn send(&self, feedback_type: FeedbackType, message: &str) -> ResponseResult<Message> {
        self.bot
            .send_message(self.chat_id, format_feedback(feedback_type, message))
            .parse_mode(ParseMode::MarkdownV2)
            .await
    }

    pub async fn success(&self, message: &str) -> ResponseResult<Message> {
        self.send(FeedbackType::Success, message).await
    }

    pub async fn error(&self, message: &str) -> ResponseResult<Message> {
        self.send(FeedbackType::Error, message).await
    }

    pub async fn warning(&self, message: &str) -> ResponseResult<Message> {
        self.send(FeedbackType::Warning, message).await
    }

    pub async fn info(&self, message: &str) -> ResponseResult<Message> {
        self.send(FeedbackType::Info, message).await
    }

    /// Send validation error with helpful suggestion
    pub async fn validation_error(&self, error: &str, suggestion: &str) -> ResponseResult<Message> {
        let message = format!("{error}\n\n💡 Suggestion: {suggestion}");
        self.send(FeedbackType::Error, &message).await
    }

    /// Reports a failed store or scheduler operation.
    pub async fn todo_error(&self, error: &TodoError) -> ResponseResult<Message> {
        if error.is_validation() {
            self.validation_error(&error.to_string(), suggestion_for(error)).await
        } else {
            tracing::error!("Operation failed [{}]: {}", error.code(), error);
            self.validation_error("Could not save your changes", suggestion_for(error)).await
        }
    }
}
