use std::sync::Arc;
use teloxide::prelude::*;

use crate::bot::commands::list::send_list;
use crate::bot::dialogue::{State, TodoDialogue, ASK_TASK_TEXT};
use crate::bot::handlers::HandlerResult;
use crate::database::models::{TaskId, UserId};
use crate::error::TodoError;
use crate::services::task_store::TaskFilter;
use crate::services::todo::TodoService;
use crate::utils::datetime::format_timestamp;
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_error, log_command_start};
use crate::utils::validation::{is_skip_answer, split_task_argument, validate_task_text, MAX_TASK_TEXT_CHARS};

const WELCOME: &str = "👋 Hi! I keep your to-do list and remind you about deadlines.

Send me any message to add it as a task, or use /add for a guided setup.
Tap a task in /list to mark it done.
Use /help to see all commands.";

/// Adds a task from chat text, reporting problems back to the chat.
pub async fn add_task(
    feedback: &CommandFeedback,
    service: &TodoService,
    user_id: UserId,
    text: &str,
) -> Result<Option<TaskId>, teloxide::RequestError> {
    let text = match validate_task_text(text) {
        Ok(text) => text,
        Err(e) => {
            let suggestion = format!("Send the task as one message of up to {MAX_TASK_TEXT_CHARS} characters.");
            feedback.validation_error(&e.to_string(), &suggestion).await?;
            return Ok(None);
        }
    };

    match service.add_task(user_id, text).await {
        Ok(task) => Ok(Some(task.id)),
        Err(e) => {
            log_command_error("add", user_id, e.code(), &e.to_string());
            feedback.todo_error(&e).await?;
            Ok(None)
        }
    }
}

pub async fn handle_start(
    bot: Bot,
    msg: Message,
    dialogue: TodoDialogue,
    service: Arc<TodoService>,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as UserId;
    log_command_start("start", &user.first_name, user_id, None);

    if let Err(e) = service
        .register_user(user_id, user.username.clone(), Some(user.full_name()))
        .await
    {
        log_command_error("start", user_id, e.code(), &e.to_string());
    }

    dialogue.exit().await?;
    bot.send_message(msg.chat.id, WELCOME).await?;
    Ok(())
}

pub async fn handle_add(
    bot: Bot,
    msg: Message,
    text: String,
    dialogue: TodoDialogue,
    service: Arc<TodoService>,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as UserId;
    let feedback = CommandFeedback::new(bot.clone(), msg.chat.id);
    log_command_start("add", &user.first_name, user_id, None);

    if text.trim().is_empty() {
        dialogue.update(State::WaitingForTask).await?;
        feedback.info(ASK_TASK_TEXT).await?;
        return Ok(());
    }

    if add_task(&feedback, &service, user_id, &text).await?.is_some() {
        send_list(&bot, msg.chat.id, user_id, TaskFilter::All, &service).await?;
    }
    Ok(())
}

/// `/deadline <n> <time>`; `skip` as the time removes the deadline.
pub async fn handle_deadline(
    bot: Bot,
    msg: Message,
    args: String,
    service: Arc<TodoService>,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as UserId;
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    log_command_start("deadline", &user.first_name, user_id, Some(&args));

    let usage = "Usage: /deadline <task number> <time>, for example /deadline 2 tomorrow at 18:00";
    let (index, phrase) = match split_task_argument(&args) {
        Ok((index, Some(phrase))) => (index, phrase),
        Ok((_, None)) => {
            feedback.validation_error("Time is missing", usage).await?;
            return Ok(());
        }
        Err(e) => {
            feedback.validation_error(&e.to_string(), usage).await?;
            return Ok(());
        }
    };

    let deadline = if is_skip_answer(phrase) {
        None
    } else {
        match service.parse_time_expression(phrase) {
            Ok(deadline) => Some(deadline),
            Err(_) => {
                feedback.todo_error(&TodoError::TimeNotRecognized).await?;
                return Ok(());
            }
        }
    };

    match service.set_deadline(user_id, index, deadline).await {
        Ok(task) => {
            let message = match task.deadline {
                Some(deadline) => format!("Deadline for '{}' set to {}", task.text, format_timestamp(&deadline)),
                None => format!("Deadline removed from '{}'", task.text),
            };
            feedback.success(&message).await?;
        }
        Err(e) => {
            log_command_error("deadline", user_id, e.code(), &e.to_string());
            feedback.todo_error(&e).await?;
        }
    }
    Ok(())
}

pub async fn handle_clear(bot: Bot, msg: Message, service: Arc<TodoService>) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as UserId;
    let feedback = CommandFeedback::new(bot.clone(), msg.chat.id);
    log_command_start("clear", &user.first_name, user_id, None);

    match service.clear_completed(user_id).await {
        Ok(0) => {
            feedback.info("There are no completed tasks to clear.").await?;
        }
        Ok(removed) => {
            feedback
                .success(&format!("Removed {removed} completed task(s)."))
                .await?;
            send_list(&bot, msg.chat.id, user_id, TaskFilter::All, &service).await?;
        }
        Err(e) => {
            log_command_error("clear", user_id, e.code(), &e.to_string());
            feedback.todo_error(&e).await?;
        }
    }
    Ok(())
}

pub async fn handle_cancel(bot: Bot, msg: Message, dialogue: TodoDialogue, state: State) -> HandlerResult {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let message = match state {
        State::Idle => "Nothing to cancel.",
        State::WaitingForTask => "Cancelled.",
        State::WaitingForDeadline { .. } | State::WaitingForReminder { .. } => {
            "Cancelled. The task you added stays in the list."
        }
    };
    dialogue.exit().await?;
    feedback.info(message).await?;
    Ok(())
}
