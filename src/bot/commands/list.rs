use chrono::NaiveDateTime;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};

use crate::bot::handlers::callback::CallbackAction;
use crate::bot::handlers::HandlerResult;
use crate::database::models::{Task, UserId};
use crate::services::task_store::TaskFilter;
use crate::services::todo::TodoService;
use crate::utils::datetime::format_timestamp;
use crate::utils::logging::log_command_start;
use crate::utils::markdown::{bold, escape_markdown, truncate_label};

/// Button labels are cut to this many characters.
pub const BUTTON_LABEL_CHARS: usize = 30;

/// A task together with its position in the user's full list.
pub type NumberedTask = (usize, Task);

pub fn title_for(filter: TaskFilter) -> &'static str {
    match filter {
        TaskFilter::All => "Your tasks",
        TaskFilter::Active => "Open tasks",
        TaskFilter::Completed => "Completed tasks",
        TaskFilter::WithDeadline => "Upcoming deadlines",
    }
}

/// Pairs a filtered view with list positions so numbers and buttons keep
/// addressing the full list.
pub fn number_tasks(all: &[Task], shown: Vec<Task>) -> Vec<NumberedTask> {
    shown
        .into_iter()
        .filter_map(|task| all.iter().position(|t| t.id == task.id).map(|i| (i, task)))
        .collect()
}

fn status_icon(task: &Task) -> &'static str {
    if task.completed {
        "✅"
    } else {
        "⭕"
    }
}

/// MarkdownV2 text of a task list with the `done/total` counter.
pub fn render_task_list(title: &str, tasks: &[NumberedTask], all: &[Task], now: NaiveDateTime) -> String {
    let done = all.iter().filter(|t| t.completed).count();
    let mut text = format!("📋 {} {}\n", bold(title), escape_markdown(&format!("({}/{} done)", done, all.len())));

    if tasks.is_empty() {
        text.push('\n');
        text.push_str(&escape_markdown("Nothing here yet. Send me a message to add a task."));
        return text;
    }

    for (index, task) in tasks {
        text.push_str(&format!(
            "\n{}\\. {} {}",
            index + 1,
            status_icon(task),
            escape_markdown(&task.text)
        ));

        if let Some(deadline) = task.deadline {
            text.push_str(&format!("\n    ⏰ {}", escape_markdown(&format_timestamp(&deadline))));
            if task.is_overdue(now) {
                text.push_str(" ⚠️ _overdue_");
            }
        }
        if let Some(completed_at) = task.completed_at {
            text.push_str(&format!(
                "\n    {}",
                escape_markdown(&format!("done {}", format_timestamp(&completed_at)))
            ));
        }
    }

    text
}

/// One toggle button per task plus the list actions.
pub fn task_keyboard(tasks: &[NumberedTask]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = tasks
        .iter()
        .map(|(index, task)| {
            let label = format!("{} {}", status_icon(task), truncate_label(&task.text, BUTTON_LABEL_CHARS));
            vec![InlineKeyboardButton::callback(label, CallbackAction::Toggle(*index).to_data())]
        })
        .collect();

    rows.push(vec![
        InlineKeyboardButton::callback("➕ Add task", CallbackAction::AddTask.to_data()),
        InlineKeyboardButton::callback("🧹 Clear completed", CallbackAction::ClearCompleted.to_data()),
    ]);

    InlineKeyboardMarkup::new(rows)
}

/// Text and keyboard for one user's view of the list.
pub async fn build_list_view(
    service: &TodoService,
    user_id: UserId,
    filter: TaskFilter,
) -> (String, InlineKeyboardMarkup) {
    let all = service.list_tasks(user_id, TaskFilter::All).await;
    let shown = service.list_tasks(user_id, filter).await;
    let numbered = number_tasks(&all, shown);

    let text = render_task_list(title_for(filter), &numbered, &all, service.now());
    (text, task_keyboard(&numbered))
}

pub async fn handle_list(
    bot: Bot,
    msg: Message,
    filter: TaskFilter,
    service: Arc<TodoService>,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as UserId;

    log_command_start("list", &user.first_name, user_id, Some(title_for(filter)));

    send_list(&bot, msg.chat.id, user_id, filter, &service).await
}

pub async fn send_list(
    bot: &Bot,
    chat_id: ChatId,
    user_id: UserId,
    filter: TaskFilter,
    service: &TodoService,
) -> HandlerResult {
    let (text, keyboard) = build_list_view(service, user_id, filter).await;
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}
