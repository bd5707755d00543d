use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::bot::commands::{list, reminders, tasks, Command};
use crate::bot::dialogue::{State, TodoDialogue};
use crate::bot::handlers::HandlerResult;
use crate::services::task_store::TaskFilter;
use crate::services::todo::TodoService;

pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    dialogue: TodoDialogue,
    state: State,
    service: Arc<TodoService>,
) -> HandlerResult {
    match cmd {
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
        }
        Command::Start => tasks::handle_start(bot, msg, dialogue, service).await?,
        Command::Add(text) => tasks::handle_add(bot, msg, text, dialogue, service).await?,
        Command::List => list::handle_list(bot, msg, TaskFilter::All, service).await?,
        Command::Active => list::handle_list(bot, msg, TaskFilter::Active, service).await?,
        Command::Done => list::handle_list(bot, msg, TaskFilter::Completed, service).await?,
        Command::Deadlines => list::handle_list(bot, msg, TaskFilter::WithDeadline, service).await?,
        Command::Deadline(args) => tasks::handle_deadline(bot, msg, args, service).await?,
        Command::Remind(args) => reminders::handle_remind(bot, msg, args, service).await?,
        Command::Reminders => reminders::handle_reminders(bot, msg, service).await?,
        Command::Clear => tasks::handle_clear(bot, msg, service).await?,
        Command::Cancel => tasks::handle_cancel(bot, msg, dialogue, state).await?,
    }
    Ok(())
}
