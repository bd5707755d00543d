pub mod list;
pub mod reminders;
pub mod tasks;

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "To-do bot commands:")]
pub enum Command {
    #[command(description = "Display this help message")]
    Help,
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Add a task: /add buy milk")]
    Add(String),
    #[command(description = "Show all tasks")]
    List,
    #[command(description = "Show open tasks")]
    Active,
    #[command(description = "Show completed tasks")]
    Done,
    #[command(description = "Show open tasks ordered by deadline")]
    Deadlines,
    #[command(description = "Set a deadline: /deadline 2 tomorrow at 18:00")]
    Deadline(String),
    #[command(description = "Set a reminder: /remind 2 in 30 minutes")]
    Remind(String),
    #[command(description = "Show pending reminders")]
    Reminders,
    #[command(description = "Remove completed tasks")]
    Clear,
    #[command(description = "Cancel the current dialogue")]
    Cancel,
}
