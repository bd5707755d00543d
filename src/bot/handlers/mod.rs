pub mod callback;
pub mod general_message;
pub mod message;

use std::sync::Arc;
use teloxide::{
    dispatching::{dialogue, dialogue::InMemStorage, UpdateHandler},
    prelude::*,
};

use crate::bot::commands::Command;
use crate::bot::dialogue::{State, TodoDialogue};
use crate::services::todo::TodoService;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type HandlerResult = Result<(), HandlerError>;

pub struct BotHandler {
    pub service: Arc<TodoService>,
}

impl BotHandler {
    pub fn new(service: Arc<TodoService>) -> Self {
        Self { service }
    }

    /// Dialogue state for every chat, kept in memory.
    pub fn storage(&self) -> Arc<InMemStorage<State>> {
        InMemStorage::new()
    }

    pub fn schema(&self) -> UpdateHandler<HandlerError> {
        let command_service = self.service.clone();
        let text_service = self.service.clone();
        let callback_service = self.service.clone();

        dialogue::enter::<Update, InMemStorage<State>, State, _>()
            .branch(
                Update::filter_message()
                    .filter_command::<Command>()
                    .endpoint(
                        move |bot: Bot, msg: Message, cmd: Command, dialogue: TodoDialogue, state: State| {
                            let service = command_service.clone();
                            async move { message::command_handler(bot, msg, cmd, dialogue, state, service).await }
                        },
                    ),
            )
            .branch(Update::filter_message().endpoint(
                move |bot: Bot, msg: Message, dialogue: TodoDialogue, state: State| {
                    let service = text_service.clone();
                    async move { general_message::handle_general_message(bot, msg, dialogue, state, service).await }
                },
            ))
            .branch(Update::filter_callback_query().endpoint(
                move |bot: Bot, q: CallbackQuery, dialogue: TodoDialogue| {
                    let service = callback_service.clone();
                    async move { callback::callback_handler(bot, q, dialogue, service).await }
                },
            ))
    }
}
