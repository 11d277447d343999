//! Reasoning workers. Each accepts a job over HTTP, answers it in the
//! background and posts the answer to the gateway callback.

pub mod assistant;
pub mod callback;
pub mod general_chat;
pub mod server;
pub mod worker;

pub use {
    assistant::AssistantWorker,
    callback::CallbackClient,
    general_chat::GeneralChatWorker,
    server::{build_assistant_app, build_general_chat_app, start_assistant, start_general_chat},
    worker::{Worker, spawn_job},
};
