pub mod bot_handler;
pub mod report;

pub use bot_handler::BotHandler;
