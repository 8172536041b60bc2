//! Chat transports and the event/prompt types they exchange with the
//! dialogue controller.

pub mod channel;
pub mod cli;
pub mod telegram;

pub use channel::*;
pub use cli::CliChannel;
pub use telegram::TelegramChannel;
