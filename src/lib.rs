pub mod config;
pub mod dictionary;
pub mod engine;
pub mod game;
pub mod message;
pub mod network;
pub mod validation;

pub use config::Config;
pub use dictionary::Dictionary;
pub use engine::GameEngine;
pub use game::{GameState, GameStatus, HistoryEntry, Player, PlayerSlot};
pub use message::GameMessage;
pub use network::ShiritoriServer;
pub use validation::{Rejection, SubmitOutcome};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("网络错误: {0}")]
    Network(#[from] anyhow::Error),
    #[error("词典错误: {0}")]
    Dictionary(String),
    #[error("配置错误: {0}")]
    Config(String),
    #[error("消息错误: {0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, Error>;
