use crate::events::GameKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GameError>;

#[derive(Error, Debug)]
pub enum GameError {
    #[error("Parlor core error: {0}")]
    Core(#[from] parlor_core::ParlorError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No {0:?} session is running in this room")]
    NotFound(GameKind),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Round is closed and settling")]
    RoundClosed,

    #[error("Account {0} is already in the lobby")]
    AlreadyJoined(parlor_core::AccountId),

    #[error("Account {0} is not in the lobby")]
    NotInLobby(parlor_core::AccountId),
}

impl GameError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            Self::Core(parlor_core::ParlorError::InsufficientFunds { .. })
        )
    }
}
