use event_relay::RelayError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("startup failed: {0}")]
    Init(RelayError),

    #[error("event loop failed: {0}")]
    Loop(RelayError),
}

pub type ServerResult<T> = Result<T, ServerError>;
