use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue entry {0} not found")]
    NotFound(String),

    #[error("queue entry {0} is not currently visible")]
    NotVisible(String),
}
