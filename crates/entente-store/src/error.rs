use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Handle already taken: {0}")]
    HandleTaken(String),
}
