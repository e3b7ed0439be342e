use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    // Lookup errors — surfaced to the caller, the run never starts
    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    #[error("Execution context not found: {0}")]
    ContextNotFound(String),

    #[error("Flow {0} has no start node")]
    StartNodeMissing(String),

    // Caller errors — rejected with no state mutation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Graph definition errors — reported at load time
    #[error("Invalid flow definition: {0}")]
    Graph(String),

    // Step errors — absorbed into context state during stepping
    #[error("Step failed at node {node}: {message}")]
    Step { node: String, message: String },

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // Messaging errors
    #[error("Channel error: {channel}: {message}")]
    Channel { channel: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
