#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Missing API key for the {0} provider: set DRAWKIT_API_KEY or pass --api-key")]
    MissingApiKey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build {provider} client: {message}")]
    ClientBuild { provider: String, message: String },
}
