use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("notification name must not be empty")]
    EmptyName,
    #[error("key path must not be empty")]
    EmptyKeyPath,
    #[error("no callback was provided for {0}")]
    MissingCallback(String),
    #[error("failed to spawn executor thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
