use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Plugin setting not found")]
    SettingNotFound,

    #[error("Dashboard not found")]
    DashboardNotFound,

    #[error("A dashboard with the same uid already exists")]
    SameUidExists,

    #[error("A dashboard with the same name in the folder already exists")]
    SameNameInFolderExists,

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
