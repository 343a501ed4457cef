// Adapters implementing the application ports

pub mod env_secrets;
pub mod fs_archive;
pub mod http_client;
pub mod run_report_adapter;
pub mod sqlite_staging;

pub use env_secrets::EnvSecretSource;
pub use fs_archive::FsArchiveStore;
pub use http_client::ReqwestHttp;
pub use run_report_adapter::FileRunReportAdapter;
pub use sqlite_staging::SqliteStagingStore;
