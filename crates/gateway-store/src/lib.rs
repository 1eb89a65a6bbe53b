pub mod db;
pub mod entities;
pub mod seaorm;
pub mod snapshot;
pub mod storage;

pub use seaorm::SeaOrmStorage;
pub use snapshot::{AliasRow, ApiKeyRow, ModelRow, ProviderRow, RegistrySnapshot};
pub use storage::{
    ApiKeyPatch, MonthlyUsageSummaryUpsert, NewApiKeyInput, Storage, StorageError, StorageResult,
    UsageRecordInput,
};
