use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::db;
use crate::entities::{self, ApiKeys, ModelAliases, Models, MonthlyUsageSummary, Providers, UsageRecords};
use crate::snapshot::{AliasRow, ApiKeyRow, ModelRow, ProviderRow, RegistrySnapshot};
use crate::storage::{
    ApiKeyPatch, MonthlyUsageSummaryUpsert, NewApiKeyInput, Storage, StorageError, StorageResult,
    UsageRecordInput,
};

pub struct SeaOrmStorage {
    conn: DatabaseConnection,
}

impl SeaOrmStorage {
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        let conn = db::connect_shared(dsn).await?;
        Ok(Self { conn })
    }
}

fn row_from_model(m: entities::api_keys::Model) -> StorageResult<ApiKeyRow> {
    let allowed_models: Vec<String> = serde_json::from_value(m.allowed_models)?;
    Ok(ApiKeyRow {
        id: m.id,
        name: m.name,
        secret_hash: m.secret_hash,
        allowed_models,
        rate_limit_per_minute: m.rate_limit_per_minute as u32,
        monthly_budget_usd_micros: m.monthly_budget_usd_micros,
        enabled: m.enabled,
        expires_at: m.expires_at,
        tags: m.tags,
    })
}

#[async_trait]
impl Storage for SeaOrmStorage {
    async fn sync(&self) -> StorageResult<()> {
        sea_orm::schema::sync::<ApiKeys>(&self.conn).await?;
        sea_orm::schema::sync::<entities::KeyMetadata>(&self.conn).await?;
        sea_orm::schema::sync::<Providers>(&self.conn).await?;
        sea_orm::schema::sync::<Models>(&self.conn).await?;
        sea_orm::schema::sync::<ModelAliases>(&self.conn).await?;
        sea_orm::schema::sync::<UsageRecords>(&self.conn).await?;
        sea_orm::schema::sync::<MonthlyUsageSummary>(&self.conn).await?;
        Ok(())
    }

    async fn get_api_key_by_secret_hash(&self, hash: &str) -> StorageResult<Option<ApiKeyRow>> {
        let found = ApiKeys::find()
            .filter(entities::api_keys::Column::SecretHash.eq(hash))
            .one(&self.conn)
            .await?;
        found.map(row_from_model).transpose()
    }

    async fn insert_api_key(&self, input: NewApiKeyInput) -> StorageResult<ApiKeyRow> {
        let am = entities::api_keys::ActiveModel {
            name: Set(input.name),
            secret_hash: Set(input.secret_hash),
            allowed_models: Set(serde_json::to_value(&input.allowed_models)?),
            rate_limit_per_minute: Set(input.rate_limit_per_minute as i32),
            monthly_budget_usd_micros: Set(input.monthly_budget_usd_micros),
            enabled: Set(true),
            expires_at: Set(input.expires_at),
            tags: Set(input.tags),
            created_at: Set(OffsetDateTime::now_utc()),
            ..Default::default()
        };
        let model = am.insert(&self.conn).await?;
        row_from_model(model)
    }

    async fn patch_api_key(&self, id: i64, patch: ApiKeyPatch) -> StorageResult<ApiKeyRow> {
        let existing = ApiKeys::find_by_id(id)
            .one(&self.conn)
            .await?
            .ok_or(StorageError::NotFound)?;
        let mut am: entities::api_keys::ActiveModel = existing.into();
        if let Some(name) = patch.name {
            am.name = Set(name);
        }
        if let Some(allowed) = patch.allowed_models {
            am.allowed_models = Set(serde_json::to_value(&allowed)?);
        }
        if let Some(limit) = patch.rate_limit_per_minute {
            am.rate_limit_per_minute = Set(limit as i32);
        }
        if let Some(budget) = patch.monthly_budget_usd_micros {
            am.monthly_budget_usd_micros = Set(budget);
        }
        if let Some(enabled) = patch.enabled {
            am.enabled = Set(enabled);
        }
        if let Some(expires_at) = patch.expires_at {
            am.expires_at = Set(expires_at);
        }
        if let Some(tags) = patch.tags {
            am.tags = Set(tags);
        }
        let model = am.update(&self.conn).await?;
        row_from_model(model)
    }

    async fn delete_api_key(&self, id: i64) -> StorageResult<()> {
        ApiKeys::delete_by_id(id).exec(&self.conn).await?;
        Ok(())
    }

    async fn list_enabled_api_key_ids(&self) -> StorageResult<Vec<i64>> {
        let ids = ApiKeys::find()
            .filter(entities::api_keys::Column::Enabled.eq(true))
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();
        Ok(ids)
    }

    async fn load_registry_snapshot(&self) -> StorageResult<RegistrySnapshot> {
        let providers = Providers::find()
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|m| ProviderRow {
                id: m.id,
                name: m.name,
                type_tag: m.type_tag,
                enabled: m.enabled,
                credential_blob: m.credential_blob,
                config_json: m.config_json,
            })
            .collect();

        let models = Models::find()
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|m| ModelRow {
                id: m.id,
                provider_id: m.provider_id,
                name: m.name,
                input_price_per_1k_usd_micros: m.input_price_per_1k_usd_micros,
                output_price_per_1k_usd_micros: m.output_price_per_1k_usd_micros,
            })
            .collect();

        let aliases = ModelAliases::find()
            .all(&self.conn)
            .await?
            .into_iter()
            .map(|m| AliasRow {
                id: m.id,
                alias: m.alias,
                model_id: m.model_id,
                provider_override_id: m.provider_override_id,
                enabled: m.enabled,
            })
            .collect();

        Ok(RegistrySnapshot { providers, models, aliases })
    }

    async fn upsert_provider(
        &self,
        name: &str,
        type_tag: &str,
        credential_blob: Vec<u8>,
        config_json: JsonValue,
        enabled: bool,
    ) -> StorageResult<i64> {
        let existing = Providers::find()
            .filter(entities::providers::Column::Name.eq(name))
            .one(&self.conn)
            .await?;
        let now = OffsetDateTime::now_utc();
        let id = match existing {
            Some(existing) => {
                let id = existing.id;
                let mut am: entities::providers::ActiveModel = existing.into();
                am.type_tag = Set(type_tag.to_string());
                am.credential_blob = Set(credential_blob);
                am.config_json = Set(config_json);
                am.enabled = Set(enabled);
                am.updated_at = Set(now);
                am.update(&self.conn).await?;
                id
            }
            None => {
                let am = entities::providers::ActiveModel {
                    name: Set(name.to_string()),
                    type_tag: Set(type_tag.to_string()),
                    credential_blob: Set(credential_blob),
                    config_json: Set(config_json),
                    enabled: Set(enabled),
                    updated_at: Set(now),
                    ..Default::default()
                };
                am.insert(&self.conn).await?.id
            }
        };
        Ok(id)
    }

    async fn set_provider_enabled(&self, provider_id: i64, enabled: bool) -> StorageResult<()> {
        let existing = Providers::find_by_id(provider_id)
            .one(&self.conn)
            .await?
            .ok_or(StorageError::NotFound)?;
        let mut am: entities::providers::ActiveModel = existing.into();
        am.enabled = Set(enabled);
        am.updated_at = Set(OffsetDateTime::now_utc());
        am.update(&self.conn).await?;
        Ok(())
    }

    async fn upsert_model(
        &self,
        provider_id: i64,
        name: &str,
        input_price_per_1k_usd_micros: i64,
        output_price_per_1k_usd_micros: i64,
    ) -> StorageResult<i64> {
        let existing = Models::find()
            .filter(entities::models::Column::ProviderId.eq(provider_id))
            .filter(entities::models::Column::Name.eq(name))
            .one(&self.conn)
            .await?;
        let now = OffsetDateTime::now_utc();
        let id = match existing {
            Some(existing) => {
                let id = existing.id;
                let mut am: entities::models::ActiveModel = existing.into();
                am.input_price_per_1k_usd_micros = Set(input_price_per_1k_usd_micros);
                am.output_price_per_1k_usd_micros = Set(output_price_per_1k_usd_micros);
                am.updated_at = Set(now);
                am.update(&self.conn).await?;
                id
            }
            None => {
                let am = entities::models::ActiveModel {
                    provider_id: Set(provider_id),
                    name: Set(name.to_string()),
                    input_price_per_1k_usd_micros: Set(input_price_per_1k_usd_micros),
                    output_price_per_1k_usd_micros: Set(output_price_per_1k_usd_micros),
                    capabilities: Set(JsonValue::Array(vec![])),
                    metadata: Set(JsonValue::Object(Default::default())),
                    updated_at: Set(now),
                    ..Default::default()
                };
                am.insert(&self.conn).await?.id
            }
        };
        Ok(id)
    }

    async fn upsert_alias(
        &self,
        alias: &str,
        model_id: i64,
        provider_override_id: Option<i64>,
        enabled: bool,
    ) -> StorageResult<i64> {
        let existing = ModelAliases::find()
            .filter(entities::model_aliases::Column::Alias.eq(alias))
            .one(&self.conn)
            .await?;
        let id = match existing {
            Some(existing) => {
                let id = existing.id;
                let mut am: entities::model_aliases::ActiveModel = existing.into();
                am.model_id = Set(model_id);
                am.provider_override_id = Set(provider_override_id);
                am.enabled = Set(enabled);
                am.update(&self.conn).await?;
                id
            }
            None => {
                let am = entities::model_aliases::ActiveModel {
                    alias: Set(alias.to_string()),
                    model_id: Set(model_id),
                    provider_override_id: Set(provider_override_id),
                    enabled: Set(enabled),
                    ..Default::default()
                };
                am.insert(&self.conn).await?.id
            }
        };
        Ok(id)
    }

    async fn append_usage_record(&self, record: UsageRecordInput) -> StorageResult<()> {
        let am = entities::usage_records::ActiveModel {
            api_key_id: Set(record.api_key_id),
            model_id: Set(record.model_id),
            provider_id: Set(record.provider_id),
            requested_at: Set(record.requested_at),
            prompt_tokens: Set(record.prompt_tokens),
            completion_tokens: Set(record.completion_tokens),
            total_tokens: Set(record.total_tokens),
            cost_usd_micros: Set(record.cost_usd_micros),
            request_summary: Set(record.request_summary),
            response_summary: Set(record.response_summary),
            ..Default::default()
        };
        am.insert(&self.conn).await?;
        Ok(())
    }

    async fn upsert_monthly_summary(&self, summary: MonthlyUsageSummaryUpsert) -> StorageResult<()> {
        let existing = MonthlyUsageSummary::find()
            .filter(entities::monthly_usage_summary::Column::ApiKeyId.eq(summary.api_key_id))
            .filter(entities::monthly_usage_summary::Column::Year.eq(summary.year))
            .filter(entities::monthly_usage_summary::Column::Month.eq(summary.month))
            .one(&self.conn)
            .await?;
        let now = OffsetDateTime::now_utc();
        match existing {
            Some(existing) => {
                let mut am: entities::monthly_usage_summary::ActiveModel = existing.into();
                am.total_cost_usd_micros = Set(summary.total_cost_usd_micros);
                am.total_requests = Set(summary.total_requests);
                am.updated_at = Set(now);
                am.update(&self.conn).await?;
            }
            None => {
                let am = entities::monthly_usage_summary::ActiveModel {
                    api_key_id: Set(summary.api_key_id),
                    year: Set(summary.year),
                    month: Set(summary.month),
                    total_cost_usd_micros: Set(summary.total_cost_usd_micros),
                    total_requests: Set(summary.total_requests),
                    updated_at: Set(now),
                    ..Default::default()
                };
                am.insert(&self.conn).await?;
            }
        }
        Ok(())
    }
}
