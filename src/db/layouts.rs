//! Dashboard layout overrides stored in PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entity::dashboard_layout::{self, ActiveModel, Entity as DashboardLayoutEntity};
use crate::error::{AppError, AppResult};
use crate::models::{Dashboard, WidgetLayout};
use crate::services::layout::LayoutStore;

use super::DbPool;

impl DbPool {
    /// Stored override for one user and dashboard.
    pub async fn find_layout(
        &self,
        user_id: &str,
        dashboard: Dashboard,
    ) -> AppResult<Option<dashboard_layout::Model>> {
        Ok(DashboardLayoutEntity::find()
            .filter(dashboard_layout::Column::UserId.eq(user_id))
            .filter(dashboard_layout::Column::DashboardId.eq(dashboard.as_str()))
            .one(self.connection())
            .await?)
    }

    /// Insert or replace the override for one user and dashboard.
    pub async fn upsert_layout(
        &self,
        user_id: &str,
        dashboard: Dashboard,
        layout: serde_json::Value,
    ) -> AppResult<()> {
        let now = Utc::now();
        let model = ActiveModel {
            id: Set(Uuid::now_v7()),
            user_id: Set(user_id.to_string()),
            dashboard_id: Set(dashboard.as_str().to_string()),
            layout: Set(layout),
            created_at: Set(now),
            updated_at: Set(now),
        };

        DashboardLayoutEntity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    dashboard_layout::Column::UserId,
                    dashboard_layout::Column::DashboardId,
                ])
                .update_columns([
                    dashboard_layout::Column::Layout,
                    dashboard_layout::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(self.connection())
            .await?;

        Ok(())
    }
}

/// [`LayoutStore`] over the `dashboard_layouts` table.
#[derive(Clone)]
pub struct SeaOrmLayoutStore {
    pool: DbPool,
}

impl SeaOrmLayoutStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LayoutStore for SeaOrmLayoutStore {
    async fn get_layout(&self, user_id: &str, dashboard: Dashboard) -> AppResult<Option<Vec<WidgetLayout>>> {
        let Some(row) = self.pool.find_layout(user_id, dashboard).await? else {
            return Ok(None);
        };
        let widgets = serde_json::from_value(row.layout).map_err(|e| {
            AppError::Database(format!(
                "Stored layout for {} on {} is malformed: {}",
                user_id, dashboard, e
            ))
        })?;
        Ok(Some(widgets))
    }

    async fn put_layout(&self, user_id: &str, dashboard: Dashboard, layout: &[WidgetLayout]) -> AppResult<()> {
        let value = serde_json::to_value(layout)
            .map_err(|e| AppError::Internal(format!("Failed to encode layout: {}", e)))?;
        self.pool.upsert_layout(user_id, dashboard, value).await
    }

    async fn ping(&self) -> AppResult<()> {
        self.pool.ping().await
    }
}
