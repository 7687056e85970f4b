//! Migration: Create dashboard_layouts table.
//!
//! One row per user and dashboard holding the user's widget order and sizes.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE dashboard_layouts (
                    id UUID PRIMARY KEY,
                    user_id VARCHAR(255) NOT NULL,
                    dashboard_id VARCHAR(64) NOT NULL
                        CHECK (dashboard_id IN (
                            'software-delivery-activity', 'security-insights', 'flow-metrics',
                            'dora-metrics', 'ci-insights', 'test-insights', 'component-security',
                            'application-security', 'component-summary'
                        )),
                    layout JSONB NOT NULL DEFAULT '[]'::jsonb,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                -- One override per user and dashboard; upserts conflict on it
                CREATE UNIQUE INDEX idx_dashboard_layouts_user_dashboard
                    ON dashboard_layouts(user_id, dashboard_id);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS dashboard_layouts CASCADE;")
            .await?;

        Ok(())
    }
}
