//! Per-user notification preferences.

use serde::Deserialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use smartnotify_common::error::AppError;
use smartnotify_common::types::NotificationPreference;

use crate::accounts::AccountService;

pub struct PreferenceService;

/// Partial update; absent switches keep their current value.
#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
pub struct PreferencePatch {
    pub in_app: Option<bool>,
    pub email: Option<bool>,
    pub sms: Option<bool>,
}

impl PreferencePatch {
    pub fn is_empty(&self) -> bool {
        self.in_app.is_none() && self.email.is_none() && self.sms.is_none()
    }
}

impl PreferenceService {
    /// Fetch `user_id`'s preferences on behalf of `requester_id`.
    pub async fn get(
        pool: &PgPool,
        requester_id: i64,
        user_id: i64,
    ) -> Result<NotificationPreference, AppError> {
        Self::authorize(pool, requester_id, user_id).await?;
        Self::load(pool, user_id).await
    }

    /// Apply a partial update to `user_id`'s preferences.
    pub async fn update(
        pool: &PgPool,
        requester_id: i64,
        user_id: i64,
        patch: &PreferencePatch,
    ) -> Result<NotificationPreference, AppError> {
        Self::authorize(pool, requester_id, user_id).await?;

        if patch.is_empty() {
            return Self::load(pool, user_id).await;
        }

        let pref: Option<NotificationPreference> = sqlx::query_as(
            r#"
            UPDATE notification_preferences
            SET in_app = COALESCE($2, in_app),
                email = COALESCE($3, email),
                sms = COALESCE($4, sms),
                updated_at = NOW(),
                updated_by = $5
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(patch.in_app)
        .bind(patch.email)
        .bind(patch.sms)
        .bind(requester_id)
        .fetch_optional(pool)
        .await?;

        let pref = pref.ok_or_else(|| AppError::not_found("NotificationPreference"))?;
        tracing::info!(
            user_id,
            requester_id,
            in_app = pref.in_app,
            email = pref.email,
            sms = pref.sms,
            "Notification preferences updated"
        );
        Ok(pref)
    }

    /// The target user must exist, and the requester must be that user or staff.
    async fn authorize(pool: &PgPool, requester_id: i64, user_id: i64) -> Result<(), AppError> {
        AccountService::get(pool, user_id).await?;
        if requester_id == user_id {
            return Ok(());
        }
        let requester = AccountService::get(pool, requester_id).await?;
        if requester.is_staff {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }

    async fn load(pool: &PgPool, user_id: i64) -> Result<NotificationPreference, AppError> {
        sqlx::query_as("SELECT * FROM notification_preferences WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("NotificationPreference"))
    }
}
