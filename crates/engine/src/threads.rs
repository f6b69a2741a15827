//! Threads, subscriptions and comments.
//!
//! Posting a comment is the event that triggers notifications. The comment
//! and its notifications commit together; delivery tasks are queued after.

use redis::aio::ConnectionManager;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use utoipa::ToSchema;

use smartnotify_common::error::AppError;
use smartnotify_common::tasks::TaskQueue;
use smartnotify_common::types::{Comment, Thread, ThreadSubscription, ThreadSummary};

use crate::dispatch::{DispatchSummary, log_summary, prepare_comment_dispatch};
use crate::validate::{Errors, parse_pk, required_str};

const MAX_TITLE_CHARS: usize = 255;

/// Service layer for threads and their subscriptions.
pub struct ThreadService;

/// Service layer for comments.
pub struct CommentService;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateThreadParams {
    pub title: Option<String>,
}

/// `thread` is kept as raw JSON so a bad reference reports a field error
/// instead of failing body deserialization.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SubscribeParams {
    #[schema(value_type = Option<i64>)]
    pub thread: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateCommentParams {
    pub content: Option<String>,
    #[schema(value_type = Option<i64>)]
    pub thread: Option<Value>,
}

impl ThreadService {
    /// Create a thread; the creator is subscribed to it automatically.
    pub async fn create(
        pool: &PgPool,
        user_id: i64,
        params: &CreateThreadParams,
    ) -> Result<Thread, AppError> {
        let mut errors = Errors::new();
        let title = required_str(&mut errors, "title", &params.title);
        if let Some(title) = title
            && title.chars().count() > MAX_TITLE_CHARS
        {
            errors.add(
                "title",
                format!("Ensure this field has no more than {} characters.", MAX_TITLE_CHARS),
            );
        }
        errors.into_result()?;
        let Some(title) = title else {
            return Err(AppError::Internal("title missing after validation".to_string()));
        };

        let mut tx = pool.begin().await?;

        let thread: Thread = sqlx::query_as(
            r#"
            INSERT INTO threads (title, created_by, updated_by)
            VALUES ($1, $2, $2)
            RETURNING *
            "#,
        )
        .bind(title.trim())
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO thread_subscriptions (thread_id, user_id, created_by)
            VALUES ($1, $2, $2)
            ON CONFLICT (thread_id, user_id) DO NOTHING
            "#,
        )
        .bind(thread.id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(thread_id = thread.id, user_id, "Thread created");
        Ok(thread)
    }

    /// List all threads, oldest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<ThreadSummary>, AppError> {
        let threads: Vec<ThreadSummary> =
            sqlx::query_as("SELECT id, title FROM threads ORDER BY id")
                .fetch_all(pool)
                .await?;
        Ok(threads)
    }

    /// Resolve a `thread` reference field, recording a field error if it is
    /// malformed or points at nothing.
    async fn resolve_thread(
        pool: &PgPool,
        errors: &mut Errors,
        value: Option<&Value>,
    ) -> Result<Option<Thread>, AppError> {
        let id = match parse_pk(value) {
            Ok(id) => id,
            Err(msg) => {
                errors.add("thread", msg);
                return Ok(None);
            }
        };

        let thread: Option<Thread> = sqlx::query_as("SELECT * FROM threads WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        if thread.is_none() {
            errors.add(
                "thread",
                format!("Invalid pk \"{}\" - object does not exist.", id),
            );
        }
        Ok(thread)
    }

    /// Subscribe a user to a thread. Subscribing twice is a validation error.
    pub async fn subscribe(
        pool: &PgPool,
        user_id: i64,
        params: &SubscribeParams,
    ) -> Result<ThreadSubscription, AppError> {
        let mut errors = Errors::new();
        let thread = Self::resolve_thread(pool, &mut errors, params.thread.as_ref()).await?;
        errors.into_result()?;
        let Some(thread) = thread else {
            return Err(AppError::Internal("thread missing after validation".to_string()));
        };

        let subscription: Option<ThreadSubscription> = sqlx::query_as(
            r#"
            INSERT INTO thread_subscriptions (thread_id, user_id, created_by)
            VALUES ($1, $2, $2)
            ON CONFLICT (thread_id, user_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(thread.id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        let subscription = subscription.ok_or_else(|| {
            AppError::field(
                "Thread Subscription",
                "Thread Subscription already exists for this user.",
            )
        })?;

        tracing::info!(thread_id = thread.id, user_id, "Subscribed to thread");
        Ok(subscription)
    }
}

impl CommentService {
    /// Post a comment and notify the thread's other subscribers.
    pub async fn create(
        pool: &PgPool,
        redis: &mut ConnectionManager,
        queue: &TaskQueue,
        user_id: i64,
        params: &CreateCommentParams,
    ) -> Result<(Comment, DispatchSummary), AppError> {
        let mut errors = Errors::new();
        let content = required_str(&mut errors, "content", &params.content);
        let thread =
            ThreadService::resolve_thread(pool, &mut errors, params.thread.as_ref()).await?;
        errors.into_result()?;
        let (Some(content), Some(thread)) = (content, thread) else {
            return Err(AppError::Internal("comment fields missing after validation".to_string()));
        };

        let mut tx = pool.begin().await?;
        let comment: Comment = sqlx::query_as(
            r#"
            INSERT INTO comments (content, thread_id, user_id, created_by, updated_by)
            VALUES ($1, $2, $3, $3, $3)
            RETURNING *
            "#,
        )
        .bind(content)
        .bind(thread.id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        let prepared = prepare_comment_dispatch(&mut *tx, &comment).await?;
        tx.commit().await?;

        tracing::info!(comment_id = comment.id, thread_id = thread.id, user_id, "Comment created");

        let summary = prepared.enqueue(pool, redis, queue).await;
        log_summary(&comment, &summary);
        Ok((comment, summary))
    }
}
