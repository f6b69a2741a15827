//! A user's notification inbox: unread list, history and mark-as-read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use utoipa::ToSchema;

use smartnotify_common::error::AppError;
use smartnotify_common::pagination::{Listing, Page, PageRequest};
use smartnotify_common::types::{CommentView, ThreadSummary};

use crate::validate::{REQUIRED, json_type_name};

pub struct InboxService;

/// Flat row from the notifications / comments / threads join.
#[derive(Debug, Clone, sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    message: String,
    created_at: DateTime<Utc>,
    is_read: bool,
    in_app_status: bool,
    email_status: bool,
    sms_status: bool,
    comment_content: Option<String>,
    comment_thread_id: Option<i64>,
    comment_user_id: Option<i64>,
    comment_created_at: Option<DateTime<Utc>>,
    thread_id: Option<i64>,
    thread_title: Option<String>,
}

/// Notification as returned to its recipient.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct NotificationView {
    pub id: i64,
    pub comment: Option<CommentView>,
    pub thread: Option<ThreadSummary>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub in_app_status: bool,
    pub email_status: bool,
    pub sms_status: bool,
}

impl From<NotificationRow> for NotificationView {
    fn from(row: NotificationRow) -> Self {
        let comment = match (
            row.comment_content,
            row.comment_thread_id,
            row.comment_user_id,
            row.comment_created_at,
        ) {
            (Some(content), Some(thread), Some(user), Some(created_at)) => Some(CommentView {
                content,
                thread,
                user,
                created_at,
            }),
            _ => None,
        };
        let thread = match (row.thread_id, row.thread_title) {
            (Some(id), Some(title)) => Some(ThreadSummary { id, title }),
            _ => None,
        };
        Self {
            id: row.id,
            comment,
            thread,
            message: row.message,
            created_at: row.created_at,
            is_read: row.is_read,
            in_app_status: row.in_app_status,
            email_status: row.email_status,
            sms_status: row.sms_status,
        }
    }
}

/// Body of the mark-as-read request. Kept as raw JSON for field-level errors.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct MarkReadParams {
    #[schema(value_type = Option<Vec<i64>>)]
    pub notification_ids: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MarkReadResult {
    pub notification_ids: Vec<i64>,
    pub updated: u64,
}

/// Validate `notification_ids`: a non-empty list of integers. Duplicates
/// are dropped and the result is sorted.
pub fn parse_notification_ids(value: Option<&Value>) -> Result<Vec<i64>, AppError> {
    let field = "notification_ids";
    let items = match value {
        None | Some(Value::Null) => return Err(AppError::field(field, REQUIRED)),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(AppError::field(
                field,
                format!(
                    "Expected a list of items but got type \"{}\".",
                    json_type_name(other)
                ),
            ));
        }
    };
    if items.is_empty() {
        return Err(AppError::field(field, "This list may not be empty."));
    }

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let id = match item {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match id {
            Some(id) => ids.push(id),
            None => return Err(AppError::field(field, "A valid integer is required.")),
        }
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

/// `{1, 2}` rendering of an id set.
fn format_id_set(ids: &[i64]) -> String {
    let inner: Vec<String> = ids.iter().map(i64::to_string).collect();
    format!("{{{}}}", inner.join(", "))
}

impl InboxService {
    /// The user's unread notifications, newest first.
    pub async fn unread(
        pool: &PgPool,
        user_id: i64,
        page: Option<PageRequest>,
        path: &str,
    ) -> Result<Listing<NotificationView>, AppError> {
        Self::listing(pool, user_id, true, page, path).await
    }

    /// Every notification the user has received, newest first.
    pub async fn history(
        pool: &PgPool,
        user_id: i64,
        page: Option<PageRequest>,
        path: &str,
    ) -> Result<Listing<NotificationView>, AppError> {
        Self::listing(pool, user_id, false, page, path).await
    }

    /// Mark the given notifications read. Every id must belong to the user;
    /// otherwise nothing is updated.
    pub async fn mark_read(
        pool: &PgPool,
        user_id: i64,
        params: &MarkReadParams,
    ) -> Result<MarkReadResult, AppError> {
        let ids = parse_notification_ids(params.notification_ids.as_ref())?;

        let owned: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM notifications WHERE recipient_id = $1 AND id = ANY($2)",
        )
        .bind(user_id)
        .bind(&ids)
        .fetch_all(pool)
        .await?;

        let missing: Vec<i64> = ids.iter().copied().filter(|id| !owned.contains(id)).collect();
        if !missing.is_empty() {
            return Err(AppError::field(
                "notification_ids",
                format!(
                    "Notifications not found or not owned by you: {}",
                    format_id_set(&missing)
                ),
            ));
        }

        let updated = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = true, updated_at = NOW(), updated_by = $1
            WHERE recipient_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(&ids)
        .execute(pool)
        .await?
        .rows_affected();

        tracing::info!(user_id, updated, "Notifications marked as read");
        Ok(MarkReadResult {
            notification_ids: ids,
            updated,
        })
    }

    async fn listing(
        pool: &PgPool,
        user_id: i64,
        unread_only: bool,
        page: Option<PageRequest>,
        path: &str,
    ) -> Result<Listing<NotificationView>, AppError> {
        let Some(page) = page else {
            let rows = Self::fetch(pool, user_id, unread_only, None, None).await?;
            return Ok(Listing::Full(rows.into_iter().map(NotificationView::from).collect()));
        };

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE recipient_id = $1 AND (NOT $2 OR is_read = false)
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(pool)
        .await?;
        let count = count.max(0) as u64;

        let window = page.window(count)?;
        let rows = Self::fetch(
            pool,
            user_id,
            unread_only,
            Some(window.limit()),
            Some(window.offset()),
        )
        .await?;
        let results = rows.into_iter().map(NotificationView::from).collect();
        Ok(Listing::Paged(Page::new(&window, count, results, path)))
    }

    async fn fetch(
        pool: &PgPool,
        user_id: i64,
        unread_only: bool,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<NotificationRow>, AppError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT n.id, n.message, n.created_at, n.is_read,
                   n.in_app_status, n.email_status, n.sms_status,
                   c.content AS comment_content,
                   c.thread_id AS comment_thread_id,
                   c.user_id AS comment_user_id,
                   c.created_at AS comment_created_at,
                   t.id AS thread_id,
                   t.title AS thread_title
            FROM notifications n
            LEFT JOIN comments c ON c.id = n.comment_id
            LEFT JOIN threads t ON t.id = c.thread_id
            WHERE n.recipient_id = $1 AND (NOT $2 OR n.is_read = false)
            ORDER BY n.created_at DESC, n.id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset.unwrap_or(0))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_error(err: AppError) -> String {
        let AppError::Validation(fields) = err else {
            panic!("expected validation error, got {:?}", err);
        };
        fields["notification_ids"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_ids_must_be_present() {
        let err = parse_notification_ids(None).unwrap_err();
        assert_eq!(field_error(err), REQUIRED);
    }

    #[test]
    fn test_ids_must_be_a_list() {
        let err = parse_notification_ids(Some(&json!("1,2"))).unwrap_err();
        assert_eq!(field_error(err), "Expected a list of items but got type \"str\".");
    }

    #[test]
    fn test_ids_list_not_empty() {
        let err = parse_notification_ids(Some(&json!([]))).unwrap_err();
        assert_eq!(field_error(err), "This list may not be empty.");
    }

    #[test]
    fn test_ids_must_be_integers() {
        let err = parse_notification_ids(Some(&json!([1, "x"]))).unwrap_err();
        assert_eq!(field_error(err), "A valid integer is required.");
    }

    #[test]
    fn test_ids_sorted_and_deduped() {
        let ids = parse_notification_ids(Some(&json!([3, "1", 3, 2]))).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_format_id_set() {
        assert_eq!(format_id_set(&[4, 9]), "{4, 9}");
        assert_eq!(format_id_set(&[7]), "{7}");
    }

    #[test]
    fn test_view_without_comment_has_null_links() {
        let now = Utc::now();
        let row = NotificationRow {
            id: 1,
            message: "You have 2 unread notifications from this week.".to_string(),
            created_at: now,
            is_read: false,
            in_app_status: true,
            email_status: false,
            sms_status: false,
            comment_content: None,
            comment_thread_id: None,
            comment_user_id: None,
            comment_created_at: None,
            thread_id: None,
            thread_title: None,
        };
        let json = serde_json::to_value(NotificationView::from(row)).unwrap();
        assert!(json["comment"].is_null());
        assert!(json["thread"].is_null());
        assert_eq!(json["in_app_status"], true);
    }

    #[test]
    fn test_view_with_comment() {
        let now = Utc::now();
        let row = NotificationRow {
            id: 2,
            message: "New comment on 'T' by a@example.com".to_string(),
            created_at: now,
            is_read: true,
            in_app_status: true,
            email_status: true,
            sms_status: false,
            comment_content: Some("hello".to_string()),
            comment_thread_id: Some(5),
            comment_user_id: Some(8),
            comment_created_at: Some(now),
            thread_id: Some(5),
            thread_title: Some("T".to_string()),
        };
        let view = NotificationView::from(row);
        assert_eq!(view.thread, Some(ThreadSummary { id: 5, title: "T".to_string() }));
        let comment = view.comment.unwrap();
        assert_eq!(comment.content, "hello");
        assert_eq!(comment.user, 8);
    }
}
