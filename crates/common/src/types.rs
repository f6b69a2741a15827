use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Delivery channel a notification can go out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelKind {
    InApp,
    Email,
    Sms,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::InApp => write!(f, "in_app"),
            ChannelKind::Email => write!(f, "email"),
            ChannelKind::Sms => write!(f, "sms"),
        }
    }
}

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub mobile: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub first_login: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

/// Public projection of a user returned by the login endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub mobile: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            mobile: user.mobile.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

/// A device (ip + user agent fingerprint) a user has logged in from.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KnownDevice {
    pub id: i64,
    pub user_id: i64,
    pub device_fingerprint: String,
    pub ip_address: String,
    pub user_agent: String,
    pub last_used: DateTime<Utc>,
}

/// A discussion thread users can subscribe to.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Thread {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
}

/// `{id, title}` projection of a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ThreadSummary {
    pub id: i64,
    pub title: String,
}

impl From<&Thread> for ThreadSummary {
    fn from(thread: &Thread) -> Self {
        Self {
            id: thread.id,
            title: thread.title.clone(),
        }
    }
}

/// A comment posted on a thread. Creating one is the notification trigger.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub thread_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
}

/// `{content, thread, user, created_at}` projection of a comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CommentView {
    pub content: String,
    pub thread: i64,
    pub user: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Comment> for CommentView {
    fn from(comment: &Comment) -> Self {
        Self {
            content: comment.content.clone(),
            thread: comment.thread_id,
            user: comment.user_id,
            created_at: comment.created_at,
        }
    }
}

/// Membership of a user in a thread's notification audience.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ThreadSubscription {
    pub id: i64,
    pub thread_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
}

/// Per-user channel switches.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationPreference {
    pub id: i64,
    pub user_id: i64,
    pub in_app: bool,
    pub email: bool,
    pub sms: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
}

impl NotificationPreference {
    /// Whether the preference enables the given channel.
    pub fn allows(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::InApp => self.in_app,
            ChannelKind::Email => self.email,
            ChannelKind::Sms => self.sms,
        }
    }
}

/// `{user, in_app, email, sms}` projection of a preference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PreferenceView {
    pub user: i64,
    pub in_app: bool,
    pub email: bool,
    pub sms: bool,
}

impl From<&NotificationPreference> for PreferenceView {
    fn from(pref: &NotificationPreference) -> Self {
        Self {
            user: pref.user_id,
            in_app: pref.in_app,
            email: pref.email,
            sms: pref.sms,
        }
    }
}

/// A notification addressed to one user.
///
/// `email_task_id` / `sms_task_id` hold the id of the queued delivery task
/// while it is outstanding and are cleared once the worker records a result.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub comment_id: Option<i64>,
    pub in_app_status: bool,
    pub email_status: bool,
    pub sms_status: bool,
    pub is_read: bool,
    pub message: String,
    pub email_task_id: Option<String>,
    pub sms_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_allows_channels() {
        let now = Utc::now();
        let pref = NotificationPreference {
            id: 1,
            user_id: 7,
            in_app: true,
            email: false,
            sms: true,
            created_at: now,
            updated_at: now,
            created_by: None,
            updated_by: None,
        };
        assert!(pref.allows(ChannelKind::InApp));
        assert!(!pref.allows(ChannelKind::Email));
        assert!(pref.allows(ChannelKind::Sms));
        assert_eq!(
            PreferenceView::from(&pref),
            PreferenceView {
                user: 7,
                in_app: true,
                email: false,
                sms: true
            }
        );
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let user = User {
            id: 1,
            email: "a@example.com".to_string(),
            mobile: None,
            password_hash: "$argon2id$secret".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            first_login: true,
            last_login: None,
            date_joined: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "a@example.com");
    }
}
