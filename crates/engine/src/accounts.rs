//! Account service: registration, login with device tracking, and the
//! unknown-device alert.
//!
//! A login from a device fingerprint the user has not used before (and not
//! on their very first login) queues an `UnknownDevice` task. The worker
//! turns that into a notification via `notify_unknown_device`.

use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;
use utoipa::ToSchema;

use smartnotify_common::error::AppError;
use smartnotify_common::tasks::{Task, TaskQueue};
use smartnotify_common::types::{NotificationPreference, User};

use crate::dispatch::{ChannelSwitches, enqueue_staged, stage_deliveries};
use crate::password::{self, MIN_LENGTH};
use crate::validate::{Errors, check_email, required_str};

pub const UNKNOWN_DEVICE_MESSAGE: &str = "Unknown device login detected";
pub const UNKNOWN_DEVICE_SUBJECT: &str = "Unknown Device Detected";

const INVALID_CREDENTIALS: &str = "Invalid email or password.";

/// Service layer for user accounts.
pub struct AccountService;

/// Parameters for self-registration.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RegisterParams {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

/// What registration echoes back (passwords are write-only).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegisteredUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile: Option<String>,
}

impl From<&User> for RegisteredUser {
    fn from(user: &User) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            mobile: user.mobile.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LoginParams {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Where a login request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub ip: String,
    pub user_agent: String,
}

impl DeviceInfo {
    /// Hex SHA-256 of `"{ip}_{user_agent}"`.
    pub fn fingerprint(&self) -> String {
        let raw = format!("{}_{}", self.ip, self.user_agent);
        hex::encode(Sha256::digest(raw.as_bytes()))
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    /// The device fingerprint had not been seen for this user.
    pub new_device: bool,
    /// Id of the queued unknown-device task, if one was queued.
    pub alert_task: Option<Uuid>,
}

/// Validate a mobile number: `98` followed by exactly eight digits.
pub fn validate_mobile(mobile: &str) -> Result<(), String> {
    if mobile.chars().count() < 10 {
        return Err("Ensure this field has at least 10 characters.".to_string());
    }
    let well_formed = mobile.len() == 10
        && mobile.starts_with("98")
        && mobile.chars().all(|c| c.is_ascii_digit());
    if !well_formed {
        return Err("Mobile number must start with '98' and be exactly 10 digits.".to_string());
    }
    Ok(())
}

/// Notification body for an unknown-device alert.
pub fn unknown_device_message(device: &DeviceInfo) -> String {
    format!(
        "{}\n\nDevice Info:\nIP: {}\nUser Agent: {}",
        UNKNOWN_DEVICE_MESSAGE, device.ip, device.user_agent
    )
}

impl AccountService {
    /// Register a user and create their default notification preferences.
    pub async fn register(pool: &PgPool, params: &RegisterParams) -> Result<User, AppError> {
        let mut errors = Errors::new();

        let email = required_str(&mut errors, "email", &params.email);
        if let Some(email) = email {
            check_email(&mut errors, "email", email);
            if !errors.has("email") && Self::email_taken(pool, email).await? {
                errors.add("email", "User already exists.");
            }
        }

        let mobile = required_str(&mut errors, "mobile", &params.mobile);
        if let Some(mobile) = mobile {
            if let Err(msg) = validate_mobile(mobile) {
                errors.add("mobile", msg);
            } else if Self::mobile_taken(pool, mobile).await? {
                errors.add("mobile", "Mobile Number already exists.");
            }
        }

        let password = required_str(&mut errors, "password", &params.password);
        if let Some(password) = password {
            if password.chars().count() < MIN_LENGTH {
                errors.add(
                    "password",
                    format!("Ensure this field has at least {} characters.", MIN_LENGTH),
                );
            } else {
                let problems = password::validate_password(password, email);
                if !problems.is_empty() {
                    errors.add("password", problems.join(" "));
                }
            }
        }

        let confirm = required_str(&mut errors, "confirm_password", &params.confirm_password);
        if let Some(confirm) = confirm
            && confirm.chars().count() < MIN_LENGTH
        {
            errors.add(
                "confirm_password",
                format!("Ensure this field has at least {} characters.", MIN_LENGTH),
            );
        }

        errors.into_result()?;

        // Field checks passed, so every required value is present.
        let (Some(email), Some(mobile), Some(password), Some(confirm)) =
            (email, mobile, password, confirm)
        else {
            return Err(AppError::Internal("registration fields missing after validation".to_string()));
        };

        if password != confirm {
            return Err(AppError::field("password", "Password fields didn't match."));
        }

        let password_hash = password::hash_password(password)?;
        let first_name = params.first_name.clone().unwrap_or_default();
        let last_name = params.last_name.clone().unwrap_or_default();

        let mut tx = pool.begin().await?;

        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (email, mobile, password_hash, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(mobile)
        .bind(&password_hash)
        .bind(first_name.trim())
        .bind(last_name.trim())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        Self::ensure_preferences(&mut tx, user.id).await?;
        tx.commit().await?;

        tracing::info!(user_id = user.id, email = %user.email, "User registered");
        Ok(user)
    }

    /// Check credentials; inactive accounts never authenticate.
    pub async fn authenticate(pool: &PgPool, email: &str, password: &str) -> Result<User, AppError> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await?;

        match user {
            Some(user) if user.is_active && password::verify_password(password, &user.password_hash)? => {
                Ok(user)
            }
            _ => Err(AppError::field("authorization", INVALID_CREDENTIALS)),
        }
    }

    /// Authenticate, record the device, and flag unknown devices.
    pub async fn login(
        pool: &PgPool,
        redis: &mut ConnectionManager,
        queue: &TaskQueue,
        params: &LoginParams,
        device: &DeviceInfo,
    ) -> Result<LoginOutcome, AppError> {
        let mut errors = Errors::new();
        let email = required_str(&mut errors, "email", &params.email);
        let password = required_str(&mut errors, "password", &params.password);
        if let Some(email) = email {
            check_email(&mut errors, "email", email);
        }
        errors.into_result()?;
        let (Some(email), Some(password)) = (email, password) else {
            return Err(AppError::Internal("login fields missing after validation".to_string()));
        };

        let user = Self::authenticate(pool, email, password).await?;
        let fingerprint = device.fingerprint();

        let new_device: bool = sqlx::query_scalar(
            r#"
            INSERT INTO known_devices (user_id, device_fingerprint, ip_address, user_agent)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, device_fingerprint) DO UPDATE SET last_used = NOW()
            RETURNING (xmax = 0)
            "#,
        )
        .bind(user.id)
        .bind(&fingerprint)
        .bind(&device.ip)
        .bind(&device.user_agent)
        .fetch_one(pool)
        .await?;

        let mut alert_task = None;
        if new_device && !user.first_login {
            let task = Task::UnknownDevice {
                user_id: user.id,
                ip: device.ip.clone(),
                user_agent: device.user_agent.clone(),
                fingerprint: fingerprint.clone(),
            };
            match queue.enqueue(redis, task).await {
                Ok(task_id) => alert_task = Some(task_id),
                Err(e) => tracing::error!(
                    user_id = user.id,
                    error = %e,
                    "Failed to queue unknown device alert"
                ),
            }
        }

        sqlx::query("UPDATE users SET first_login = false, last_login = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(pool)
            .await?;

        tracing::info!(
            user_id = user.id,
            new_device,
            first_login = user.first_login,
            "User logged in"
        );

        Ok(LoginOutcome {
            user,
            new_device,
            alert_task,
        })
    }

    /// Load a user by id.
    pub async fn get(pool: &PgPool, user_id: i64) -> Result<User, AppError> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    /// Create a staff superuser (admin command).
    pub async fn create_superuser(
        pool: &PgPool,
        email: &str,
        password: &str,
        mobile: Option<&str>,
    ) -> Result<User, AppError> {
        let mut errors = Errors::new();
        check_email(&mut errors, "email", email);
        if let Some(mobile) = mobile
            && let Err(msg) = validate_mobile(mobile)
        {
            errors.add("mobile", msg);
        }
        let problems = password::validate_password(password, Some(email));
        if !problems.is_empty() {
            errors.add("password", problems.join(" "));
        }
        errors.into_result()?;

        let password_hash = password::hash_password(password)?;
        let mut tx = pool.begin().await?;

        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (email, mobile, password_hash, is_staff, is_superuser)
            VALUES ($1, $2, $3, true, true)
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(mobile)
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        Self::ensure_preferences(&mut tx, user.id).await?;
        tx.commit().await?;

        tracing::info!(user_id = user.id, email = %user.email, "Superuser created");
        Ok(user)
    }

    /// Create the unknown-device notification and queue its deliveries.
    ///
    /// Users without a preference row get the defaults (in-app only).
    /// Returns the id of the new notification.
    pub async fn notify_unknown_device(
        pool: &PgPool,
        redis: &mut ConnectionManager,
        queue: &TaskQueue,
        user_id: i64,
        device: &DeviceInfo,
    ) -> Result<i64, AppError> {
        let user = Self::get(pool, user_id).await?;

        let pref: Option<NotificationPreference> =
            sqlx::query_as("SELECT * FROM notification_preferences WHERE user_id = $1")
                .bind(user.id)
                .fetch_optional(pool)
                .await?;
        let switches = pref.as_ref().map(ChannelSwitches::from).unwrap_or_default();

        let mut tx = pool.begin().await?;
        let notification_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (recipient_id, message, in_app_status)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(user.id)
        .bind(unknown_device_message(device))
        .bind(switches.in_app)
        .fetch_one(&mut *tx)
        .await?;
        let staged = stage_deliveries(
            &mut *tx,
            notification_id,
            &switches,
            UNKNOWN_DEVICE_SUBJECT,
            UNKNOWN_DEVICE_MESSAGE,
        )
        .await?;
        tx.commit().await?;

        let tasks = enqueue_staged(pool, redis, queue, staged)
            .await
            .pop()
            .unwrap_or_default();

        tracing::info!(
            user_id = user.id,
            notification_id,
            ip = %device.ip,
            email_task = ?tasks.email,
            sms_task = ?tasks.sms,
            "Unknown device notification created"
        );

        Ok(notification_id)
    }

    async fn email_taken(pool: &PgPool, email: &str) -> Result<bool, AppError> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(pool)
            .await?;
        Ok(taken)
    }

    async fn mobile_taken(pool: &PgPool, mobile: &str) -> Result<bool, AppError> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE mobile = $1)")
            .bind(mobile)
            .fetch_one(pool)
            .await?;
        Ok(taken)
    }

    async fn ensure_preferences(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        user_id: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO notification_preferences (user_id, created_by)
            VALUES ($1, $1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

/// Turn a unique-constraint race on `users` into the matching field error.
fn map_unique_violation(err: sqlx::Error) -> AppError {
    if let Some(db) = err.as_database_error()
        && db.is_unique_violation()
    {
        let constraint = db.constraint().unwrap_or_default();
        if constraint.contains("mobile") {
            return AppError::field("mobile", "Mobile Number already exists.");
        }
        return AppError::field("email", "User already exists.");
    }
    AppError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_sha256_of_ip_and_agent() {
        let device = DeviceInfo {
            ip: "127.0.0.1".to_string(),
            user_agent: "curl/8.0".to_string(),
        };
        let fp = device.fingerprint();
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, hex::encode(Sha256::digest(b"127.0.0.1_curl/8.0")));
    }

    #[test]
    fn test_fingerprint_changes_with_agent() {
        let a = DeviceInfo {
            ip: "10.0.0.1".to_string(),
            user_agent: "Firefox".to_string(),
        };
        let b = DeviceInfo {
            user_agent: "Chrome".to_string(),
            ..a.clone()
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_validate_mobile() {
        assert!(validate_mobile("9812345678").is_ok());
        assert!(validate_mobile("981234").unwrap_err().contains("at least 10"));
        assert!(validate_mobile("9712345678").unwrap_err().contains("start with '98'"));
        assert!(validate_mobile("98123456789").is_err());
        assert!(validate_mobile("98123x5678").is_err());
    }

    #[test]
    fn test_unknown_device_message_includes_device() {
        let device = DeviceInfo {
            ip: "192.168.1.4".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
        };
        let msg = unknown_device_message(&device);
        assert!(msg.starts_with(UNKNOWN_DEVICE_MESSAGE));
        assert!(msg.contains("IP: 192.168.1.4"));
        assert!(msg.contains("User Agent: Mozilla/5.0"));
    }
}
