//! Per-scope request throttling backed by Redis fixed windows.
//!
//! Keys: `throttle:{scope}:{ident}:{window}` where `window` is the Unix time
//! divided by the scope's period. The first hit in a window sets the expiry.

use chrono::Utc;
use redis::AsyncCommands;

use smartnotify_common::error::AppError;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

const MINUTE: u64 = 60;
const DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub limit: u64,
    pub period_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleScope {
    User,
    Anon,
    Login,
    UnreadNotifications,
    MarkNotificationsRead,
    NotificationHistory,
    NotificationPrefGet,
    NotificationPrefPatch,
}

impl ThrottleScope {
    pub fn name(&self) -> &'static str {
        match self {
            ThrottleScope::User => "user",
            ThrottleScope::Anon => "anon",
            ThrottleScope::Login => "login",
            ThrottleScope::UnreadNotifications => "unread_notifications",
            ThrottleScope::MarkNotificationsRead => "mark_notifications_read",
            ThrottleScope::NotificationHistory => "notification_history",
            ThrottleScope::NotificationPrefGet => "notification_pref_get",
            ThrottleScope::NotificationPrefPatch => "notification_pref_patch",
        }
    }

    pub fn rate(&self) -> Rate {
        let (limit, period_secs) = match self {
            ThrottleScope::User => (100, DAY),
            ThrottleScope::Anon => (20, DAY),
            ThrottleScope::Login => (5, MINUTE),
            ThrottleScope::UnreadNotifications
            | ThrottleScope::MarkNotificationsRead
            | ThrottleScope::NotificationHistory => (60, MINUTE),
            ThrottleScope::NotificationPrefGet => (10, MINUTE),
            ThrottleScope::NotificationPrefPatch => (5, MINUTE),
        };
        Rate { limit, period_secs }
    }
}

/// Who a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ident {
    User(i64),
    Ip(String),
}

impl Ident {
    pub fn for_request(auth: Option<&AuthUser>, ip: &str) -> Self {
        match auth {
            Some(user) => Ident::User(user.user_id),
            None => Ident::Ip(ip.to_string()),
        }
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ident::User(id) => write!(f, "user:{}", id),
            Ident::Ip(ip) => write!(f, "ip:{}", ip),
        }
    }
}

/// Redis key for the window containing `now_secs`, plus seconds until that
/// window closes.
pub fn window_key(scope: ThrottleScope, ident: &Ident, now_secs: u64) -> (String, u64) {
    let period = scope.rate().period_secs;
    let window = now_secs / period;
    let remaining = period - now_secs % period;
    (
        format!("throttle:{}:{}:{}", scope.name(), ident, window),
        remaining,
    )
}

/// Count this request against `scope` and reject it once the limit is hit.
pub async fn check(state: &AppState, scope: ThrottleScope, ident: &Ident) -> Result<(), AppError> {
    if !state.config.throttle_enabled {
        return Ok(());
    }

    let now_secs = Utc::now().timestamp().max(0) as u64;
    let (key, remaining) = window_key(scope, ident, now_secs);
    let rate = scope.rate();

    let mut redis = state.redis.clone();
    let count: u64 = redis.incr(&key, 1u64).await?;
    if count == 1 {
        let _: () = redis.expire(&key, rate.period_secs as i64).await?;
    }

    if count > rate.limit {
        tracing::warn!(
            scope = scope.name(),
            ident = %ident,
            count,
            limit = rate.limit,
            "Request throttled"
        );
        return Err(AppError::Throttled(remaining));
    }
    Ok(())
}

/// Default throttles for general endpoints: `user` when authenticated,
/// `anon` otherwise.
pub async fn check_user_or_anon(
    state: &AppState,
    auth: Option<&AuthUser>,
    ip: &str,
) -> Result<(), AppError> {
    let ident = Ident::for_request(auth, ip);
    let scope = match ident {
        Ident::User(_) => ThrottleScope::User,
        Ident::Ip(_) => ThrottleScope::Anon,
    };
    check(state, scope, &ident).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        assert_eq!(ThrottleScope::Login.rate(), Rate { limit: 5, period_secs: 60 });
        assert_eq!(ThrottleScope::User.rate(), Rate { limit: 100, period_secs: 86_400 });
        assert_eq!(ThrottleScope::Anon.rate().limit, 20);
        assert_eq!(ThrottleScope::NotificationPrefGet.rate().limit, 10);
        assert_eq!(ThrottleScope::NotificationPrefPatch.rate().limit, 5);
        assert_eq!(ThrottleScope::NotificationHistory.rate().limit, 60);
    }

    #[test]
    fn test_window_key_and_remaining() {
        let (key, remaining) = window_key(ThrottleScope::Login, &Ident::User(7), 125);
        assert_eq!(key, "throttle:login:user:7:2");
        assert_eq!(remaining, 55);

        let (key, _) = window_key(ThrottleScope::Anon, &Ident::Ip("1.2.3.4".into()), 86_399);
        assert_eq!(key, "throttle:anon:ip:1.2.3.4:0");
    }

    #[test]
    fn test_same_window_same_key() {
        let ident = Ident::Ip("10.0.0.1".into());
        let (a, _) = window_key(ThrottleScope::UnreadNotifications, &ident, 600);
        let (b, _) = window_key(ThrottleScope::UnreadNotifications, &ident, 659);
        let (c, _) = window_key(ThrottleScope::UnreadNotifications, &ident, 660);
        assert_eq!(a, b);
        assert_ne!(b, c);
    }
}
