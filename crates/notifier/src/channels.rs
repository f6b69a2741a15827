//! Delivery channels.
//!
//! Email and SMS are mocked: delivery is a log line and always succeeds.
//! A real provider would implement `DeliveryChannel` and replace the mock
//! in `TaskContext`.

use smartnotify_common::error::AppError;
use smartnotify_common::types::ChannelKind;

/// Longest SMS body sent; longer messages are cut.
pub const SMS_MAX_CHARS: usize = 160;

/// Who a delivery is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: i64,
    pub email: String,
    pub mobile: Option<String>,
}

/// Outbound delivery over one channel.
pub trait DeliveryChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Send `message` to `recipient`. Returns whether the provider accepted it.
    fn send(&self, recipient: &Recipient, subject: &str, message: &str) -> Result<bool, AppError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockEmailChannel;

impl DeliveryChannel for MockEmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn send(&self, recipient: &Recipient, subject: &str, message: &str) -> Result<bool, AppError> {
        tracing::info!(
            user_id = recipient.user_id,
            body_len = message.len(),
            "Mock email to {}: {}",
            recipient.email,
            subject
        );
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockSmsChannel;

impl DeliveryChannel for MockSmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    fn send(&self, recipient: &Recipient, _subject: &str, message: &str) -> Result<bool, AppError> {
        tracing::info!(
            user_id = recipient.user_id,
            mobile = recipient.mobile.as_deref().unwrap_or(""),
            "Mock SMS to {}: {}",
            recipient.email,
            sms_body(message)
        );
        Ok(true)
    }
}

/// First `SMS_MAX_CHARS` characters of `message`.
pub fn sms_body(message: &str) -> &str {
    match message.char_indices().nth(SMS_MAX_CHARS) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}
