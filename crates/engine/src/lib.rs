pub mod accounts;
pub mod dispatch;
pub mod inbox;
pub mod password;
pub mod preferences;
pub mod summary;
pub mod threads;
pub mod validate;
