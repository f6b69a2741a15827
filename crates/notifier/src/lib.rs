pub mod channels;
pub mod handlers;
pub mod retry;
pub mod schedule;
pub mod worker;
