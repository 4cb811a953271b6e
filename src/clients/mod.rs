pub mod channel;
pub mod database;
pub mod health;
pub mod memory;
pub mod push;
pub mod realtime;
pub mod redis;
pub mod sms;
pub mod store;
