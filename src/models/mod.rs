pub mod delivery;
pub mod health;
pub mod nearby;
pub mod notification;
pub mod response;
pub mod retry;
pub mod stats;
pub mod validation;
