pub mod account;
pub mod activity;
pub mod applications;
pub mod health;
pub mod oauth;
pub mod sessions;

pub use health::health_check;
