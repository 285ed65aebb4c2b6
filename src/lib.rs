//! terms-bot: guided onboarding and Terms & Conditions generation over
//! chat channels.

pub mod artifacts;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod profile;
pub mod render;
pub mod session;
