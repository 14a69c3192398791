pub mod accounts;
pub mod reset_notifier;
pub mod reset_tokens;
