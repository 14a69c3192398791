pub mod client_context;
pub mod error;
pub mod handlers;
pub mod router;
pub mod security_guard;

#[cfg(test)]
pub(crate) mod test_utils;
