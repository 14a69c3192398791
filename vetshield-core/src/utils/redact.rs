//! Helpers that keep personal data out of security logs

/// Number of identifier hint characters kept in logs.
pub const VISIBLE_HINT_CHARS: usize = 3;

/// Maximum number of client agent characters kept in logs.
pub const MAX_CLIENT_AGENT_CHARS: usize = 50;

/// Keep only the first few characters of an identifier hint
///
/// # Returns
/// The visible prefix followed by `***`, or `***` alone for an empty hint.
pub fn redact_identifier_hint(hint: &str) -> String {
    let visible: String = hint.chars().take(VISIBLE_HINT_CHARS).collect();
    format!("{visible}***")
}

/// Truncate a client agent string so log lines stay bounded
pub fn truncate_client_agent(agent: &str) -> String {
    agent.chars().take(MAX_CLIENT_AGENT_CHARS).collect()
}

/// Mask an e-mail address, keeping the first character of the local part
/// and the domain.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{first}***@{domain}")
        }
        None => redact_identifier_hint(email),
    }
}
