//! Redaction tokens embedded in archived configuration text.

use crate::ident::Identifier;

/// Render the token that stands in for a secret in archived text.
pub fn redaction_token(id: &Identifier) -> String {
    format!("<secret hidden: {}>", id)
}

/// Replace every occurrence of `secret` in `line` with its redaction token.
///
/// Returns the line unchanged when the secret is empty or absent.
pub fn redact_line(line: &str, secret: &str, id: &Identifier) -> String {
    if secret.is_empty() {
        return line.to_string();
    }
    line.replace(secret, &redaction_token(id))
}
