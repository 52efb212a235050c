//! Keyword matching for inbound-message auto-replies

use crate::types::ChatbotRule;

/// First enabled rule whose keyword occurs in `body`, ignoring case
pub fn match_rule<'a>(rules: &'a [ChatbotRule], body: &str) -> Option<&'a ChatbotRule> {
    let body = body.to_lowercase();
    rules
        .iter()
        .filter(|rule| rule.is_enabled && !rule.keyword.is_empty())
        .find(|rule| body.contains(&rule.keyword.to_lowercase()))
}
