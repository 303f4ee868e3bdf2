use url::Url;

/// Drops query and fragment, keeping `origin + path`.
///
/// Input that does not parse as a URL with a real origin is cut at the first
/// `?` or `#` instead. Never fails and is idempotent.
pub fn normalize(raw: &str) -> String {
    if let Ok(parsed) = Url::parse(raw) {
        let origin = parsed.origin();
        if origin.is_tuple() {
            return format!("{}{}", origin.ascii_serialization(), parsed.path());
        }
    }
    truncate_at_query(raw).to_owned()
}

fn truncate_at_query(raw: &str) -> &str {
    match raw.find(['?', '#']) {
        Some(idx) => &raw[..idx],
        None => raw,
    }
}
