//! Tool key derivation
//!
//! Every registered tool is addressed by `<integration-slug>-<action-key>`.
//! The key is capped at [`MAX_TOOL_KEY_LEN`] so that it stays under the
//! protocol's own key-length ceiling once a server-level prefix is added.

/// Maximum length of a generated tool key. Leaves buffer for the server name.
pub const MAX_TOOL_KEY_LEN: usize = 40;

/// Normalize an integration display name into a slug: lowercase, runs of
/// non-alphanumeric characters collapse to a single hyphen, no leading or
/// trailing hyphen.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Derive the tool key for an (integration slug, action key) pair.
///
/// Keys longer than [`MAX_TOOL_KEY_LEN`] are truncated from the right. No
/// collision detection runs after truncation; two actions that truncate to
/// the same key overwrite each other within one server instance.
pub fn tool_key(slug: &str, action_key: &str) -> String {
    let key = format!("{}-{}", slug, action_key);
    if key.chars().count() > MAX_TOOL_KEY_LEN {
        let truncated: String = key.chars().take(MAX_TOOL_KEY_LEN).collect();
        tracing::debug!(from = %key, to = %truncated, "tool key truncated");
        truncated
    } else {
        key
    }
}
