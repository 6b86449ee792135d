//! Identifier and email normalization.

use sealmail_types::KeyInfo;

/// Canonical form of a key id or fingerprint: upper-case hex without
/// whitespace or a `0x` prefix.
pub fn normalize_id(id: &str) -> String {
    let id = id.trim();
    let id = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id);
    id.chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Normalizes every id in `ids`, dropping empties and duplicates while
/// keeping first-seen order.
pub fn normalize_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        let id = normalize_id(id.as_ref());
        if !id.is_empty() && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Pulls the address out of a user id such as `Alice <alice@example.com>`.
/// A bare address is accepted too.
pub fn email_from_user_id(user_id: &str) -> Option<String> {
    let candidate = match (user_id.rfind('<'), user_id.rfind('>')) {
        (Some(open), Some(close)) if open < close => &user_id[open + 1..close],
        _ => user_id,
    };
    let candidate = candidate.trim();
    let at = candidate.find('@')?;
    if at == 0 || at + 1 == candidate.len() || candidate.contains(char::is_whitespace) {
        return None;
    }
    Some(candidate.to_lowercase())
}

/// Returns the key with normalized ids and lower-cased, de-duplicated emails.
/// Applying it twice yields the same value.
pub fn normalize(key: KeyInfo) -> KeyInfo {
    let (family, mut parts) = key.into_parts();
    parts.id = normalize_id(&parts.id);
    parts.key_ids = normalize_ids(
        std::iter::once(parts.id.as_str()).chain(parts.key_ids.iter().map(String::as_str)),
    );

    let mut emails: Vec<String> = Vec::new();
    for email in &parts.emails {
        let email = email.trim().to_lowercase();
        if !email.is_empty() && !emails.contains(&email) {
            emails.push(email);
        }
    }
    parts.emails = emails;
    KeyInfo::from_parts(family, parts)
}
