//! Email address handling.

/// Split a `Name <mailbox>` display form into `(name, mailbox)`.
///
/// The mailbox comes back lowercased; surrounding quotes on the display
/// name are dropped. Input without an angle-bracket pair is treated as a
/// bare address with no name.
pub fn split_display_address(raw: &str) -> (Option<String>, String) {
    let raw = raw.trim();

    if let Some((display, rest)) = raw.rsplit_once('<') {
        if let Some(end) = rest.find('>') {
            let mailbox = rest[..end].trim().to_ascii_lowercase();
            let display = display.trim().trim_matches('"').trim();
            let name = if display.is_empty() {
                None
            } else {
                Some(display.to_string())
            };
            return (name, mailbox);
        }
    }

    (None, raw.to_ascii_lowercase())
}

/// Normalize an address for identity comparison.
///
/// Lowercases, drops `+tag` subaddressing, and ignores dots in the local
/// part on Gmail domains, so `S.Ortiz+news@Gmail.com` and
/// `sortiz@gmail.com` compare equal.
pub fn normalize_email(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();

    let Some(at) = lowered.find('@') else {
        return lowered;
    };
    let domain = &lowered[at + 1..];
    let local = lowered[..at]
        .split_once('+')
        .map_or(&lowered[..at], |(base, _)| base);

    let strip_dots = matches!(domain, "gmail.com" | "googlemail.com");
    let local: String = local.chars().filter(|c| !(strip_dots && *c == '.')).collect();

    format!("{}@{}", local, domain)
}

/// Whether `candidate` is the same mailbox as `account`, after
/// normalization.
pub fn is_self(candidate: &str, account: &str) -> bool {
    normalize_email(candidate) == normalize_email(account)
}
