use url::Url;

use crate::settings::Settings;

/// Domains tracked out of the box.
pub const BUILT_IN_DOMAINS: [&str; 10] = [
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "linkedin.com",
    "reddit.com",
    "youtube.com",
    "snapchat.com",
    "pinterest.com",
];

/// Maps a navigated URL to a tracked platform key.
///
/// Built-in domains match by substring containment so regional subdomains
/// (`m.facebook.com`, `de-de.facebook.com`) resolve to the same key. Custom
/// domains only match exactly or as a `.domain` suffix, so a custom entry
/// cannot accidentally swallow unrelated hostnames.
///
/// Non-http(s) schemes and unparseable URLs classify as `None`.
pub fn classify(url: &str, settings: &Settings) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(host.as_str());

    if let Some(domain) = BUILT_IN_DOMAINS.iter().find(|domain| host.contains(*domain)) {
        return Some((*domain).to_string());
    }

    settings
        .platforms
        .iter()
        .filter(|(_, config)| config.is_custom)
        .find(|(domain, _)| host == domain.as_str() || host.ends_with(&format!(".{domain}")))
        .map(|(domain, _)| domain.clone())
}

/// Cleans up user-entered domain input (`HTTPS://WWW.Example.com/x` becomes
/// `example.com`). Returns `None` when no hostname can be extracted.
pub fn normalize_domain(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = Url::parse(&with_scheme).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(host.as_str()).to_string())
}

/// Display name for a built-in domain, falling back to the domain itself.
pub fn display_name(domain: &str) -> &str {
    match domain {
        "facebook.com" => "Facebook",
        "instagram.com" => "Instagram",
        "twitter.com" => "Twitter",
        "x.com" => "X (Twitter)",
        "tiktok.com" => "TikTok",
        "linkedin.com" => "LinkedIn",
        "reddit.com" => "Reddit",
        "youtube.com" => "YouTube",
        "snapchat.com" => "Snapchat",
        "pinterest.com" => "Pinterest",
        other => other,
    }
}

/// Emoji icon for a built-in domain; everything else gets the globe.
pub fn icon(domain: &str) -> &'static str {
    match domain {
        "facebook.com" => "📘",
        "instagram.com" => "📷",
        "twitter.com" => "🐦",
        "x.com" => "❌",
        "tiktok.com" => "🎵",
        "linkedin.com" => "💼",
        "reddit.com" => "🤖",
        "youtube.com" => "📺",
        "snapchat.com" => "👻",
        "pinterest.com" => "📌",
        _ => "🌐",
    }
}
