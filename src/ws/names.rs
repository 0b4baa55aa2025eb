//! Display name cleaning and moderation

use rand::Rng;

pub const MAX_NAME_LEN: usize = 14;
/// Rejected join attempts before the connection is dropped
pub const MAX_NAME_ATTEMPTS: u32 = 5;

const DEFAULT_NAME: &str = "Sniper";

/// Matched anywhere in the normalized name
const SUBSTRING_BANS: &[&str] = &[
    "fuck", "shit", "nigger", "nigga", "bitch", "slut", "nazi", "hitler", "milf", "cunt",
    "retard", "dick", "diddy", "epstein", "diddle", "rape", "pedo", "rapist", "porn",
    "mussolini", "stalin", "trump", "cock", "israel", "genocide", "homicide", "suicide",
    "genocidal", "suicidal", "homicidal", "arson",
];

/// Only banned as the whole normalized name
const WORD_ONLY_BANS: &[&str] = &["ass"];

const RESERVED: &[&str] = &[
    "bobby",
    "rob",
    "eliminator",
    "spectrebolt",
    "admin",
    "server",
    "saifkayyali3",
    "sunbul-k",
    "you",
    "player",
    "skayyali3",
];

const TLDS: &[&str] = &[
    "com", "net", "org", "io", "gg", "dev", "app", "xyz", "tv", "me", "co", "info", "site", "online",
];

/// Why a requested name was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NameRejection {
    #[error("name must contain a letter")]
    NoLetters,
    #[error("links are not allowed")]
    Link,
    #[error("only English letters, digits, space, '_', '.' and '-' (max 14)")]
    Charset,
    #[error("name is reserved")]
    Reserved,
    #[error("name is inappropriate")]
    Banned,
}

/// Trim and truncate the requested name, generating one when it is empty
/// or the stock "Sniper". Anything else must pass [`validate_name`].
pub fn resolve_name<R: Rng + ?Sized>(requested: Option<&str>, rng: &mut R) -> Result<String, NameRejection> {
    let name: String = requested
        .unwrap_or_default()
        .trim()
        .chars()
        .take(MAX_NAME_LEN)
        .collect();

    if name.is_empty() || name.eq_ignore_ascii_case(DEFAULT_NAME) {
        return Ok(format!("{DEFAULT_NAME}{}", rng.gen_range(1000..=9999)));
    }

    validate_name(&name)?;
    Ok(name)
}

pub fn validate_name(name: &str) -> Result<(), NameRejection> {
    if name.trim().is_empty() || !name.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(NameRejection::NoLetters);
    }

    let lower = name.to_lowercase();
    if lower.contains("http://") || lower.contains("https://") || lower.contains("www.") {
        return Err(NameRejection::Link);
    }
    if looks_like_domain(&lower) {
        return Err(NameRejection::Link);
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-');
    if name.chars().count() > MAX_NAME_LEN || !name.chars().all(allowed) {
        return Err(NameRejection::Charset);
    }

    let normalized = normalize(&lower);
    let collapsed = collapse_repeats(&normalized);

    if [lower.as_str(), normalized.as_str(), collapsed.as_str()]
        .iter()
        .any(|candidate| RESERVED.contains(candidate))
    {
        return Err(NameRejection::Reserved);
    }

    if SUBSTRING_BANS
        .iter()
        .any(|w| normalized.contains(w) || collapsed.contains(w))
    {
        return Err(NameRejection::Banned);
    }
    if WORD_ONLY_BANS.contains(&normalized.as_str()) {
        return Err(NameRejection::Banned);
    }

    Ok(())
}

/// Undo common leetspeak and keep only a-z
fn normalize(lower: &str) -> String {
    lower
        .chars()
        .filter_map(|c| match c {
            '0' => Some('o'),
            '1' | '!' => Some('i'),
            '2' => Some('z'),
            '3' => Some('e'),
            '4' | '@' => Some('a'),
            '5' | '$' => Some('s'),
            '7' => Some('t'),
            '8' => Some('b'),
            '9' => Some('g'),
            c if c.is_ascii_lowercase() => Some(c),
            _ => None,
        })
        .collect()
}

/// "fuuuck" -> "fuck"
fn collapse_repeats(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if !out.ends_with(c) {
            out.push(c);
        }
    }
    out
}

/// `label.tld` where the label is at least two of [a-z0-9-] and the tld is
/// a known one ending at a word boundary
fn looks_like_domain(lower: &str) -> bool {
    let chars: Vec<char> = lower.chars().collect();
    let is_label = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';

    chars.iter().enumerate().any(|(dot, &c)| {
        if c != '.' {
            return false;
        }
        let label = chars[..dot].iter().rev().take_while(|&&c| is_label(c)).count();
        if label < 2 {
            return false;
        }
        let tld: String = chars[dot + 1..].iter().take_while(|&&c| is_word(c)).collect();
        TLDS.contains(&tld.as_str())
    })
}

/// Per-connection count of rejected names
#[derive(Debug, Default)]
pub struct NamingStrikes {
    count: u32,
}

/// What to tell a connection after a rejected name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrikeOutcome {
    Retry(String),
    Disconnect(String),
}

impl NamingStrikes {
    pub fn strike(&mut self) -> StrikeOutcome {
        self.count += 1;
        if self.count >= MAX_NAME_ATTEMPTS {
            return StrikeOutcome::Disconnect("Disconnected for repeated naming violations.".to_string());
        }
        StrikeOutcome::Retry(format!(
            "Inappropriate name, or reserved name, or name doesn't use English letters/numbers (max {MAX_NAME_LEN}), retry again while fulfilling these requirements {} attempts left.",
            MAX_NAME_ATTEMPTS - self.count
        ))
    }
}
