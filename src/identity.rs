//! Identity normalization.
//!
//! Turns a loosely shaped [`ContactRecord`] into a [`ContactProfile`]
//! with every list present and every address normalized. Missing fields
//! are substituted with empty values; normalization never fails.

use sha2::{Digest, Sha256};

use crate::models::{
    Address, AddressKind, ContactProfile, ContactRecord, PostalAddress, SocialProfile, UrlEntry,
    EMBEDDING_DIMS,
};

/// Field separator fed to the hasher between identity fields.
const FIELD_SEP: &[u8] = &[0x1f];
/// Value separator fed to the hasher between list entries.
const VALUE_SEP: &[u8] = &[0x1e];

/// Stable identifier over names and raw address strings.
///
/// Any change to one of these inputs yields a different id.
pub fn contact_id(first: &str, last: &str, raw_emails: &[String], raw_phones: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(first.as_bytes());
    hasher.update(FIELD_SEP);
    hasher.update(last.as_bytes());
    hasher.update(FIELD_SEP);
    for email in raw_emails {
        hasher.update(email.as_bytes());
        hasher.update(VALUE_SEP);
    }
    hasher.update(FIELD_SEP);
    for phone in raw_phones {
        hasher.update(phone.as_bytes());
        hasher.update(VALUE_SEP);
    }
    format!("{:x}", hasher.finalize())
}

/// Build a [`ContactProfile`] from a source record.
///
/// The semantic vector starts as the all-zero placeholder.
pub fn normalize_contact(record: &ContactRecord) -> ContactProfile {
    let first_name = clean(record.first_name.as_deref());
    let last_name = clean(record.last_name.as_deref());
    let raw_emails = record.raw_emails();
    let raw_phones = record.raw_phone_numbers();

    let id = contact_id(&first_name, &last_name, &raw_emails, &raw_phones);

    let display_name = match clean(record.display_name.as_deref()) {
        name if !name.is_empty() => name,
        _ => format!("{} {}", first_name, last_name).trim().to_string(),
    };

    ContactProfile {
        id,
        display_name,
        company: clean(record.company.as_deref()),
        title: clean(record.title.as_deref()),
        emails: normalize_addresses(AddressKind::Email, &raw_emails),
        phone_numbers: normalize_addresses(AddressKind::Phone, &raw_phones),
        postal_addresses: record
            .addresses
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|a| PostalAddress {
                kind: clean(a.kind.as_deref()),
                address: clean(a.address.as_deref()),
            })
            .collect(),
        social_profiles: record
            .social_profiles
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|p| SocialProfile {
                platform: clean(p.platform.as_deref()),
                url: clean(p.url.as_deref()),
            })
            .collect(),
        urls: record
            .urls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|u| UrlEntry {
                kind: clean(u.kind.as_deref()),
                url: clean(u.url.as_deref()),
            })
            .collect(),
        notes: String::new(),
        semantic_vector: vec![0.0; EMBEDDING_DIMS],
        raw: record.raw.clone(),
        first_name,
        last_name,
    }
}

fn clean(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

fn normalize_addresses(kind: AddressKind, raw: &[String]) -> Vec<Address> {
    let mut out: Vec<Address> = Vec::with_capacity(raw.len());
    for value in raw {
        let normalized = normalize_address(kind, value);
        if normalized.is_empty() || out.iter().any(|a| a.value == normalized) {
            continue;
        }
        out.push(Address::new(kind, normalized));
    }
    out
}

/// Normalize one address value.
///
/// Emails are trimmed and lower-cased. Phone numbers keep a leading `+`
/// and their digits; formatting characters are dropped.
pub fn normalize_address(kind: AddressKind, value: &str) -> String {
    let trimmed = value.trim();
    match kind {
        AddressKind::Email => trimmed.to_lowercase(),
        AddressKind::Phone => {
            let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                String::new()
            } else if trimmed.starts_with('+') {
                format!("+{}", digits)
            } else {
                digits
            }
        }
    }
}

/// Normalize a retrieval query the way stored addresses are normalized.
///
/// Queries with an `@` are treated as emails. Queries made only of digits
/// and phone punctuation (`+ - ( ) .` and spaces) are treated as phone
/// numbers. Anything else is returned trimmed.
pub fn normalize_query(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.contains('@') {
        return normalize_address(AddressKind::Email, trimmed);
    }
    let phone_like = trimmed.chars().any(|c| c.is_ascii_digit())
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | '.' | ' '));
    if phone_like {
        normalize_address(AddressKind::Phone, trimmed)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> ContactRecord {
        ContactRecord::from_value(value).unwrap()
    }

    #[test]
    fn queries_normalize_like_addresses() {
        assert_eq!(normalize_query(" +1 (555) 010-0100 "), "+15550100100");
        assert_eq!(normalize_query("555.0100"), "5550100");
        assert_eq!(normalize_query("Ann@X.com "), "ann@x.com");
        assert_eq!(normalize_query("Ann Lee"), "Ann Lee");
        assert_eq!(normalize_query("+"), "+");
    }

    #[test]
    fn id_is_stable_for_unchanged_contact() {
        let value = json!({
            "firstName": "Ann",
            "lastName": "Lee",
            "emails": [{"address": "ann@x.com"}]
        });
        let a = normalize_contact(&record(value.clone()));
        let b = normalize_contact(&record(value));
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);
    }

    #[test]
    fn id_changes_when_hashed_field_changes() {
        let a = normalize_contact(&record(json!({
            "firstName": "Ann", "lastName": "Lee", "emails": [{"address": "ann@x.com"}]
        })));
        let b = normalize_contact(&record(json!({
            "firstName": "Ann", "lastName": "Lee", "emails": [{"address": "ann@y.com"}]
        })));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn id_separates_fields() {
        // "AnnLee" + "" must not collide with "Ann" + "Lee".
        let a = contact_id("AnnLee", "", &[], &[]);
        let b = contact_id("Ann", "Lee", &[], &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let profile = normalize_contact(&record(json!({})));
        assert_eq!(profile.first_name, "");
        assert_eq!(profile.last_name, "");
        assert_eq!(profile.display_name, "");
        assert!(profile.emails.is_empty());
        assert!(profile.phone_numbers.is_empty());
        assert!(profile.postal_addresses.is_empty());
        assert!(profile.social_profiles.is_empty());
        assert!(profile.urls.is_empty());
        assert_eq!(profile.semantic_vector.len(), EMBEDDING_DIMS);
    }

    #[test]
    fn display_name_falls_back_to_full_name() {
        let profile = normalize_contact(&record(json!({"firstName": "Ann", "lastName": "Lee"})));
        assert_eq!(profile.display_name, "Ann Lee");
    }

    #[test]
    fn addresses_are_normalized_and_deduplicated() {
        let profile = normalize_contact(&record(json!({
            "emails": [{"address": " Ann@X.com "}, {"address": "ann@x.com"}, {"address": ""}],
            "phoneNumbers": [{"address": "+1 (555) 123-4567"}, {"address": "555.987"}]
        })));
        let emails: Vec<&str> = profile.emails.iter().map(|a| a.value.as_str()).collect();
        let phones: Vec<&str> = profile
            .phone_numbers
            .iter()
            .map(|a| a.value.as_str())
            .collect();
        assert_eq!(emails, vec!["ann@x.com"]);
        assert_eq!(phones, vec!["+15551234567", "555987"]);
    }

    #[test]
    fn nested_lists_are_copied() {
        let profile = normalize_contact(&record(json!({
            "addresses": [{"type": "home", "address": "1 Main St"}],
            "socialProfiles": [{"platform": "x"}],
            "urls": [{"url": "https://ann.dev"}]
        })));
        assert_eq!(profile.postal_addresses[0].kind, "home");
        assert_eq!(profile.social_profiles[0].url, "");
        assert_eq!(profile.urls[0].url, "https://ann.dev");
    }
}
