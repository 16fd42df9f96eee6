use intake_form_contract::{
    CONSENT_FIELDS, RESERVED_KEYS, SIGNATURE_FIELDS, SIGNATURE_KEY_PREFIX, SUMMARY_SECTIONS,
};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;

static LABELS: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();

fn labels() -> &'static HashMap<&'static str, &'static str> {
    LABELS.get_or_init(|| {
        let mut map = HashMap::new();
        for section in SUMMARY_SECTIONS.iter() {
            for field in section.fields {
                map.insert(field.key, field.label);
            }
        }
        for field in CONSENT_FIELDS.iter() {
            map.insert(field.key, field.label);
        }
        for signer in SIGNATURE_FIELDS.iter() {
            map.insert(signer.key, signer.label);
        }
        map
    })
}

/// Display label for a submission key: the registered label, or the key with
/// its first character upper-cased.
pub fn label(key: &str) -> Cow<'static, str> {
    if let Some(label) = labels().get(key) {
        return Cow::Borrowed(label);
    }
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => Cow::Owned(first.to_uppercase().chain(chars).collect()),
        None => Cow::Borrowed(""),
    }
}

pub fn is_registered(key: &str) -> bool {
    labels().contains_key(key)
}

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Signature keys and their raw `...Data` values are never summary answers.
pub fn is_signature_key(key: &str) -> bool {
    key.starts_with(SIGNATURE_KEY_PREFIX)
}

/// True for keys the summary may list as a labelled answer.
pub fn is_listable_key(key: &str) -> bool {
    !key.is_empty() && !is_reserved_key(key) && !is_signature_key(key)
}
