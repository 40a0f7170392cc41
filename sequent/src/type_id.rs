//! Tag-based event identifiers.
//!
//! An event id is a TypeID-style string `"<prefix>_<26-char ulid>"` with a total
//! length of at most [`MAX_TYPE_ID_LEN`]. The prefix is the underscore-joined list of
//! the event's tag keys, each sanitized and sorted ascending, so ids of events tagged
//! with the same dimensions sort and group together while the ULID suffix keeps each
//! id unique.
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use ulid::Ulid;

use crate::event::Tag;

/// Maximum length of a generated event id.
pub const MAX_TYPE_ID_LEN: usize = 64;

/// Length of the ULID suffix.
const SUFFIX_LEN: usize = 26;

/// Maximum length of the prefix, leaving room for the `_` separator and the suffix.
const MAX_PREFIX_LEN: usize = MAX_TYPE_ID_LEN - SUFFIX_LEN - 1;

/// Sanitizes a tag key for use in an id prefix: lowercase, any run of
/// non-alphanumeric characters collapsed to a single `_`, leading and trailing `_`
/// stripped.
fn sanitize_key(key: &str) -> String {
    lazy_static! {
        static ref NON_ALNUM: Regex = Regex::new("[^a-z0-9]+").unwrap();
    }
    let lowered = key.to_lowercase();
    NON_ALNUM
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Generates a tag-based id for an event.
///
/// The prefix is deterministic for a given set of tag keys; the suffix is a fresh
/// ULID per call. Keys whose sanitized form is empty are skipped, and the prefix is
/// truncated so the id never exceeds [`MAX_TYPE_ID_LEN`].
pub fn generate_tag_based_type_id(tags: &[Tag]) -> String {
    let keys: BTreeSet<String> = tags
        .iter()
        .map(|tag| sanitize_key(tag.key()))
        .filter(|key| !key.is_empty())
        .collect();
    let mut prefix = keys.into_iter().collect::<Vec<_>>().join("_");
    if prefix.len() > MAX_PREFIX_LEN {
        prefix.truncate(MAX_PREFIX_LEN);
        prefix = prefix.trim_end_matches('_').to_string();
    }
    let suffix = Ulid::new().to_string();
    if prefix.is_empty() {
        suffix
    } else {
        format!("{prefix}_{suffix}")
    }
}

/// Extracts the unique suffix from a tag-based id.
///
/// Given an id of the form `a_b_..._XXXXXXXXXXXXXXXXXXXXXXXXXX` where the trailing 26
/// characters are the ULID, returns that suffix; otherwise returns the input
/// unchanged.
pub fn extract_uuid_from_type_id(id: &str) -> &str {
    match id.rsplit_once('_') {
        Some((_, suffix))
            if suffix.len() == SUFFIX_LEN && suffix.bytes().all(|b| b.is_ascii_alphanumeric()) =>
        {
            suffix
        }
        _ => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags;
    use std::collections::HashSet;

    #[test]
    fn it_generates_a_stable_prefix_and_unique_suffixes() {
        let tags = tags! {"course_id" => "c1", "student_id" => "s1"};
        let mut suffixes = HashSet::new();
        for _ in 0..100 {
            let id = generate_tag_based_type_id(&tags);
            assert!(id.starts_with("course_id_student_id_"), "id: {id}");
            assert!(id.len() <= MAX_TYPE_ID_LEN);
            let suffix = extract_uuid_from_type_id(&id);
            assert_eq!(suffix.len(), 26);
            suffixes.insert(suffix.to_string());
        }
        assert_eq!(suffixes.len(), 100);
    }

    #[test]
    fn the_prefix_sorts_keys_ascending() {
        let id = generate_tag_based_type_id(&tags! {"student_id" => "s1", "course_id" => "c1"});
        assert!(id.starts_with("course_id_student_id_"));
    }

    #[test]
    fn it_sanitizes_keys() {
        let id = generate_tag_based_type_id(&tags! {"Course--ID" => "c1"});
        assert!(id.starts_with("course_id_"));

        let id = generate_tag_based_type_id(&tags! {"__order.id__" => "o1"});
        assert!(id.starts_with("order_id_"));
    }

    #[test]
    fn it_skips_keys_that_sanitize_to_nothing() {
        let id = generate_tag_based_type_id(&tags! {"???" => "v"});
        assert_eq!(id.len(), 26);
        assert_eq!(extract_uuid_from_type_id(&id), id);
    }

    #[test]
    fn it_caps_the_id_length() {
        let tags = tags! {
            "a_very_long_tag_key_number_one" => "v",
            "a_very_long_tag_key_number_two" => "v",
            "a_very_long_tag_key_number_three" => "v"
        };
        let id = generate_tag_based_type_id(&tags);
        assert!(id.len() <= MAX_TYPE_ID_LEN, "id too long: {id}");
        assert_eq!(extract_uuid_from_type_id(&id).len(), 26);
    }

    #[test]
    fn extract_returns_the_input_when_there_is_no_suffix() {
        assert_eq!(extract_uuid_from_type_id("not-a-type-id"), "not-a-type-id");
        assert_eq!(extract_uuid_from_type_id("short_suffix"), "short_suffix");
    }
}
