// src/identity/normalize.rs
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUNS: Lazy<Option<Regex>> = Lazy::new(|| match Regex::new(r"\s+") {
    Ok(re) => Some(re),
    Err(e) => {
        warn!("Invalid whitespace pattern, falling back to token join: {}", e);
        None
    }
});

/// Canonical form of a free-text site name: trimmed, with every internal run
/// of whitespace collapsed to one space. Total and idempotent; an empty result
/// means the record carries no identity.
pub fn normalize(raw_name: &str) -> String {
    let trimmed = raw_name.trim();
    match WHITESPACE_RUNS.as_ref() {
        Some(re) => re.replace_all(trimmed, " ").into_owned(),
        None => trimmed.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

pub fn normalize_optional(raw_name: Option<&str>) -> String {
    raw_name.map(normalize).unwrap_or_default()
}

pub fn has_identity(canonical_name: &str) -> bool {
    !canonical_name.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_internal_whitespace() {
        assert_eq!(normalize("Spring Creek  -  I35"), "Spring Creek - I35");
        assert_eq!(normalize("  Bird\tCreek \n"), "Bird Creek");
        assert_eq!(normalize("Spring Creek - I35"), "Spring Creek - I35");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "",
            "   ",
            "Coal Creek",
            " Little  River:\u{00a0}Hwy 3 ",
            "Tenmile\r\nCreek",
            "Illinois River - Watts",
        ];
        for raw in samples {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_missing_names_have_no_identity() {
        assert_eq!(normalize_optional(None), "");
        assert!(!has_identity(&normalize("  \t ")));
        assert!(has_identity(&normalize("X")));
    }
}
