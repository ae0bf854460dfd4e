use crate::config::CountryConfig;

/// Normalize a raw postcode value to the canonical 4-digit form used by both
/// the transaction log and the boundary data.
pub fn normalize_postcode(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() < 4 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("{trimmed:0>4}")
    } else {
        trimmed.to_string()
    }
}

/// Map a postcode to its jurisdiction via the shared range table.
///
/// Pure function of the config's range table: parse the postcode to an
/// integer, soft-fail to `None` on non-numeric input, and return the first
/// jurisdiction whose inclusive ranges contain it.
pub fn resolve_province(config: &CountryConfig, postcode: &str) -> Option<&'static str> {
    let postcode_num: u32 = postcode.trim().parse().ok()?;
    config
        .postcode_ranges()
        .iter()
        .find(|(_, ranges)| {
            ranges
                .iter()
                .any(|(start, end)| (*start..=*end).contains(&postcode_num))
        })
        .map(|(jurisdiction, _)| *jurisdiction)
}

/// Test whether a postcode falls inside any of the given jurisdictions'
/// ranges. Used by the geometry provider's postcode filtering so that it
/// stays in lockstep with `resolve_province`.
pub fn postcode_in_jurisdictions(
    config: &CountryConfig,
    postcode: &str,
    jurisdictions: &[String],
) -> bool {
    match resolve_province(config, postcode) {
        Some(province) => jurisdictions.iter().any(|j| j == province),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_postcodes() {
        let config = CountryConfig::australia();
        assert_eq!(resolve_province(&config, "2000"), Some("New South Wales"));
        assert_eq!(resolve_province(&config, "2601"), Some("Australian Capital Territory"));
        assert_eq!(resolve_province(&config, "3150"), Some("Victoria"));
        assert_eq!(resolve_province(&config, "9999"), Some("Queensland"));
        assert_eq!(resolve_province(&config, "0850"), Some("Northern Territory"));
    }

    #[test]
    fn non_numeric_postcode_resolves_to_none() {
        let config = CountryConfig::australia();
        assert_eq!(resolve_province(&config, "AB1"), None);
        assert_eq!(resolve_province(&config, ""), None);
    }

    #[test]
    fn out_of_range_postcode_resolves_to_none() {
        let config = CountryConfig::australia();
        assert_eq!(resolve_province(&config, "0100"), None);
        assert_eq!(resolve_province(&config, "8500"), None);
    }

    #[test]
    fn resolve_is_idempotent() {
        let config = CountryConfig::australia();
        let first = resolve_province(&config, "4000");
        let second = resolve_province(&config, "4000");
        assert_eq!(first, second);
    }

    #[test]
    fn normalizes_short_numeric_postcodes() {
        assert_eq!(normalize_postcode("800"), "0800");
        assert_eq!(normalize_postcode(" 2000 "), "2000");
        assert_eq!(normalize_postcode("AB1"), "AB1");
    }

    #[test]
    fn jurisdiction_membership_follows_resolution() {
        let config = CountryConfig::australia();
        let included = vec!["Queensland".to_string(), "Victoria".to_string()];
        assert!(postcode_in_jurisdictions(&config, "4000", &included));
        assert!(postcode_in_jurisdictions(&config, "3000", &included));
        assert!(!postcode_in_jurisdictions(&config, "2000", &included));
        assert!(!postcode_in_jurisdictions(&config, "bad", &included));
    }
}
