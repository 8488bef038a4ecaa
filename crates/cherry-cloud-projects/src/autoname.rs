//! Name generation for projects created without an explicit name

use rand::Rng;

/// Random hex characters appended to a generated name
const RANDOM_LEN: usize = 6;

/// Maximum length of a generated name
const MAX_LEN: usize = 28;

/// Determine the name for an auto-named field.
///
/// Priority:
/// 1. User provided value.
/// 2. Value from the previous inputs.
/// 3. A generated `<prefix>-<hex>` name.
pub fn autoname(arg: Option<&str>, prefix: &str, prior: Option<&str>) -> String {
    if let Some(name) = arg.filter(|n| !n.is_empty()) {
        return name.to_string();
    }

    if let Some(name) = prior.filter(|n| !n.is_empty()) {
        return name.to_string();
    }

    unique_hex(prefix)
}

fn unique_hex(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..RANDOM_LEN)
        .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect();

    let max_prefix = MAX_LEN - RANDOM_LEN - 1;
    let prefix: String = prefix.chars().take(max_prefix).collect();
    format!("{}-{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_generated(name: &str, prefix: &str) -> bool {
        let Some(suffix) = name.strip_prefix(&format!("{}-", prefix)) else {
            return false;
        };
        suffix.len() == RANDOM_LEN && suffix.chars().all(|c| c.is_ascii_hexdigit())
    }

    #[test]
    fn test_user_value_wins() {
        assert_eq!(autoname(Some("mine"), "test", Some("old")), "mine");
    }

    #[test]
    fn test_prior_value_is_kept() {
        assert_eq!(autoname(None, "test", Some("old")), "old");
        assert_eq!(autoname(Some(""), "test", Some("old")), "old");
    }

    #[test]
    fn test_generated_name() {
        let name = autoname(None, "test", None);
        assert!(is_generated(&name, "test"), "unexpected name {}", name);
        assert!(name.len() <= MAX_LEN);

        let other = autoname(None, "test", Some(""));
        assert!(is_generated(&other, "test"));
    }

    #[test]
    fn test_generated_name_is_truncated() {
        let name = autoname(None, "a-very-long-logical-resource-name", None);
        assert_eq!(name.len(), MAX_LEN);
        assert!(name.starts_with("a-very-long-logical-"));
    }
}
