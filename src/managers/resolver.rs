use once_cell::sync::Lazy;
use regex::Regex;

static IPV4_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("ipv4 pattern"));

/// One raw, already-filtered line from a host list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostToken {
    raw: String,
}

impl HostToken {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            raw: raw.trim().trim_end_matches('\r').to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Token before `@` and before the first `.` — the name key resolvers and
    /// override tables key on.
    pub fn bare_name(&self) -> &str {
        let head = self.raw.split('@').next().unwrap_or(&self.raw);
        head.split('.').next().unwrap_or(head)
    }
}

/// Resolved connection identity for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub raw_token: String,
    pub canonical_address: String,
    pub domain_applied: bool,
}

/// Turn a host token into a canonical address. Never fails: every token maps
/// to a usable (if possibly unreachable) address.
///
/// Priority order: inline `host@domain` override, IPv4 literal pass-through,
/// dotted-name pass-through, bare name plus the default domain when one is
/// configured.
pub fn resolve(token: &HostToken, default_domain: &str) -> HostSpec {
    let raw = token.as_str();

    if let Some((host, domain)) = raw.split_once('@') {
        return HostSpec {
            raw_token: raw.to_string(),
            canonical_address: format!("{}.{}", host, domain.trim_start_matches('.')),
            domain_applied: true,
        };
    }

    if IPV4_PATTERN.is_match(raw) || raw.contains('.') {
        return HostSpec {
            raw_token: raw.to_string(),
            canonical_address: raw.to_string(),
            domain_applied: false,
        };
    }

    let default_domain = default_domain.trim();
    if default_domain.is_empty() {
        return HostSpec {
            raw_token: raw.to_string(),
            canonical_address: raw.to_string(),
            domain_applied: false,
        };
    }

    HostSpec {
        raw_token: raw.to_string(),
        canonical_address: format!("{}.{}", raw, default_domain.trim_start_matches('.')),
        domain_applied: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_domain_overrides_default() {
        let spec = resolve(&HostToken::new("beta@example.com"), ".lan");
        assert_eq!(spec.canonical_address, "beta.example.com");
        assert!(spec.domain_applied);
    }

    #[test]
    fn ipv4_literal_passes_through() {
        let spec = resolve(&HostToken::new("10.0.0.5"), ".lan");
        assert_eq!(spec.canonical_address, "10.0.0.5");
        assert!(!spec.domain_applied);
    }

    #[test]
    fn dotted_name_passes_through() {
        let spec = resolve(&HostToken::new("nas.home.arpa"), ".lan");
        assert_eq!(spec.canonical_address, "nas.home.arpa");
        assert!(!spec.domain_applied);
    }

    #[test]
    fn bare_name_without_domain_is_identity() {
        let spec = resolve(&HostToken::new("alpha"), "");
        assert_eq!(spec.canonical_address, "alpha");
        assert!(!spec.domain_applied);
    }

    #[test]
    fn bare_name_gets_default_domain() {
        for domain in [".lan", "lan"] {
            let spec = resolve(&HostToken::new("alpha"), domain);
            assert_eq!(spec.canonical_address, "alpha.lan");
            assert!(spec.domain_applied);
        }
    }

    #[test]
    fn whitespace_and_cr_are_stripped() {
        let spec = resolve(&HostToken::new("  alpha \r"), ".lan");
        assert_eq!(spec.raw_token, "alpha");
        assert_eq!(spec.canonical_address, "alpha.lan");
    }

    #[test]
    fn bare_name_strips_domain_and_override() {
        assert_eq!(HostToken::new("beta@example.com").bare_name(), "beta");
        assert_eq!(HostToken::new("nas.home.arpa").bare_name(), "nas");
        assert_eq!(HostToken::new("alpha").bare_name(), "alpha");
    }

    #[test]
    fn mixed_list_scenario() {
        let tokens = ["alpha", "beta@example.com", "10.0.0.5"];
        let resolved: Vec<String> = tokens
            .iter()
            .map(|raw| resolve(&HostToken::new(*raw), ".lan").canonical_address)
            .collect();
        assert_eq!(resolved, vec!["alpha.lan", "beta.example.com", "10.0.0.5"]);
    }
}
