/// A static permission declared by the host, per spec §4.5.
#[derive(Debug, Clone)]
pub struct PermissionDef {
    pub name: String,
    pub restricted: bool,
    pub admin_only: bool,
}

impl PermissionDef {
    pub const fn new(name: &'static str, restricted: bool, admin_only: bool) -> StaticPermissionDef {
        StaticPermissionDef {
            name,
            restricted,
            admin_only,
        }
    }
}

/// `const`-constructible variant used by internal apps to declare their
/// default permission sets at registration time.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermissionDef {
    pub name: &'static str,
    pub restricted: bool,
    pub admin_only: bool,
}

impl From<StaticPermissionDef> for PermissionDef {
    fn from(def: StaticPermissionDef) -> Self {
        PermissionDef {
            name: def.name.to_string(),
            restricted: def.restricted,
            admin_only: def.admin_only,
        }
    }
}

/// Prefix for dynamic host-reachability permissions, e.g. `url:github.com`.
pub const URL_PERMISSION_PREFIX: &str = "url:";

/// Wildcard object granting any host.
pub const ANY_HOST: &str = "*";

/// Suffix-wildcard host matching: a grant for `example.com` authorizes
/// `api.example.com`; a grant for `*` authorizes any host.
pub fn url_host_matches(granted: &str, requested: &str) -> bool {
    if granted == ANY_HOST {
        return true;
    }
    if granted == requested {
        return true;
    }
    requested
        .strip_suffix(granted)
        .map(|prefix| prefix.ends_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_anything() {
        assert!(url_host_matches("*", "api.github.com"));
    }

    #[test]
    fn exact_match() {
        assert!(url_host_matches("github.com", "github.com"));
    }

    #[test]
    fn subdomain_matches_parent_grant() {
        assert!(url_host_matches("github.com", "api.github.com"));
    }

    #[test]
    fn unrelated_suffix_does_not_match() {
        assert!(!url_host_matches("github.com", "evilgithub.com"));
    }

    #[test]
    fn sibling_host_does_not_match() {
        assert!(!url_host_matches("github.com", "gitlab.com"));
    }
}
