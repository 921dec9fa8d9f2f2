//! Lazily-resolved, mostly-sticky capability flags and the version
//! normalization that feeds them.

/// Cluster version normalized per the rules below at or above which the
/// server-side reporter and modern management features are assumed.
pub const MODERN_VERSION: i64 = 121_300;

/// Tri-state capability flag.
///
/// Every flag resolves at most once (`Unknown -> Resolved`); a resolved
/// flag never flips back. The single sanctioned exception is the
/// reporter-availability downgrade, expressed by [`Flag::downgrade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flag {
    #[default]
    Unknown,
    Resolved(bool),
}

impl Flag {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Flag::Unknown)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Flag::Resolved(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Flag::Resolved(false))
    }

    /// First resolution wins; later calls are no-ops.
    pub fn resolve(&mut self, value: bool) {
        if self.is_unknown() {
            *self = Flag::Resolved(value);
        }
    }

    /// Permanent downgrade to `false`. The only legal transition out of
    /// `Resolved(true)`, used when a reporter execution attempt fails.
    pub fn downgrade(&mut self) {
        *self = Flag::Resolved(false);
    }
}

/// Per-connection capability flags, mutated only by the refresh task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilityFlags {
    /// Server-side batch report execution usable. May be downgraded
    /// true -> false within a session, never upgraded back.
    pub reporter_available: Flag,
    /// Cluster version >= [`MODERN_VERSION`].
    pub modern_cluster: Flag,
    pub federation_configured: Flag,
    pub extend_configured: Flag,
    pub http_proxy_configured: Flag,
    pub persistence_configured: Flag,
    pub coherence_web_configured: Flag,
    pub elastic_data_configured: Flag,
    pub jcache_configured: Flag,
    pub hotcache_configured: Flag,
    /// Pre-aggregated bulk cache responses supported by the REST backend.
    pub rest_cache_aggregation_available: Flag,
}

/// Normalizes a raw cluster version string into a comparable integer.
///
/// Rules, preserved exactly from the historical numbering scheme:
/// everything after the first space is dropped, a `-SNAPSHOT` suffix is
/// dropped, remaining `-` become `.`. A `3.5*` version maps to the
/// constant `353` (numbering discontinuity that cannot be derived
/// arithmetically). A `2*` (year-based) version is padded to a 7-digit
/// magnitude, which intentionally collides e.g. `20.06.1` and
/// `20.06.10`. Anything else is the remaining digits read directly.
pub fn normalize_version(raw: &str) -> i64 {
    let version = raw.split(' ').next().unwrap_or_default();
    let version = match version.find("-SNAPSHOT") {
        Some(idx) => &version[..idx],
        None => version,
    };
    let version = version.replace('-', ".");

    if version.starts_with("3.5") {
        return 353;
    }

    let digits: String = version.chars().filter(|c| *c != '.').collect();
    let parsed = digits.parse::<i64>().unwrap_or(0);
    if version.starts_with('2') {
        let padding = 7u32.saturating_sub(digits.len() as u32);
        parsed * 10i64.pow(padding)
    } else {
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("3.5.0", 353)]
    #[case("3.5", 353)]
    #[case("20.06", 2_006_000)]
    #[case("20.06.1", 2_006_100)]
    // Intentional collision with 20.06.1, inherited behavior.
    #[case("20.06.10", 2_006_100)]
    #[case("12.2.1.4.0", 122_140)]
    #[case("12.2.1.4.0 (build 12345)", 122_140)]
    #[case("14.1.1-0-0", 141_100)]
    #[case("22.06.1-SNAPSHOT build", 2_206_100)]
    fn normalizes_version_strings(#[case] raw: &str, #[case] expected: i64) {
        assert_eq!(normalize_version(raw), expected);
    }

    #[test]
    fn garbage_version_normalizes_to_zero() {
        assert_eq!(normalize_version("unknown"), 0);
    }

    #[rstest]
    #[case(121_300, true)]
    #[case(121_299, false)]
    fn modern_threshold_is_inclusive(#[case] normalized: i64, #[case] modern: bool) {
        assert_eq!(normalized >= MODERN_VERSION, modern);
    }

    #[test]
    fn flag_resolution_is_sticky() {
        let mut flag = Flag::default();
        assert!(flag.is_unknown());
        flag.resolve(true);
        assert!(flag.is_true());
        flag.resolve(false);
        assert!(flag.is_true());
    }

    #[test]
    fn downgrade_is_permanent() {
        let mut flag = Flag::default();
        flag.resolve(true);
        flag.downgrade();
        assert!(flag.is_false());
        flag.resolve(true);
        assert!(flag.is_false());
    }
}
