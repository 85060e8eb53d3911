//! Capability flags for installers driving this tool.
//!
//! Callers inspect this list to decide which code paths the installed
//! version supports; each entry keeps a stable meaning across releases.

pub const FEATURES: &[&str] = &[
    // udevadm property queries are parsed with the escaped-value fallback chain
    "UDEV_EXPORT_PARSE_FALLBACK",
    // persistent network interface naming rules can be generated
    "UDEV_NET_RULE_GENERATION",
    // settle supports --exit-if-exists short-circuiting
    "UDEV_SETTLE_EXIT_IF_EXISTS",
    // multipath maps, members and partitions can be detected and torn down
    "MULTIPATH_DETECTION",
    "MULTIPATH_TEARDOWN",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn features_are_unique_and_non_empty() {
        let mut seen = std::collections::BTreeSet::new();
        for feature in FEATURES {
            assert!(!feature.is_empty());
            assert!(seen.insert(feature), "duplicate feature flag: {feature}");
        }
    }
}
