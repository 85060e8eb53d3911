//! Composition of persistent-naming udev rule text.
//!
//! One rule per line; match clauses must precede assignment clauses or udev
//! will reject the rule. Keys are compile-time constants supplied by
//! callers, so a wrong-case key is a programming error and fails fast.

/// Return a udev comparison clause, like `ACTION=="add"`.
pub fn compose_udev_equality(key: &str, value: &str) -> String {
    assert!(key == key.to_uppercase(), "udev match key must be upper-case: {key}");
    format!("{key}==\"{value}\"")
}

/// Return a udev attribute comparison clause, like `ATTR{type}=="1"`.
pub fn compose_udev_attr_equality(attribute: &str, value: &str) -> String {
    assert!(
        attribute == attribute.to_lowercase(),
        "udev attribute must be lower-case: {attribute}"
    );
    format!("ATTR{{{attribute}}}==\"{value}\"")
}

/// Return a udev assignment clause, like `NAME="eth0"`.
pub fn compose_udev_setting(key: &str, value: &str) -> String {
    assert!(key == key.to_uppercase(), "udev setting key must be upper-case: {key}");
    format!("{key}=\"{value}\"")
}

/// Return a udev rule pinning the name of the network interface with `mac`.
///
/// The rule ends up as a single line looking something like:
///
/// ```text
/// SUBSYSTEM=="net", ACTION=="add", DRIVERS=="?*",
/// ATTR{address}=="ff:ee:dd:cc:bb:aa", NAME="eth0"
/// ```
///
/// Neither `interface` nor `mac` is escaped; callers must pass values that
/// are already safe udev-rule literals. A value containing `"` would
/// corrupt the generated rule.
pub fn generate_udev_rule(interface: &str, mac: &str) -> String {
    let clauses = [
        compose_udev_equality("SUBSYSTEM", "net"),
        compose_udev_equality("ACTION", "add"),
        compose_udev_equality("DRIVERS", "?*"),
        compose_udev_attr_equality("address", mac),
        compose_udev_setting("NAME", interface),
    ];
    format!("{}\n", clauses.join(", "))
}
