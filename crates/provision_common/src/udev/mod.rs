//! udev mediation: rule composition and property queries.

pub mod admin;
pub mod properties;
pub mod rules;

pub use admin::{udevadm_info, udevadm_settle, udevadm_trigger, SettleOptions};
pub use properties::{
    parse_property_database, parse_property_line, PropertyMapping, PropertyValue,
};
pub use rules::{
    compose_udev_attr_equality, compose_udev_equality, compose_udev_setting,
    generate_udev_rule,
};
