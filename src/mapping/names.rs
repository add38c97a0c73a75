//! Canonical names for the standard controller layout

/// Button names in standard-mapping hardware order (index 0 = bottom face button)
pub const BUTTON_NAMES: [&str; 17] = [
    "button-a",
    "button-b",
    "button-x",
    "button-y",
    "shoulder-left",
    "shoulder-right",
    "trigger-left",
    "trigger-right",
    "button-select",
    "button-start",
    "left-stick-in",
    "right-stick-in",
    "button-dpad-up",
    "button-dpad-down",
    "button-dpad-left",
    "button-dpad-right",
    "vendor",
];

/// Synthetic button names for an axis pushed towards its positive end
pub const POSITIVE_AXIS_NAMES: [&str; 4] = [
    "left-analog-right",
    "left-analog-down",
    "right-analog-right",
    "right-analog-down",
];

/// Synthetic button names for an axis pushed towards its negative end
pub const NEGATIVE_AXIS_NAMES: [&str; 4] = [
    "left-analog-left",
    "left-analog-up",
    "right-analog-left",
    "right-analog-up",
];

/// Owned copy of [`BUTTON_NAMES`], used as the default `button_mapping`
pub fn default_button_mapping() -> Vec<String> {
    BUTTON_NAMES.iter().map(|name| name.to_string()).collect()
}

/// Hardware index of a canonical button name
pub fn resolve_button(name: &str) -> Option<usize> {
    BUTTON_NAMES.iter().position(|candidate| *candidate == name)
}

/// Synthetic button name for an axis deflection
///
/// Zero counts as negative; callers only ask once the threshold has been crossed.
pub fn axis_name(axis: usize, value: f32) -> Option<&'static str> {
    if value > 0.0 {
        POSITIVE_AXIS_NAMES.get(axis).copied()
    } else {
        NEGATIVE_AXIS_NAMES.get(axis).copied()
    }
}

/// Both synthetic names of an axis as `[positive, negative]`
pub fn axis_names(axis: usize) -> Option<[&'static str; 2]> {
    Some([
        *POSITIVE_AXIS_NAMES.get(axis)?,
        *NEGATIVE_AXIS_NAMES.get(axis)?,
    ])
}
