//! Lookup helpers over a parsed JSON tree. Every JSON surface of the
//! pipeline (registry files, material templates, glTF documents) treats
//! object keys case-insensitively, so the raw `serde_json::Value` accessors
//! are wrapped here once.

use sable_shared::serde_json::Value;

/// Finds a member of a JSON object by case-insensitive key. Returns `None`
/// when `value` is not an object or no key matches. The first matching member
/// in document order wins.
pub(crate) fn find_ci<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_object()?
        .iter()
        .find(|(member_key, _)| member_key.eq_ignore_ascii_case(key))
        .map(|(_, member_value)| member_value)
}

pub(crate) fn get_str(value: Option<&Value>) -> Option<&str> {
    value?.as_str()
}

pub(crate) fn get_f64(value: Option<&Value>) -> Option<f64> {
    value?.as_f64()
}

pub(crate) fn get_bool(value: Option<&Value>) -> Option<bool> {
    value?.as_bool()
}

/// Numeric member as `u32`; rejects negative values and values above
/// `u32::MAX` instead of wrapping.
pub(crate) fn get_u32(value: Option<&Value>) -> Option<u32> {
    let number = get_f64(value)?;
    if number < 0.0 || number > f64::from(u32::MAX) {
        return None;
    }
    Some(number as u32)
}
