//! Model key helpers.
//!
//! A model key is `<prefix>_<label>`, where the prefix is the target column
//! offset and the label names a fold or the complete sample set (`full`).

pub const FULL_SUFFIX: &str = "_full";

/// True for keys naming the complete sample set of their prefix.
pub fn is_full_key(key: &str) -> bool {
    key.ends_with(FULL_SUFFIX)
}

/// Text before the first underscore (the whole key when there is none).
pub fn key_prefix(key: &str) -> &str {
    key.split('_').next().unwrap_or(key)
}

/// The `_full` key sharing `key`'s prefix.
pub fn full_key_for(key: &str) -> String {
    format!("{}{}", key_prefix(key), FULL_SUFFIX)
}
