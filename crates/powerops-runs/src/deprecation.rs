//! Process-wide registry of deprecation warnings already emitted.

use std::collections::HashSet;
use std::sync::{LazyLock, Mutex};

use tracing::warn;

static WARNED: LazyLock<Mutex<HashSet<&'static str>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// Log a deprecation warning for `name` the first time it is used.
///
/// Returns `true` if this call emitted the warning.
pub fn warn_deprecated(name: &'static str, replacement: &str) -> bool {
  let mut warned = WARNED.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
  if !warned.insert(name) {
    return false;
  }
  warn!(deprecated = name, replacement, "{name} is deprecated, use {replacement} instead");
  true
}

pub fn has_warned(name: &str) -> bool {
  WARNED
    .lock()
    .unwrap_or_else(|poisoned| poisoned.into_inner())
    .contains(name)
}
