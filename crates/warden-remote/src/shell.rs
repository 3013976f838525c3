//! Shell quoting for remote command lines
//!
//! Arguments are quoted with the `shell-escape` crate's POSIX rules. Values
//! that reference an environment variable (`$DRUSH_ROOT`) are passed through
//! untouched so they expand on the remote side.

use shell_escape::unix::escape;
use std::borrow::Cow;

/// Quote a single argument for a POSIX shell
#[must_use]
pub fn quote(arg: &str) -> String {
    escape(Cow::Borrowed(arg)).into_owned()
}

/// Check whether a value references a remote environment variable
#[inline]
#[must_use]
pub fn is_env_reference(value: &str) -> bool {
    value.starts_with('$')
}

/// Quote a value unless it references a remote environment variable
#[must_use]
pub fn quote_value(value: &str) -> String {
    if is_env_reference(value) {
        value.to_string()
    } else {
        quote(value)
    }
}
