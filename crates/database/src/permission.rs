//! Allow-list check between a role and its target

use glob::Pattern;

use crate::error::{Error, Result};

/// The pattern that admits every role.
pub const WILDCARD: &str = "*";

/// Whether `role_name` is admitted by `patterns`.
///
/// A bare `*` admits everything. Otherwise each entry is tried as an exact
/// name and then as a wildcard pattern in which `*` matches any run of
/// characters. Every other character, `?` and `[` included, is literal.
pub fn is_allowed<S: AsRef<str>>(role_name: &str, patterns: &[S]) -> bool {
    if patterns.iter().any(|p| p.as_ref() == WILDCARD) {
        return true;
    }

    patterns.iter().any(|p| {
        let p = p.as_ref();
        p == role_name
            || (p.contains('*') && wildcard(p).is_some_and(|glob| glob.matches(role_name)))
    })
}

/// Fail with [`Error::PermissionDenied`] unless `role_name` is admitted.
pub fn authorize<S: AsRef<str>>(role_name: &str, patterns: &[S]) -> Result<()> {
    if is_allowed(role_name, patterns) {
        Ok(())
    } else {
        Err(Error::PermissionDenied)
    }
}

/// Compile a `*`-only pattern. Literal runs are escaped and adjacent stars
/// collapse into one.
fn wildcard(pattern: &str) -> Option<Pattern> {
    let mut compiled = String::with_capacity(pattern.len());
    for (i, literal) in pattern.split('*').enumerate() {
        if i > 0 && !compiled.ends_with('*') {
            compiled.push('*');
        }
        compiled.push_str(&Pattern::escape(literal));
    }
    // Escaped literals never produce a malformed pattern.
    Pattern::new(&compiled).ok()
}
