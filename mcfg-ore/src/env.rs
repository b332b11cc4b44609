//! Utilities for reading environment variables.

use std::ffi::OsStr;

/// Returns true if the environment variable is set, and is _not_ one of the following:
/// `'0', '', 'no', 'false'`.
pub fn is_truthy<K: AsRef<OsStr>>(var: K) -> bool {
    let Some(value) = std::env::var_os(var) else {
        return false;
    };
    value_is_truthy(&value)
}

fn value_is_truthy(value: &OsStr) -> bool {
    static FALSEY: &[&str] = &["0", "", "no", "false"];

    let value = value.to_ascii_lowercase();
    !FALSEY.iter().any(|falsey| value == *falsey)
}

/// Returns every environment variable whose name starts with `prefix`, with the prefix
/// stripped and the remainder lowercased.
///
/// Variables whose name or value is not valid unicode are skipped.
///
/// ```ignore
/// // MCFG_MACH_COMMAND=/opt/mach
/// let vars = prefixed_vars("MCFG_");
/// assert_eq!(vars, vec![("mach_command".to_string(), "/opt/mach".to_string())]);
/// ```
pub fn prefixed_vars(prefix: &str) -> Vec<(String, String)> {
    let mut vars: Vec<_> = std::env::vars_os()
        .filter_map(|(name, value)| {
            let name = name.into_string().ok()?;
            let value = value.into_string().ok()?;
            let stripped = name.strip_prefix(prefix)?;
            if stripped.is_empty() {
                return None;
            }
            Some((stripped.to_ascii_lowercase(), value))
        })
        .collect();
    vars.sort();
    vars
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn falsey_values() {
        for value in ["0", "", "no", "NO", "false", "False"] {
            assert!(!value_is_truthy(OsStr::new(value)), "{value}");
        }
        for value in ["1", "yes", "true", "anything"] {
            assert!(value_is_truthy(OsStr::new(value)), "{value}");
        }
    }

    #[test]
    fn unset_is_not_truthy() {
        assert!(!is_truthy("MCFG_ORE_TEST_DEFINITELY_NOT_SET"));
    }
}
