//! Guard-token derivation.
//!
//! A guard token is the canonical, slugified form of a display name. It is
//! used as a secondary unique key for roles and permissions, so derivation
//! must be deterministic and referentially stable.

/// Derive the guard token for a display name.
///
/// Lowercases, collapses every run of non-alphanumeric characters into a
/// single `-`, and trims separators from both ends:
///
/// ```
/// use passport_core::guard;
///
/// assert_eq!(guard("Admin"), "admin");
/// assert_eq!(guard("create $#% contact"), "create-contact");
/// ```
pub fn guard(name: &str) -> String {
    let mut token = String::with_capacity(name.len());
    let mut pending_separator = false;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !token.is_empty() {
                token.push('-');
            }
            pending_separator = false;
            // Lowercasing can expand to several chars; combining marks in the
            // expansion are dropped to keep the token alphanumeric.
            for lower in ch.to_lowercase() {
                if lower.is_alphanumeric() {
                    token.push(lower);
                }
            }
        } else {
            pending_separator = true;
        }
    }

    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lowercases_plain_names() {
        assert_eq!(guard("Admin"), "admin");
        assert_eq!(guard("Warehouse"), "warehouse");
    }

    #[test]
    fn collapses_symbol_runs_to_one_separator() {
        assert_eq!(guard("create $#% contact"), "create-contact");
        assert_eq!(guard("read  ---  invoices"), "read-invoices");
    }

    #[test]
    fn trims_leading_and_trailing_separators() {
        assert_eq!(guard("  Sales Manager  "), "sales-manager");
        assert_eq!(guard("--edit--"), "edit");
    }

    #[test]
    fn empty_and_symbol_only_names_yield_empty_token() {
        assert_eq!(guard(""), "");
        assert_eq!(guard("$#%"), "");
    }

    proptest! {
        #[test]
        fn deterministic(name in ".*") {
            prop_assert_eq!(guard(&name), guard(&name));
        }

        #[test]
        fn idempotent(name in ".*") {
            let once = guard(&name);
            prop_assert_eq!(guard(&once), once.clone());
        }

        #[test]
        fn output_is_lowercase_alphanumeric_and_dashes(name in ".*") {
            let token = guard(&name);
            prop_assert!(token.chars().all(|c| c == '-' || (c.is_alphanumeric() && !c.is_uppercase())));
            prop_assert!(!token.starts_with('-'));
            prop_assert!(!token.ends_with('-'));
        }
    }
}
