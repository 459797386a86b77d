//! Literal text substitution for the code-edit pipeline.

use thiserror::Error;

/// Result of [`replace_first`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub text: String,
    /// Whether the selection was found and replaced.
    pub applied: bool,
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("selected code was not found verbatim in the full code")]
    SelectionNotFound,
}

/// Replace the first literal occurrence of `selected` in `full`.
///
/// When `selected` is empty or does not occur, the text is returned
/// unchanged and `applied` is false.
pub fn replace_first(full: &str, selected: &str, replacement: &str) -> Patch {
    if selected.is_empty() {
        return Patch {
            text: full.to_string(),
            applied: false,
        };
    }

    match full.find(selected) {
        Some(at) => {
            let mut text = String::with_capacity(full.len() - selected.len() + replacement.len());
            text.push_str(&full[..at]);
            text.push_str(replacement);
            text.push_str(&full[at + selected.len()..]);
            Patch {
                text,
                applied: true,
            }
        }
        None => Patch {
            text: full.to_string(),
            applied: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_selection() {
        let patch = replace_first("abc123def", "123", "XYZ");
        assert_eq!(patch.text, "abcXYZdef");
        assert!(patch.applied);
    }

    #[test]
    fn test_missing_selection_is_noop() {
        let patch = replace_first("abcdef", "zzz", "XYZ");
        assert_eq!(patch.text, "abcdef");
        assert!(!patch.applied);
    }

    #[test]
    fn test_only_first_occurrence() {
        let patch = replace_first("x = 1\nx = 1\n", "x = 1", "x = 2");
        assert_eq!(patch.text, "x = 2\nx = 1\n");
    }

    #[test]
    fn test_empty_selection_is_noop() {
        let patch = replace_first("abc", "", "Z");
        assert_eq!(patch.text, "abc");
        assert!(!patch.applied);
    }

    #[test]
    fn test_multibyte_text() {
        let patch = replace_first("héllo wörld", "wörld", "monde");
        assert_eq!(patch.text, "héllo monde");
    }
}
