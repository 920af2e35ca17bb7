use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

/// Lowercase, NFD-fold with combining marks removed, every non-alphanumeric
/// run collapsed into a single space, trimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveNormalizer;

impl NaiveNormalizer {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TextNormalizer for NaiveNormalizer {
    fn normalize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut pending_space = false;

        for c in text.to_lowercase().nfd() {
            if is_combining_mark(c) {
                continue;
            }
            if c.is_alphanumeric() {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            } else {
                pending_space = true;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizer() {
        let n = NaiveNormalizer::new();
        assert_eq!(n.normalize("  Hello.. .World,,,,.,."), "hello world");
        assert_eq!(n.normalize("שלום   ]- --  שלום שלום!"), "שלום שלום שלום");
        assert_eq!(n.normalize("   El-Niño"), "el nino");
        assert_eq!(n.normalize("Hello ...  El Niño"), "hello el nino");
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        let n = NaiveNormalizer::new();
        assert_eq!(n.normalize(""), "");
        assert_eq!(n.normalize("?!... --"), "");
    }
}
