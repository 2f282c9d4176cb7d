//! Case- and accent-insensitive comparison form for channel names.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Lower-case `s`, decompose it, and drop the combining marks.
///
/// `normalize("Anúncios") == "anuncios"`.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}
