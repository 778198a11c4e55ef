use std::cmp::Ordering;

use unicode_normalization::UnicodeNormalization;

const KATAKANA_START: u32 = 0x30A1;
const KATAKANA_END: u32 = 0x30F6;
const KANA_OFFSET: u32 = 0x60;

/// Folded form used for ordering titles and file names.
///
/// NFKC turns half-width kana and full-width Latin into their usual forms,
/// katakana is folded onto hiragana and the result is lowercased.
pub fn collation_key(text: &str) -> String {
    text.nfkc()
        .map(|ch| {
            let code = ch as u32;
            if (KATAKANA_START..=KATAKANA_END).contains(&code) {
                char::from_u32(code - KANA_OFFSET).unwrap_or(ch)
            } else {
                ch
            }
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Compares folded keys, then the raw strings so distinct inputs never tie.
/// The raw tie-break is reversed so lowercase sorts before uppercase.
pub fn collate(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| b.cmp(a))
}
