//! Text cleanup

use regex::Regex;
use std::sync::LazyLock;

// patterns are literals; compilation cannot fail at runtime
#[allow(clippy::expect_used)]
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

#[allow(clippy::expect_used)]
static SPACE_BEFORE_CJK_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([。，、；：？！])").expect("punctuation pattern"));

// no lookaround in the regex crate: the surrounding ideographs are captured and restored
#[allow(clippy::expect_used)]
static SPACE_BETWEEN_CJK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\x{4E00}-\x{9FA5}])\s+([\x{4E00}-\x{9FA5}])").expect("ideograph pattern")
});

/// Whether `c` is a CJK unified ideograph
pub fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FA5}').contains(&c)
}

/// Whether the text contains a CJK ideograph
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// Normalize a text run from flowing content
///
/// Whitespace runs collapse to a single space, then whitespace before CJK punctuation and
/// between two ideographs is removed. Leading and trailing single spaces are kept so that
/// adjacent inline runs stay separated.
pub fn clean_text(text: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(text, " ");
    clean_cjk(&collapsed)
}

/// Remove whitespace the CJK typesetting rules forbid, leaving other spacing untouched
pub fn clean_cjk(text: &str) -> String {
    let text = SPACE_BEFORE_CJK_PUNCTUATION.replace_all(text, "$1");
    // a match consumes the ideograph after the gap, so a second pass catches chains
    // like "一 二 三"
    let once = SPACE_BETWEEN_CJK.replace_all(&text, "$1$2");
    SPACE_BETWEEN_CJK.replace_all(&once, "$1$2").into_owned()
}
