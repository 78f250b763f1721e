//! Character classes shared by sentence splitting and speech sanitizing.

/// Pictographic symbols that start an emoji cluster.
pub fn is_pictographic(ch: char) -> bool {
    matches!(
        u32::from(ch),
        0x1F000..=0x1FAFF | 0x2300..=0x23FF | 0x2600..=0x27BF | 0x2B00..=0x2BFF | 0x3030 | 0x303D
    )
}

/// Code points that only ever extend an emoji cluster.
pub fn is_emoji_extender(ch: char) -> bool {
    matches!(
        u32::from(ch),
        0x200D | 0xFE0E | 0xFE0F | 0x20E3 | 0xE0020..=0xE007F
    )
}

/// Sentence enders that need trailing whitespace to count (`3.14` is not a boundary).
pub fn is_latin_terminal(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | '…')
}

/// Sentence enders used by scripts that do not separate sentences with spaces.
pub fn is_cjk_terminal(ch: char) -> bool {
    matches!(ch, '。' | '！' | '？' | '｡' | '۔' | '؟' | '।')
}

/// Closing quotes and brackets that stay attached to the sentence they end.
pub fn is_closing(ch: char) -> bool {
    matches!(
        ch,
        '"' | '\'' | ')' | ']' | '}' | '”' | '’' | '»' | '」' | '』' | '）'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_emoji() {
        for ch in ['🙂', '❤', '⭐', '🇯', '🤖', '⌛'] {
            assert!(is_pictographic(ch), "{ch} should be pictographic");
        }
        for ch in ['a', '7', '?', '中', 'é'] {
            assert!(!is_pictographic(ch), "{ch} should not be pictographic");
        }
    }
}
