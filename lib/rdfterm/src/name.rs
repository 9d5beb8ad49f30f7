//! Character classes of the SPARQL grammar shared by blank node labels and variable names.

/// `PN_CHARS_BASE` from the SPARQL grammar.
pub fn is_base_char(c: char) -> bool {
    matches!(c,
        'A'..='Z'
        | 'a'..='z'
        | '\u{00C0}'..='\u{00D6}'
        | '\u{00D8}'..='\u{00F6}'
        | '\u{00F8}'..='\u{02FF}'
        | '\u{0370}'..='\u{037D}'
        | '\u{037F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

/// `PN_CHARS_U` plus digits: the characters allowed everywhere after the first one.
pub fn is_inner_char(c: char) -> bool {
    is_base_char(c)
        || matches!(c,
            '_' | '0'..='9' | '\u{00B7}' | '\u{0300}'..='\u{036F}' | '\u{203F}'..='\u{2040}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        assert!(is_base_char('a'));
        assert!(!is_base_char('_'));
        assert!(is_inner_char('_'));
        assert!(is_inner_char('7'));
        assert!(!is_inner_char('-'));
        assert!(!is_inner_char(' '));
    }
}
