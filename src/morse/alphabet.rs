// Table of Morse representations

/// Character to representation, '.' for a dot and '-' for a dash
const TABLE: &[(char, &str)] = &[
    // ASCII letters
    ('A', ".-"),
    ('B', "-..."),
    ('C', "-.-."),
    ('D', "-.."),
    ('E', "."),
    ('F', "..-."),
    ('G', "--."),
    ('H', "...."),
    ('I', ".."),
    ('J', ".---"),
    ('K', "-.-"),
    ('L', ".-.."),
    ('M', "--"),
    ('N', "-."),
    ('O', "---"),
    ('P', ".--."),
    ('Q', "--.-"),
    ('R', ".-."),
    ('S', "..."),
    ('T', "-"),
    ('U', "..-"),
    ('V', "...-"),
    ('W', ".--"),
    ('X', "-..-"),
    ('Y', "-.--"),
    ('Z', "--.."),
    // Numerals
    ('0', "-----"),
    ('1', ".----"),
    ('2', "..---"),
    ('3', "...--"),
    ('4', "....-"),
    ('5', "....."),
    ('6', "-...."),
    ('7', "--..."),
    ('8', "---.."),
    ('9', "----."),
    // Punctuation
    ('"', ".-..-."),
    ('\'', ".----."),
    ('$', "...-..-"),
    ('(', "-.--."),
    (')', "-.--.-"),
    ('+', ".-.-."),
    (',', "--..--"),
    ('-', "-....-"),
    ('.', ".-.-.-"),
    ('/', "-..-."),
    (':', "---..."),
    (';', "-.-.-."),
    ('=', "-...-"),
    ('?', "..--.."),
    ('_', "..--.-"),
    ('@', ".--.-."),
    // Procedural signals
    ('<', "...-.-"),  // VA/SK
    ('>', "-...-.-"), // BK
    ('!', "...-."),   // SN
    ('&', ".-..."),   // AS
    ('^', "-.-.-"),   // KA
    ('~', ".-.-.."),  // AL
];

/// Longest representation in the table
pub const MAX_REPRESENTATION_LEN: usize = 7;

/// Look up the representation of a character (case-insensitive)
pub fn lookup(c: char) -> Option<&'static str> {
    let c = c.to_ascii_uppercase();
    TABLE
        .iter()
        .find(|(character, _)| *character == c)
        .map(|(_, representation)| *representation)
}

/// Find the character sent as `representation`
pub fn reverse_lookup(representation: &str) -> Option<char> {
    TABLE
        .iter()
        .find(|(_, r)| *r == representation)
        .map(|(character, _)| *character)
}

pub fn is_valid_character(c: char) -> bool {
    lookup(c).is_some()
}

/// Every character is in the table or is a space
pub fn is_valid_string(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || is_valid_character(c))
}

/// Non-empty string of dots and dashes, not longer than any table entry
/// would need
pub fn is_valid_representation(representation: &str) -> bool {
    !representation.is_empty()
        && representation.len() <= MAX_REPRESENTATION_LEN
        && representation.chars().all(|c| c == '.' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup('e'), Some("."));
        assert_eq!(lookup('E'), Some("."));
        assert_eq!(lookup('q'), Some("--.-"));
        assert_eq!(lookup('#'), None);
    }

    #[test]
    fn test_reverse_lookup() {
        assert_eq!(reverse_lookup("...-.-"), Some('<'));
        assert_eq!(reverse_lookup("........"), None);
    }

    #[test]
    fn test_table_entries_are_valid_representations() {
        for (character, representation) in TABLE {
            assert!(
                is_valid_representation(representation),
                "Bad entry for {character:?}"
            );
            assert_eq!(reverse_lookup(representation), Some(*character));
        }
    }

    #[test]
    fn test_string_validation() {
        assert!(is_valid_string("CQ CQ de test 73"));
        assert!(!is_valid_string("hello #world"));
        assert!(is_valid_string(""));
    }

    #[test]
    fn test_representation_validation() {
        assert!(is_valid_representation(".-.-"));
        assert!(!is_valid_representation(""));
        assert!(!is_valid_representation(".-x"));
        assert!(!is_valid_representation("........"));
    }
}
