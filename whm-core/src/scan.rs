//! Barcode entry from a scanner wedge or the keyboard.

/// Normalizes scanned or typed input into a product code.
///
/// Scanner wedges append a line terminator, so surrounding whitespace is
/// trimmed. Returns `None` when nothing is left.
pub fn scan_or_enter_code(text: &str) -> Option<String> {
    let code = text.trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanned_code_is_trimmed() {
        assert_eq!(scan_or_enter_code("0123456789\r\n"), Some("0123456789".to_string()));
    }

    #[test]
    fn test_manual_code_passes_through() {
        assert_eq!(scan_or_enter_code("SKU-100"), Some("SKU-100".to_string()));
        assert_eq!(scan_or_enter_code("bin A 01"), Some("bin A 01".to_string()));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(scan_or_enter_code(""), None);
        assert_eq!(scan_or_enter_code("  \n"), None);
    }
}
