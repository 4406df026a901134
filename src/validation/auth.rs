/// Usernames are 3 to 32 characters of letters, digits, `_` or `-`.
pub fn username(value: &str, _context: &()) -> garde::Result {
    let len = value.chars().count();
    if len < 3 {
        return Err(garde::Error::new("must be at least 3 characters long"));
    }
    if len > 32 {
        return Err(garde::Error::new("must be at most 32 characters"));
    }
    if !value.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(garde::Error::new(
            "can only contain letters, numbers, underscores and hyphens",
        ));
    }
    Ok(())
}

/// Passwords are 8 to 128 characters and mix letters with digits.
pub fn password(value: &str, _context: &()) -> garde::Result {
    let len = value.chars().count();
    if len < 8 {
        return Err(garde::Error::new("must be at least 8 characters long"));
    }
    if len > 128 {
        return Err(garde::Error::new("must be at most 128 characters"));
    }
    let has_letter = value.chars().any(char::is_alphabetic);
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    if !(has_letter && has_digit) {
        return Err(garde::Error::new("must contain at least one letter and one digit"));
    }
    Ok(())
}

/// Opaque tokens are URL-safe base64 without padding.
pub fn opaque_token(value: &str, _context: &()) -> garde::Result {
    if value.is_empty() || value.len() > 128 {
        return Err(garde::Error::new("is not a valid token"));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(garde::Error::new("is not a valid token"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(username("book_worm-7", &()).is_ok());
        assert!(username("ab", &()).is_err());
        assert!(username("has space", &()).is_err());
        assert!(username(&"x".repeat(33), &()).is_err());
    }

    #[test]
    fn passwords() {
        assert!(password("correct horse 1", &()).is_ok());
        assert!(password("short1", &()).is_err());
        assert!(password("onlyletters", &()).is_err());
        assert!(password("1234567890", &()).is_err());
    }

    #[test]
    fn tokens() {
        assert!(opaque_token("abcDEF_123-xyz", &()).is_ok());
        assert!(opaque_token("", &()).is_err());
        assert!(opaque_token("not/base64url=", &()).is_err());
    }
}
