use super::error::ValidationError;

/// Check a sign-in form before it is submitted.
pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
    validate_email(email)?;
    if password.is_empty() {
        return Err(ValidationError::MissingField("password"));
    }
    Ok(())
}

/// Check a sign-up form before it is submitted.
pub fn validate_registration(
    email: &str,
    password: &str,
    password_confirm: &str,
) -> Result<(), ValidationError> {
    validate_email(email)?;
    if password.is_empty() {
        return Err(ValidationError::MissingField("password"));
    }
    if password_confirm.is_empty() {
        return Err(ValidationError::MissingField("password confirmation"));
    }
    if password != password_confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

/// Non-empty, one `@` with text on both sides, no whitespace.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingField("email"));
    }
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_requires_email_and_password() {
        assert_eq!(
            validate_login("", "pw"),
            Err(ValidationError::MissingField("email"))
        );
        assert_eq!(
            validate_login("a@b.c", ""),
            Err(ValidationError::MissingField("password"))
        );
        assert!(validate_login("a@b.c", "pw").is_ok());
    }

    #[test]
    fn registration_rejects_mismatched_passwords() {
        assert_eq!(
            validate_registration("a@b.c", "one", "two"),
            Err(ValidationError::PasswordMismatch)
        );
        assert_eq!(
            validate_registration("a@b.c", "one", ""),
            Err(ValidationError::MissingField("password confirmation"))
        );
        assert!(validate_registration("a@b.c", "secret1", "secret1").is_ok());
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["plain", "@b.c", "a@", "a@b@c", "a b@c.d"] {
            assert!(
                matches!(validate_login(bad, "pw"), Err(ValidationError::InvalidEmail(_))),
                "{bad} should be rejected"
            );
        }
    }
}
