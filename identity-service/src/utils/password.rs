use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Newtype for a raw password so it cannot be logged by accident.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Newtype for a PHC-format argon2 hash string.
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash.
///
/// A mismatch is `Ok(false)`, not an error: the login path counts mismatches
/// toward the lockout window, while a malformed stored hash is a real error.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<bool, anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    match Argon2::default().verify_password(password.as_str().as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let password = Password::new("Ab1!aaaa1".to_string());
        let hash = hash_password(&password).expect("hash");

        assert!(hash.as_str().starts_with("$argon2"));
        assert!(verify_password(&password, &hash).unwrap());
    }

    #[test]
    fn wrong_password_is_a_clean_mismatch() {
        let password = Password::new("Ab1!aaaa1".to_string());
        let hash = hash_password(&password).expect("hash");

        let wrong = Password::new("not-the-password".to_string());
        assert!(!verify_password(&wrong, &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error_not_a_mismatch() {
        let password = Password::new("Ab1!aaaa1".to_string());
        let garbage = PasswordHashString::new("not-a-phc-string".to_string());
        assert!(verify_password(&password, &garbage).is_err());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let password = Password::new("Ab1!aaaa1".to_string());
        let first = hash_password(&password).expect("hash");
        let second = hash_password(&password).expect("hash");
        assert_ne!(first.as_str(), second.as_str());
    }

    #[test]
    fn debug_output_redacts_the_password() {
        let password = Password::new("Ab1!aaaa1".to_string());
        assert_eq!(format!("{:?}", password), "Password(<redacted>)");
    }
}
