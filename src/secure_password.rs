//! Keystore password handling using the secrecy crate
//!
//! The password lives as a plain value in the configuration map because it has
//! to be written to `catalina.properties`. Everywhere else it travels inside
//! [`KeystorePassword`], which zeroizes on drop and never shows up in debug
//! output.

use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

const GENERATED_PASSWORD_LENGTH: usize = 15;
const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Secure container for the keystore password
pub struct KeystorePassword {
    secret: SecretString,
}

impl KeystorePassword {
    /// Generate a random alphabetic password
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let password: String = (0..GENERATED_PASSWORD_LENGTH)
            .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
            .collect();
        Self::from(password)
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl From<String> for KeystorePassword {
    fn from(password: String) -> Self {
        Self {
            secret: SecretString::from(password),
        }
    }
}

impl fmt::Debug for KeystorePassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystorePassword")
            .field("secret", &"<securely stored>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_no_leak() {
        let password = KeystorePassword::from("defaultPassword".to_string());
        let debug_str = format!("{:?}", password);
        assert!(!debug_str.contains("defaultPassword"));
        assert!(debug_str.contains("securely stored"));
        assert_eq!(password.expose(), "defaultPassword");
    }

    #[test]
    fn test_generated_password_shape() {
        let a = KeystorePassword::generate();
        let b = KeystorePassword::generate();
        assert_eq!(a.expose().len(), GENERATED_PASSWORD_LENGTH);
        assert!(a.expose().chars().all(|c| c.is_ascii_alphabetic()));
        assert_ne!(a.expose(), b.expose());
    }
}
