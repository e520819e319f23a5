//! Password policy and Argon2id hashing.

use argon2::{
    password_hash::{
        PasswordHash, PasswordHasher as Argon2PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2, Params,
};
use rand::rngs::OsRng;

use crate::config::SecurityConfig;

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    /// Requires upper and lower case letters, a digit and a symbol.
    pub require_complexity: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_complexity: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PasswordPolicyError {
    #[error("Password must be at least {min_length} characters")]
    TooShort { min_length: usize },
    #[error("Password must contain at least one uppercase letter")]
    MissingUppercase,
    #[error("Password must contain at least one lowercase letter")]
    MissingLowercase,
    #[error("Password must contain at least one digit")]
    MissingDigit,
    #[error("Password must contain at least one special character")]
    MissingSpecial,
}

impl PasswordPolicy {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            min_length: config.min_password_length,
            require_complexity: config.require_password_complexity,
        }
    }

    pub fn validate(&self, password: &str) -> Result<(), PasswordPolicyError> {
        if password.chars().count() < self.min_length {
            return Err(PasswordPolicyError::TooShort {
                min_length: self.min_length,
            });
        }

        if !self.require_complexity {
            return Ok(());
        }

        if !password.chars().any(|c| c.is_uppercase()) {
            return Err(PasswordPolicyError::MissingUppercase);
        }
        if !password.chars().any(|c| c.is_lowercase()) {
            return Err(PasswordPolicyError::MissingLowercase);
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(PasswordPolicyError::MissingDigit);
        }
        if !password.chars().any(|c| !c.is_alphanumeric()) {
            return Err(PasswordPolicyError::MissingSpecial);
        }

        Ok(())
    }
}

pub struct PasswordService;

impl PasswordService {
    /// `memory_cost_log2` is the Argon2 memory cost as a power of two KiB.
    /// 4 keeps tests fast; 16 (64 MiB) is a sensible production value.
    pub fn hash_password_with_cost(
        password: &str,
        memory_cost_log2: u32,
    ) -> Result<String, argon2::password_hash::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let m_cost = (1u32 << memory_cost_log2.min(22)).max(Params::MIN_M_COST);

        let params =
            Params::new(m_cost, 3, 1, None).map_err(|_| argon2::password_hash::Error::Algorithm)?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
        Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
    }

    /// Accounts created through an invitation have no password yet; they
    /// never match.
    pub fn verify_password(
        password: &str,
        password_hash: Option<&str>,
    ) -> Result<bool, argon2::password_hash::Error> {
        let Some(password_hash) = password_hash else {
            return Ok(false);
        };

        let parsed_hash = PasswordHash::new(password_hash)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = PasswordService::hash_password_with_cost("Sup3r$ecret", 4).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(PasswordService::verify_password("Sup3r$ecret", Some(&hash)).unwrap());
        assert!(!PasswordService::verify_password("wrong", Some(&hash)).unwrap());
    }

    #[test]
    fn test_missing_hash_never_matches() {
        assert!(!PasswordService::verify_password("anything", None).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = PasswordService::hash_password_with_cost("same", 4).unwrap();
        let b = PasswordService::hash_password_with_cost("same", 4).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_length_only_policy() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("password").is_ok());
        assert_eq!(
            policy.validate("short"),
            Err(PasswordPolicyError::TooShort { min_length: 8 })
        );
    }

    #[test]
    fn test_complex_policy() {
        let policy = PasswordPolicy {
            min_length: 8,
            require_complexity: true,
        };

        assert_eq!(
            policy.validate("password1!"),
            Err(PasswordPolicyError::MissingUppercase)
        );
        assert_eq!(
            policy.validate("PASSWORD1!"),
            Err(PasswordPolicyError::MissingLowercase)
        );
        assert_eq!(
            policy.validate("Password!"),
            Err(PasswordPolicyError::MissingDigit)
        );
        assert_eq!(
            policy.validate("Password1"),
            Err(PasswordPolicyError::MissingSpecial)
        );
        assert!(policy.validate("Password1!").is_ok());
    }
}
