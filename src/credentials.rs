//! Player credential generation.
//!
//! Usernames are `<prefix><8 digits>` drawn uniformly from
//! [`USERNAME_MIN`]`..=`[`USERNAME_MAX`]. Collisions are left for the backend
//! to reject. Passwords are random alphanumeric strings.

use rand::{Rng, seq::SliceRandom};

pub const USERNAME_MIN: u32 = 10_000_000;
pub const USERNAME_MAX: u32 = 99_999_999;

pub const PASSWORD_LEN: usize = 10;

// Look-alike characters (0/O, 1/l/I) are left out; players type these by hand.
const LOWER: &[u8] = b"abcdefghijkmnpqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";

/// Generated login handed to the backend and to the player.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Produces usernames with a fixed prefix.
#[derive(Debug, Clone)]
pub struct CredentialGenerator {
    prefix: String,
}

impl CredentialGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn username(&self) -> String {
        let suffix = rand::thread_rng().gen_range(USERNAME_MIN..=USERNAME_MAX);
        format!("{}{}", self.prefix, suffix)
    }

    /// Random password with at least one lowercase, uppercase and digit.
    pub fn password(&self) -> String {
        let mut rng = rand::thread_rng();
        let all: Vec<u8> = [LOWER, UPPER, DIGITS].concat();

        let mut chars: Vec<u8> = Vec::with_capacity(PASSWORD_LEN);
        for class in [LOWER, UPPER, DIGITS] {
            chars.push(class[rng.gen_range(0..class.len())]);
        }
        while chars.len() < PASSWORD_LEN {
            chars.push(all[rng.gen_range(0..all.len())]);
        }
        chars.shuffle(&mut rng);

        chars.into_iter().map(char::from).collect()
    }

    pub fn generate(&self) -> Credentials {
        Credentials {
            username: self.username(),
            password: self.password(),
        }
    }
}

impl Default for CredentialGenerator {
    fn default() -> Self {
        Self::new("bet")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn usernames_match_format_and_bounds() {
        let generator = CredentialGenerator::default();
        let pattern = Regex::new(r"^bet\d{8}$").unwrap();

        for _ in 0..10_000 {
            let username = generator.username();
            assert!(pattern.is_match(&username), "bad username {username}");

            let n: u32 = username["bet".len()..].parse().unwrap();
            assert!((USERNAME_MIN..=USERNAME_MAX).contains(&n));
        }
    }

    #[test]
    fn custom_prefix_is_used() {
        let generator = CredentialGenerator::new("vip");
        assert!(generator.username().starts_with("vip"));
        assert_eq!(generator.prefix(), "vip");
    }

    #[test]
    fn passwords_mix_character_classes() {
        let generator = CredentialGenerator::default();
        for _ in 0..1_000 {
            let password = generator.password();
            assert_eq!(password.len(), PASSWORD_LEN);
            assert!(password.chars().any(|c| c.is_ascii_lowercase()));
            assert!(password.chars().any(|c| c.is_ascii_uppercase()));
            assert!(password.chars().any(|c| c.is_ascii_digit()));
            assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn passwords_are_not_constant() {
        let generator = CredentialGenerator::default();
        let first = generator.password();
        assert!((0..20).any(|_| generator.password() != first));
    }

    #[test]
    fn debug_hides_password() {
        let creds = CredentialGenerator::default().generate();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains(&creds.password));
        assert!(rendered.contains(&creds.username));
    }
}
