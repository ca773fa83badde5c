use lazy_static::lazy_static;
use rand::{thread_rng, Rng};
use regex::Regex;

use crate::{CollabError, CollabResult};

/// Characters a session code is drawn from. Codes are stored upper-case.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

lazy_static! {
    static ref CODE_PATTERN: Regex = Regex::new("^[A-Z0-9]{6}$").expect("code pattern is valid");
}

/// Produces candidate session codes.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// The default generator, drawing uniformly from [CODE_ALPHABET].
#[derive(Debug, Default)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn generate(&self, length: usize) -> String {
        let mut rng = thread_rng();

        std::iter::repeat(())
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .take(length)
            .collect()
    }
}

/// Normalizes a user supplied code: trimmed and upper-cased.
pub fn normalize_code(input: &str) -> CollabResult<String> {
    let code = input.trim().to_ascii_uppercase();

    if !CODE_PATTERN.is_match(&code) {
        return Err(CollabError::Validation(format!(
            "session code must be 6 letters or digits, got {:?}",
            input
        )));
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_codes_are_upper_case_alphanumeric() {
        let code = RandomCodes.generate(6);

        assert_eq!(code.len(), 6);
        assert!(normalize_code(&code).is_ok());
        assert_eq!(normalize_code(&code).unwrap(), code);
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_code(" 7qk2m1 ").unwrap(), "7QK2M1");
    }

    #[test]
    fn rejects_malformed_codes() {
        for input in ["", "ABC", "ABCDEFG", "AB-DEF", "ÅBCDEF"] {
            assert!(
                matches!(normalize_code(input), Err(CollabError::Validation(_))),
                "{input:?} should be rejected"
            );
        }
    }
}
