//! One-time code generation.

use rand::Rng;
use rand::rngs::OsRng;

use crate::domain::CodeGenerator;

/// Draws every symbol from the operating system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRngCodeGenerator;

impl CodeGenerator for OsRngCodeGenerator {
    fn generate(&self, length: usize, charset: &[char]) -> String {
        if charset.is_empty() {
            return String::new();
        }
        let mut rng = OsRng;
        (0..length)
            .map(|_| charset[rng.gen_range(0..charset.len())])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_requested_length_from_charset() {
        let digits: Vec<char> = "0123456789".chars().collect();
        let generator = OsRngCodeGenerator;

        for _ in 0..100 {
            let code = generator.generate(6, &digits);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_codes_vary() {
        let digits: Vec<char> = "0123456789".chars().collect();
        let generator = OsRngCodeGenerator;
        let codes: std::collections::HashSet<String> =
            (0..50).map(|_| generator.generate(8, &digits)).collect();
        assert!(codes.len() > 1);
    }

    #[test]
    fn test_empty_charset_yields_empty_code() {
        assert_eq!(OsRngCodeGenerator.generate(6, &[]), "");
    }
}
