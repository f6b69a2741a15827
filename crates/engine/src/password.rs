//! Password hashing and strength checks.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use smartnotify_common::error::AppError;

pub const MIN_LENGTH: usize = 8;

/// Similarity ratio at or above which a password counts as derived from the email.
const MAX_SIMILARITY: f64 = 0.7;

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890",
    "qwerty123", "qwertyuiop", "iloveyou", "sunshine", "princess", "football",
    "baseball", "welcome1", "abc12345", "letmein1", "trustno1", "superman",
    "starwars", "passw0rd", "11111111", "00000000", "admin123", "monkey123",
];

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Run the strength checks, returning every failed rule's message.
pub fn validate_password(password: &str, email: Option<&str>) -> Vec<String> {
    let mut problems = Vec::new();

    if let Some(email) = email
        && is_too_similar(password, email)
    {
        problems.push("The password is too similar to the email address.".to_string());
    }
    if password.chars().count() < MIN_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_LENGTH
        ));
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        problems.push("This password is too common.".to_string());
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }

    problems
}

/// Compare against the whole email and each alphanumeric part of it.
fn is_too_similar(password: &str, email: &str) -> bool {
    let password = password.to_lowercase();
    let email = email.to_lowercase();

    std::iter::once(email.as_str())
        .chain(email.split(|c: char| !c.is_alphanumeric()))
        .filter(|part| !part.is_empty())
        .any(|part| similarity(&password, part) >= MAX_SIMILARITY)
}

/// `2 * LCS / (len(a) + len(b))` over characters.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    for ca in &a {
        let mut row = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        prev = row;
    }

    2.0 * prev[b.len()] as f64 / (a.len() + b.len()) as f64
}
