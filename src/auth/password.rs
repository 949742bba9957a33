use bcrypt::{hash, verify};
use tracing::warn;

use crate::error::AppError;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;

// Keeps the test suite fast; bcrypt's minimum cost.
#[cfg(test)]
const HASH_COST: u32 = 4;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(hash(password, HASH_COST)?)
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match verify(password, password_hash) {
        Ok(valid) => valid,
        Err(err) => {
            warn!(error = %err, "Stored password hash could not be verified");
            false
        }
    }
}
