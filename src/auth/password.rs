//! Password strength checks and bcrypt hashes for user accounts.

use std::fmt::{self, Display};

use bcrypt::{hash, verify};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use zxcvbn::{Score, zxcvbn};

use crate::Error;

const WEAK_PASSWORD_HINT: &str = "Use a longer password that is not based on your email.";

/// A password that passed the strength check and may be hashed.
#[derive(Clone, PartialEq)]
pub struct ValidatedPassword(String);

impl ValidatedPassword {
    /// Check that `raw_password` is strong enough to protect an account.
    ///
    /// `user_inputs` are words the password must not lean on, such as the
    /// account's email address. A zxcvbn score of three or more is required.
    ///
    /// # Errors
    ///
    /// Returns [Error::TooWeak] with zxcvbn's advice on a stronger password.
    pub fn new(raw_password: &str, user_inputs: &[&str]) -> Result<Self, Error> {
        let entropy = zxcvbn(raw_password, user_inputs);

        if matches!(entropy.score(), Score::Three | Score::Four) {
            return Ok(Self(raw_password.to_owned()));
        }

        let advice = entropy
            .feedback()
            .map(|feedback| feedback.to_string())
            .filter(|advice| !advice.trim().is_empty())
            .unwrap_or_else(|| WEAK_PASSWORD_HINT.to_owned());

        Err(Error::TooWeak(advice))
    }
}

impl fmt::Debug for ValidatedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValidatedPassword(********)")
    }
}

/// A salted bcrypt hash, as stored in the `user.password` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// bcrypt's default work factor.
    pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

    /// Hash `password` with `cost` rounds of bcrypt.
    ///
    /// # Errors
    ///
    /// Returns [Error::HashingError] if bcrypt rejects the cost or fails.
    pub fn new(password: ValidatedPassword, cost: u32) -> Result<Self, Error> {
        hash(&password.0, cost)
            .map(Self)
            .map_err(|error| Error::HashingError(error.to_string()))
    }

    /// Check and hash the password chosen for the account `email`.
    ///
    /// The email and the words in it count against the password's strength.
    ///
    /// # Errors
    ///
    /// Returns [Error::TooWeak] for a weak password, or [Error::HashingError].
    pub fn for_account(raw_password: &str, email: &str, cost: u32) -> Result<Self, Error> {
        let password = ValidatedPassword::new(raw_password, &email_words(email))?;
        Self::new(password, cost)
    }

    /// Wrap a hash read from storage without checking its format.
    pub fn new_unchecked(raw_hash: &str) -> Self {
        Self(raw_hash.to_owned())
    }

    /// Whether `raw_password` is the password this hash was made from.
    ///
    /// # Errors
    ///
    /// Returns [Error::HashingError] if the stored hash is malformed.
    pub fn verify(&self, raw_password: &str) -> Result<bool, Error> {
        verify(raw_password, &self.0).map_err(|error| Error::HashingError(error.to_string()))
    }
}

/// `email` followed by its alphanumeric parts, e.g. "sari", "example" and "com".
fn email_words(email: &str) -> Vec<&str> {
    std::iter::once(email)
        .chain(email.split(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .collect()
}

impl Display for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ToSql for PasswordHash {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for PasswordHash {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        String::column_result(value).map(Self)
    }
}
