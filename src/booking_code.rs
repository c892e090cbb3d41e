//! Short codes members show at the front desk.

use crate::error::LedgerError;
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use tracing::warn;

pub const CODE_LENGTH: usize = 8;
/// Upper case letters and digits without the easily confused 0, O, 1 and I.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const MAX_CODE_ATTEMPTS: usize = 8;

lazy_static! {
    pub static ref BOOKING_CODE_REGEX: Regex = Regex::new(r"^[A-HJ-NP-Z2-9]{8}$").unwrap();
}

#[cfg_attr(test, mockall::automock)]
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..CODE_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

pub fn is_well_formed(code: &str) -> bool {
    BOOKING_CODE_REGEX.is_match(code)
}

/// Hands fresh codes to `claim` until it accepts one.
///
/// `claim` returns `Ok(None)` when the code is already taken. Collisions are
/// retried up to [`MAX_CODE_ATTEMPTS`] times before giving up with a
/// [`LedgerError::TransientStoreFailure`].
pub fn with_unique_code<G, T, F>(generator: &G, mut claim: F) -> Result<T, LedgerError>
where
    G: CodeGenerator + ?Sized,
    F: FnMut(String) -> Result<Option<T>, LedgerError>,
{
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = generator.generate();
        match claim(code.clone())? {
            Some(claimed) => return Ok(claimed),
            None => warn!(%code, attempt, "Booking code collision"),
        }
    }
    Err(LedgerError::TransientStoreFailure(
        "No unique booking code could be issued".into(),
    ))
}
