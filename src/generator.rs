//! Synthetic test data.

use chrono::{Duration, NaiveDate};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::row::Row;

pub const DEFAULT_STRING_LEN: usize = 10;
pub const DEFAULT_DAYS: u32 = 30;

/// Produces rows with a fixed-length alphanumeric `value` and a `date` drawn
/// uniformly from `[start_date, start_date + days)`.
#[derive(Debug, Clone)]
pub struct Generator {
    string_len: usize,
    start_date: NaiveDate,
    days: u32,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            string_len: DEFAULT_STRING_LEN,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            days: DEFAULT_DAYS,
        }
    }
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string_len(mut self, len: usize) -> Self {
        self.string_len = len;
        self
    }

    pub fn start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = date;
        self
    }

    pub fn days(mut self, days: u32) -> Self {
        self.days = days;
        self
    }

    /// Generate `n` rows. The same seed always yields the same rows.
    pub fn generate(&self, n: i64, seed: Option<u64>) -> Result<Vec<Row>> {
        if n < 0 {
            return Err(Error::InvalidArgument(format!(
                "row count must be non-negative, got {}",
                n
            )));
        }
        if self.string_len == 0 {
            return Err(Error::InvalidArgument(
                "string length must be positive".to_string(),
            ));
        }
        if self.days == 0 {
            return Err(Error::InvalidArgument(
                "date range must span at least one day".to_string(),
            ));
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let rows = (0..n)
            .map(|_| {
                let value: String = (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(self.string_len)
                    .map(char::from)
                    .collect();
                let offset = rng.gen_range(0..self.days);
                Row::new(value, self.start_date + Duration::days(i64::from(offset)))
            })
            .collect();

        Ok(rows)
    }
}

/// Generate `n` rows with the default generator settings.
pub fn generate(n: i64, seed: Option<u64>) -> Result<Vec<Row>> {
    Generator::default().generate(n, seed)
}
