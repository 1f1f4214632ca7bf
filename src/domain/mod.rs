//! Resources served behind the gate.

pub mod filters;
pub mod movies;
pub mod users;

use std::collections::BTreeMap;

use crate::error::Error;

/// Collects field errors; the first message per field wins.
#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<&'static str, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &'static str, message: &str) {
        if !ok {
            self.errors.entry(field).or_insert_with(|| message.to_string());
        }
    }

    pub fn finish(self) -> Result<(), Error> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::FailedValidation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_per_field_wins() {
        let mut v = Validator::new();
        v.check(false, "title", "must be provided");
        v.check(false, "title", "must not be more than 500 bytes long");
        v.check(true, "year", "must be provided");

        match v.finish() {
            Err(Error::FailedValidation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors["title"], "must be provided");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
