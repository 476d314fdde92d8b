//! Helpers for propagating [`Outcome`](asupersync::Outcome) values.
//!
//! Every async operation in the workspace returns `Outcome<T, Error>`. These
//! macros are the `?` of that world: they unwrap the success value or return
//! the non-success variant unchanged.

/// Unwrap `Outcome::Ok` or return the other variant from the enclosing fn.
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            $crate::Outcome::Ok(value) => value,
            $crate::Outcome::Err(err) => return $crate::Outcome::Err(err),
            $crate::Outcome::Cancelled(reason) => return $crate::Outcome::Cancelled(reason),
            $crate::Outcome::Panicked(payload) => return $crate::Outcome::Panicked(payload),
        }
    };
}

/// Unwrap a `Result` inside a fn returning `Outcome`, turning `Err` into
/// `Outcome::Err`.
#[macro_export]
macro_rules! try_ok {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => return $crate::Outcome::Err(err.into()),
        }
    };
}

/// Convert an outcome into a plain result.
///
/// Cancellation and panics become [`Error::Cancelled`](crate::Error::Cancelled)
/// and [`Error::Panicked`](crate::Error::Panicked) so callers that only deal
/// in `Result` still see every way the operation can end.
pub fn into_result<T>(outcome: crate::Outcome<T, crate::Error>) -> crate::Result<T> {
    match outcome {
        crate::Outcome::Ok(value) => Ok(value),
        crate::Outcome::Err(err) => Err(err),
        crate::Outcome::Cancelled(reason) => Err(crate::Error::Cancelled(format!("{reason:?}"))),
        crate::Outcome::Panicked(payload) => Err(crate::Error::Panicked(format!("{payload:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Outcome};

    fn double(input: Outcome<i64, Error>) -> Outcome<i64, Error> {
        let v = try_outcome!(input);
        Outcome::Ok(v * 2)
    }

    fn parse(input: &str) -> Outcome<i64, Error> {
        let v: i64 = try_ok!(input.parse::<i64>().map_err(|e| Error::definition(e.to_string())));
        Outcome::Ok(v)
    }

    #[test]
    fn test_try_outcome_passes_errors_through() {
        assert!(matches!(double(Outcome::Ok(2)), Outcome::Ok(4)));
        let err = Error::not_found("pet", "1");
        match double(Outcome::Err(err.clone())) {
            Outcome::Err(e) => assert_eq!(e, err),
            _ => panic!("expected error"),
        }
    }

    #[test]
    fn test_try_ok_and_into_result() {
        assert_eq!(into_result(parse("7")).unwrap(), 7);
        assert!(matches!(
            into_result(parse("x")),
            Err(Error::Definition(_))
        ));
    }
}
