//! Helper macros shared by the codec modules.

/// Returns early with `Err($error)` when `$predicate` does not hold.
///
/// ```ignore
/// ensure!(body_length <= self.max_body_bytes, ParseError::too_large_body(body_length, self.max_body_bytes));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
