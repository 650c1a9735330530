use crate::database::store::StoreError;

/// How a failed write is presented to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The payload was malformed or semantically invalid: answer 400
    BadRequest,
    /// Anything else: hand over to the error translator
    Unclassified,
}

/// Maps engine errors raised by inserts and updates to a [`Classification`].
///
/// Each storage backend speaks its own error vocabulary, so the policy is
/// chosen per backend when the handlers are built.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, err: &StoreError) -> Classification;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&StoreError) -> Classification + Send + Sync,
{
    fn classify(&self, err: &StoreError) -> Classification {
        self(err)
    }
}

fn classify_code(err: &StoreError, allow_list: &[&str]) -> Classification {
    match err.code() {
        Some(code) if allow_list.contains(&&*code) => Classification::BadRequest,
        _ => Classification::Unclassified,
    }
}

/// PostgreSQL SQLSTATE codes that signal a bad payload
pub struct PostgresCodes;

impl PostgresCodes {
    pub const BAD_PAYLOAD: &'static [&'static str] = &[
        "22001", // string_data_right_truncation
        "22P02", // invalid_text_representation
        "22007", // invalid_datetime_format
        "22008", // datetime_field_overflow
        "22018", // invalid_character_value_for_cast
        "22P05", // untranslatable_character
        "42804", // datatype_mismatch
        "23503", // foreign_key_violation
        "22003", // numeric_value_out_of_range
        "23502", // not_null_violation
    ];
}

impl ErrorClassifier for PostgresCodes {
    fn classify(&self, err: &StoreError) -> Classification {
        classify_code(err, Self::BAD_PAYLOAD)
    }
}

/// MySQL / MariaDB error names that signal a bad payload
pub struct MysqlCodes;

impl MysqlCodes {
    pub const BAD_PAYLOAD: &'static [&'static str] = &[
        "ER_DATA_TOO_LONG",
        "ER_TRUNCATED_WRONG_VALUE_FOR_FIELD",
        "ER_NO_REFERENCED_ROW_2",
        "ER_WARN_DATA_OUT_OF_RANGE",
        "ER_BAD_NULL_ERROR",
        "ER_NO_DEFAULT_FOR_FIELD",
        "ER_PARSE_ERROR",
        "WARN_DATA_TRUNCATED",
    ];
}

impl ErrorClassifier for MysqlCodes {
    fn classify(&self, err: &StoreError) -> Classification {
        classify_code(err, Self::BAD_PAYLOAD)
    }
}
