//! Error construction macros.

/// Creates a [`crate::error::SiltError`] from a kind, a static description,
/// and an optional dynamic detail.
#[macro_export]
macro_rules! silt_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::SiltError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::SiltError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::SiltError`] from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::silt_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::silt_error!($kind, $desc, $detail))
    };
}
