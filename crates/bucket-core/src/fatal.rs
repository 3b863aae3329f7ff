/// Aborts the process for a detected invariant violation (§7 "Fatal
/// conditions"), logging the violation first. Never call this for a
/// recoverable condition — those go through [`crate::Error`] instead.
pub fn fatal_abort(message: &str) -> ! {
    tracing::error!(message, "fatal invariant violation, aborting");
    panic!("fatal invariant violation: {message}");
}

/// Convenience wrapper around [`fatal_abort`] with `format!`-style arguments.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::fatal_abort(&format!($($arg)*))
    };
}
