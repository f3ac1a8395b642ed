// Logging macros
//
// Each macro takes a `PiiRedactor`, the free text to scrub, and the usual
// tracing arguments. The scrubbed text is recorded as the `detail` field.

#[macro_export]
macro_rules! redacted_debug {
    ($redactor:expr, $text:expr, $($arg:tt)*) => {
        $crate::__tracing::debug!(detail = %$redactor.redact($text), $($arg)*)
    };
}

#[macro_export]
macro_rules! redacted_info {
    ($redactor:expr, $text:expr, $($arg:tt)*) => {
        $crate::__tracing::info!(detail = %$redactor.redact($text), $($arg)*)
    };
}

#[macro_export]
macro_rules! redacted_warn {
    ($redactor:expr, $text:expr, $($arg:tt)*) => {
        $crate::__tracing::warn!(detail = %$redactor.redact($text), $($arg)*)
    };
}
