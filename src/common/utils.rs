/// Log something that should never happen, but isn't worth failing over.
#[macro_export]
macro_rules! alert {
    ($($arg:tt)*) => {
        ::tracing::warn!("ALERT: {}", format_args!($($arg)*));
    };
}
