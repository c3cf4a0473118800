pub mod render;
pub mod scene;
pub mod transform;

/// Logs a contract violation and aborts the current thread.
///
/// Reserved for integration bugs (a resource that must exist does not, a
/// format that cannot be used the way it is requested). Recoverable load
/// failures go through `anyhow::Result` instead.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {{
        log::error!($($arg)+);
        panic!($($arg)+)
    }};
}
