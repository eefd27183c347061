//! ---
//! bco_section: "03-observability"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Structured logging adapters and sinks."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
//! Level-specific macros sharing one field layout.

#[doc(hidden)]
#[macro_export]
macro_rules! __bco_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            cluster = ctx.cluster.unwrap_or(""),
            node = ctx.node.unwrap_or(""),
            plan = ctx.plan.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with failover context.
#[macro_export]
macro_rules! bco_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__bco_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__bco_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with failover context.
#[macro_export]
macro_rules! bco_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__bco_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__bco_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with failover context.
#[macro_export]
macro_rules! bco_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__bco_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__bco_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with failover context.
#[macro_export]
macro_rules! bco_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__bco_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__bco_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
