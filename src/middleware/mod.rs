mod core;
mod metrics;
mod tracing;

pub use self::core::{AfterFn, BeforeFn, Middleware};
pub use self::metrics::MetricsMiddleware;
pub use self::tracing::TracingMiddleware;
