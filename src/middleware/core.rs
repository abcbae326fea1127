use crate::dispatcher::{Request, Response};

/// A step that runs around every matched route.
///
/// `before` returns `false` to stop the request; it is then expected to have
/// written its own response. `after` has no veto and runs only when the
/// whole before chain and the handler completed.
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &mut Request, _res: &mut Response) -> bool {
        true
    }
    fn after(&self, _req: &Request, _res: &mut Response) {}
}

/// Adapter turning a closure into before-middleware.
pub struct BeforeFn<F>(pub F);

impl<F> Middleware for BeforeFn<F>
where
    F: Fn(&mut Request, &mut Response) -> bool + Send + Sync,
{
    fn before(&self, req: &mut Request, res: &mut Response) -> bool {
        (self.0)(req, res)
    }
}

/// Adapter turning a closure into after-middleware.
pub struct AfterFn<F>(pub F);

impl<F> Middleware for AfterFn<F>
where
    F: Fn(&Request, &mut Response) + Send + Sync,
{
    fn after(&self, req: &Request, res: &mut Response) {
        (self.0)(req, res)
    }
}
