use crate::dispatcher::{Dispatcher, Request, Response};
use std::sync::Arc;

/// Whatever answers requests on the workers.
pub trait Service: Send + Sync + 'static {
    fn call(&self, req: &mut Request, res: &mut Response);
}

impl Service for Dispatcher {
    fn call(&self, req: &mut Request, res: &mut Response) {
        self.dispatch(req, res);
    }
}

impl<S: Service + ?Sized> Service for Arc<S> {
    fn call(&self, req: &mut Request, res: &mut Response) {
        S::call(self, req, res)
    }
}
