//! Middleware interception points.
//!
//! Observers can be hooked at four steps of the request/response cycle.
//! With service A calling service B, the order of events is:
//!
//! 1. outgoing-request, on A, after encoding and before publish
//! 2. incoming-request, on B, after decoding and before local delivery
//! 3. incoming-response, on B after local delivery produces a response;
//!    the same point also fires on A when the correlated response comes
//!    off the broker
//! 4. outgoing-response, on A, when the response is handed back to the
//!    originator
//!
//! Middlewares observe; they never mutate the envelope. They run on the
//! delivering task in registration order, so anything slow belongs on a
//! spawned task of their own.

pub mod logger;
pub mod trace;

use crate::envelope::{Request, Response};

type RequestObserver = Box<dyn Fn(&Request) + Send + Sync>;
type ResponseObserver = Box<dyn Fn(&Response) + Send + Sync>;

/// Ordered observer lists for the four interception points. Built once
/// at startup, then shared immutably with the broker session and proxy.
#[derive(Default)]
pub struct MiddlewareChain {
    outgoing_request: Vec<RequestObserver>,
    incoming_request: Vec<RequestObserver>,
    incoming_response: Vec<ResponseObserver>,
    outgoing_response: Vec<ResponseObserver>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_outgoing_request(&mut self, observer: impl Fn(&Request) + Send + Sync + 'static) {
        self.outgoing_request.push(Box::new(observer));
    }

    pub fn on_incoming_request(&mut self, observer: impl Fn(&Request) + Send + Sync + 'static) {
        self.incoming_request.push(Box::new(observer));
    }

    pub fn on_incoming_response(&mut self, observer: impl Fn(&Response) + Send + Sync + 'static) {
        self.incoming_response.push(Box::new(observer));
    }

    pub fn on_outgoing_response(&mut self, observer: impl Fn(&Response) + Send + Sync + 'static) {
        self.outgoing_response.push(Box::new(observer));
    }

    pub fn outgoing_request(&self, request: &Request) {
        for observer in &self.outgoing_request {
            observer(request);
        }
    }

    pub fn incoming_request(&self, request: &Request) {
        for observer in &self.incoming_request {
            observer(request);
        }
    }

    pub fn incoming_response(&self, response: &Response) {
        for observer in &self.incoming_response {
            observer(response);
        }
    }

    pub fn outgoing_response(&self, response: &Response) {
        for observer in &self.outgoing_response {
            observer(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn observers_fire_per_interception_point() {
        let mut chain = MiddlewareChain::new();
        let requests = Arc::new(AtomicUsize::new(0));
        let responses = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        chain.on_outgoing_request(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = responses.clone();
        chain.on_incoming_response(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        chain.outgoing_request(&Request::default());
        chain.outgoing_request(&Request::default());
        chain.incoming_response(&Response::default());
        // Unregistered points are no-ops.
        chain.incoming_request(&Request::default());
        chain.outgoing_response(&Response::default());

        assert_eq!(requests.load(Ordering::SeqCst), 2);
        assert_eq!(responses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn observers_run_in_registration_order() {
        let mut chain = MiddlewareChain::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            chain.on_incoming_request(move |_| {
                order.lock().unwrap().push(tag);
            });
        }

        chain.incoming_request(&Request::default());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }
}
