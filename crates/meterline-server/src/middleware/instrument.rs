//! Request instrumentation middleware.
//!
//! `InstrumentLayer` wraps any HTTP service and records one data point per
//! request into the injected `ServiceMetrics`: a count keyed by
//! (path, method, status) and a latency sample keyed by path. The response
//! passes through untouched.
//!
//! Outcome to status label:
//! - response produced: its status code
//! - inner service returned `Err` or the handler panicked: `500`, then the
//!   error/panic is propagated unchanged
//! - future dropped before completion (client gone, timeout): `499`
//!
//! Rejected metric updates are logged at `warn` the first time per family and
//! at `debug` after that.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tower::{Layer, Service};

use crate::obs::metrics::ServiceMetrics;

/// Recorded when the downstream handler fails before producing a response.
pub const STATUS_FAILED: u16 = 500;
/// Recorded when the request is dropped mid-flight (nginx "client closed request").
pub const STATUS_CANCELLED: u16 = 499;

/// Layer producing [`Instrumented`] services.
#[derive(Clone)]
pub struct InstrumentLayer {
    metrics: Arc<ServiceMetrics>,
}

impl InstrumentLayer {
    pub fn new(metrics: Arc<ServiceMetrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for InstrumentLayer {
    type Service = Instrumented<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Instrumented {
            inner,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Service wrapper that records request count and latency.
#[derive(Clone)]
pub struct Instrumented<S> {
    inner: S,
    metrics: Arc<ServiceMetrics>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Instrumented<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let observation = Observation::start(
            Arc::clone(&self.metrics),
            req.uri().path().to_string(),
            req.method().as_str().to_string(),
        );
        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut observation = observation;
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(res)) => {
                    observation.finish(res.status().as_u16());
                    Ok(res)
                }
                Ok(Err(err)) => {
                    observation.finish(STATUS_FAILED);
                    Err(err)
                }
                Err(panic) => {
                    observation.finish(STATUS_FAILED);
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }
}

/// One in-flight request. Records exactly once: on `finish`, or on drop.
///
/// A drop during unwinding means the inner `call` panicked before handing back
/// a future, which counts as a failure rather than a cancellation.
struct Observation {
    metrics: Arc<ServiceMetrics>,
    path: String,
    method: String,
    started: Instant,
    done: bool,
}

impl Observation {
    fn start(metrics: Arc<ServiceMetrics>, path: String, method: String) -> Self {
        Self {
            metrics,
            path,
            method,
            started: Instant::now(),
            done: false,
        }
    }

    fn finish(&mut self, status: u16) {
        if self.done {
            return;
        }
        self.done = true;
        let elapsed = self.started.elapsed();

        tracing::debug!(
            method = %self.method,
            path = %self.path,
            status,
            latency_ms = elapsed.as_secs_f64() * 1000.0,
            "request completed"
        );

        // Instrumentation failures never reach the caller.
        if let Err(e) = self.metrics.record(&self.path, &self.method, status, elapsed) {
            if self.metrics.first_rejection(&e) {
                tracing::warn!(
                    code = e.code().as_str(),
                    path = %self.path,
                    error = %e,
                    "metric update rejected, further rejections logged at debug"
                );
            } else {
                tracing::debug!(
                    code = e.code().as_str(),
                    path = %self.path,
                    error = %e,
                    "metric update rejected"
                );
            }
        }
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if std::thread::panicking() {
            self.finish(STATUS_FAILED);
        } else {
            tracing::debug!(
                method = %self.method,
                path = %self.path,
                "request cancelled in flight"
            );
            self.finish(STATUS_CANCELLED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::time::Duration;

    use tower::{service_fn, ServiceExt};

    fn get(path: &str) -> Request<()> {
        Request::get(path).body(()).unwrap()
    }

    fn count(m: &ServiceMetrics, path: &str, method: &str, status: &str) -> u64 {
        m.requests_total
            .get(&[("path", path), ("method", method), ("status", status)])
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn response_passes_through_unchanged() {
        let metrics = Arc::new(ServiceMetrics::default());
        let layer = InstrumentLayer::new(Arc::clone(&metrics));
        let svc = layer.layer(service_fn(|_req: Request<()>| async {
            let res = Response::builder()
                .status(201)
                .header("x-probe", "1")
                .body("made")
                .unwrap();
            Ok::<_, Infallible>(res)
        }));

        let res = svc.oneshot(get("/things")).await.unwrap();
        assert_eq!(res.status(), 201);
        assert_eq!(res.headers()["x-probe"], "1");
        assert_eq!(*res.body(), "made");
        assert_eq!(count(&metrics, "/things", "GET", "201"), 1);
    }

    #[tokio::test]
    async fn inner_error_is_counted_and_propagated() {
        let metrics = Arc::new(ServiceMetrics::default());
        let layer = InstrumentLayer::new(Arc::clone(&metrics));
        let svc = layer.layer(service_fn(|_req: Request<()>| async {
            Err::<Response<()>, _>("boom")
        }));

        let err = svc.oneshot(get("/hello")).await.unwrap_err();
        assert_eq!(err, "boom");
        assert_eq!(count(&metrics, "/hello", "GET", "500"), 1);
        assert_eq!(metrics.request_latency.get(&[("path", "/hello")]).unwrap().count, 1);
    }

    #[tokio::test]
    async fn panic_is_counted_and_resumed() {
        let metrics = Arc::new(ServiceMetrics::default());
        let layer = InstrumentLayer::new(Arc::clone(&metrics));
        let svc = layer.layer(service_fn(|_req: Request<()>| async {
            if true {
                panic!("handler blew up");
            }
            Ok::<Response<()>, Infallible>(Response::new(()))
        }));

        let outcome = AssertUnwindSafe(svc.oneshot(get("/hello"))).catch_unwind().await;
        assert!(outcome.is_err());
        assert_eq!(count(&metrics, "/hello", "GET", "500"), 1);
    }

    #[tokio::test]
    async fn dropped_request_records_cancellation() {
        let metrics = Arc::new(ServiceMetrics::default());
        let layer = InstrumentLayer::new(Arc::clone(&metrics));
        let svc = layer.layer(service_fn(|_req: Request<()>| async {
            std::future::pending::<()>().await;
            Ok::<Response<()>, Infallible>(Response::new(()))
        }));

        let call = svc.oneshot(get("/slow"));
        let timed_out = tokio::time::timeout(Duration::from_millis(20), call).await;
        assert!(timed_out.is_err());
        assert_eq!(count(&metrics, "/slow", "GET", "499"), 1);

        let hist = metrics.request_latency.get(&[("path", "/slow")]).unwrap();
        assert_eq!(hist.count, 1);
        assert!(hist.sum >= 0.01);
    }

    #[tokio::test]
    async fn method_is_part_of_the_key() {
        let metrics = Arc::new(ServiceMetrics::default());
        let layer = InstrumentLayer::new(Arc::clone(&metrics));
        let mut svc = layer.layer(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(Response::new(()))
        }));

        let post = Request::post("/hello").body(()).unwrap();
        svc.ready().await.unwrap().call(post).await.unwrap();
        svc.ready().await.unwrap().call(get("/hello")).await.unwrap();

        assert_eq!(count(&metrics, "/hello", "POST", "200"), 1);
        assert_eq!(count(&metrics, "/hello", "GET", "200"), 1);
        assert_eq!(metrics.request_latency.get(&[("path", "/hello")]).unwrap().count, 2);
    }

    #[tokio::test]
    async fn rejected_metric_update_does_not_fail_request() {
        let metrics = Arc::new(ServiceMetrics::from_config(&crate::config::MetricsSection {
            max_series: 1,
            ..Default::default()
        }));
        let layer = InstrumentLayer::new(Arc::clone(&metrics));
        let mut svc = layer.layer(service_fn(|_req: Request<()>| async {
            Ok::<_, Infallible>(Response::new(()))
        }));

        svc.ready().await.unwrap().call(get("/a")).await.unwrap();
        let res = svc.ready().await.unwrap().call(get("/b")).await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(count(&metrics, "/b", "GET", "200"), 0);
        assert_eq!(metrics.snapshot().requests.len(), 1);
    }

    /// Service that panics in `call` itself, before any future exists.
    struct PanicsInCall;

    impl Service<Request<()>> for PanicsInCall {
        type Response = Response<()>;
        type Error = Infallible;
        type Future = std::future::Ready<Result<Response<()>, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<()>) -> Self::Future {
            panic!("call blew up");
        }
    }

    #[test]
    fn panic_in_call_counts_as_failure() {
        let metrics = Arc::new(ServiceMetrics::default());
        let mut svc = InstrumentLayer::new(Arc::clone(&metrics)).layer(PanicsInCall);

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| svc.call(get("/hello"))));
        assert!(outcome.is_err());
        assert_eq!(count(&metrics, "/hello", "GET", "500"), 1);
        assert_eq!(count(&metrics, "/hello", "GET", "499"), 0);
        assert_eq!(metrics.request_latency.get(&[("path", "/hello")]).unwrap().count, 1);
    }

    #[test]
    fn repeated_rejections_do_not_fail_requests() {
        let metrics = Arc::new(ServiceMetrics::from_config(&crate::config::MetricsSection {
            max_series: 1,
            ..Default::default()
        }));
        for path in ["/a", "/b", "/c", "/d"] {
            let mut obs = Observation::start(Arc::clone(&metrics), path.into(), "GET".into());
            obs.finish(200);
        }
        assert_eq!(metrics.snapshot().requests.len(), 1);
        assert_eq!(count(&metrics, "/a", "GET", "200"), 1);
    }

    #[test]
    fn observation_records_once() {
        let metrics = Arc::new(ServiceMetrics::default());
        let mut obs = Observation::start(Arc::clone(&metrics), "/x".into(), "GET".into());
        obs.finish(200);
        obs.finish(500);
        drop(obs);
        assert_eq!(count(&metrics, "/x", "GET", "200"), 1);
        assert_eq!(count(&metrics, "/x", "GET", "500"), 0);
        assert_eq!(count(&metrics, "/x", "GET", "499"), 0);
    }
}
