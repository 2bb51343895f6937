use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::{ContentType, StatusClass},
    request::{FromRequest, Outcome},
    Data, Orbit, Request, Response, Rocket,
};

use crate::config::StoreKind;

/// A unique identifier for a particular request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct RequestId(pub usize);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RequestId {
    /// Atomically get the next ID. Wraps around to zero on overflow.
    pub fn next() -> RequestId {
        static REQUEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
        RequestId(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Allow the ID to be accessed via request guard, e.g. to tag the log lines of
/// a long-lived event stream.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for &'r RequestId {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(req.local_cache(RequestId::next))
    }
}

/// Number of event streams currently open.
static OPEN_STREAMS: AtomicUsize = AtomicUsize::new(0);

/// Held by an event stream for as long as a client is following it, so its
/// lifetime shows up in the logs however it ends.
#[derive(Debug)]
pub struct StreamGuard {
    id: RequestId,
    topic: &'static str,
}

impl StreamGuard {
    pub fn open(id: RequestId, topic: &'static str) -> Self {
        let open = OPEN_STREAMS.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("req{id} following the {topic} ({open} streams open)");
        Self { id, topic }
    }

    pub fn open_streams() -> usize {
        OPEN_STREAMS.load(Ordering::Relaxed)
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let open = OPEN_STREAMS
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        debug!(
            "req{} stopped following the {} ({open} streams open)",
            self.id, self.topic
        );
    }
}

/// A rocket fairing that logs every request and response.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let protocol = if rocket.config().tls_enabled() {
            "https"
        } else {
            "http"
        };
        let ip = &rocket.config().address;
        let port = &rocket.config().port;
        let store = match rocket.state::<StoreKind>() {
            Some(StoreKind::Mongodb) => "MongoDB",
            Some(StoreKind::Memory) => "in-memory",
            None => "unknown",
        };
        info!("Poll server launched on {protocol}://{ip}:{port} with {store} store");
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let id = req.local_cache(RequestId::next);
        let method = req.method();
        let uri = req.uri();
        info!("->req{id} {method} {uri}");
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let id = req.local_cache(RequestId::next);
        let code = res.status();
        let route = match req.route() {
            Some(r) => match r.name {
                Some(ref name) => format!("{name} ({})", r.uri),
                None => r.uri.to_string(),
            },
            None => "UNKNOWN ROUTE".to_string(),
        };
        let log_msg = if res.content_type() == Some(ContentType::EventStream) {
            format!("<-rsp{id} {code} {route}, streaming")
        } else {
            format!("<-rsp{id} {code} {route}")
        };
        match code.class() {
            StatusClass::ServerError => error!("{log_msg}"),
            StatusClass::ClientError => warn!("{log_msg}"),
            _ => info!("{log_msg}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        let open = StreamGuard::open_streams();
        warn!("Shutdown requested, closing {open} event streams...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase() {
        let a = RequestId::next();
        let b = RequestId::next();
        assert!(b > a);
        assert_eq!(RequestId(7).to_string(), "7");
    }

    #[test]
    fn guards_count_open_streams() {
        let guard = StreamGuard::open(RequestId::next(), "results");
        assert!(StreamGuard::open_streams() >= 1);
        let other = StreamGuard::open(RequestId::next(), "active question");
        assert!(StreamGuard::open_streams() >= 2);
        drop(guard);
        drop(other);
    }
}
