//! Blocking TCP service exposing one broker.
//!
//! One listener thread accepts; each connection gets its own thread and
//! handles requests strictly in order, so calls arriving on one
//! connection are observed in invocation order. Peer callbacks made
//! while a request is in flight arrive on fresh connections and their
//! threads, which is what keeps the re-entrant connect/refresh
//! cascades progressing.

use crate::broker::{BrokerRef, BrokerStore, Connection};
use crate::clock::Clock;
use crate::error::Result;
use crate::types::{INVALID_SOURCE, SELF_SOURCE};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

use super::message::{read_frame, write_frame, Request, Response};

pub struct Endpoint {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
}

impl Endpoint {
    /// Binds `authority` (`host:port`) and serves `broker` until
    /// `stop`. The store builds reverse proxies for connecting peers.
    pub fn serve(store: Arc<BrokerStore>, broker: BrokerRef, authority: &str) -> Result<Endpoint> {
        let listener = TcpListener::bind(authority)?;
        let addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        thread::spawn(move || accept_loop(listener, store, broker, flag));

        info!(%addr, "endpoint serving");
        Ok(Endpoint { addr, shutdown })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the accept loop so it observes the flag.
        let _ = TcpStream::connect(self.addr);
    }
}

fn accept_loop(
    listener: TcpListener,
    store: Arc<BrokerStore>,
    broker: BrokerRef,
    shutdown: Arc<AtomicBool>,
) {
    for stream in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                let store = store.clone();
                let broker = broker.clone();
                thread::spawn(move || serve_connection(store, broker, stream));
            }
            Err(err) => warn!(%err, "accept failed"),
        }
    }
    debug!("endpoint stopped");
}

fn serve_connection(store: Arc<BrokerStore>, broker: BrokerRef, mut stream: TcpStream) {
    loop {
        let request: Request = match read_frame(&mut stream) {
            Ok(request) => request,
            Err(_) => break,
        };
        let response = dispatch(&store, &broker, request);
        if write_frame(&mut stream, &response).is_err() {
            break;
        }
    }
}

/// Maps one request onto the served broker. Failures surface as the
/// protocol's own sentinels, never as a dropped connection.
pub fn dispatch(store: &BrokerStore, broker: &BrokerRef, request: Request) -> Response {
    match request {
        Request::Connect { source, clock, provides, url } => match store.get_or_create(&url) {
            Ok(stub) => {
                let conn = if source == SELF_SOURCE {
                    Connection::new(stub)
                } else {
                    Connection { peer: Some(stub), source, clock, provides }
                };
                let out = broker.connect(conn);
                Response::Connect { source: out.source, clock: out.clock, provides: out.provides }
            }
            Err(err) => {
                warn!(%err, %url, "connect: cannot reach back");
                Response::Connect {
                    source: INVALID_SOURCE,
                    clock: Clock::invalid(),
                    provides: Default::default(),
                }
            }
        },
        Request::Query { sender, clock } => {
            Response::Query { entries: broker.query(&clock, sender) }
        }
        Request::Insert { sender, entry } => {
            Response::Clock { clock: broker.insert(&entry, sender) }
        }
        Request::Refresh { sender, source, clock, provides } => {
            let data = Connection { peer: None, source, clock, provides };
            Response::Refresh { ok: broker.refresh(&data, sender) }
        }
        Request::Relay { sender, data } => Response::Clock { clock: broker.relay(data, sender) },
        Request::GetClock => Response::Clock { clock: broker.clock() },
        Request::Sources { sender } => Response::Sources { sources: broker.sources(sender) },
    }
}
