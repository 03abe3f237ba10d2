//! TCP link to the collector.
//!
//! The link thread owns connecting: it dials the collector until it first
//! answers, sends the handshake on the fresh stream, and only then
//! publishes it. The ranging loop writes through a [`TcpLink`] handle; the
//! first failed write drops the stream for the rest of the run.

use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{info, warn};

use echonode::comm;
use echonode::emitter::Link;
use echonode::error::LinkError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// One open, handshaken collector stream.
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    pub fn open(addr: &SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect_timeout(addr, CONNECT_TIMEOUT)?;
        stream.set_nodelay(true)?; // one small record per event
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        Ok(Self { stream })
    }
}

impl Link for Connection {
    fn is_connected(&self) -> bool {
        true
    }

    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        self.stream
            .write_all(line.as_bytes())
            .map_err(|_| LinkError::Io)
    }
}

/// Shared handle to the current collector stream, if any.
#[derive(Clone, Default)]
pub struct TcpLink {
    slot: Arc<Mutex<Option<Connection>>>,
}

impl Link for TcpLink {
    fn is_connected(&self) -> bool {
        self.slot.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        let mut slot = self.slot.lock().map_err(|_| LinkError::Io)?;
        let conn = slot.as_mut().ok_or(LinkError::Disconnected)?;
        let result = conn.send_line(line);
        if result.is_err() {
            warn!("Collector link lost, continuing with local log only");
            *slot = None;
        }
        result
    }
}

impl TcpLink {
    fn publish(&self, conn: Connection) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(conn);
        }
    }
}

/// Dial the collector until it answers once, then hand the stream over.
pub fn link_thread(link: TcpLink, host: &'static str, port: u16, device_id: &str, boot_us: fn() -> u32) {
    info!("Link thread started, collector {}:{}", host, port);

    loop {
        let addr = match (host, port).to_socket_addrs().map(|mut a| a.next()) {
            Ok(Some(addr)) => addr,
            Ok(None) | Err(_) => {
                warn!("Cannot resolve collector {}", host);
                thread::sleep(RETRY_INTERVAL);
                continue;
            }
        };

        match Connection::open(&addr) {
            Ok(mut conn) => match comm::send_handshake(&mut conn, device_id, boot_us()) {
                Ok(()) => {
                    link.publish(conn);
                    info!("Collector link up ({})", addr);
                    return;
                }
                Err(e) => warn!("Handshake failed: {}", e),
            },
            Err(e) => warn!("Collector connect failed: {}", e),
        }

        thread::sleep(RETRY_INTERVAL);
    }
}
