//! Fan-out of encoded OSC packets to every configured target.
//!
//! Each target owns a bounded lane and a sender thread, so a slow or dead
//! target only ever loses its own packets. Packets are encoded once and the
//! buffer is shared between lanes.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, info, warn};
use rosc::{encoder, OscMessage, OscPacket};

use crate::config::OscOptions;
use crate::error::DispatchError;

/// Something that can deliver one encoded packet.
pub trait OscTransport: Send + 'static {
    fn send(&mut self, packet: &[u8]) -> io::Result<usize>;
}

/// Connected UDP socket. A target whose address did not resolve keeps an
/// error instead and fails every send.
pub struct UdpTransport {
    socket: Result<UdpSocket, String>,
}

impl UdpTransport {
    pub fn connect(host: &str, port: u16, write_timeout: Duration) -> io::Result<Self> {
        let dest = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, format!("{}:{} did not resolve", host, port))
        })?;
        let local: SocketAddr = if dest.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(dest)?;
        socket.set_write_timeout(Some(write_timeout))?;
        Ok(Self { socket: Ok(socket) })
    }

    pub fn unresolved(reason: String) -> Self {
        Self { socket: Err(reason) }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().ok()?.local_addr().ok()
    }
}

impl OscTransport for UdpTransport {
    fn send(&mut self, packet: &[u8]) -> io::Result<usize> {
        match &self.socket {
            Ok(socket) => socket.send(packet),
            Err(reason) => Err(io::Error::new(io::ErrorKind::NotConnected, reason.clone())),
        }
    }
}

#[derive(Debug)]
pub struct TargetStats {
    sent: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
    alive: AtomicBool,
}

impl Default for TargetStats {
    fn default() -> Self {
        Self {
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            alive: AtomicBool::new(true),
        }
    }
}

impl TargetStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Packets refused because the target's lane was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// False after a failed send, true again after the next successful one.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct Target {
    name: String,
    address: String,
    port: u16,
    stats: Arc<TargetStats>,
}

impl Target {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            stats: Arc::new(TargetStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn stats(&self) -> Arc<TargetStats> {
        self.stats.clone()
    }
}

struct Lane {
    target: Target,
    tx: Sender<Arc<Vec<u8>>>,
    handle: JoinHandle<()>,
}

pub struct Dispatcher {
    lanes: Vec<Lane>,
    done_rx: Receiver<usize>,
}

impl Dispatcher {
    /// Spawn one sender thread per target.
    pub fn new(targets: Vec<(Target, Box<dyn OscTransport>)>, lane_capacity: usize) -> io::Result<Self> {
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let mut lanes = Vec::with_capacity(targets.len());
        for (index, (target, transport)) in targets.into_iter().enumerate() {
            let (tx, rx) = crossbeam_channel::bounded(lane_capacity.max(1));
            let worker_target = target.clone();
            let done = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("osc-{}", target.name))
                .spawn(move || {
                    lane_loop(worker_target, transport, rx);
                    let _ = done.send(index);
                })?;
            lanes.push(Lane { target, tx, handle });
        }
        Ok(Self { lanes, done_rx })
    }

    /// One UDP lane per configured target. Targets that fail to resolve stay
    /// in the set and count every packet as an error.
    pub fn connect_udp(options: &OscOptions) -> io::Result<Self> {
        let mut targets: Vec<(Target, Box<dyn OscTransport>)> = Vec::with_capacity(options.targets.len());
        for (name, t) in &options.targets {
            let transport = match UdpTransport::connect(&t.address, t.port, options.send_timeout()) {
                Ok(transport) => {
                    info!(
                        target: "osc",
                        "target '{}' -> {}:{} (local {:?})",
                        name, t.address, t.port, transport.local_addr()
                    );
                    transport
                }
                Err(e) => {
                    warn!(target: "osc", "target '{}' ({}:{}) is unreachable: {}", name, t.address, t.port, e);
                    UdpTransport::unresolved(e.to_string())
                }
            };
            targets.push((Target::new(name.as_str(), t.address.as_str(), t.port), Box::new(transport) as Box<dyn OscTransport>));
        }
        Self::new(targets, options.target_queue_capacity)
    }

    /// Encode `msg` once and queue it on every lane without blocking.
    ///
    /// Only an encoding failure is returned; per-target problems are logged
    /// and counted on that target.
    pub fn dispatch(&self, msg: &OscMessage) -> Result<(), DispatchError> {
        let packet = encoder::encode(&OscPacket::Message(msg.clone())).map_err(|e| DispatchError::Encode {
            addr: msg.addr.clone(),
            reason: format!("{:?}", e),
        })?;
        let packet = Arc::new(packet);
        for lane in &self.lanes {
            if let Err(e) = lane.tx.try_send(packet.clone()) {
                lane.target.stats.dropped.fetch_add(1, Ordering::Relaxed);
                let err = match e {
                    TrySendError::Full(_) => DispatchError::QueueFull {
                        target: lane.target.name.clone(),
                    },
                    TrySendError::Disconnected(_) => DispatchError::Closed {
                        target: lane.target.name.clone(),
                    },
                };
                debug!(target: "osc", "{} ({})", err, msg.addr);
            }
        }
        Ok(())
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.lanes.iter().map(|l| &l.target)
    }

    /// Close every lane and wait up to `grace` for the senders to drain.
    /// Returns how many were still busy and got detached.
    pub fn shutdown(self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        let mut pending: Vec<Option<(String, JoinHandle<()>)>> = self
            .lanes
            .into_iter()
            .map(|lane| {
                drop(lane.tx);
                Some((lane.target.name, lane.handle))
            })
            .collect();
        let mut remaining = pending.len();

        while remaining > 0 {
            let timeout = deadline.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(timeout) {
                Ok(index) => {
                    if let Some((_, handle)) = pending.get_mut(index).and_then(Option::take) {
                        let _ = handle.join();
                        remaining -= 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        for (name, _) in pending.into_iter().flatten() {
            warn!(target: "osc", "target '{}' did not drain within {:?}, detaching", name, grace);
        }
        remaining
    }
}

fn lane_loop(target: Target, mut transport: Box<dyn OscTransport>, rx: Receiver<Arc<Vec<u8>>>) {
    let stats = &target.stats;
    while let Ok(packet) = rx.recv() {
        match transport.send(&packet) {
            Ok(n) => {
                stats.sent.fetch_add(1, Ordering::Relaxed);
                if !stats.alive.swap(true, Ordering::Relaxed) {
                    info!(target: "osc", "target '{}' is sending again", target.name);
                }
                debug!(target: "osc", "sent {} bytes to '{}'", n, target.name);
            }
            Err(source) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                let err = DispatchError::Send {
                    target: target.name.clone(),
                    source,
                };
                if stats.alive.swap(false, Ordering::Relaxed) {
                    warn!(target: "osc", "{}", err);
                } else {
                    debug!(target: "osc", "{}", err);
                }
            }
        }
    }
    debug!(target: "osc", "lane for '{}' closed", target.name);
}
