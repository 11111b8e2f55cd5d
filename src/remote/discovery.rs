//! mDNS advertisement of the bridge's OSC endpoint.

use log::{info, warn};
use mdns_sd::{IfKind, ServiceDaemon, ServiceInfo};

use crate::config::{IpVersion, ListenOptions};
use crate::error::{Error, Result};

/// Registered service; unregistered on [`ServiceRegistration::deregister`]
/// or drop.
pub struct ServiceRegistration {
    daemon: ServiceDaemon,
    fullname: String,
    registered: bool,
}

fn host_name(options: &ListenOptions) -> String {
    let host = match &options.svc_addr {
        Some(addr) => addr.trim_end_matches('.').to_string(),
        None => gethostname::gethostname().to_string_lossy().to_string(),
    };
    if host.ends_with(".local") {
        format!("{}.", host)
    } else {
        format!("{}.local.", host)
    }
}

impl ServiceRegistration {
    pub fn register(options: &ListenOptions) -> Result<Self> {
        let daemon = ServiceDaemon::new().map_err(|e| Error::Discovery(format!("cannot start mDNS daemon: {}", e)))?;

        let disabled = match options.svc_ipver {
            IpVersion::V4 => Some(IfKind::IPv6),
            IpVersion::V6 => Some(IfKind::IPv4),
            IpVersion::All => None,
        };
        if let Some(kind) = disabled {
            daemon
                .disable_interface(kind)
                .map_err(|e| Error::Discovery(format!("cannot restrict IP version: {}", e)))?;
        }

        let host = host_name(options);
        let service = ServiceInfo::new(
            &options.svc_type,
            &options.svc_name,
            &host,
            (),
            options.svc_port,
            options.svc_props.clone(),
        )
        .map_err(|e| Error::Discovery(format!("invalid service info: {}", e)))?
        .enable_addr_auto();

        let fullname = service.get_fullname().to_string();
        daemon
            .register(service)
            .map_err(|e| Error::Discovery(format!("cannot register {}: {}", fullname, e)))?;

        info!(target: "mdns", "registered {} on {} port {}", fullname, host, options.svc_port);
        Ok(Self {
            daemon,
            fullname,
            registered: true,
        })
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    pub fn deregister(mut self) {
        self.unregister();
    }

    fn unregister(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!(target: "mdns", "failed to unregister {}: {}", self.fullname, e);
        }
        if let Err(e) = self.daemon.shutdown() {
            warn!(target: "mdns", "mDNS daemon shutdown failed: {}", e);
        }
        info!(target: "mdns", "unregistered {}", self.fullname);
    }
}

impl Drop for ServiceRegistration {
    fn drop(&mut self) {
        self.unregister();
    }
}
