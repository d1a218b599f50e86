use crate::{Error, Result};
use std::net::UdpSocket;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::directory::DEFAULT_IP;

/// Install a ctrl-c handler that flips the shared running flag instead of exiting immediately.
pub fn create_shutdown_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let running_handle = running.clone();

    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        running_handle.store(false, Ordering::SeqCst);
    })
    .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

    Ok(running)
}

/// Local IPv4 address of the default route. Connecting a UDP socket sends
/// nothing; it only selects the outgoing interface.
pub fn discover_local_ip() -> String {
    let probe = || -> std::io::Result<String> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip().to_string())
    };
    match probe() {
        Ok(ip) => ip,
        Err(err) => {
            log::warn!("could not determine local IP, announcing {DEFAULT_IP}: {err}");
            DEFAULT_IP.to_string()
        }
    }
}
