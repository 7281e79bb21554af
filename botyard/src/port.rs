//! Host port allocation for the container's published service port.

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use botyard_shared::errors::{BotyardError, BotyardResult};

/// A free port held open by a bound listener.
///
/// The port stays reserved for as long as the reservation lives. Call
/// [`PortReservation::release`] right before handing the port to the runtime;
/// the window between release and the runtime's bind is not closed.
#[derive(Debug)]
pub struct PortReservation {
    port: u16,
    listener: TcpListener,
}

impl PortReservation {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Close the reserving listener and return the port number.
    pub fn release(self) -> u16 {
        drop(self.listener);
        self.port
    }
}

/// Bind an ephemeral listener and keep it as a reservation.
pub fn reserve_free_port() -> BotyardResult<PortReservation> {
    let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
        .map_err(|e| BotyardError::PortAllocation(format!("bind failed: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| BotyardError::PortAllocation(format!("local_addr failed: {}", e)))?
        .port();
    if port == 0 {
        return Err(BotyardError::PortAllocation(
            "kernel returned port 0".to_string(),
        ));
    }
    Ok(PortReservation { port, listener })
}

/// Find an unused port and release it immediately.
pub fn allocate_free_port() -> BotyardResult<u16> {
    reserve_free_port().map(PortReservation::release)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocated_port_can_be_bound() {
        let port = allocate_free_port().unwrap();
        assert_ne!(port, 0);
        let listener = TcpListener::bind(("127.0.0.1", port));
        assert!(listener.is_ok(), "port {} should be free", port);
    }

    #[test]
    fn test_reservation_holds_the_port() {
        let reservation = reserve_free_port().unwrap();
        let port = reservation.port();
        assert!(TcpListener::bind(("127.0.0.1", port)).is_err());

        assert_eq!(reservation.release(), port);
        assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
    }
}
