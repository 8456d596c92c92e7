use crate::{client::FrameTransport, error::TransportError};
use std::io;
use thiserror::Error;

/// Defines all possible errors for raw socket setup.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Failed to create a raw packet socket (CAP_NET_RAW is required)")]
    CreateSocket(#[source] io::Error),

    #[error("Interface name '{0}' is invalid")]
    InvalidInterfaceName(String),

    #[error("Interface '{interface}' not found")]
    InterfaceNotFound {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind packet socket to interface '{interface}'")]
    BindToDevice {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to register socket with the Tokio reactor")]
    RegisterWithTokio(#[source] io::Error),

    #[allow(dead_code)]
    #[error("Raw packet sockets are not implemented on this platform")]
    NotImplemented,
}

#[cfg(target_os = "linux")]
pub use linux::RawSocket;

#[cfg(not(target_os = "linux"))]
pub use fallback::RawSocket;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use socket2::{Domain, Protocol, Socket, Type};
    use std::{ffi::CString, io::Read, mem, os::fd::AsRawFd};
    use tokio::io::unix::AsyncFd;

    const ETH_P_IP: u16 = libc::ETH_P_IP as u16;

    /// An AF_PACKET socket bound to one interface, delivering and accepting
    /// complete Ethernet frames carrying IPv4.
    pub struct RawSocket {
        inner: AsyncFd<Socket>,
        interface: String,
    }

    impl RawSocket {
        /// Creates a packet socket and binds it to `interface`.
        ///
        /// This function handles the order of operations:
        /// 1. Creates a `socket2` AF_PACKET/SOCK_RAW socket filtered to IPv4.
        /// 2. Resolves the interface index.
        /// 3. Binds the socket to that index with a `sockaddr_ll`.
        /// 4. Switches to non-blocking mode and registers with Tokio.
        pub fn bind(interface: &str) -> Result<Self, SocketError> {
            let socket = Socket::new(
                Domain::PACKET,
                Type::RAW,
                Some(Protocol::from(i32::from(ETH_P_IP.to_be()))),
            )
            .map_err(SocketError::CreateSocket)?;

            let name = CString::new(interface)
                .map_err(|_| SocketError::InvalidInterfaceName(interface.to_string()))?;
            // SAFETY: `name` is a valid NUL-terminated string for the duration of the call.
            let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
            if index == 0 {
                return Err(SocketError::InterfaceNotFound {
                    interface: interface.to_string(),
                    source: io::Error::last_os_error(),
                });
            }

            // SAFETY: sockaddr_ll is plain old data; all-zero is a valid value.
            let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
            addr.sll_family = libc::AF_PACKET as libc::c_ushort;
            addr.sll_protocol = ETH_P_IP.to_be();
            addr.sll_ifindex = index as libc::c_int;

            // SAFETY: the pointer and length describe `addr`, which outlives the call.
            let ret = unsafe {
                libc::bind(
                    socket.as_raw_fd(),
                    &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
                )
            };
            if ret < 0 {
                return Err(SocketError::BindToDevice {
                    interface: interface.to_string(),
                    source: io::Error::last_os_error(),
                });
            }

            socket
                .set_nonblocking(true)
                .map_err(SocketError::SetNonBlocking)?;
            // SAFETY: `socket` is an open descriptor owned by the AsyncFd from here
            // on, and `Socket::as_raw_fd` always returns that same descriptor.
            let inner = unsafe { AsyncFd::register(socket) }
                .map_err(|e| SocketError::RegisterWithTokio(io::Error::from(e)))?;

            tracing::debug!("Packet socket bound to '{}' (index {})", interface, index);
            Ok(Self {
                inner,
                interface: interface.to_string(),
            })
        }

        pub fn interface(&self) -> &str {
            &self.interface
        }
    }

    impl FrameTransport for RawSocket {
        async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
            loop {
                let mut guard = self
                    .inner
                    .writable()
                    .await
                    .map_err(TransportError::Send)?;
                match guard.try_io(|inner| inner.get_ref().send(frame)) {
                    Ok(Ok(sent)) if sent == frame.len() => return Ok(()),
                    Ok(Ok(sent)) => {
                        return Err(TransportError::Send(io::Error::new(
                            io::ErrorKind::WriteZero,
                            format!("short write: {sent} of {} bytes", frame.len()),
                        )))
                    }
                    Ok(Err(e)) => return Err(TransportError::Send(e)),
                    Err(_would_block) => continue,
                }
            }
        }

        async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            loop {
                let mut guard = self
                    .inner
                    .readable()
                    .await
                    .map_err(TransportError::Receive)?;
                match guard.try_io(|inner| (&*inner.get_ref()).read(buf)) {
                    Ok(result) => return result.map_err(TransportError::Receive),
                    Err(_would_block) => continue,
                }
            }
        }
    }
}

/// Fallback for systems without AF_PACKET.
#[cfg(not(target_os = "linux"))]
mod fallback {
    use super::*;

    pub struct RawSocket {
        _private: (),
    }

    impl RawSocket {
        pub fn bind(_interface: &str) -> Result<Self, SocketError> {
            Err(SocketError::NotImplemented)
        }

        pub fn interface(&self) -> &str {
            ""
        }
    }

    impl FrameTransport for RawSocket {
        async fn send(&mut self, _frame: &[u8]) -> Result<(), TransportError> {
            Err(TransportError::Closed)
        }

        async fn receive(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
            Err(TransportError::Closed)
        }
    }
}
