//! # Modem Transport Abstraction
//!
//! This module defines the `ModemTransport` trait, the transmit half of the
//! serial link to the modem. Received bytes never flow through this trait:
//! they are pushed into an [`RxBuffer`](crate::ring::RxBuffer) by the UART
//! interrupt (or by [`pump_rx`] on targets with an async UART reader).
//!
//! The link itself is expected to run 8N1 at whatever baud rate the modem
//! firmware is set to. Setting that up is the HAL's job.

use embedded_io_async::{Read, Write};

use crate::ring::RxBuffer;

/// A trait representing the transmit side of a serial link to the modem.
#[allow(async_fn_in_trait)]
pub trait ModemTransport {
    /// The error type returned by the transport.
    type Error: TransportError;

    /// Sends a buffer of data over the transport.
    ///
    /// Returns once every byte has been handed to the hardware.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;
}

/// A marker trait for transport-related errors.
pub trait TransportError: core::fmt::Debug {}

impl TransportError for core::convert::Infallible {}

/// Error wrapper for any `embedded-io` writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartError(pub embedded_io_async::ErrorKind);

impl TransportError for UartError {}

/// UART transport implementation over any `embedded-io-async` writer.
pub struct UartTransport<W> {
    tx: W,
}

impl<W: Write> UartTransport<W> {
    /// Creates a new `UartTransport` from the TX half of a UART.
    pub fn new(tx: W) -> Self {
        Self { tx }
    }

    /// Gives the writer back.
    pub fn into_inner(self) -> W {
        self.tx
    }
}

impl<W: Write> ModemTransport for UartTransport<W> {
    type Error = UartError;

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        use embedded_io_async::Error as _;

        self.tx
            .write_all(buf)
            .await
            .map_err(|e| UartError(e.kind()))?;

        // Flush so the modem sees the terminator before we start polling.
        self.tx.flush().await.map_err(|e| UartError(e.kind()))
    }
}

/// Feeds an [`RxBuffer`] from an async UART reader, forever.
///
/// This is the producer side for targets whose HAL hands out an async RX
/// half instead of a raw interrupt. Run it in its own task. Read errors
/// (framing, overrun) are logged and reading resumes; a zero-length read
/// is treated the same way.
pub async fn pump_rx<R: Read, const N: usize>(mut reader: R, buffer: &RxBuffer<N>) -> ! {
    use embedded_io_async::Error as _;

    let mut chunk = [0u8; 64];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {}
            Ok(n) => buffer.push_slice(&chunk[..n]),
            Err(e) => {
                let _kind = e.kind();
                warn!("uart rx error: {:?}", _kind);
            }
        }
    }
}
