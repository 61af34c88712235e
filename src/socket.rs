//! UDP intake for reading submissions from the operator terminals.
//!
//! Every datagram carries one JSON encoded [`ReadingSubmission`].
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::sleep;
use std::{io, time};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::{NewReading, ProductCatalog, ReadingSubmission};

/// Largest datagram accepted from a terminal.
const MAX_DATAGRAM_SIZE: usize = 4096;

#[derive(Serialize, Deserialize, Debug, Clone)]
/// Parameters for the intake socket.
pub struct SocketParameters {
    /// The ip address the socket should listen on.
    pub address: String,
    /// The port the socket should listen on.
    pub port: u16,
}

/// Decodes and validates the payload of one datagram.
///
/// # Errors
///
/// * `Error::InvalidArgument` - The payload is not UTF-8.
/// * `Error::Json` - The payload is not a JSON submission.
/// * `Error::Validation` - The submission is incomplete.
pub fn decode_submission(payload: &[u8], catalog: &ProductCatalog) -> Result<NewReading> {
    let text = std::str::from_utf8(payload)
        .map_err(|err| Error::InvalidArgument(format!("datagram is not UTF-8: {}", err)))?;
    let submission = serde_json::from_str::<ReadingSubmission>(text.trim_end_matches(char::from(0)).trim())?;
    submission.validate(catalog)
}

/// Thread function for the intake socket.
///
/// Runs until `thread_finished` is set. Datagrams that cannot be decoded are logged and dropped.
pub fn socket_thread(
    tx: Sender<NewReading>,
    thread_finished: Arc<AtomicBool>,
    params: SocketParameters,
    catalog: ProductCatalog,
) {
    let socket: UdpSocket = match UdpSocket::bind(format!("{}:{}", params.address, params.port)) {
        Ok(socket) => socket,
        Err(err) => {
            log::error!(target: "qclogd::udp", "Could not open udp socket: \'{}\'", err);
            thread_finished.store(true, Ordering::SeqCst);
            return;
        }
    };
    match socket.set_nonblocking(true) {
        Ok(_) => log::debug!(target: "qclogd::udp", "Set socket to nonblocking mode!"),
        Err(err) => {
            log::error!(target: "qclogd::udp", "Could not set socket to nonblocking mode: \'{}\'", err);
            thread_finished.store(true, Ordering::SeqCst);
            return;
        }
    }

    match socket.local_addr() {
        Ok(res) => {
            log::info!(target: "qclogd::udp", "Socket Addr: \'{}\'", res);
        }
        Err(err) => {
            log::error!(target: "qclogd::udp", "Could not get socket address: \'{}\'", err);
            thread_finished.store(true, Ordering::SeqCst);
            return;
        }
    }

    let timeout = time::Duration::from_millis(100);
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    while !thread_finished.load(Ordering::SeqCst) {
        let (buf_size, addr) = match socket.recv_from(&mut buf) {
            Ok(res) => res,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                sleep(timeout);
                continue;
            }
            Err(msg) => {
                log::error!(target: "qclogd::udp", "Socket cannot recv data: \'{}\'", msg);
                continue;
            }
        };

        log::debug!(target: "qclogd::udp", "Received data with length: \'{}\' from \'{}\'!", buf_size, addr);

        let reading = match decode_submission(&buf[..buf_size], &catalog) {
            Ok(reading) => reading,
            Err(err) => {
                log::warn!(target: "qclogd::udp", "Rejected submission from \'{}\': \'{}\'", addr, err);
                continue;
            }
        };

        match tx.send(reading) {
            Ok(_) => log::debug!(target: "qclogd::udp", "Send reading to database thread!"),
            Err(err) => {
                log::error!(target: "qclogd::udp", "Could not send reading to database thread: \'{}\'", err);
                thread_finished.store(true, Ordering::SeqCst);
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    const PAYLOAD: &str = r#"{"shift":"1","location":"Túnel 2","product_name":"Drumstick",
        "market":"external","state":"frozen","measured_at_date":"2024-02-01",
        "measured_at_time":"06:45","start":-18.2,"middle":-19.1,"end":-20.3,"recorded_by":"u9"}"#;

    #[test]
    fn decodes_valid_payload() {
        let reading = decode_submission(PAYLOAD.as_bytes(), &ProductCatalog::new()).unwrap();
        assert_eq!(reading.location, "Túnel 2");
        assert_eq!(reading.temperatures.end, -20.3);
    }

    #[test]
    fn tolerates_trailing_padding() {
        let mut padded = PAYLOAD.as_bytes().to_vec();
        padded.extend_from_slice(b"\n\0\0");
        assert!(decode_submission(&padded, &ProductCatalog::new()).is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            decode_submission(&[0xff, 0xfe], &ProductCatalog::new()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            decode_submission(b"not json", &ProductCatalog::new()),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            decode_submission(br#"{"shift":"1"}"#, &ProductCatalog::new()),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn socket_thread_forwards_valid_datagrams() {
        let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let (tx, rx) = mpsc::channel();
        let finished = Arc::new(AtomicBool::new(false));
        let thread_finished = Arc::clone(&finished);
        let params = SocketParameters {
            address: "127.0.0.1".to_string(),
            port,
        };
        let handle = thread::spawn(move || socket_thread(tx, thread_finished, params, ProductCatalog::new()));

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let received = (0..50).find_map(|_| {
            sender.send_to(b"garbage", ("127.0.0.1", port)).unwrap();
            sender.send_to(PAYLOAD.as_bytes(), ("127.0.0.1", port)).unwrap();
            rx.recv_timeout(time::Duration::from_millis(100)).ok()
        });

        finished.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        assert_eq!(received.unwrap().recorded_by, "u9");
    }
}
