// ADF serial line reader - port detection and a background thread feeding lines to the relay
//
// Single source, line mode. Baud rate and framing are the port's business;
// the relay only ever sees whole lines.

use crate::relay::Relay;
use serde::{Deserialize, Serialize};
use serialport::SerialPortType;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Duration;
use thiserror::Error;

const READ_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No serial port configured")]
    NoPort,
}

/// Information about a detected serial port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedPort {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub is_likely_device: bool,
}

/// Line source connection status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    ReceivingData,
    Simulating,
    Error,
}

/// Current line source status plus pipeline counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub port_name: Option<String>,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub lines_received: u64,
    pub bearings_decoded: u64,
    pub fixes_decoded: u64,
    pub unhandled_lines: u64,
    pub last_line_time: Option<String>,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            port_name: None,
            status: ConnectionStatus::Disconnected,
            last_error: None,
            lines_received: 0,
            bearings_decoded: 0,
            fixes_decoded: 0,
            unhandled_lines: 0,
            last_line_time: None,
        }
    }
}

/// Enumerate all available serial ports
pub fn list_ports() -> Result<Vec<DetectedPort>, SerialError> {
    let ports = serialport::available_ports()?;

    Ok(ports
        .into_iter()
        .map(|port| {
            let (port_type, manufacturer, product, serial_number) = match &port.port_type {
                SerialPortType::UsbPort(info) => (
                    "USB".to_string(),
                    info.manufacturer.clone(),
                    info.product.clone(),
                    info.serial_number.clone(),
                ),
                SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None, None, None),
                SerialPortType::PciPort => ("PCI".to_string(), None, None, None),
                SerialPortType::Unknown => ("Unknown".to_string(), None, None, None),
            };
            let is_likely_device = is_likely_device(&manufacturer, &product);

            DetectedPort {
                port_name: port.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                is_likely_device,
            }
        })
        .collect())
}

/// Heuristic for USB serial adapters commonly wired to DF units and GPS receivers
fn is_likely_device(manufacturer: &Option<String>, product: &Option<String>) -> bool {
    let keywords = [
        "ftdi", "prolific", "pl2303", "ch340", "cp210", "silicon labs", "serial", "uart",
        "gps", "gnss", "nmea", "doppler", "rdf",
    ];

    let check = |s: &Option<String>| -> bool {
        s.as_ref()
            .map(|text| {
                let lower = text.to_lowercase();
                keywords.iter().any(|kw| lower.contains(kw))
            })
            .unwrap_or(false)
    };

    check(manufacturer) || check(product)
}

/// Owns the reader thread for one serial line
pub struct LineReader {
    relay: Arc<Relay>,
    status: Arc<RwLock<DeviceStatus>>,
    stop_flag: Arc<AtomicBool>,
    reader_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl LineReader {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            status: Arc::new(RwLock::new(DeviceStatus::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            reader_handle: Mutex::new(None),
        }
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Connection status merged with the relay's counters
    pub fn status(&self) -> DeviceStatus {
        let mut status = self
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let counts = self.relay.counts();
        status.lines_received = counts.lines;
        status.bearings_decoded = counts.bearings;
        status.fixes_decoded = counts.fixes;
        status.unhandled_lines = counts.unhandled;
        status.last_line_time = self.relay.last_line_time().map(|t| t.to_rfc3339());
        status
    }

    fn update_status(&self, f: impl FnOnce(&mut DeviceStatus)) {
        update_status(&self.status, f)
    }

    /// Open `port_name` and start feeding lines to the relay
    pub fn connect(&self, port_name: &str, baud_rate: u32) -> Result<(), SerialError> {
        self.disconnect();

        self.update_status(|s| {
            s.port_name = Some(port_name.to_string());
            s.status = ConnectionStatus::Connecting;
            s.last_error = None;
        });

        let port = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open();
        let port = match port {
            Ok(port) => port,
            Err(e) => {
                self.update_status(|s| {
                    s.status = ConnectionStatus::Error;
                    s.last_error = Some(e.to_string());
                });
                return Err(e.into());
            }
        };
        log::info!("Opened {} at {} baud", port_name, baud_rate);
        self.update_status(|s| s.status = ConnectionStatus::Connected);

        self.spawn_reader(BufReader::new(port));
        Ok(())
    }

    /// Start the reader thread over any line source.
    /// Call [`disconnect`](Self::disconnect) first if a reader is already running.
    pub fn spawn_reader<R: BufRead + Send + 'static>(&self, reader: R) {
        self.stop_flag.store(false, Ordering::SeqCst);
        let stop_flag = Arc::clone(&self.stop_flag);
        let status_lock = Arc::clone(&self.status);
        let relay = Arc::clone(&self.relay);

        let handle = thread::spawn(move || {
            if let Err(e) = read_lines(reader, &stop_flag, &status_lock, &relay) {
                log::error!("ADF reader error: {}", e);
                update_status(&status_lock, |s| {
                    s.last_error = Some(e.to_string());
                    s.status = ConnectionStatus::Error;
                });
            }
        });

        *self
            .reader_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Mark the line source as the simulator
    pub(crate) fn set_simulating(&self) {
        self.update_status(|s| {
            s.port_name = None;
            s.status = ConnectionStatus::Simulating;
            s.last_error = None;
        });
    }

    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    pub(crate) fn set_handle(&self, handle: thread::JoinHandle<()>) {
        *self
            .reader_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Stop reading and wait for the thread to finish its current read
    pub fn disconnect(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);

        let handle = self
            .reader_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("ADF reader thread panicked");
            }
        }

        self.update_status(|s| s.status = ConnectionStatus::Disconnected);
    }

    /// Block until the reader thread ends on its own (end of stream or error)
    pub fn wait(&self) {
        let handle = self
            .reader_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for LineReader {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn update_status(status: &RwLock<DeviceStatus>, f: impl FnOnce(&mut DeviceStatus)) {
    f(&mut status.write().unwrap_or_else(PoisonError::into_inner));
}

fn read_lines<R: BufRead>(
    mut reader: R,
    stop_flag: &AtomicBool,
    status_lock: &RwLock<DeviceStatus>,
    relay: &Relay,
) -> Result<(), SerialError> {
    // Bytes of the current line; survives a timeout in the middle of a line
    let mut buf = Vec::new();
    let mut receiving = false;

    while !stop_flag.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                if !buf.is_empty() {
                    relay.process_line(&String::from_utf8_lossy(&buf));
                }
                log::info!("ADF line source closed");
                break;
            }
            Ok(_) => {
                relay.process_line(&String::from_utf8_lossy(&buf));
                buf.clear();

                if !receiving {
                    receiving = true;
                    update_status(status_lock, |s| s.status = ConnectionStatus::ReceivingData);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SerialError::Io(e)),
        }
    }

    Ok(())
}
