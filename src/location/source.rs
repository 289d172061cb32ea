// src/location/source.rs
//! Device location sources and the connections they open

use super::{geometry::SpatialReference, gpsd};
use crate::error::{DeviceLocationError, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt, io,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// A GNSS receiver attached to a serial port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialPortSource {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub antenna_height: f64, // meters
    pub spatial_reference: SpatialReference,
}

impl SerialPortSource {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
            antenna_height: 0.0,
            spatial_reference: SpatialReference::WGS84,
        }
    }

    pub fn with_antenna_height(mut self, meters: f64) -> Self {
        self.antenna_height = meters;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(DeviceLocationError::Connection("serial port name is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(DeviceLocationError::Connection("baud rate must be positive".into()));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(DeviceLocationError::Connection(format!(
                "unsupported data bits: {}",
                self.data_bits
            )));
        }
        validate_antenna_height(self.antenna_height)
    }

    async fn open(&self) -> Result<FrameReader> {
        self.validate()?;
        info!("Opening GNSS receiver on {} at {} baud", self.port, self.baud_rate);

        let data_bits = match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };
        let parity = match self.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        };

        let serial = tokio_serial::new(&self.port, self.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(1000))
            .open_native_async()
            .map_err(|e| {
                DeviceLocationError::Connection(format!(
                    "Failed to open serial port {}: {}",
                    self.port, e
                ))
            })?;

        Ok(FrameReader::Lines {
            reader: Box::new(BufReader::new(serial)),
            pacing: None,
        })
    }
}

/// A gpsd daemon relaying raw NMEA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsdSource {
    pub host: String,
    pub port: u16,
    pub antenna_height: f64,
}

impl GpsdSource {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            antenna_height: 0.0,
        }
    }
}

/// A recorded NMEA log replayed line by line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySource {
    pub path: PathBuf,
    /// Delay before each line; `None` replays as fast as it is read
    pub interval: Option<Duration>,
    pub antenna_height: f64,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: None,
            antenna_height: 0.0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

type FeedItem = io::Result<String>;

/// In-process loopback transport. Lines pushed into the paired
/// [`MemoryFeed`] come out of the connection; dropping the feed ends the
/// stream. Only one connection can hold the feed at a time.
#[derive(Clone)]
pub struct MemorySource {
    receiver: Arc<Mutex<Option<mpsc::Receiver<FeedItem>>>>,
    pub antenna_height: f64,
}

/// Sending half of a [`MemorySource`]
#[derive(Clone)]
pub struct MemoryFeed {
    sender: mpsc::Sender<FeedItem>,
}

impl MemorySource {
    pub fn new(capacity: usize) -> (Self, MemoryFeed) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let source = Self {
            receiver: Arc::new(Mutex::new(Some(receiver))),
            antenna_height: 0.0,
        };
        (source, MemoryFeed { sender })
    }

    fn claim(&self) -> Result<FrameReader> {
        let mut slot = self
            .receiver
            .lock()
            .map_err(|_| DeviceLocationError::Connection("memory source lock poisoned".into()))?;
        let receiver = slot.take().ok_or_else(|| {
            DeviceLocationError::Connection("memory source is already claimed".into())
        })?;
        Ok(FrameReader::Channel {
            receiver,
            home: Arc::clone(&self.receiver),
        })
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("antenna_height", &self.antenna_height)
            .finish_non_exhaustive()
    }
}

impl MemoryFeed {
    pub async fn send_line(&self, line: impl Into<String>) -> bool {
        self.sender.send(Ok(line.into())).await.is_ok()
    }

    /// Make the next read on the connection fail with `kind`
    pub async fn send_error(&self, kind: io::ErrorKind) -> bool {
        let err = io::Error::new(kind, "injected read error");
        self.sender.send(Err(err)).await.is_ok()
    }
}

/// The transports a device location service can open
#[derive(Debug, Clone)]
pub enum DeviceLocationSource {
    SerialPort(SerialPortSource),
    Gpsd(GpsdSource),
    Replay(ReplaySource),
    Memory(MemorySource),
}

impl DeviceLocationSource {
    /// Human readable description used in logs
    pub fn name(&self) -> String {
        match self {
            DeviceLocationSource::SerialPort(s) => format!("serial {}@{}", s.port, s.baud_rate),
            DeviceLocationSource::Gpsd(g) => format!("gpsd {}:{}", g.host, g.port),
            DeviceLocationSource::Replay(r) => format!("replay {}", r.path.display()),
            DeviceLocationSource::Memory(_) => "memory".to_string(),
        }
    }

    pub fn antenna_height(&self) -> f64 {
        match self {
            DeviceLocationSource::SerialPort(s) => s.antenna_height,
            DeviceLocationSource::Gpsd(g) => g.antenna_height,
            DeviceLocationSource::Replay(r) => r.antenna_height,
            DeviceLocationSource::Memory(m) => m.antenna_height,
        }
    }

    /// Native spatial reference of the positions the device reports
    pub fn spatial_reference(&self) -> SpatialReference {
        match self {
            DeviceLocationSource::SerialPort(s) => s.spatial_reference,
            _ => SpatialReference::WGS84,
        }
    }

    /// Establish the connection
    pub async fn open(&self) -> Result<SourceConnection> {
        validate_antenna_height(self.antenna_height())?;

        let reader = match self {
            DeviceLocationSource::SerialPort(serial) => serial.open().await?,
            DeviceLocationSource::Gpsd(g) => {
                info!("Connecting to gpsd at {}:{}", g.host, g.port);
                FrameReader::Gpsd(gpsd::connect_gpsd(&g.host, g.port).await?)
            }
            DeviceLocationSource::Replay(r) => {
                let file = tokio::fs::File::open(&r.path).await.map_err(|e| {
                    DeviceLocationError::Connection(format!(
                        "Failed to open replay file {}: {}",
                        r.path.display(),
                        e
                    ))
                })?;
                FrameReader::Lines {
                    reader: Box::new(BufReader::new(file)),
                    pacing: r.interval,
                }
            }
            DeviceLocationSource::Memory(m) => m.claim()?,
        };

        info!("Connected to {}", self.name());
        Ok(SourceConnection {
            label: self.name(),
            reader,
        })
    }
}

fn validate_antenna_height(meters: f64) -> Result<()> {
    if !meters.is_finite() || meters < 0.0 {
        return Err(DeviceLocationError::Connection(format!(
            "invalid antenna height: {}",
            meters
        )));
    }
    Ok(())
}

enum FrameReader {
    Lines {
        reader: Box<dyn AsyncBufRead + Send + Unpin>,
        pacing: Option<Duration>,
    },
    Gpsd(BufReader<tokio::net::TcpStream>),
    Channel {
        receiver: mpsc::Receiver<FeedItem>,
        // The receiver goes back here on close so the source can reopen
        home: Arc<Mutex<Option<mpsc::Receiver<FeedItem>>>>,
    },
    Closed,
}

/// Bounded retry of transient read errors before the connection is
/// declared lost
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// First backoff; doubles with each further attempt
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// An open connection. Owned by the read loop for its whole lifetime.
pub struct SourceConnection {
    label: String,
    reader: FrameReader,
}

impl fmt::Debug for SourceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConnection")
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl SourceConnection {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.reader, FrameReader::Closed)
    }

    /// Read one raw line. `Ok(None)` means the stream ended.
    pub async fn read_frame(&mut self) -> io::Result<Option<String>> {
        match &mut self.reader {
            FrameReader::Lines { reader, pacing } => {
                if let Some(delay) = pacing {
                    tokio::time::sleep(*delay).await;
                }
                read_line_lossy(reader.as_mut()).await
            }
            FrameReader::Gpsd(reader) => loop {
                match read_line_lossy(reader).await? {
                    Some(line) if gpsd::handle_control_message(&line) => continue,
                    other => return Ok(other),
                }
            },
            FrameReader::Channel { receiver, .. } => match receiver.recv().await {
                Some(Ok(line)) => Ok(Some(line)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            },
            FrameReader::Closed => Ok(None),
        }
    }

    /// Next frame, retrying transient read errors per `policy`. End of
    /// stream and exhausted retries are both `ConnectionLost`.
    pub async fn next_frame(&mut self, policy: &RetryPolicy) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.read_frame().await {
                Ok(Some(line)) => return Ok(line),
                Ok(None) => {
                    return Err(DeviceLocationError::ConnectionLost(format!(
                        "{}: end of stream",
                        self.label
                    )))
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > policy.max_retries {
                        return Err(DeviceLocationError::ConnectionLost(format!(
                            "{}: {} (after {} retries)",
                            self.label, e, policy.max_retries
                        )));
                    }
                    let delay = policy.delay_for(attempt);
                    warn!(
                        "Read error on {}: {}; retry {}/{} in {:?}",
                        self.label, e, attempt, policy.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Release the underlying handle. Closing twice is a no-op.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.reader, FrameReader::Closed) {
            FrameReader::Closed => {}
            FrameReader::Channel { receiver, home } => {
                if let Ok(mut slot) = home.lock() {
                    *slot = Some(receiver);
                }
                debug!("Closed {}", self.label);
            }
            _ => debug!("Closed {}", self.label),
        }
    }
}

impl Drop for SourceConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Longest line kept; NMEA caps sentences at 82 bytes and gpsd reports
/// stay well below this
const MAX_FRAME_LEN: usize = 1024;

/// Read up to the next newline; invalid UTF-8 is replaced rather than
/// failing the read, so line noise only costs the one frame. A line longer
/// than [`MAX_FRAME_LEN`] is skipped through its newline and comes back
/// empty, which the decoder drops as malformed.
async fn read_line_lossy<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut buf = Vec::new();
    let mut overlong = false;
    let mut read_any = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        read_any = true;

        let (chunk, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (&available[..=i], true),
            None => (available, false),
        };
        let used = chunk.len();
        if !overlong {
            if buf.len() + used > MAX_FRAME_LEN + 2 {
                overlong = true;
                buf.clear();
            } else {
                buf.extend_from_slice(chunk);
            }
        }
        reader.consume(used);
        if done {
            break;
        }
    }

    if !read_any {
        return Ok(None);
    }
    if overlong {
        warn!("Skipped a line longer than {} bytes", MAX_FRAME_LEN);
        return Ok(Some(String::new()));
    }
    Ok(Some(String::from_utf8_lossy(&buf).trim_end().to_string()))
}

/// List available serial ports
pub fn list_serial_ports() -> Result<Vec<tokio_serial::SerialPortInfo>> {
    tokio_serial::available_ports()
        .map_err(|e| DeviceLocationError::Other(format!("Failed to list serial ports: {}", e)))
}
