// src/service.rs
//! Device location service: owns the one open source and its read loop

use crate::{
    error::{DeviceLocationError, Result},
    events::{SnapshotEvent, SnapshotEventBus, SubscriptionHandle},
    location::{
        CoordinateTransform, DeviceLocationSource, GeographicTransform, MapPoint, NmeaDecoder,
        RetryPolicy, Snapshot, SourceConnection, SpatialReference,
    },
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, RwLock,
    },
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

/// Settings attached to the open connection. Changes apply from the next
/// decoded snapshot on.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceLocationProperties {
    /// Meters; 0 disables the accuracy test
    pub accuracy_threshold: f64,
}

impl DeviceLocationProperties {
    pub fn new(accuracy_threshold: f64) -> Self {
        Self { accuracy_threshold }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.accuracy_threshold.is_finite() || self.accuracy_threshold < 0.0 {
            return Err(DeviceLocationError::Validation(format!(
                "accuracy threshold must be a non-negative distance, got {}",
                self.accuracy_threshold
            )));
        }
        Ok(())
    }
}

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Construction-time settings of a [`DeviceLocationService`]
#[derive(Clone)]
pub struct ServiceOptions {
    /// Spatial reference snapshots are emitted in; `None` keeps the
    /// device's native reference
    pub output_spatial_reference: Option<SpatialReference>,
    pub transform: Arc<dyn CoordinateTransform>,
    /// Queue size of channel subscriptions made through the service
    pub channel_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            output_spatial_reference: None,
            transform: Arc::new(GeographicTransform),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("output_spatial_reference", &self.output_spatial_reference)
            .field("channel_capacity", &self.channel_capacity)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Closed,
    Connected,
}

struct Session {
    id: u64,
    source: DeviceLocationSource,
    alive: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    session: Mutex<Option<Session>>,
    properties: RwLock<Option<DeviceLocationProperties>>,
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl Shared {
    fn session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn accuracy_threshold(&self) -> f64 {
        self.properties
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .map_or(0.0, |p| p.accuracy_threshold)
    }

    fn set_properties(&self, properties: Option<DeviceLocationProperties>) {
        *self.properties.write().unwrap_or_else(|e| e.into_inner()) = properties;
    }

    fn set_current(&self, snapshot: Option<Arc<Snapshot>>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }
}

/// Manages exactly one open [`DeviceLocationSource`].
///
/// Construct one per application and hand it to whoever needs it; there is
/// no global instance. One background task per open source reads frames,
/// decodes them and publishes snapshots on [`events`](Self::events).
pub struct DeviceLocationService {
    options: ServiceOptions,
    bus: SnapshotEventBus,
    shared: Arc<Shared>,
    // Serializes open/close so a half-open source is never observable
    lifecycle: tokio::sync::Mutex<()>,
    next_session: AtomicU64,
}

impl DeviceLocationService {
    pub fn new(options: ServiceOptions) -> Self {
        Self {
            options,
            bus: SnapshotEventBus::new(),
            shared: Arc::new(Shared::default()),
            lifecycle: tokio::sync::Mutex::new(()),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// The bus snapshots are published on. Subscriptions survive
    /// close/open cycles.
    pub fn events(&self) -> SnapshotEventBus {
        self.bus.clone()
    }

    /// Channel subscription sized by `ServiceOptions::channel_capacity`
    pub fn subscribe_channel(&self) -> (SubscriptionHandle, mpsc::Receiver<SnapshotEvent>) {
        self.bus.subscribe_channel(self.options.channel_capacity)
    }

    pub fn transform(&self) -> Arc<dyn CoordinateTransform> {
        Arc::clone(&self.options.transform)
    }

    /// Open `source` and start streaming. Fails with `AlreadyOpen` while
    /// another source is open.
    pub async fn open(
        &self,
        source: DeviceLocationSource,
        properties: DeviceLocationProperties,
    ) -> Result<()> {
        properties.validate()?;
        let _lifecycle = self.lifecycle.lock().await;

        let lost = {
            let mut slot = self.shared.session();
            match slot.as_ref() {
                Some(session) if session.alive.load(Ordering::SeqCst) => {
                    return Err(DeviceLocationError::AlreadyOpen)
                }
                Some(_) => slot.take(),
                None => None,
            }
        };
        // A lost session may still be reporting the loss to a slow
        // subscriber; stop it before the new one starts publishing
        if let Some(session) = lost {
            debug!("Reclaiming lost session {}", session.id);
            let _ = session.shutdown.send(true);
            let _ = session.worker.await;
        }

        let mut decoder = NmeaDecoder::new(source.antenna_height())
            .with_native_reference(source.spatial_reference());
        if let Some(target) = self.options.output_spatial_reference {
            let origin = MapPoint::new(0.0, 0.0, None, source.spatial_reference());
            self.options.transform.project(&origin, target)?;
            decoder = decoder.with_output(Arc::clone(&self.options.transform), target);
        }

        let connection = source.open().await?;

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let alive = Arc::new(AtomicBool::new(true));
        let (shutdown, shutdown_rx) = watch::channel(false);

        self.shared.set_properties(Some(properties));
        self.shared.set_current(None);

        // Hold the slot while spawning so a loop that dies at once still
        // finds its session to tear down
        let mut slot = self.shared.session();
        let worker = tokio::spawn(read_loop(ReadLoop {
            session: id,
            connection,
            decoder,
            retry: self.options.retry,
            shutdown: shutdown_rx,
            alive: Arc::clone(&alive),
            shared: Arc::clone(&self.shared),
            bus: self.bus.clone(),
        }));

        info!("Device location source {} open (session {})", source.name(), id);
        *slot = Some(Session {
            id,
            source,
            alive,
            shutdown,
            worker,
        });
        Ok(())
    }

    /// Stop the read loop and release the source. Returns once the loop
    /// has exited; no events are published after that. Closing a closed
    /// service does nothing.
    pub async fn close(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        let session = match self.shared.session().take() {
            Some(s) => s,
            None => return,
        };

        let _ = session.shutdown.send(true);
        if let Err(e) = session.worker.await {
            if e.is_panic() {
                error!("Read loop for session {} panicked", session.id);
            }
        }
        session.alive.store(false, Ordering::SeqCst);

        self.shared.set_properties(None);
        self.shared.set_current(None);
        info!("Device location source {} closed", session.source.name());
    }

    /// The open source, or `None` once it is closed or its connection
    /// was lost
    pub fn get_source(&self) -> Option<DeviceLocationSource> {
        self.shared
            .session()
            .as_ref()
            .filter(|s| s.alive.load(Ordering::SeqCst))
            .map(|s| s.source.clone())
    }

    pub fn get_properties(&self) -> Option<DeviceLocationProperties> {
        *self.shared.properties.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the properties of the open source without interrupting it
    pub fn update_properties(&self, properties: DeviceLocationProperties) -> Result<()> {
        properties.validate()?;
        let session = self.shared.session();
        if !session.as_ref().map_or(false, |s| s.alive.load(Ordering::SeqCst)) {
            return Err(DeviceLocationError::InvalidState(
                "no device location source is open".into(),
            ));
        }
        self.shared.set_properties(Some(properties));
        debug!("Accuracy threshold now {} m", properties.accuracy_threshold);
        Ok(())
    }

    pub fn is_device_connected(&self) -> bool {
        self.shared
            .session()
            .as_ref()
            .map_or(false, |s| s.alive.load(Ordering::SeqCst))
    }

    pub fn state(&self) -> ServiceState {
        if self.is_device_connected() {
            ServiceState::Connected
        } else {
            ServiceState::Closed
        }
    }

    /// Most recently accepted snapshot of the open source
    pub fn get_current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.shared
            .current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for DeviceLocationService {
    fn default() -> Self {
        Self::new(ServiceOptions::default())
    }
}

impl Drop for DeviceLocationService {
    fn drop(&mut self) {
        // The loop notices the signal and releases the connection itself
        if let Some(session) = self.shared.session().take() {
            let _ = session.shutdown.send(true);
        }
    }
}

struct ReadLoop {
    session: u64,
    connection: SourceConnection,
    decoder: NmeaDecoder,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    alive: Arc<AtomicBool>,
    shared: Arc<Shared>,
    bus: SnapshotEventBus,
}

async fn read_loop(mut ctx: ReadLoop) {
    let lost = loop {
        let frame = tokio::select! {
            biased;
            _ = ctx.shutdown.changed() => break None,
            frame = ctx.connection.next_frame(&ctx.retry) => frame,
        };

        let line = match frame {
            Ok(line) => line,
            Err(e) => break Some(e),
        };

        let threshold = ctx.shared.accuracy_threshold();
        if let Some(snapshot) = ctx.decoder.decode(&line, threshold) {
            let snapshot = Arc::new(snapshot);
            ctx.shared.set_current(Some(Arc::clone(&snapshot)));
            tokio::select! {
                biased;
                _ = ctx.shutdown.changed() => break None,
                _ = ctx.bus.publish(SnapshotEvent::Snapshot(snapshot)) => {}
            }
        }
    };

    ctx.alive.store(false, Ordering::SeqCst);
    ctx.connection.close();
    debug!(
        "Read loop for session {} stopped; {} frame(s) dropped",
        ctx.session,
        ctx.decoder.dropped_frames()
    );

    if let Some(err) = lost {
        error!("{}", err);
        let reason = match err {
            DeviceLocationError::ConnectionLost(reason) => reason,
            other => other.to_string(),
        };
        // Closed as seen from outside before anyone hears of the loss, so a
        // subscriber may reopen from its handler
        if owns_slot(&ctx) {
            ctx.shared.set_properties(None);
            ctx.shared.set_current(None);
        }
        tokio::select! {
            biased;
            _ = ctx.shutdown.changed() => {}
            _ = ctx.bus.publish(SnapshotEvent::ConnectionLost { reason }) => {}
        }

        // Free the slot, unless close() or a new open() already took it
        let mut session = ctx.shared.session();
        if session.as_ref().map_or(false, |s| s.id == ctx.session) {
            *session = None;
        } else {
            warn!("Session {} was replaced while reporting connection loss", ctx.session);
        }
    }
}

fn owns_slot(ctx: &ReadLoop) -> bool {
    ctx.shared
        .session()
        .as_ref()
        .map_or(false, |s| s.id == ctx.session)
}
