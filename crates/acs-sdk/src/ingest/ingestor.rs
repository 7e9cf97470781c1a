//! Background event ingestion loop

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use acs_core::{DeviceEvent, DeviceSession};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::buffer::{EventBuffer, EVENT_BUFFER_CAPACITY};
use super::normalize::normalize;
use crate::config::IngestConfig;
use crate::error::SdkError;
use crate::gateway::{EventBatch, PullRequest, SdkGateway};
use crate::session::SessionManager;

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Polling,
    Stopped,
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Devices included in the batch pull
    pub devices_polled: usize,
    /// Events appended to the buffer
    pub events_ingested: usize,
    /// Devices whose pull failed
    pub failures: usize,
    /// Devices disconnected by the staleness sweep
    pub evicted: usize,
}

/// Pull position of one device
#[derive(Debug, Clone)]
struct Cursor {
    endpoint: (IpAddr, u16),
    next_from: DateTime<Utc>,
    /// Highest record number buffered so far
    last_serial: u32,
}

/// Polls connected devices, buffers their events and retires silent ones
pub struct EventIngestor {
    sessions: Arc<SessionManager>,
    gateway: SdkGateway,
    config: IngestConfig,
    stale_threshold: Duration,
    buffer: Mutex<EventBuffer>,
    events_tx: broadcast::Sender<DeviceEvent>,
    cursors: DashMap<String, Cursor>,
    state: RwLock<LoopState>,
    ticks: AtomicU64,
    running: AtomicBool,
}

impl EventIngestor {
    pub fn new(
        sessions: Arc<SessionManager>,
        gateway: SdkGateway,
        config: IngestConfig,
        stale_threshold: Duration,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER_CAPACITY);
        Self {
            sessions,
            gateway,
            config,
            stale_threshold,
            buffer: Mutex::new(EventBuffer::new()),
            events_tx,
            cursors: DashMap::new(),
            state: RwLock::new(LoopState::Idle),
            ticks: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.read()
    }

    /// Completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Receiver for every event appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events_tx.subscribe()
    }

    /// See [`EventBuffer::read_recent`]
    pub fn read_recent(&self, take: i64) -> Vec<DeviceEvent> {
        self.buffer.lock().read_recent(take)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Tick every poll interval until `cancel` fires
    ///
    /// A tick that overruns the interval delays the next one. Calling `run`
    /// while the loop is already running returns immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Ingestion loop already running");
            return;
        }
        info!(interval_ms = self.config.poll_interval_ms, "Ingestion loop started");

        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick(&cancel).await;
                }
            }
        }

        *self.state.write() = LoopState::Stopped;
        self.running.store(false, Ordering::SeqCst);
        info!(ticks = self.ticks(), "Ingestion loop stopped");
    }

    /// One polling pass over every connected device
    pub async fn tick(&self, cancel: &CancellationToken) -> TickReport {
        *self.state.write() = LoopState::Polling;

        let sessions = self.sessions.connected_devices();
        let mut report = TickReport {
            devices_polled: sessions.len(),
            ..Default::default()
        };

        if !sessions.is_empty() {
            self.poll(&sessions, cancel, &mut report).await;
        }

        report.evicted = self
            .sessions
            .mark_stale_offline(self.stale_threshold)
            .await
            .len();

        self.ticks.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.write();
            if *state == LoopState::Polling {
                *state = LoopState::Idle;
            }
        }
        debug!(?report, "Ingestion tick finished");
        report
    }

    async fn poll(&self, sessions: &[DeviceSession], cancel: &CancellationToken, report: &mut TickReport) {
        let to = Utc::now();
        let requests: Vec<PullRequest> = sessions
            .iter()
            .map(|s| PullRequest {
                device_id: s.device_id.clone(),
                handle: s.handle,
                from: self.window_start(s, to),
            })
            .collect();
        let windows: Vec<(String, DateTime<Utc>)> = requests
            .iter()
            .map(|r| (r.device_id.clone(), r.from))
            .collect();

        let outcomes = match self.gateway.pull_events_batch(requests, to, cancel).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(error = %e, "Batch event pull failed");
                report.failures = sessions.len();
                return;
            }
        };

        for outcome in outcomes {
            match outcome.result {
                Ok(batch) => {
                    let Some(session) = sessions.iter().find(|s| s.device_id == outcome.device_id) else {
                        continue;
                    };
                    let from = windows
                        .iter()
                        .find(|(id, _)| *id == outcome.device_id)
                        .map_or(to, |(_, from)| *from);
                    report.events_ingested += self.ingest(session, batch, from, to).await;
                    // A successful pull is proof of life even without records
                    self.sessions.touch_heartbeat(&session.device_id, to).await;
                }
                Err(SdkError::Cancelled) => {
                    debug!(device_id = %outcome.device_id, "Event pull cancelled");
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(device_id = %outcome.device_id, error = %e, "Event pull failed");
                }
            }
        }
    }

    /// Buffer new records of one device and advance its cursor
    ///
    /// A complete pull moves the window to `pulled_at`. A truncated one resumes
    /// from the last record read, so records the stream withheld are pulled
    /// again next tick.
    async fn ingest(
        &self,
        session: &DeviceSession,
        batch: EventBatch,
        from: DateTime<Utc>,
        pulled_at: DateTime<Utc>,
    ) -> usize {
        let endpoint = (session.ip, session.port);
        let mut last_serial = self
            .cursors
            .get(&session.device_id)
            .filter(|c| c.endpoint == endpoint)
            .map_or(0, |c| c.last_serial);

        let next_from = if batch.truncated {
            batch
                .records
                .last()
                .and_then(|r| r.occurred_at)
                .map_or(from, |at| at.max(from))
        } else {
            pulled_at
        };
        if batch.truncated {
            debug!(device_id = %session.device_id, resume_from = %next_from, "Pull truncated");
        }

        let mut fresh = Vec::new();
        for raw in batch.records {
            // Serial 0 means the device does not number its records
            if raw.serial_no != 0 {
                if raw.serial_no <= last_serial {
                    continue;
                }
                last_serial = raw.serial_no;
            }
            fresh.push(normalize(&session.device_id, &raw, pulled_at));
        }

        self.cursors.insert(
            session.device_id.clone(),
            Cursor {
                endpoint,
                next_from,
                last_serial,
            },
        );

        {
            let mut buffer = self.buffer.lock();
            for event in &fresh {
                buffer.push(event.clone());
            }
        }

        for event in &fresh {
            self.sessions
                .touch_heartbeat(&event.device_id, event.occurred_at)
                .await;
            // No subscribers is fine
            let _ = self.events_tx.send(event.clone());
        }
        fresh.len()
    }

    fn window_start(&self, session: &DeviceSession, now: DateTime<Utc>) -> DateTime<Utc> {
        self.cursors
            .get(&session.device_id)
            .filter(|c| c.endpoint == (session.ip, session.port))
            .map(|c| c.next_from)
            .unwrap_or_else(|| {
                let lookback = chrono::Duration::from_std(self.config.initial_lookback())
                    .unwrap_or_else(|_| chrono::Duration::seconds(30));
                now - lookback
            })
    }
}
