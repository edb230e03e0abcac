//! Access session controller.
//!
//! Owns one visitor's gate state, the signed link currently on display and
//! the renewal timer that keeps that link fresh.
//!
//! ```text
//!   Ungated ──submit──▶ Gating ──insert ok──▶ Gated ◀── gate token at open
//!      ▲                  │
//!      └──insert failed───┘
//! ```
//!
//! While Gated and mounted, a renewal task fetches the latest document and a
//! new signed link immediately and then on every `renewal_interval` tick.
//! Only one renewal runs at a time; a tick that fires while a renewal is
//! still in flight is skipped. Unmounting stops the ticks, and a renewal that
//! is still in flight at unmount is abandoned and never applied.

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::backend::{AccessBackend, GateTokenStore, IpLookup};
use super::error::{AccessError, Result};
use super::model::{
    AccessRecord, GATE_TOKEN_KEY, LINK_TTL, LocalGateToken, RENEWAL_INTERVAL, SignedLink,
    UNKNOWN_IP, is_valid_email,
};

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Validity window requested for each signed link
    pub link_ttl: Duration,
    /// Period of the renewal timer
    pub renewal_interval: Duration,
    /// User agent recorded with each access record
    pub user_agent: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            link_ttl: LINK_TTL,
            renewal_interval: RENEWAL_INTERVAL,
            user_agent: concat!("docgate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Gate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No gate token; the email form is shown.
    Ungated,
    /// An access record is being written.
    Gating,
    /// The visitor passed the gate (now or in an earlier session).
    Gated,
}

/// What the document area of the view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentView {
    /// Nothing requested yet.
    Idle,
    /// First link request in flight.
    Loading,
    /// A signed link to the current document.
    Ready(SignedLink),
    /// No document has been uploaded. Not an error.
    NoDocument,
    /// The store failed; retried on the next tick.
    Unavailable,
}

/// Transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Info(String),
    Error(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Success(m) | Notice::Info(m) | Notice::Error(m) => m,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Error(_))
    }
}

/// Observable controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSnapshot {
    pub gate: GateState,
    pub email: Option<String>,
    pub document: DocumentView,
    pub notice: Option<Notice>,
}

impl AccessSnapshot {
    fn initial(token: Option<&LocalGateToken>) -> Self {
        Self {
            gate: if token.is_some() {
                GateState::Gated
            } else {
                GateState::Ungated
            },
            email: token.map(|t| t.email.clone()),
            document: DocumentView::Idle,
            notice: None,
        }
    }
}

/// What happened to one renewal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// The fetched state was applied.
    Applied,
    /// Another renewal was already in flight.
    Skipped,
    /// The view was unmounted before the fetch finished.
    Discarded,
    /// The visitor has not passed the gate.
    NotGated,
}

struct Shared {
    config: ControllerConfig,
    backend: Arc<dyn AccessBackend>,
    tokens: Arc<dyn GateTokenStore>,
    ip_lookup: Arc<dyn IpLookup>,
    state: watch::Sender<AccessSnapshot>,
    in_flight: tokio::sync::Mutex<()>,
}

impl Shared {
    async fn resolve_ip(&self) -> String {
        match self.ip_lookup.lookup().await {
            Ok(ip) => ip,
            Err(e) => {
                debug!(error = %e, "Could not determine client address");
                UNKNOWN_IP.to_string()
            }
        }
    }

    /// Fetch the current document and sign a fresh link to it.
    async fn fetch_document(&self) -> (DocumentView, Option<Notice>) {
        let document = match self.backend.latest_document().await {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!("No document uploaded yet");
                return (
                    DocumentView::NoDocument,
                    Some(Notice::Info("No documents found".to_string())),
                );
            }
            Err(e) => {
                warn!(error = %e, "Failed to look up current document");
                return (
                    DocumentView::Unavailable,
                    Some(Notice::Error(format!("Error loading document: {e}"))),
                );
            }
        };

        let issued_at = Utc::now();
        match self
            .backend
            .create_signed_url(&document.storage_path, self.config.link_ttl)
            .await
        {
            Ok(url) => {
                debug!(
                    document_id = %document.id,
                    expires_in = self.config.link_ttl.as_secs(),
                    "Signed link issued"
                );
                let link = SignedLink {
                    url,
                    issued_at,
                    ttl: self.config.link_ttl,
                };
                (DocumentView::Ready(link), None)
            }
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "Failed to sign document link");
                (
                    DocumentView::Unavailable,
                    Some(Notice::Error(format!("Error loading document: {e}"))),
                )
            }
        }
    }

    /// One renewal. With `wait_for_guard` it queues behind a renewal already
    /// in flight instead of skipping.
    async fn refresh(
        &self,
        cancel: Option<&watch::Receiver<bool>>,
        wait_for_guard: bool,
    ) -> RenewalOutcome {
        if self.state.borrow().gate != GateState::Gated {
            return RenewalOutcome::NotGated;
        }

        let _in_flight = if wait_for_guard {
            self.in_flight.lock().await
        } else {
            match self.in_flight.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    debug!("Link renewal already in flight, skipping");
                    return RenewalOutcome::Skipped;
                }
            }
        };

        // Cancellation abandons the fetch so the guard is released at unmount
        let (document, notice) = match cancel {
            Some(cancel) => tokio::select! {
                fetched = self.fetch_document() => fetched,
                _ = cancelled(cancel.clone()) => {
                    debug!("View unmounted during renewal, abandoning fetch");
                    return RenewalOutcome::Discarded;
                }
            },
            None => self.fetch_document().await,
        };

        if cancel.is_some_and(is_cancelled) {
            debug!("View unmounted during renewal, discarding result");
            return RenewalOutcome::Discarded;
        }

        self.state.send_modify(|s| {
            s.document = document;
            s.notice = notice;
        });
        RenewalOutcome::Applied
    }
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow() || cancel.has_changed().is_err()
}

/// Resolves once the renewal is cancelled or its owner is gone.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Renewal loop: refresh immediately, then on every tick until cancelled.
async fn run_renewal(shared: Arc<Shared>, mut cancel: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(shared.config.renewal_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let tick_cancel = cancel.clone();
    // The first refresh after mount must not be skipped, or the view sits in
    // Loading for a whole period.
    let mut first_tick = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            _ = ticker.tick() => {
                // Refresh runs detached so the cadence does not drift with
                // store latency; the in-flight guard keeps them from overlapping.
                let shared = Arc::clone(&shared);
                let cancel = tick_cancel.clone();
                let wait_for_guard = std::mem::take(&mut first_tick);
                tokio::spawn(async move {
                    shared.refresh(Some(&cancel), wait_for_guard).await;
                });
            }
        }
    }

    debug!("Link renewal stopped");
}

struct Renewal {
    cancel: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

impl Renewal {
    fn spawn(shared: Arc<Shared>) -> Self {
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_renewal(shared, cancel_rx));
        Self {
            cancel,
            _task: task,
        }
    }

    fn stop(self) {
        let _ = self.cancel.send(true);
    }
}

#[derive(Default)]
struct MountState {
    mounted: bool,
    renewal: Option<Renewal>,
}

/// Controller for one visitor's view of the gated document.
pub struct AccessSessionController {
    shared: Arc<Shared>,
    mount: Mutex<MountState>,
}

impl AccessSessionController {
    /// Create a controller, reading the gate token to pick the initial state.
    ///
    /// An unreadable token store is treated as "no token": the visitor is
    /// asked for their email again.
    pub async fn open(
        config: ControllerConfig,
        backend: Arc<dyn AccessBackend>,
        tokens: Arc<dyn GateTokenStore>,
        ip_lookup: Arc<dyn IpLookup>,
    ) -> Self {
        let token = match tokens.get(GATE_TOKEN_KEY).await {
            Ok(value) => value.map(|email| LocalGateToken { email }),
            Err(e) => {
                warn!(error = %e, "Failed to read gate token");
                None
            }
        };

        if let Some(token) = &token {
            debug!(email = %token.email, "Gate token present, skipping email capture");
        }

        let (state, _) = watch::channel(AccessSnapshot::initial(token.as_ref()));

        Self {
            shared: Arc::new(Shared {
                config,
                backend,
                tokens,
                ip_lookup,
                state,
                in_flight: tokio::sync::Mutex::new(()),
            }),
            mount: Mutex::new(MountState::default()),
        }
    }

    /// Current state.
    pub fn snapshot(&self) -> AccessSnapshot {
        self.shared.state.borrow().clone()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<AccessSnapshot> {
        self.shared.state.subscribe()
    }

    pub fn gate_state(&self) -> GateState {
        self.shared.state.borrow().gate
    }

    /// The held link, if it is still inside its validity window.
    pub fn current_link(&self) -> Option<SignedLink> {
        match &self.shared.state.borrow().document {
            DocumentView::Ready(link) if link.is_valid_at(Utc::now()) => Some(link.clone()),
            _ => None,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.lock_mount().mounted
    }

    /// Attach the controller to a live view. Starts link renewal if the
    /// visitor is already gated. Must be called inside a Tokio runtime.
    pub fn mount(&self) {
        let mut mount = self.lock_mount();
        if mount.mounted {
            return;
        }
        mount.mounted = true;

        if self.gate_state() == GateState::Gated {
            self.start_renewal(&mut mount);
        }
    }

    /// Detach from the view: no further ticks, and a renewal still in flight
    /// will not touch the state.
    pub fn unmount(&self) {
        let mut mount = self.lock_mount();
        mount.mounted = false;
        if let Some(renewal) = mount.renewal.take() {
            renewal.stop();
            debug!("View unmounted, link renewal cancelled");
        }
    }

    /// Submit the gate form.
    ///
    /// Records an access entry and, once the store confirms it, persists the
    /// gate token and (when mounted) starts link renewal. On failure the
    /// controller returns to Ungated with an error notice and nothing is
    /// persisted locally, so the visitor can simply submit again.
    ///
    /// Submitting while already gated is a no-op.
    pub async fn submit(&self, email: &str) -> Result<()> {
        let email = email.trim();

        if !is_valid_email(email) {
            let err = AccessError::InvalidEmail(email.to_string());
            self.shared.state.send_modify(|s| {
                s.notice = Some(Notice::Error(err.to_string()));
            });
            return Err(err);
        }

        let mut began = false;
        let mut already_gated = false;
        self.shared.state.send_if_modified(|s| match s.gate {
            GateState::Ungated => {
                s.gate = GateState::Gating;
                s.email = Some(email.to_string());
                s.notice = None;
                began = true;
                true
            }
            GateState::Gated => {
                already_gated = true;
                false
            }
            GateState::Gating => false,
        });

        if already_gated {
            return Ok(());
        }
        if !began {
            return Err(AccessError::SubmissionInProgress);
        }

        let record = AccessRecord {
            email: email.to_string(),
            accessed_at: Utc::now(),
            user_agent: self.shared.config.user_agent.clone(),
            ip_address: self.shared.resolve_ip().await,
        };

        if let Err(e) = self.shared.backend.insert_access_record(&record).await {
            warn!(email = %email, error = %e, "Failed to record document access");
            self.shared.state.send_modify(|s| {
                s.gate = GateState::Ungated;
                s.notice = Some(Notice::Error(e.to_string()));
            });
            return Err(e);
        }

        // The store already has the record; losing the local marker only
        // means the visitor is asked again next time.
        if let Err(e) = self.shared.tokens.set(GATE_TOKEN_KEY, email).await {
            warn!(email = %email, error = %e, "Failed to persist gate token");
        }

        self.shared.state.send_modify(|s| {
            s.gate = GateState::Gated;
            s.notice = Some(Notice::Success("Access granted!".to_string()));
        });
        info!(email = %email, ip = %record.ip_address, "Document access granted");

        let mut mount = self.lock_mount();
        if mount.mounted {
            self.start_renewal(&mut mount);
        }

        Ok(())
    }

    /// Run one renewal right now, outside the timer.
    ///
    /// Shares the in-flight guard with the timer, so it is skipped if a
    /// renewal is already running.
    pub async fn refresh_now(&self) -> RenewalOutcome {
        self.shared.refresh(None, false).await
    }

    fn start_renewal(&self, mount: &mut MountState) {
        if mount.renewal.is_some() {
            return;
        }

        self.shared.state.send_if_modified(|s| {
            if s.document == DocumentView::Idle {
                s.document = DocumentView::Loading;
                true
            } else {
                false
            }
        });

        debug!(
            interval_secs = self.shared.config.renewal_interval.as_secs(),
            "Starting link renewal"
        );
        mount.renewal = Some(Renewal::spawn(Arc::clone(&self.shared)));
    }

    fn lock_mount(&self) -> MutexGuard<'_, MountState> {
        self.mount.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AccessSessionController {
    fn drop(&mut self) {
        self.unmount();
    }
}
