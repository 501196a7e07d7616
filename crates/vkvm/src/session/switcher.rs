//! Profile switching.
//!
//! One entry point, [`Switcher::switch_to`], implements the full switch
//! protocol:
//!
//! 1. Resolve the profile by name (absent → [`SwitchError::ProfileNotFound`]).
//! 2. On an agent with a coordinator (and propagation allowed), forward
//!    the request to the host and stop — the host is authoritative.
//! 3. Wake the displays (sleeping panels ignore DDC writes).
//! 4. For `local`/`both` modes, write VCP 0x60 to every monitor in the
//!    profile that is present on this machine. Writes run in parallel
//!    across monitors, serialized per monitor, with last-error-wins
//!    semantics; IDs from foreign machines are skipped silently.
//! 5. Persist `current_profile`.
//! 6. For `remote`/`both` modes on the host, broadcast the switch so
//!    agents update their injection gate (`propagate=false` in the
//!    payload prevents loops).
//! 7. Fire the `on_switch` callback exactly once.
//!
//! DDC calls block on an external tool, so they run on the blocking
//! thread pool and no lock is ever held across them.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use vkvm_core::config::{Role, SwitchMode};
use vkvm_core::ConfigManager;
use vkvm_platform::ddc::{DdcController, DdcError, Monitor};
use vkvm_platform::wake::{wake_displays, WAKE_SETTLE};

use crate::transport::ws_client::WsClientHandle;

/// Error type for switch operations.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// The requested switch target does not exist. Rejected at the API
    /// boundary with 404.
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// One or more DDC writes failed (last error wins; the other
    /// monitors in the profile were still attempted).
    #[error(transparent)]
    Ddc(#[from] DdcError),
}

/// Seam between the switcher and the host's control channel broadcast.
#[async_trait]
pub trait SwitchBroadcaster: Send + Sync {
    async fn broadcast_switch(&self, profile: &str, origin: &str);
}

/// Broadcaster for roles with no connected peers (agents, CLI one-shots).
pub struct NoBroadcast;

#[async_trait]
impl SwitchBroadcaster for NoBroadcast {
    async fn broadcast_switch(&self, _profile: &str, _origin: &str) {}
}

type OnSwitchFn = Box<dyn Fn(&str) + Send + Sync>;

/// Stateful owner of the switch protocol.
pub struct Switcher {
    config: Arc<ConfigManager>,
    /// Absent on platforms without a DDC driver: the display plane
    /// degrades while switching/broadcast still work.
    ddc: Option<Arc<dyn DdcController>>,
    broadcaster: Arc<dyn SwitchBroadcaster>,
    forward: Mutex<Option<WsClientHandle>>,
    on_switch: Mutex<Option<OnSwitchFn>>,
    /// Held across every switch and sleep round. Hotkeys, the API, and
    /// agent requests all land here concurrently; without this, two
    /// rounds could interleave their writes to the same monitor.
    serialize: tokio::sync::Mutex<()>,
}

impl Switcher {
    pub fn new(
        config: Arc<ConfigManager>,
        ddc: Option<Arc<dyn DdcController>>,
        broadcaster: Arc<dyn SwitchBroadcaster>,
    ) -> Self {
        Self {
            config,
            ddc,
            broadcaster,
            forward: Mutex::new(None),
            on_switch: Mutex::new(None),
            serialize: tokio::sync::Mutex::new(()),
        }
    }

    /// Wires the agent → host forwarding path.
    pub fn set_forwarder(&self, handle: WsClientHandle) {
        *self.forward.lock().expect("forward lock") = Some(handle);
    }

    /// Registers the callback fired once per completed switch.
    pub fn set_on_switch(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_switch.lock().expect("on_switch lock") = Some(Box::new(callback));
    }

    /// Switches to `profile_name`. `propagate=false` applies locally
    /// only: no agent forwarding, no host broadcast.
    ///
    /// # Errors
    ///
    /// [`SwitchError::ProfileNotFound`] when the name resolves to
    /// nothing; [`SwitchError::Ddc`] when a local write failed (the
    /// switch still completes — `current_profile` is persisted and the
    /// callback fires).
    pub async fn switch_to(&self, profile_name: &str, propagate: bool) -> Result<(), SwitchError> {
        // One switch at a time, whatever the trigger source.
        let _round = self.serialize.lock().await;

        let profile = self
            .config
            .profile(profile_name)
            .ok_or_else(|| SwitchError::ProfileNotFound(profile_name.to_string()))?;
        let general = self.config.get().general;

        // Agents defer to the host.
        if propagate && general.role == Role::Agent && !general.coordinator_addr.is_empty() {
            let forward = self.forward.lock().expect("forward lock").clone();
            if let Some(handle) = forward {
                info!(profile = profile_name, host = %general.coordinator_addr,
                    "forwarding switch request to host");
                handle.send_switch(profile_name, "agent").await;
                return Ok(());
            }
        }

        let mut last_err: Option<DdcError> = None;

        if matches!(profile.switch_mode, SwitchMode::Local | SwitchMode::Both) {
            if let Some(ddc) = &self.ddc {
                wake_displays();
                tokio::time::sleep(WAKE_SETTLE).await;
                last_err = self.drive_monitors(ddc, &profile.monitor_inputs).await;
            }
        }

        if let Err(e) = self.config.update(|c| {
            c.general.current_profile = profile_name.to_string();
        }) {
            warn!(error = %e, "failed to persist current profile");
        }

        if propagate
            && matches!(profile.switch_mode, SwitchMode::Remote | SwitchMode::Both)
            && general.role == Role::Host
        {
            self.broadcaster.broadcast_switch(profile_name, "host").await;
        }

        if let Some(cb) = self.on_switch.lock().expect("on_switch lock").as_ref() {
            cb(profile_name);
        }

        match last_err {
            Some(e) => Err(SwitchError::Ddc(e)),
            None => Ok(()),
        }
    }

    /// Writes every profile entry whose monitor is present locally.
    /// Returns the last write error, if any.
    async fn drive_monitors(
        &self,
        ddc: &Arc<dyn DdcController>,
        monitor_inputs: &std::collections::BTreeMap<String, u16>,
    ) -> Option<DdcError> {
        // Filter against live enumeration: configs sync across machines,
        // so foreign monitor IDs are expected and skipped without error.
        let present: HashSet<String> = {
            let ddc = Arc::clone(ddc);
            match tokio::task::spawn_blocking(move || ddc.list_monitors()).await {
                Ok(Ok(monitors)) => monitors.into_iter().map(|m| m.id).collect(),
                Ok(Err(e)) => {
                    warn!(error = %e, "monitor enumeration failed before switch");
                    return Some(e);
                }
                Err(e) => {
                    warn!(error = %e, "enumeration task panicked");
                    return Some(DdcError::CommandFailed(e.to_string()));
                }
            }
        };

        let mut handles = Vec::new();
        for (monitor_id, input_code) in monitor_inputs {
            if !present.contains(monitor_id) {
                debug!(monitor = %monitor_id, "skipping monitor not present on this machine");
                continue;
            }
            let ddc = Arc::clone(ddc);
            let id = monitor_id.clone();
            let code = *input_code;
            // One task per monitor: parallel across monitors, exactly
            // one write per monitor within this round.
            handles.push(tokio::task::spawn_blocking(move || {
                let result = ddc.set_input_source(&id, code);
                (id, code, result)
            }));
        }

        let mut last_err = None;
        for handle in handles {
            match handle.await {
                Ok((id, code, Ok(()))) => {
                    info!(monitor = %id, "input source set to 0x{code:02X}");
                }
                Ok((id, _, Err(e))) => {
                    warn!(monitor = %id, error = %e, "input source write failed");
                    last_err = Some(e);
                }
                Err(e) => {
                    last_err = Some(DdcError::CommandFailed(e.to_string()));
                }
            }
        }
        last_err
    }

    /// Puts every DDC-capable monitor into standby (sleep hotkey).
    pub async fn sleep_displays(&self) {
        let _round = self.serialize.lock().await;
        let Some(ddc) = &self.ddc else { return };
        let ddc = Arc::clone(ddc);
        let result = tokio::task::spawn_blocking(move || {
            let monitors = ddc.list_monitors()?;
            for monitor in monitors.iter().filter(|m| m.ddc_supported) {
                if let Err(e) = ddc.set_power(&monitor.id, false) {
                    warn!(monitor = %monitor.id, error = %e, "sleep write failed");
                }
            }
            Ok::<_, DdcError>(())
        })
        .await;
        if let Ok(Err(e)) = result {
            warn!(error = %e, "display sleep failed");
        }
    }

    /// Live monitor enumeration for the CLI and settings UI.
    ///
    /// # Errors
    ///
    /// Returns [`DdcError`] when no driver exists or the tool fails.
    pub async fn list_monitors(&self) -> Result<Vec<Monitor>, DdcError> {
        let Some(ddc) = &self.ddc else {
            return Err(DdcError::UnsupportedPlatform(std::env::consts::OS));
        };
        let ddc = Arc::clone(ddc);
        tokio::task::spawn_blocking(move || ddc.list_monitors())
            .await
            .map_err(|e| DdcError::CommandFailed(e.to_string()))?
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
