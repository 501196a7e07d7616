//! Session coordinator: role behavior, gating, and hotkey dispatch.
//!
//! A [`Session`] value owns every subsystem for the configured role and
//! wires them with channels — construction failures are explicit and
//! nothing global outlives it.
//!
//! **Host** (with `usb_forwarding_enabled`): starts capture, pumps
//! captured events to the burst channel (control channel when no agent
//! is registered over UDP), gates local swallow on whether the active
//! profile belongs to an agent, and arms the kill switch.
//!
//! **Agent** (with a coordinator address): runs the control channel
//! client, probes and joins the burst channel, and injects arriving
//! events iff forwarding is enabled host-side AND the active profile is
//! this agent's own — otherwise events are silently dropped, which is
//! the normal state while another seat owns the monitors.
//!
//! Hotkey chords fire from a global hook (or from the capture stream on
//! a capturing host, which sees every event first); the session applies
//! the 500 ms debounce and dispatches the action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use vkvm_core::config::{Config, Role};
use vkvm_core::event::{InputEvent, TimedEvent};
use vkvm_core::keymap::KeyMapper;
use vkvm_core::{ConfigManager, HotkeyRegistry};
use vkvm_platform::capture::{self, CaptureError};
use vkvm_platform::ddc::{self, DdcController};
use vkvm_platform::hotkey_feed;
use vkvm_platform::inject::Injector;

use crate::api::{self, ApiState, PeerRegistry};
use crate::transport::udp_receiver::UdpReceiver;
use crate::transport::udp_sender::UdpSender;
use crate::transport::ws_client::WsClient;
use crate::transport::TransportEvent;

pub mod switcher;

use switcher::{SwitchBroadcaster, Switcher};

/// Minimum spacing between hotkey-triggered switches, applied here (not
/// in the hotkey engine) so every trigger source shares one policy.
pub const HOTKEY_DEBOUNCE: Duration = Duration::from_millis(500);

/// Period of the agent's local gate re-check against the persisted
/// active profile.
const GATE_RECHECK: Duration = Duration::from_secs(1);

/// Actions a hotkey chord can trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyAction {
    SwitchProfile(String),
    OpenSettings,
    SleepDisplays,
}

// ── Gating ────────────────────────────────────────────────────────────────────

/// The agent's injection gate.
///
/// An arriving event is injected iff forwarding is enabled in the last
/// synced config AND the last observed active profile is this agent's
/// own. Both flags flip from transport events and from the periodic
/// local re-check.
pub struct InjectionGate {
    allow_injection: AtomicBool,
    usb_forwarding: AtomicBool,
}

impl InjectionGate {
    pub fn new(usb_forwarding: bool) -> Self {
        Self {
            allow_injection: AtomicBool::new(false),
            usb_forwarding: AtomicBool::new(usb_forwarding),
        }
    }

    pub fn permits(&self) -> bool {
        self.usb_forwarding.load(Ordering::SeqCst) && self.allow_injection.load(Ordering::SeqCst)
    }

    pub fn set_forwarding(&self, enabled: bool) {
        self.usb_forwarding.store(enabled, Ordering::SeqCst);
    }

    /// Updates the gate from an observed active profile.
    pub fn observe_profile(&self, active_profile: &str, agent_profile: &str) {
        let owns = !agent_profile.is_empty() && active_profile == agent_profile;
        self.allow_injection.store(owns, Ordering::SeqCst);
    }
}

// ── Debounce ──────────────────────────────────────────────────────────────────

/// Global minimum interval between consecutive hotkey-triggered
/// switches.
pub struct Debouncer {
    last: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl Debouncer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last: Mutex::new(None),
            min_interval,
        }
    }

    /// Returns true when enough time has passed since the last allowed
    /// trigger, and records this one.
    pub fn allow(&self, now: Instant) -> bool {
        let mut last = self.last.lock().expect("debounce lock");
        match *last {
            Some(prev) if now.duration_since(prev) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

// ── Hotkey registry wiring ────────────────────────────────────────────────────

type SharedRegistry = Arc<Mutex<HotkeyRegistry<HotkeyAction>>>;

/// Rebuilds chord registrations from the current config: the settings
/// and sleep chords plus one per profile. Called initially and from the
/// config change callback (hotkey rebinding on live edits).
pub fn rebuild_registry(registry: &SharedRegistry, config: &Config) {
    let mut reg = registry.lock().expect("registry lock");
    reg.clear();
    reg.register(
        &config.general.settings_hotkey,
        HotkeyAction::OpenSettings,
    );
    reg.register(&config.general.sleep_hotkey, HotkeyAction::SleepDisplays);
    for profile in &config.profiles {
        reg.register(
            &profile.hotkey,
            HotkeyAction::SwitchProfile(profile.name.clone()),
        );
    }
    info!(chords = reg.len(), "hotkey registrations refreshed");
}

/// Feeds a captured event into chord matching (hosts with capture
/// running see every event here before the OS does).
fn feed_registry_from_event(
    registry: &SharedRegistry,
    event: &TimedEvent,
    actions_tx: &mpsc::UnboundedSender<HotkeyAction>,
) {
    let (token, is_down) = match event.event {
        InputEvent::Key { code, pressed, .. } => {
            let Some(token) = KeyMapper::vk_to_token(code) else {
                return;
            };
            (token.to_string(), pressed)
        }
        InputEvent::MouseButton { button, pressed } => (format!("MOUSE{button}"), pressed),
        _ => return,
    };

    let fired = registry
        .lock()
        .expect("registry lock")
        .key_transition(&token, is_down);
    for action in fired {
        let _ = actions_tx.send(action);
    }
}

// ── Agent runtime ─────────────────────────────────────────────────────────────

/// Per-event agent behavior, factored out of the loop for testability.
pub struct AgentRuntime {
    pub config: Arc<ConfigManager>,
    pub switcher: Arc<Switcher>,
    pub gate: Arc<InjectionGate>,
    pub injector: Option<Injector>,
    pub udp: Option<Arc<UdpReceiver>>,
}

impl AgentRuntime {
    pub async fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("control channel up; resetting injector state");
                // Modifiers tracked before the drop are stale.
                if let Some(injector) = self.injector.as_mut() {
                    injector.reset();
                }
                if let Some(udp) = &self.udp {
                    if udp.probe().await {
                        if let Err(e) = udp.register().await {
                            warn!(error = %e, "UDP re-registration failed");
                        }
                    }
                }
            }

            TransportEvent::Disconnected => {
                if let Some(injector) = self.injector.as_mut() {
                    injector.reset();
                }
            }

            TransportEvent::Switch(payload) => {
                // Apply with the payload's own propagation flag: host
                // broadcasts arrive with propagate=false and stay local.
                if let Err(e) = self
                    .switcher
                    .switch_to(&payload.profile, payload.propagate)
                    .await
                {
                    warn!(error = %e, "switch from control channel failed");
                }
                let agent_profile = self.config.get().general.agent_profile;
                self.gate.observe_profile(&payload.profile, &agent_profile);
            }

            TransportEvent::ProfilesSynced {
                profiles,
                usb_forwarding_enabled,
            } => {
                info!(count = profiles.len(), "profiles synced from host");
                if let Err(e) = self.config.set_profiles(profiles) {
                    warn!(error = %e, "failed to persist synced profiles");
                }
                self.gate.set_forwarding(usb_forwarding_enabled);
            }

            TransportEvent::Input(event) => {
                if !self.gate.permits() {
                    // Normal state while another seat owns the monitors.
                    return;
                }
                let Some(injector) = self.injector.as_mut() else {
                    return;
                };
                if let Err(e) = inject_event(injector, event) {
                    warn!(error = %e, "injection failed");
                }
            }
        }
    }

    /// Periodic re-check of the gate against the locally persisted
    /// active profile (covers agents that switch via their own UI).
    pub fn recheck_gate(&self) {
        let general = self.config.get().general;
        self.gate
            .observe_profile(&general.current_profile, &general.agent_profile);
    }
}

fn inject_event(
    injector: &mut Injector,
    event: TimedEvent,
) -> Result<(), vkvm_platform::inject::InjectionError> {
    match event.event {
        InputEvent::MouseMove { dx, dy } => injector.inject_mouse_move(dx, dy),
        InputEvent::MouseButton { button, pressed } => {
            injector.inject_mouse_button(button, pressed)
        }
        InputEvent::MouseWheel { delta, axis } => match axis {
            vkvm_core::event::ScrollAxis::Vertical => injector.inject_mouse_wheel(delta, 0),
            vkvm_core::event::ScrollAxis::Horizontal => injector.inject_mouse_wheel(0, delta),
        },
        InputEvent::Key {
            code,
            pressed,
            modifiers,
        } => injector.inject_key(code, pressed, modifiers),
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Owner of all running subsystems for one service lifetime.
pub struct Session {
    config: Arc<ConfigManager>,
    switcher: Arc<Switcher>,
    peers: Arc<PeerRegistry>,
    registry: SharedRegistry,
    shutdown: watch::Sender<bool>,
}

impl Session {
    /// Builds the role-independent core: DDC controller, peer registry,
    /// switcher, hotkey registry.
    pub fn new(config: Arc<ConfigManager>) -> Self {
        let general = config.get().general;

        let ddc: Option<Arc<dyn DdcController>> =
            match ddc::platform_controller(general.hdmi_dp_heuristic) {
                Ok(controller) => Some(Arc::from(controller)),
                Err(e) => {
                    warn!(error = %e, "DDC unavailable; display plane disabled");
                    None
                }
            };

        let peers = Arc::new(PeerRegistry::new());
        let switcher = Arc::new(Switcher::new(
            Arc::clone(&config),
            ddc,
            Arc::clone(&peers) as Arc<dyn SwitchBroadcaster>,
        ));

        let registry: SharedRegistry = Arc::new(Mutex::new(HotkeyRegistry::new(
            cfg!(target_os = "macos"),
        )));
        rebuild_registry(&registry, &config.get());

        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            switcher,
            peers,
            registry,
            shutdown,
        }
    }

    pub fn switcher(&self) -> Arc<Switcher> {
        Arc::clone(&self.switcher)
    }

    /// Runs the service until Ctrl-C.
    pub async fn run(self) -> anyhow::Result<()> {
        let general = self.config.get().general;

        // Rebind hotkeys whenever the config changes (API pushes, UI
        // edits). The callback fires with no config lock held.
        {
            let registry = Arc::clone(&self.registry);
            let config = Arc::clone(&self.config);
            self.config.on_change(move || {
                rebuild_registry(&registry, &config.get());
            });
        }

        // Control API (both roles expose it).
        if general.api_enabled {
            let state = ApiState {
                config: Arc::clone(&self.config),
                switcher: Arc::clone(&self.switcher),
                peers: Arc::clone(&self.peers),
                token: general.api_token.clone(),
            };
            let shutdown_rx = self.shutdown.subscribe();
            let port = general.api_port;
            tokio::spawn(async move {
                if let Err(e) = api::serve(state, port, shutdown_rx).await {
                    error!(error = %e, "control API failed; continuing without remote control");
                }
            });
        }

        // Hotkey dispatch channel, shared by the global hook feed and
        // (on a capturing host) the capture stream.
        let (actions_tx, actions_rx) = mpsc::unbounded_channel::<HotkeyAction>();

        let capture_running = match general.role {
            Role::Host => self.start_host(actions_tx.clone(), general.api_port).await,
            Role::Agent => {
                self.start_agent(&general.coordinator_addr).await;
                false
            }
        };

        // Global hook feed for chord matching, unless the capture hooks
        // already observe everything (they run first and may swallow).
        if !capture_running {
            let registry = Arc::clone(&self.registry);
            let tx = actions_tx.clone();
            let result = hotkey_feed::start(Box::new(move |token, is_down| {
                let fired = registry
                    .lock()
                    .expect("registry lock")
                    .key_transition(token, is_down);
                for action in fired {
                    let _ = tx.send(action);
                }
            }));
            if let Err(e) = result {
                warn!(error = %e, "global hotkeys unavailable");
            }
        }

        self.run_action_loop(actions_rx).await;

        let _ = self.shutdown.send(true);
        info!("session stopped");
        Ok(())
    }

    /// Starts host-side capture and forwarding. Returns whether capture
    /// hooks are running (and thus feeding the hotkey registry).
    async fn start_host(
        &self,
        actions_tx: mpsc::UnboundedSender<HotkeyAction>,
        api_port: u16,
    ) -> bool {
        let general = self.config.get().general;

        // Burst channel sender shares the API port number.
        let udp = match UdpSender::bind(api_port).await {
            Ok(sender) => {
                sender.start();
                Some(Arc::new(sender))
            }
            Err(e) => {
                warn!(error = %e, "burst channel unavailable; using control channel only");
                None
            }
        };

        // UDP itself is unauthenticated: accept registrations only from
        // source IPs holding an open control channel. The registry
        // republishes its peer IPs on every connect/disconnect.
        if let Some(udp) = &udp {
            let udp = Arc::clone(udp);
            let mut ips_rx = self.peers.subscribe_ips();
            let mut shutdown_rx = self.shutdown.subscribe();
            let initial = ips_rx.borrow().clone();
            udp.set_allowed_ips(Some(initial)).await;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        changed = ips_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let ips = ips_rx.borrow_and_update().clone();
                            udp.set_allowed_ips(Some(ips)).await;
                        }
                    }
                }
            });
        }

        if !general.usb_forwarding_enabled {
            info!("input forwarding disabled; display-only host");
            return false;
        }

        let capture = match capture::platform_capture() {
            Ok(capture) => capture,
            Err(e) => {
                warn!(error = %e, "input capture unavailable; degrading to display-only switching");
                return false;
            }
        };

        match capture.start() {
            Ok(()) => {}
            Err(CaptureError::KillSwitchUnregistrable(reason)) => {
                // Never capture without an operator-accessible escape.
                error!(%reason, "kill switch unregistrable; refusing to start capture");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "capture start failed; degrading to display-only switching");
                return false;
            }
        }

        // Forwarding gate: armed now, cleared by the kill switch, re-armed
        // by the next profile switch.
        let forwarding = Arc::new(AtomicBool::new(true));
        {
            let forwarding = Arc::clone(&forwarding);
            capture.set_kill_switch(Box::new(move || {
                warn!("kill switch fired; local control restored");
                forwarding.store(false, Ordering::SeqCst);
            }));
        }

        // Swallow local input only while an agent profile owns the seat.
        capture.enable_capture(
            !general.agent_profile.is_empty()
                && general.current_profile == general.agent_profile,
        );

        // Re-gate capture (and re-arm forwarding) on every switch.
        {
            let capture = Arc::clone(&capture);
            let config = Arc::clone(&self.config);
            let forwarding = Arc::clone(&forwarding);
            self.switcher.set_on_switch(move |profile| {
                let agent_profile = config.get().general.agent_profile;
                capture.enable_capture(!agent_profile.is_empty() && profile == agent_profile);
                forwarding.store(true, Ordering::SeqCst);
            });
        }

        // Capture pump: chord matching first, then forward.
        let queue = capture.events();
        let registry = Arc::clone(&self.registry);
        let peers = Arc::clone(&self.peers);
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        capture.stop();
                        break;
                    }
                    event = queue.recv() => {
                        feed_registry_from_event(&registry, &event, &actions_tx);
                        if !forwarding.load(Ordering::SeqCst) {
                            continue;
                        }
                        // Burst channel when an agent is registered,
                        // control channel fallback otherwise.
                        let mut sent = false;
                        if let Some(udp) = &udp {
                            if udp.has_agents().await {
                                udp.send_event(event).await;
                                sent = true;
                            }
                        }
                        if !sent {
                            peers.broadcast_input(event).await;
                        }
                    }
                }
            }
        });

        info!("host capture and forwarding running");
        true
    }

    /// Starts agent-side transports and the injection loop.
    async fn start_agent(&self, coordinator_addr: &str) {
        if coordinator_addr.is_empty() {
            warn!("agent role without coordinator_addr; nothing to connect to");
            return;
        }
        let general = self.config.get().general;

        let (events_tx, mut events_rx) = mpsc::channel::<TransportEvent>(256);

        let agent_name = std::env::var("HOSTNAME").unwrap_or_else(|_| "vkvm-agent".to_string());
        let ws = WsClient::start(
            coordinator_addr.to_string(),
            general.api_token.clone(),
            agent_name,
            events_tx.clone(),
        );
        self.switcher.set_forwarder(ws.handle());

        let udp = match UdpReceiver::new(coordinator_addr, events_tx).await {
            Ok(receiver) => {
                if receiver.probe().await {
                    if let Err(e) = receiver.start().await {
                        warn!(error = %e, "burst channel start failed");
                    }
                } else {
                    info!("burst channel closed; relying on control channel fallback");
                }
                Some(Arc::new(receiver))
            }
            Err(e) => {
                warn!(error = %e, "burst channel unavailable");
                None
            }
        };

        let injector = match Injector::platform() {
            Ok(injector) => {
                if !injector.permission_granted() {
                    warn!("synthetic input permission missing; events accepted but ignored by the OS");
                }
                Some(injector)
            }
            Err(e) => {
                warn!(error = %e, "input injection unavailable on this platform");
                None
            }
        };

        let gate = Arc::new(InjectionGate::new(general.usb_forwarding_enabled));
        gate.observe_profile(&general.current_profile, &general.agent_profile);

        let mut runtime = AgentRuntime {
            config: Arc::clone(&self.config),
            switcher: Arc::clone(&self.switcher),
            gate,
            injector,
            udp,
        };

        // The WsClient must outlive the loop; move it into the task.
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let _ws = ws;
            let mut recheck = tokio::time::interval(GATE_RECHECK);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = recheck.tick() => runtime.recheck_gate(),
                    maybe = events_rx.recv() => {
                        let Some(event) = maybe else { break };
                        runtime.handle(event).await;
                    }
                }
            }
        });

        info!(coordinator = coordinator_addr, "agent transports running");
    }

    /// Dispatches debounced hotkey actions until Ctrl-C.
    async fn run_action_loop(&self, mut actions_rx: mpsc::UnboundedReceiver<HotkeyAction>) {
        let debouncer = Debouncer::new(HOTKEY_DEBOUNCE);
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    return;
                }
                maybe = actions_rx.recv() => {
                    let Some(action) = maybe else { return };
                    if !debouncer.allow(Instant::now()) {
                        continue;
                    }
                    match action {
                        HotkeyAction::SwitchProfile(name) => {
                            info!(profile = %name, "hotkey switch");
                            if let Err(e) = self.switcher.switch_to(&name, true).await {
                                warn!(error = %e, "hotkey switch failed");
                            }
                        }
                        HotkeyAction::OpenSettings => {
                            let port = self.config.get().general.api_port;
                            info!("settings UI available at http://127.0.0.1:{port}/");
                        }
                        HotkeyAction::SleepDisplays => {
                            info!("sleeping displays");
                            // Grace period so the chord's own key-ups do
                            // not wake the panels straight back up.
                            tokio::time::sleep(Duration::from_millis(500)).await;
                            self.switcher.sleep_displays().await;
                        }
                    }
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use vkvm_core::config::Profile;
    use vkvm_core::event::ScrollAxis;
    use vkvm_core::protocol::control::SwitchPayload;
    use vkvm_platform::ddc::mock::MockController;
    use vkvm_platform::inject::mock::RecordingBackend;
    use vkvm_platform::inject::SyntheticEvent;

    // ── InjectionGate ─────────────────────────────────────────────────────────

    #[test]
    fn test_gate_requires_both_flags() {
        let gate = InjectionGate::new(true);
        assert!(!gate.permits(), "no profile observed yet");

        gate.observe_profile("Mac", "Mac");
        assert!(gate.permits());

        gate.set_forwarding(false);
        assert!(!gate.permits());
    }

    #[test]
    fn test_gate_closes_when_other_profile_active() {
        let gate = InjectionGate::new(true);
        gate.observe_profile("Mac", "Mac");
        gate.observe_profile("PC1", "Mac");
        assert!(!gate.permits());
    }

    #[test]
    fn test_gate_never_opens_without_agent_profile() {
        let gate = InjectionGate::new(true);
        gate.observe_profile("", "");
        assert!(!gate.permits());
    }

    // ── Debouncer ─────────────────────────────────────────────────────────────

    #[test]
    fn test_debounce_suppresses_rapid_triggers() {
        let debouncer = Debouncer::new(HOTKEY_DEBOUNCE);
        let base = Instant::now();
        assert!(debouncer.allow(base));
        assert!(!debouncer.allow(base + Duration::from_millis(100)));
        assert!(!debouncer.allow(base + Duration::from_millis(499)));
        assert!(debouncer.allow(base + Duration::from_millis(500)));
    }

    #[test]
    fn test_debounce_first_trigger_always_allowed() {
        let debouncer = Debouncer::new(HOTKEY_DEBOUNCE);
        assert!(debouncer.allow(Instant::now()));
    }

    // ── Registry wiring ───────────────────────────────────────────────────────

    #[test]
    fn test_rebuild_registers_profile_and_global_chords() {
        let registry: SharedRegistry = Arc::new(Mutex::new(HotkeyRegistry::new(false)));
        let mut config = Config::default();
        config.general.sleep_hotkey = "Ctrl+Alt+P".to_string();

        rebuild_registry(&registry, &config);

        // settings + sleep + PC1 + PC2
        assert_eq!(registry.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_rebuild_replaces_previous_registrations() {
        let registry: SharedRegistry = Arc::new(Mutex::new(HotkeyRegistry::new(false)));
        rebuild_registry(&registry, &Config::default());
        let before = registry.lock().unwrap().len();

        let mut config = Config::default();
        config.profiles.clear();
        config.general.settings_hotkey.clear();
        rebuild_registry(&registry, &config);

        assert!(registry.lock().unwrap().len() < before);
        assert_eq!(registry.lock().unwrap().len(), 0);
    }

    #[test]
    fn test_capture_stream_feeds_chords() {
        let registry: SharedRegistry = Arc::new(Mutex::new(HotkeyRegistry::new(false)));
        let mut config = Config::default();
        config.profiles = vec![{
            let mut p = Profile::named("Mac");
            p.hotkey = "Ctrl+Alt+1".to_string();
            p
        }];
        config.general.settings_hotkey.clear();
        rebuild_registry(&registry, &config);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let key = |code: u16, pressed| {
            TimedEvent::new(
                InputEvent::Key {
                    code,
                    pressed,
                    modifiers: 0,
                },
                0,
            )
        };

        feed_registry_from_event(&registry, &key(0xA2, true), &tx); // LCtrl
        feed_registry_from_event(&registry, &key(0xA4, true), &tx); // LAlt
        feed_registry_from_event(&registry, &key(0x31, true), &tx); // '1'

        assert_eq!(
            rx.try_recv().unwrap(),
            HotkeyAction::SwitchProfile("Mac".to_string())
        );
    }

    // ── Agent runtime (S3-style gating) ───────────────────────────────────────

    fn agent_harness() -> (AgentRuntime, RecordingBackend, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigManager::with_path(dir.path().join("config.json")));
        config
            .update(|c| {
                c.general.role = Role::Agent;
                c.general.agent_profile = "Mac".to_string();
                c.general.current_profile = "PC1".to_string();
                c.profiles = vec![Profile::named("PC1"), Profile::named("Mac")];
            })
            .unwrap();

        let ddc = MockController::new();
        let switcher = Arc::new(Switcher::new(
            Arc::clone(&config),
            Some(Arc::new(ddc) as Arc<dyn DdcController>),
            Arc::new(switcher::NoBroadcast),
        ));

        let gate = Arc::new(InjectionGate::new(true));
        let backend = RecordingBackend::new();
        let runtime = AgentRuntime {
            config,
            switcher,
            gate,
            injector: Some(Injector::new(Box::new(backend.clone()))),
            udp: None,
        };
        (runtime, backend, dir)
    }

    fn key_event(code: u16) -> TransportEvent {
        TransportEvent::Input(TimedEvent::new(
            InputEvent::Key {
                code,
                pressed: true,
                modifiers: 0,
            },
            0,
        ))
    }

    #[tokio::test]
    async fn test_agent_drops_input_while_gated_off() {
        let (mut runtime, backend, _dir) = agent_harness();
        runtime.recheck_gate(); // active profile is PC1, not ours

        runtime.handle(key_event(0x41)).await;

        assert_eq!(backend.posted_count(), 0, "gated event must be dropped silently");
    }

    #[tokio::test]
    async fn test_agent_injects_after_switch_to_own_profile() {
        let (mut runtime, backend, _dir) = agent_harness();
        runtime.recheck_gate();

        // Host broadcast: switch to this agent's profile.
        runtime
            .handle(TransportEvent::Switch(SwitchPayload {
                profile: "Mac".to_string(),
                origin: "host".to_string(),
                propagate: false,
            }))
            .await;

        runtime.handle(key_event(0x41)).await;
        assert_eq!(backend.posted_count(), 1);
    }

    #[tokio::test]
    async fn test_agent_gate_closes_again_on_switch_away() {
        let (mut runtime, backend, _dir) = agent_harness();
        runtime
            .handle(TransportEvent::Switch(SwitchPayload {
                profile: "Mac".to_string(),
                origin: "host".to_string(),
                propagate: false,
            }))
            .await;
        runtime
            .handle(TransportEvent::Switch(SwitchPayload {
                profile: "PC1".to_string(),
                origin: "host".to_string(),
                propagate: false,
            }))
            .await;

        runtime.handle(key_event(0x41)).await;
        assert_eq!(backend.posted_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_disabling_forwarding_closes_gate() {
        let (mut runtime, backend, _dir) = agent_harness();
        runtime
            .handle(TransportEvent::Switch(SwitchPayload {
                profile: "Mac".to_string(),
                origin: "host".to_string(),
                propagate: false,
            }))
            .await;

        runtime
            .handle(TransportEvent::ProfilesSynced {
                profiles: vec![Profile::named("PC1"), Profile::named("Mac")],
                usb_forwarding_enabled: false,
            })
            .await;

        runtime.handle(key_event(0x41)).await;
        assert_eq!(backend.posted_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_persists_profiles() {
        let (mut runtime, _backend, _dir) = agent_harness();
        runtime
            .handle(TransportEvent::ProfilesSynced {
                profiles: vec![Profile::named("New")],
                usb_forwarding_enabled: true,
            })
            .await;
        assert_eq!(runtime.config.get().profiles.len(), 1);
        assert_eq!(runtime.config.get().profiles[0].name, "New");
    }

    #[tokio::test]
    async fn test_reconnect_resets_modifier_state() {
        use vkvm_core::keymap::windows_vk::VK_LSHIFT;
        let (mut runtime, _backend, _dir) = agent_harness();
        runtime
            .handle(TransportEvent::Switch(SwitchPayload {
                profile: "Mac".to_string(),
                origin: "host".to_string(),
                propagate: false,
            }))
            .await;

        // Shift goes down, then the connection drops mid-chord.
        runtime.handle(key_event(VK_LSHIFT)).await;
        assert_ne!(
            runtime.injector.as_ref().unwrap().modifier_mask().0,
            0
        );

        runtime.handle(TransportEvent::Connected).await;
        assert_eq!(
            runtime.injector.as_ref().unwrap().modifier_mask().0,
            0,
            "stale modifier mask must clear on reconnect"
        );
    }

    #[tokio::test]
    async fn test_gated_scroll_and_moves_also_drop() {
        let (mut runtime, backend, _dir) = agent_harness();
        runtime.recheck_gate();

        runtime
            .handle(TransportEvent::Input(TimedEvent::new(
                InputEvent::MouseMove { dx: 5, dy: 5 },
                0,
            )))
            .await;
        runtime
            .handle(TransportEvent::Input(TimedEvent::new(
                InputEvent::MouseWheel {
                    delta: 120,
                    axis: ScrollAxis::Vertical,
                },
                0,
            )))
            .await;

        assert_eq!(backend.posted_count(), 0);
    }

    #[tokio::test]
    async fn test_open_gate_injects_wheel_with_axis() {
        let (mut runtime, backend, _dir) = agent_harness();
        runtime
            .handle(TransportEvent::Switch(SwitchPayload {
                profile: "Mac".to_string(),
                origin: "host".to_string(),
                propagate: false,
            }))
            .await;

        runtime
            .handle(TransportEvent::Input(TimedEvent::new(
                InputEvent::MouseWheel {
                    delta: -120,
                    axis: ScrollAxis::Horizontal,
                },
                0,
            )))
            .await;

        assert_eq!(
            backend.posted(),
            vec![SyntheticEvent::Wheel {
                vertical: 0,
                horizontal: -1
            }]
        );
    }
}
