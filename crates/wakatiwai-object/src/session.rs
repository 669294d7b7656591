//! The client main loop: drives the protocol engine, announces its state to
//! the peer process and dispatches the peer's unsolicited envelopes.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};
use wakatiwai_frame::{Envelope, EnvelopeKind, FrameError, HEARTBEAT, OBSERVE, STATE_CHANGED};

use crate::channel::Exchange;
use crate::error::{BridgeError, EngineError};
use crate::observe::{dispatch_observe, Uri};
use crate::registry::ObjectRegistry;

/// Longest the loop sleeps between engine steps.
pub const DEFAULT_LOOP_INTERVAL: Duration = Duration::from_secs(5);

/// Granularity at which a pending shutdown is noticed while waiting.
pub const DEFAULT_SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Registration state of the client towards its servers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    #[default]
    Initial,
    BootstrapRequired,
    Bootstrapping,
    RegisterRequired,
    Registering,
    Ready,
}

impl ClientState {
    /// Name announced to the peer in `stateChanged`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Initial => "STATE_INITIAL",
            Self::BootstrapRequired => "STATE_BOOTSTRAP_REQUIRED",
            Self::Bootstrapping => "STATE_BOOTSTRAPPING",
            Self::RegisterRequired => "STATE_REGISTER_REQUIRED",
            Self::Registering => "STATE_REGISTERING",
            Self::Ready => "STATE_READY",
        }
    }

    /// Transitional states are re-announced on every step.
    fn is_transitional(self) -> bool {
        matches!(self, Self::Bootstrapping | Self::Registering)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The LWM2M protocol engine the session drives.
///
/// The engine owns server communication; objects are reached through the
/// registry and the exchange passed to each call.
pub trait Engine {
    fn state(&self) -> ClientState;

    /// Returns true while any server observes a resource.
    fn has_observations(&self) -> bool;

    /// Do pending protocol work. Returns how long the engine may sleep.
    fn step(
        &mut self,
        registry: &mut ObjectRegistry,
        exchange: &mut dyn Exchange,
    ) -> Result<Duration, EngineError>;

    /// The peer reported a changed value under `uri`.
    fn resource_value_changed(&mut self, uri: &Uri);

    /// Drop back to [`ClientState::Initial`].
    fn reset(&mut self);

    /// Deregister from every server.
    fn close(&mut self, registry: &mut ObjectRegistry, exchange: &mut dyn Exchange);
}

/// How the loop should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Shutdown {
    Running = 0,
    /// Leave after deregistering from the servers.
    Deregister = 1,
    /// Leave without telling the servers.
    Abandon = 2,
}

/// Shutdown request shared between a signal handler and the loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicU8>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop. The first request wins.
    pub fn request(&self, mode: Shutdown) {
        let _ = self.0.compare_exchange(
            Shutdown::Running as u8,
            mode as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn get(&self) -> Shutdown {
        match self.0.load(Ordering::SeqCst) {
            1 => Shutdown::Deregister,
            2 => Shutdown::Abandon,
            _ => Shutdown::Running,
        }
    }

    pub fn is_requested(&self) -> bool {
        self.get() != Shutdown::Running
    }
}

/// Session loop timing.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on the wait between engine steps.
    pub loop_interval: Duration,
    /// Slice length used to notice shutdown requests while waiting.
    pub shutdown_poll: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            loop_interval: DEFAULT_LOOP_INTERVAL,
            shutdown_poll: DEFAULT_SHUTDOWN_POLL,
        }
    }
}

/// One client: the engine, the objects it exposes and the peer they are
/// bridged to.
pub struct Session<X, G> {
    exchange: X,
    engine: G,
    registry: ObjectRegistry,
    previous: ClientState,
    shutdown: ShutdownFlag,
    config: SessionConfig,
}

impl<X: Exchange, G: Engine> Session<X, G> {
    pub fn new(exchange: X, engine: G, registry: ObjectRegistry, shutdown: ShutdownFlag) -> Self {
        Self::with_config(exchange, engine, registry, shutdown, SessionConfig::default())
    }

    pub fn with_config(
        exchange: X,
        engine: G,
        registry: ObjectRegistry,
        shutdown: ShutdownFlag,
        config: SessionConfig,
    ) -> Self {
        Self {
            exchange,
            engine,
            registry,
            previous: ClientState::Initial,
            shutdown,
            config,
        }
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &G {
        &self.engine
    }

    /// The state seen at the end of the last step.
    pub fn previous_state(&self) -> ClientState {
        self.previous
    }

    /// Run until shutdown is requested or a step fails outside bootstrapping.
    pub fn run(&mut self) -> Result<Shutdown, EngineError> {
        info!("session started");
        loop {
            match self.shutdown.get() {
                Shutdown::Running => self.tick()?,
                Shutdown::Deregister => {
                    info!("deregistering");
                    self.engine.close(&mut self.registry, &mut self.exchange);
                    return Ok(Shutdown::Deregister);
                }
                Shutdown::Abandon => {
                    info!("leaving without deregistration");
                    return Ok(Shutdown::Abandon);
                }
            }
        }
    }

    /// One loop iteration.
    pub fn tick(&mut self) -> Result<(), EngineError> {
        let stepped = self.engine.step(&mut self.registry, &mut self.exchange);
        self.announce_state()?;

        let wait = match stepped {
            Ok(wait) => wait.min(self.config.loop_interval),
            Err(err) if self.previous == ClientState::Bootstrapping => {
                warn!(error = %err, "bootstrap failed, restoring security and server objects");
                self.registry.restore_bootstrap_objects(&mut self.exchange);
                self.engine.reset();
                self.config.loop_interval
            }
            Err(err) => {
                error!(error = %err, state = %self.engine.state(), "engine step failed");
                return Err(err);
            }
        };
        self.track_state();

        if self.engine.state() == ClientState::Ready && self.engine.has_observations() {
            self.exchange.notify(OBSERVE, &[])?;
        }

        self.await_inbound(wait)
    }

    fn announce_state(&mut self) -> Result<(), BridgeError> {
        let state = self.engine.state();
        if state == self.previous && !self.previous.is_transitional() {
            self.exchange.notify(HEARTBEAT, &[])
        } else {
            debug!(%state, "announcing state");
            self.exchange.notify(STATE_CHANGED, state.name().as_bytes())
        }
    }

    fn track_state(&mut self) {
        let state = self.engine.state();
        if state == self.previous {
            return;
        }
        info!(from = %self.previous, to = %state, "client state changed");
        self.previous = state;
        if state == ClientState::Bootstrapping {
            self.registry.backup_bootstrap_objects(&mut self.exchange);
        }
    }

    /// Wait up to `wait` for one unsolicited envelope and handle it.
    fn await_inbound(&mut self, wait: Duration) -> Result<(), EngineError> {
        let deadline = Instant::now().checked_add(wait);
        loop {
            let remaining = deadline
                .map(|d| d.saturating_duration_since(Instant::now()))
                .unwrap_or(self.config.shutdown_poll);

            match self
                .exchange
                .next_unsolicited(remaining.min(self.config.shutdown_poll))
            {
                Ok(Some(envelope)) => {
                    self.dispatch(envelope);
                    return Ok(());
                }
                Ok(None) | Err(BridgeError::Frame(FrameError::Incomplete { .. })) => {}
                Err(err @ BridgeError::Frame(FrameError::ConnectionClosed)) => {
                    error!("peer closed the bridge");
                    return Err(err.into());
                }
                Err(err) => {
                    warn!(error = %err, "discarding unreadable input");
                    return Ok(());
                }
            }

            if remaining.is_zero() || self.shutdown.is_requested() {
                return Ok(());
            }
        }
    }

    fn dispatch(&mut self, envelope: Envelope) {
        match envelope.kind {
            EnvelopeKind::Observe => {
                let engine = &mut self.engine;
                match dispatch_observe(&envelope.payload, |uri| engine.resource_value_changed(uri)) {
                    Ok(count) => debug!(count, "observe notification handled"),
                    Err(err) => {
                        warn!(error = %err, status = %err.status(), "observe notification rejected");
                    }
                }
            }
            EnvelopeKind::Response { command } => {
                warn!(command = %command, "dropping response with no request outstanding");
            }
        }
    }
}

/// An engine with no servers: stays in [`ClientState::Initial`] and sleeps
/// for a fixed interval. Changed values are logged.
#[derive(Debug, Clone)]
pub struct IdleEngine {
    interval: Duration,
    changes: u64,
}

impl IdleEngine {
    pub fn new(interval: Duration) -> Self {
        Self { interval, changes: 0 }
    }

    /// Number of changed-value notifications seen.
    pub fn changes(&self) -> u64 {
        self.changes
    }
}

impl Default for IdleEngine {
    fn default() -> Self {
        Self::new(DEFAULT_LOOP_INTERVAL)
    }
}

impl Engine for IdleEngine {
    fn state(&self) -> ClientState {
        ClientState::Initial
    }

    fn has_observations(&self) -> bool {
        false
    }

    fn step(
        &mut self,
        _registry: &mut ObjectRegistry,
        _exchange: &mut dyn Exchange,
    ) -> Result<Duration, EngineError> {
        Ok(self.interval)
    }

    fn resource_value_changed(&mut self, uri: &Uri) {
        self.changes += 1;
        info!(%uri, "resource value changed");
    }

    fn reset(&mut self) {}

    fn close(&mut self, _registry: &mut ObjectRegistry, _exchange: &mut dyn Exchange) {}
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::Bytes;

    use super::*;
    use crate::object::GenericObject;
    use crate::testing::{instances_reply, ScriptedExchange};

    /// Walks through scripted states; a step with no script left fails.
    #[derive(Default)]
    struct ScriptedEngine {
        steps: VecDeque<(ClientState, bool)>,
        state: ClientState,
        observing: bool,
        changed: Vec<Uri>,
        resets: usize,
        closed: bool,
    }

    impl ScriptedEngine {
        fn then(mut self, state: ClientState) -> Self {
            self.steps.push_back((state, true));
            self
        }

        fn then_fail(mut self, state: ClientState) -> Self {
            self.steps.push_back((state, false));
            self
        }
    }

    impl Engine for ScriptedEngine {
        fn state(&self) -> ClientState {
            self.state
        }

        fn has_observations(&self) -> bool {
            self.observing
        }

        fn step(
            &mut self,
            _registry: &mut ObjectRegistry,
            _exchange: &mut dyn Exchange,
        ) -> Result<Duration, EngineError> {
            match self.steps.pop_front() {
                Some((state, ok)) => {
                    self.state = state;
                    if ok {
                        Ok(Duration::ZERO)
                    } else {
                        Err(EngineError::Step("server unreachable".into()))
                    }
                }
                None => Err(EngineError::Step("script exhausted".into())),
            }
        }

        fn resource_value_changed(&mut self, uri: &Uri) {
            self.changed.push(*uri);
        }

        fn reset(&mut self) {
            self.resets += 1;
            self.state = ClientState::Initial;
        }

        fn close(&mut self, _registry: &mut ObjectRegistry, _exchange: &mut dyn Exchange) {
            self.closed = true;
        }
    }

    fn bootstrap_registry() -> ObjectRegistry {
        let mut registry = ObjectRegistry::default();
        for id in [0, 1, 3] {
            registry.insert(GenericObject::new(id));
        }
        registry
    }

    fn session(engine: ScriptedEngine) -> Session<ScriptedExchange, ScriptedEngine> {
        Session::new(
            ScriptedExchange::new(),
            engine,
            bootstrap_registry(),
            ShutdownFlag::new(),
        )
    }

    fn notifications(session: &Session<ScriptedExchange, ScriptedEngine>) -> Vec<(&str, &[u8])> {
        session
            .exchange
            .notifications
            .iter()
            .map(|(c, p)| (c.as_str(), p.as_slice()))
            .collect()
    }

    #[test]
    fn state_names() {
        assert_eq!(ClientState::Initial.name(), "STATE_INITIAL");
        assert_eq!(ClientState::BootstrapRequired.name(), "STATE_BOOTSTRAP_REQUIRED");
        assert_eq!(ClientState::RegisterRequired.to_string(), "STATE_REGISTER_REQUIRED");
        assert_eq!(ClientState::Ready.to_string(), "STATE_READY");
    }

    #[test]
    fn unchanged_state_sends_heartbeat() {
        let mut session = session(ScriptedEngine::default().then(ClientState::Initial));
        session.tick().unwrap();
        assert_eq!(notifications(&session), vec![("heartbeat", &b""[..])]);
    }

    #[test]
    fn transition_announces_state_name() {
        let mut session = session(
            ScriptedEngine::default()
                .then(ClientState::RegisterRequired)
                .then(ClientState::RegisterRequired),
        );
        session.tick().unwrap();
        session.tick().unwrap();
        assert_eq!(
            notifications(&session),
            vec![
                ("stateChanged", &b"STATE_REGISTER_REQUIRED"[..]),
                ("heartbeat", &b""[..]),
            ]
        );
        assert_eq!(session.previous_state(), ClientState::RegisterRequired);
    }

    #[test]
    fn transitional_states_are_announced_every_step() {
        let mut session = session(
            ScriptedEngine::default()
                .then(ClientState::Registering)
                .then(ClientState::Registering)
                .then(ClientState::Ready)
                .then(ClientState::Ready),
        );
        for _ in 0..4 {
            session.tick().unwrap();
        }
        let commands: Vec<_> = notifications(&session).into_iter().map(|(c, _)| c).collect();
        assert_eq!(
            commands,
            vec!["stateChanged", "stateChanged", "stateChanged", "heartbeat"]
        );
    }

    #[test]
    fn entering_bootstrapping_backs_up_security_and_server() {
        let mut session = session(
            ScriptedEngine::default()
                .then(ClientState::Bootstrapping)
                .then(ClientState::Bootstrapping),
        );
        session.exchange.push_reply(&[0x02, 0x01, 0x44]);
        session.exchange.push_reply(&[0x02, 0x01, 0x44]);

        session.tick().unwrap();
        assert_eq!(session.exchange.commands(), vec!["backup", "backup"]);

        session.tick().unwrap();
        assert_eq!(session.exchange.commands().len(), 2, "backup runs once per entry");
    }

    #[test]
    fn bootstrap_failure_restores_and_resets() {
        let mut session = session(
            ScriptedEngine::default()
                .then(ClientState::Bootstrapping)
                .then_fail(ClientState::Bootstrapping),
        );
        // Backups answered with Changed, restores with Changed then a fresh instance list.
        session.exchange.push_reply(&[0x02, 0x01, 0x44]);
        session.exchange.push_reply(&[0x02, 0x01, 0x44]);
        session.exchange.push_reply(&[0x02, 0x01, 0x44]);
        session.exchange.push_reply(&instances_reply(0, &[0]));
        session.exchange.push_reply(&[0x02, 0x01, 0x44]);
        session.exchange.push_reply(&instances_reply(1, &[0]));

        session.tick().unwrap();
        session.tick().unwrap();

        assert_eq!(
            session.exchange.commands(),
            vec!["backup", "backup", "restore", "readInstances", "restore", "readInstances"]
        );
        assert_eq!(session.engine().resets, 1);
        assert_eq!(session.previous_state(), ClientState::Initial);
        assert!(session.registry().get(0).unwrap().instances().is_synchronized());
    }

    #[test]
    fn failure_outside_bootstrap_is_fatal() {
        let mut session = session(ScriptedEngine::default().then_fail(ClientState::Registering));
        let err = session.tick().unwrap_err();
        assert!(matches!(err, EngineError::Step(_)));
        // The state is still announced before the failure surfaces.
        assert_eq!(
            notifications(&session),
            vec![("stateChanged", &b"STATE_REGISTERING"[..])]
        );
    }

    #[test]
    fn ready_with_observations_polls_the_peer() {
        let mut engine = ScriptedEngine::default()
            .then(ClientState::Ready)
            .then(ClientState::Ready);
        engine.observing = true;
        let mut session = session(engine);
        session.tick().unwrap();
        session.tick().unwrap();
        let commands: Vec<_> = notifications(&session).into_iter().map(|(c, _)| c).collect();
        assert_eq!(
            commands,
            vec!["stateChanged", "observe", "heartbeat", "observe"]
        );
    }

    #[test]
    fn observe_envelope_reaches_the_engine() {
        let mut session = session(ScriptedEngine::default().then(ClientState::Ready));
        let mut payload = vec![0x02, 0x00, 0x45, 0x02, 0x00];
        for uri in ["/3/0/13", "/1024/2"] {
            payload.extend_from_slice(&(uri.len() as u16).to_le_bytes());
            payload.extend_from_slice(uri.as_bytes());
        }
        session.exchange.push_observe(&payload);

        session.tick().unwrap();
        assert_eq!(
            session.engine().changed,
            vec![Uri::resource(3, 0, 13), Uri::instance(1024, 2)]
        );
    }

    #[test]
    fn one_unsolicited_envelope_per_tick() {
        let mut session = session(
            ScriptedEngine::default()
                .then(ClientState::Ready)
                .then(ClientState::Ready),
        );
        session.exchange.push_unsolicited(Envelope {
            kind: EnvelopeKind::Response {
                command: "read".into(),
            },
            payload: Bytes::from_static(&[0x02, 0x01, 0x45]),
        });
        session.exchange.push_observe(&[0x02, 0x00, 0x45, 0x01, 0x00, 0x02, 0x00, b'/', b'5']);

        session.tick().unwrap();
        assert!(session.engine().changed.is_empty());
        session.tick().unwrap();
        assert_eq!(session.engine().changed, vec![Uri::object(5)]);
    }

    #[test]
    fn bad_observe_keeps_the_session_alive() {
        let mut session = session(
            ScriptedEngine::default()
                .then(ClientState::Ready)
                .then(ClientState::Ready),
        );
        session.exchange.push_observe(&[0x02, 0x00, 0x45, 0x01, 0x00, 0x03, 0x00, b'b', b'a', b'd']);
        session.tick().unwrap();
        session.tick().unwrap();
        assert!(session.engine().changed.is_empty());
    }

    #[test]
    fn shutdown_flag_first_request_wins() {
        let flag = ShutdownFlag::new();
        assert_eq!(flag.get(), Shutdown::Running);
        flag.clone().request(Shutdown::Abandon);
        flag.request(Shutdown::Deregister);
        assert_eq!(flag.get(), Shutdown::Abandon);
        assert!(flag.is_requested());
    }

    #[test]
    fn run_stops_on_request_and_deregisters() {
        let flag = ShutdownFlag::new();
        let mut session = Session::new(
            ScriptedExchange::new(),
            ScriptedEngine::default(),
            bootstrap_registry(),
            flag.clone(),
        );
        flag.request(Shutdown::Deregister);
        assert_eq!(session.run().unwrap(), Shutdown::Deregister);
        assert!(session.engine().closed);
    }

    #[test]
    fn abandon_skips_deregistration() {
        let flag = ShutdownFlag::new();
        flag.request(Shutdown::Abandon);
        let mut session = Session::new(
            ScriptedExchange::new(),
            ScriptedEngine::default(),
            bootstrap_registry(),
            flag,
        );
        assert_eq!(session.run().unwrap(), Shutdown::Abandon);
        assert!(!session.engine().closed);
    }

    #[test]
    fn run_surfaces_fatal_step_errors() {
        let mut session = session(ScriptedEngine::default());
        assert!(session.run().is_err());
    }

    #[test]
    fn idle_engine_stays_initial() {
        let mut engine = IdleEngine::new(Duration::from_millis(5));
        let mut registry = ObjectRegistry::default();
        let mut exchange = ScriptedExchange::new();
        assert_eq!(
            engine.step(&mut registry, &mut exchange).unwrap(),
            Duration::from_millis(5)
        );
        engine.resource_value_changed(&Uri::object(3));
        assert_eq!(engine.state(), ClientState::Initial);
        assert_eq!(engine.changes(), 1);
    }
}
