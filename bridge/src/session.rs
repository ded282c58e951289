use std::{
    future::Future,
    io,
    sync::OnceLock,
    time::Duration,
};

use lighting_bridge_common::{
    BridgeAction, BridgeConfig, BridgeError, Command, CommandQueue, ConnectionState,
    DeviceChange, DeviceRegistry, DeviceRequest, DeviceStatus, Event, LineCodec, LineSink,
    SessionConfig, SinkError,
};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{tcp::OwnedWriteHalf, TcpStream},
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 4096;
const REQUEST_BUFFER: usize = 32;
const CHANGE_BUFFER: usize = 64;

#[derive(Debug, Error)]
enum Teardown {
    #[error("controller closed the connection")]
    Eof,
    #[error("read failed: {0}")]
    Read(io::Error),
    #[error("writer stopped")]
    WriterStopped,
    #[error("no data received within the idle timeout")]
    IdleTimeout,
    #[error("no pong received")]
    PongTimeout,
    #[error("unterminated line exceeded {0} bytes")]
    LineOverflow(usize),
}

enum SessionRequest {
    Device {
        request: DeviceRequest,
        reply: oneshot::Sender<Result<DeviceStatus, BridgeError>>,
    },
    Devices {
        reply: oneshot::Sender<Vec<DeviceStatus>>,
    },
    State {
        reply: oneshot::Sender<ConnectionState>,
    },
}

/// Cloneable entry point into a running session.
#[derive(Clone)]
pub struct BridgeHandle {
    requests: mpsc::Sender<SessionRequest>,
    changes: broadcast::Sender<DeviceChange>,
}

impl BridgeHandle {
    pub async fn request(&self, request: DeviceRequest) -> Result<DeviceStatus, BridgeError> {
        let (reply, response) = oneshot::channel();
        self.call(SessionRequest::Device { request, reply }, response)
            .await?
    }

    pub async fn devices(&self) -> Result<Vec<DeviceStatus>, BridgeError> {
        let (reply, response) = oneshot::channel();
        self.call(SessionRequest::Devices { reply }, response).await
    }

    pub async fn connection_state(&self) -> Result<ConnectionState, BridgeError> {
        let (reply, response) = oneshot::channel();
        self.call(SessionRequest::State { reply }, response).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceChange> {
        self.changes.subscribe()
    }

    async fn call<T>(
        &self,
        request: SessionRequest,
        response: oneshot::Receiver<T>,
    ) -> Result<T, BridgeError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| BridgeError::SessionClosed)?;
        response.await.map_err(|_| BridgeError::SessionClosed)
    }
}

/// Starts the session task. It runs until every handle has been dropped.
pub fn spawn(config: &BridgeConfig, registry: DeviceRegistry) -> (BridgeHandle, JoinHandle<()>) {
    let (requests_tx, requests) = mpsc::channel(REQUEST_BUFFER);
    let (changes, _) = broadcast::channel(CHANGE_BUFFER);

    let evaluate_period = Duration::from_millis(config.session.evaluate_interval_ms);
    let mut evaluate = time::interval_at(Instant::now() + evaluate_period, evaluate_period);
    evaluate.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let session = Session {
        address: format!("{}:{}", config.host, config.port),
        lighting_address: config.lighting_address.clone(),
        config: config.session.clone(),
        registry,
        queue: CommandQueue::new(),
        codec: LineCodec::new(),
        state: ConnectionState::Disconnected,
        sink: None,
        pong_deadline: None,
        idle_deadline: None,
        evaluate,
        requests,
        changes: changes.clone(),
    };

    let task = tokio::spawn(session.run());
    (
        BridgeHandle {
            requests: requests_tx,
            changes,
        },
        task,
    )
}

/// Hands lines to the per-connection writer task.
struct ChannelSink {
    lines: mpsc::Sender<String>,
}

impl LineSink for ChannelSink {
    fn offer(&mut self, line: &str) -> Result<(), SinkError> {
        self.lines
            .try_send(line.to_string())
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => SinkError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
            })
    }
}

struct Session {
    address: String,
    lighting_address: String,
    config: SessionConfig,
    registry: DeviceRegistry,
    queue: CommandQueue,
    codec: LineCodec,
    state: ConnectionState,
    sink: Option<ChannelSink>,
    pong_deadline: Option<Instant>,
    idle_deadline: Option<Instant>,
    evaluate: Interval,
    requests: mpsc::Receiver<SessionRequest>,
    changes: broadcast::Sender<DeviceChange>,
}

impl Session {
    async fn run(mut self) {
        info!(
            controller = %self.address,
            devices = self.registry.len(),
            "bridge session started"
        );

        loop {
            self.set_state(ConnectionState::Connecting);
            let connect = time::timeout(
                Duration::from_millis(self.config.connect_timeout_ms),
                TcpStream::connect(self.address.clone()),
            );
            let Some(attempt) = self.serve_until(connect).await else {
                break;
            };

            match attempt {
                Ok(Ok(stream)) => {
                    info!(controller = %self.address, "connected to lighting controller");
                    match self.serve(stream).await {
                        Some(reason) => warn!(controller = %self.address, %reason, "connection closed"),
                        None => break,
                    }
                }
                Ok(Err(err)) => warn!(controller = %self.address, "connect failed: {err}"),
                Err(_) => warn!(controller = %self.address, "connect timed out"),
            }

            self.set_state(ConnectionState::Disconnected);
            info!(
                delay_ms = self.config.reconnect_delay_ms,
                "reconnect scheduled"
            );
            let delay = time::sleep(Duration::from_millis(self.config.reconnect_delay_ms));
            if self.serve_until(delay).await.is_none() {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("bridge session stopped");
    }

    /// Keeps serving requests and thermostat evaluation until `future`
    /// completes. Returns `None` once every handle is gone.
    async fn serve_until<F: Future>(&mut self, future: F) -> Option<F::Output> {
        tokio::pin!(future);
        loop {
            tokio::select! {
                output = &mut future => return Some(output),
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => return None,
                },
                _ = self.evaluate.tick() => self.evaluate_thermostats(),
            }
        }
    }

    /// Runs one connection until it is torn down. Returns `None` on shutdown.
    async fn serve(&mut self, stream: TcpStream) -> Option<Teardown> {
        let (mut reader, writer) = stream.into_split();
        let (lines, pending) = mpsc::channel(self.config.write_buffer);
        let mut writer_task = tokio::spawn(write_lines(writer, pending));
        self.sink = Some(ChannelSink { lines });

        self.set_state(ConnectionState::Connected);
        self.idle_deadline = self.next_idle_deadline();
        self.ready();

        let ping_period = Duration::from_millis(self.config.ping_interval_ms);
        let mut ping = time::interval_at(Instant::now() + ping_period, ping_period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut chunk = [0u8; READ_CHUNK];

        let outcome = loop {
            let stalled = self.queue.is_stalled();
            tokio::select! {
                read = reader.read(&mut chunk) => match read {
                    Ok(0) => break Some(Teardown::Eof),
                    Ok(len) => {
                        self.idle_deadline = self.next_idle_deadline();
                        if let Err(reason) = self.receive(&chunk[..len]) {
                            break Some(reason);
                        }
                    }
                    Err(err) => break Some(Teardown::Read(err)),
                },
                open = capacity_returned(self.sink.as_ref()), if stalled => {
                    if !open {
                        break Some(Teardown::WriterStopped);
                    }
                    self.drain();
                }
                _ = ping.tick() => {
                    self.send(Command::Ping);
                    // An unanswered ping keeps its deadline; later pings do not extend it.
                    let timeout = Duration::from_millis(self.config.pong_timeout_ms);
                    self.pong_deadline.get_or_insert_with(|| Instant::now() + timeout);
                }
                _ = expire(self.pong_deadline) => break Some(Teardown::PongTimeout),
                _ = expire(self.idle_deadline) => break Some(Teardown::IdleTimeout),
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break None,
                },
                _ = self.evaluate.tick() => self.evaluate_thermostats(),
                _ = &mut writer_task => break Some(Teardown::WriterStopped),
            }
        };

        writer_task.abort();
        self.close();
        outcome
    }

    /// Connection is usable: register the devices and restore credit.
    fn ready(&mut self) {
        for command in self.registry.configure_commands(&self.lighting_address) {
            self.queue.enqueue(&command);
        }
        self.drain();
    }

    fn close(&mut self) {
        self.sink = None;
        self.queue.revoke();
        self.codec.clear();
        self.pong_deadline = None;
        self.idle_deadline = None;
        self.set_state(ConnectionState::Disconnected);
        if !self.queue.is_empty() {
            debug!(pending = self.queue.len(), "commands held for the next connection");
        }
    }

    fn receive(&mut self, bytes: &[u8]) -> Result<(), Teardown> {
        for line in self.codec.feed(bytes) {
            self.dispatch(&line);
        }

        let pending = self.codec.pending_len();
        if pending > self.config.max_line_bytes {
            return Err(Teardown::LineOverflow(pending));
        }
        Ok(())
    }

    fn dispatch(&mut self, line: &str) {
        debug!(line, "received");
        let Some(event) = lighting_bridge_common::parse(line) else {
            debug!(line, "unrecognized line");
            return;
        };

        match event {
            Event::Ping => self.send(Command::Pong),
            Event::Pong => self.pong_deadline = None,
            event => {
                let actions = self.registry.apply(&event, monotonic_ms());
                self.execute(actions);
            }
        }
    }

    fn handle_request(&mut self, request: SessionRequest) {
        let now_ms = monotonic_ms();
        match request {
            SessionRequest::Device { request, reply } => {
                let result = match self.registry.handle(&request, now_ms) {
                    Ok((actions, status)) => {
                        self.execute(actions);
                        Ok(status)
                    }
                    Err(err) => {
                        debug!(address = request.address(), "request rejected: {err}");
                        Err(err)
                    }
                };
                let _ = reply.send(result);
            }
            SessionRequest::Devices { reply } => {
                let _ = reply.send(self.registry.statuses(now_ms));
            }
            SessionRequest::State { reply } => {
                let _ = reply.send(self.state);
            }
        }
    }

    fn evaluate_thermostats(&mut self) {
        let actions = self.registry.evaluate_thermostats(monotonic_ms());
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<BridgeAction>) {
        for action in actions {
            match action {
                BridgeAction::Send(command) => self.send(command),
                BridgeAction::Notify(change) => {
                    // No subscribers is not an error.
                    let _ = self.changes.send(change);
                }
            }
        }
    }

    fn send(&mut self, command: Command) {
        self.queue.enqueue(&command);
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = self.queue.flush(sink) {
                debug!("handoff refused: {err}");
            }
        }
    }

    fn drain(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(err) = self.queue.drain(sink) {
                debug!("handoff refused: {err}");
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = self.state.as_str(), to = state.as_str(), "session state");
            self.state = state;
        }
    }

    fn next_idle_deadline(&self) -> Option<Instant> {
        self.config
            .idle_timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms))
    }
}

async fn write_lines(
    mut writer: OwnedWriteHalf,
    mut lines: mpsc::Receiver<String>,
) -> io::Result<()> {
    while let Some(line) = lines.recv().await {
        debug!(line = line.trim_end(), "sent");
        if let Err(err) = writer.write_all(line.as_bytes()).await {
            warn!("write failed: {err}");
            return Err(err);
        }
    }
    Ok(())
}

/// Resolves once the writer channel has a free slot, or `false` if it closed.
async fn capacity_returned(sink: Option<&ChannelSink>) -> bool {
    match sink {
        Some(sink) => sink.lines.reserve().await.is_ok(),
        None => std::future::pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<std::time::Instant> = OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use lighting_bridge_common::{
        DeviceEntry, DeviceKind, DeviceState, ThermostatConfig, ThermostatContext, ThermostatMode,
    };
    use pretty_assertions::assert_eq;
    use tokio::{
        io::{AsyncBufReadExt, BufReader, Lines},
        net::{tcp::OwnedReadHalf, TcpListener},
    };

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    struct Controller {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl Controller {
        async fn accept(listener: &TcpListener) -> Self {
            let (stream, _) = time::timeout(WAIT, listener.accept())
                .await
                .expect("bridge did not connect")
                .unwrap();
            let (reader, writer) = stream.into_split();
            Self {
                lines: BufReader::new(reader).lines(),
                writer,
            }
        }

        async fn line(&mut self) -> String {
            time::timeout(WAIT, self.lines.next_line())
                .await
                .expect("no line from bridge")
                .unwrap()
                .expect("bridge closed the connection")
        }

        async fn lines(&mut self, count: usize) -> Vec<String> {
            let mut lines = Vec::with_capacity(count);
            for _ in 0..count {
                lines.push(self.line().await);
            }
            lines
        }

        async fn write(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }
    }

    fn entry(name: &str, device_type: DeviceKind, address: &str) -> DeviceEntry {
        DeviceEntry {
            name: name.to_string(),
            device_type,
            address: address.to_string(),
        }
    }

    fn config(port: u16, lighting_table: Vec<DeviceEntry>) -> BridgeConfig {
        BridgeConfig {
            lighting_address: "10".to_string(),
            host: "127.0.0.1".to_string(),
            port,
            http_port: 0,
            lighting_table,
            session: SessionConfig {
                ping_interval_ms: 60_000,
                pong_timeout_ms: 60_000,
                reconnect_delay_ms: 50,
                connect_timeout_ms: 1_000,
                evaluate_interval_ms: 60_000,
                idle_timeout_ms: None,
                max_line_bytes: 256,
                write_buffer: 4,
            },
            thermostat: ThermostatConfig::default(),
        }
    }

    fn start(config: BridgeConfig, contexts: HashMap<String, ThermostatContext>) -> BridgeHandle {
        let registry = DeviceRegistry::discover(&config, &contexts).unwrap();
        let (handle, _task) = spawn(&config, registry);
        handle
    }

    async fn listen() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn ready_sends_configure_sequence() {
        let (listener, port) = listen().await;
        let _bridge = start(
            config(
                port,
                vec![
                    entry("Lounge", DeviceKind::SimpleThermostat, "2.1; measurement = 0+3"),
                    entry("Kitchen", DeviceKind::Switch, "3.2"),
                    entry("Hall", DeviceKind::Dimmer, "1.1"),
                ],
            ),
            HashMap::new(),
        );

        let mut controller = Controller::accept(&listener).await;

        assert_eq!(
            controller.lines(4).await,
            vec![
                "Lighting_controller::Configure(Lighting_Address = 10)",
                "Lighting_controller::ConfigureDimmer(Address1 = 1.1)",
                "Lighting_controller::ConfigureSwitch(Address1 = 3.2)",
                "Lighting_controller::ConfigureSwitch(Address1 = 2.1; measurement = 0+3)",
            ]
        );
    }

    #[tokio::test]
    async fn controller_ping_is_answered_with_pong() {
        let (listener, port) = listen().await;
        let _bridge = start(config(port, Vec::new()), HashMap::new());

        let mut controller = Controller::accept(&listener).await;
        controller.line().await;
        controller.write("Lighting_controller::Ping()\r\n").await;

        assert_eq!(controller.line().await, "Lighting_controller::Pong()");
    }

    #[tokio::test]
    async fn answered_keepalive_keeps_the_connection() {
        let (listener, port) = listen().await;
        let mut config = config(port, Vec::new());
        config.session.ping_interval_ms = 100;
        config.session.pong_timeout_ms = 60;
        let bridge = start(config, HashMap::new());

        let mut controller = Controller::accept(&listener).await;
        controller.line().await;
        for _ in 0..3 {
            assert_eq!(controller.line().await, "Lighting_controller::Ping()");
            controller.write("Lighting_controller::Pong()\n").await;
        }

        assert_eq!(
            bridge.connection_state().await,
            Ok(ConnectionState::Connected)
        );
    }

    #[tokio::test]
    async fn missing_pong_tears_down_and_reconnects() {
        let (listener, port) = listen().await;
        let mut config = config(port, Vec::new());
        config.session.ping_interval_ms = 200;
        config.session.pong_timeout_ms = 50;
        let _bridge = start(config, HashMap::new());

        let mut first = Controller::accept(&listener).await;
        first.line().await;
        assert_eq!(first.line().await, "Lighting_controller::Ping()");

        let mut second = Controller::accept(&listener).await;
        assert_eq!(
            second.line().await,
            "Lighting_controller::Configure(Lighting_Address = 10)"
        );
        let closed = time::timeout(WAIT, first.lines.next_line()).await.unwrap();
        assert!(matches!(closed, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn overlong_line_tears_down_the_connection() {
        let (listener, port) = listen().await;
        let _bridge = start(config(port, Vec::new()), HashMap::new());

        let mut first = Controller::accept(&listener).await;
        first.line().await;
        first.write(&"x".repeat(300)).await;

        let mut second = Controller::accept(&listener).await;
        assert_eq!(
            second.line().await,
            "Lighting_controller::Configure(Lighting_Address = 10)"
        );
    }

    #[tokio::test]
    async fn commands_issued_while_disconnected_are_replayed_before_configure() {
        let (listener, port) = listen().await;
        let mut config = config(port, vec![entry("Kitchen", DeviceKind::Switch, "3.2")]);
        config.session.reconnect_delay_ms = 500;
        let bridge = start(config, HashMap::new());
        let mut changes = bridge.subscribe();

        let mut first = Controller::accept(&listener).await;
        first.lines(2).await;
        drop(first);

        time::timeout(WAIT, async {
            while bridge.connection_state().await == Ok(ConnectionState::Connected) {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let status = bridge
            .request(DeviceRequest::SetOn {
                address: "3.2".to_string(),
                on: true,
            })
            .await
            .unwrap();
        assert_eq!(status.state, DeviceState::Power { on: Some(true) });
        assert_eq!(
            changes.recv().await.unwrap(),
            DeviceChange::Power {
                address: "3.2".to_string(),
                on: true
            }
        );

        let mut second = Controller::accept(&listener).await;
        assert_eq!(
            second.lines(3).await,
            vec![
                "Lighting_controller::SwitchOn(Address1 = 3.2)",
                "Lighting_controller::Configure(Lighting_Address = 10)",
                "Lighting_controller::ConfigureSwitch(Address1 = 3.2)",
            ]
        );
    }

    #[tokio::test]
    async fn measurement_drives_thermostat_output() {
        let (listener, port) = listen().await;
        let address = "2.1; measurement = 0 + 3";
        let contexts = HashMap::from([(
            address.to_string(),
            ThermostatContext {
                mode: Some(ThermostatMode::Heat),
                setpoint: Some(21.0),
            },
        )]);
        let bridge = start(
            config(
                port,
                vec![entry("Lounge", DeviceKind::SimpleThermostat, address)],
            ),
            contexts,
        );

        let mut controller = Controller::accept(&listener).await;
        controller.lines(2).await;
        controller
            .write("Measurement(Device+Channel = 0+3, Units = 0, Value = 18.5)\n")
            .await;

        assert_eq!(
            controller.line().await,
            "Lighting_controller::SwitchOn(Address1 = 2.1; measurement = 0 + 3)"
        );

        let devices = bridge.devices().await.unwrap();
        let DeviceState::Thermostat(status) = &devices[0].state else {
            panic!("expected thermostat status");
        };
        assert!(status.heating);
        assert_eq!(status.current_temp, 18.5);
    }

    #[tokio::test]
    async fn unknown_device_request_is_rejected() {
        let (_listener, port) = listen().await;
        let bridge = start(config(port, Vec::new()), HashMap::new());

        let result = bridge
            .request(DeviceRequest::SetLevel {
                address: "9.9".to_string(),
                level: 10,
            })
            .await;

        assert_eq!(
            result,
            Err(BridgeError::UnknownDevice {
                address: "9.9".to_string()
            })
        );
    }

    #[tokio::test]
    async fn unanswered_ping_times_out_when_pings_outpace_the_deadline() {
        let (listener, port) = listen().await;
        let mut config = config(port, Vec::new());
        config.session.ping_interval_ms = 50;
        config.session.pong_timeout_ms = 200;
        let _bridge = start(config, HashMap::new());

        let mut first = Controller::accept(&listener).await;
        first.line().await;
        assert_eq!(first.line().await, "Lighting_controller::Ping()");

        let mut second = Controller::accept(&listener).await;
        assert_eq!(
            second.line().await,
            "Lighting_controller::Configure(Lighting_Address = 10)"
        );
    }

    #[tokio::test]
    async fn silent_controller_hits_idle_timeout() {
        let (listener, port) = listen().await;
        let mut config = config(port, Vec::new());
        config.session.idle_timeout_ms = Some(100);
        let _bridge = start(config, HashMap::new());

        let mut first = Controller::accept(&listener).await;
        first.line().await;

        let mut second = Controller::accept(&listener).await;
        assert_eq!(
            second.line().await,
            "Lighting_controller::Configure(Lighting_Address = 10)"
        );
        let closed = time::timeout(WAIT, first.lines.next_line()).await.unwrap();
        assert!(matches!(closed, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn full_writer_channel_drains_in_order() {
        let (listener, port) = listen().await;
        let addresses: Vec<String> = (0..40).map(|index| format!("3.{index:02}")).collect();
        let table = addresses
            .iter()
            .map(|address| entry("Light", DeviceKind::Switch, address))
            .collect();
        let mut config = config(port, table);
        config.session.write_buffer = 1;
        let _bridge = start(config, HashMap::new());

        let mut controller = Controller::accept(&listener).await;

        let mut expected =
            vec!["Lighting_controller::Configure(Lighting_Address = 10)".to_string()];
        expected.extend(
            addresses
                .iter()
                .map(|address| format!("Lighting_controller::ConfigureSwitch(Address1 = {address})")),
        );
        assert_eq!(controller.lines(expected.len()).await, expected);
    }

    #[tokio::test]
    async fn close_cancels_pending_pong_and_reconnects_once() {
        let (listener, port) = listen().await;
        let mut config = config(port, Vec::new());
        config.session.ping_interval_ms = 50;
        config.session.pong_timeout_ms = 300;
        let bridge = start(config, HashMap::new());

        let mut first = Controller::accept(&listener).await;
        first.line().await;
        assert_eq!(first.line().await, "Lighting_controller::Ping()");
        drop(first);

        let mut second = Controller::accept(&listener).await;
        second.line().await;
        for _ in 0..10 {
            assert_eq!(second.line().await, "Lighting_controller::Ping()");
            second.write("Lighting_controller::Pong()\n").await;
        }

        assert!(time::timeout(Duration::from_millis(200), listener.accept())
            .await
            .is_err());
        assert_eq!(
            bridge.connection_state().await,
            Ok(ConnectionState::Connected)
        );
    }
}
