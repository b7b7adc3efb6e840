//! The session client: wires channels, poller, readiness, arbiter, and
//! message dispatch together for one streaming target.

pub mod arbiter;
pub mod dispatch;
pub mod readiness;
pub mod recorder;

pub use arbiter::{ControlArbiter, EvalInput};
pub use dispatch::MessageDispatcher;
pub use readiness::{is_ready, ReadinessGate};
pub use recorder::ExfiltrationRecorder;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::auth::{CredentialProvider, StreamAuth};
use crate::channel::{ControlChannel, ControlEvent, PixelStreamChannel};
use crate::clipboard::{Clipboard, SystemClipboard};
use crate::config::Config;
use crate::notify::{LogNotifier, Notifier};
use crate::session::{
    build_stream_url, ExistencePoller, ReqwestSessionApi, SessionApi, SessionError, SessionTarget,
};
use crate::transport::websocket::WsPixelTransport;
use crate::transport::{FirstFrameDetector, PixelTransport, RenderSurfaceDetector};

const REDIAL_DELAY: Duration = Duration::from_secs(1);

type DetectorFactory = Arc<dyn Fn() -> Box<dyn RenderSurfaceDetector> + Send + Sync>;

/// Builder for [`SessionClient`]. The target identity is fixed for the life
/// of the client; watching a different entity means building a new client.
pub struct SessionClientBuilder {
    config: Config,
    target: Option<SessionTarget>,
    show_stream: bool,
    interactive: bool,
    credentials: Option<Arc<dyn CredentialProvider>>,
    clipboard: Arc<dyn Clipboard>,
    notifier: Arc<dyn Notifier>,
    transport: Arc<dyn PixelTransport>,
    session_api: Option<Arc<dyn SessionApi>>,
    detector_factory: DetectorFactory,
}

impl SessionClientBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            target: None,
            show_stream: true,
            interactive: false,
            credentials: None,
            clipboard: Arc::new(SystemClipboard),
            notifier: Arc::new(LogNotifier),
            transport: Arc::new(WsPixelTransport),
            session_api: None,
            detector_factory: Arc::new(|| Box::new(FirstFrameDetector) as Box<dyn RenderSurfaceDetector>),
        }
    }

    pub fn target(mut self, target: Option<SessionTarget>) -> Self {
        self.target = target;
        self
    }

    pub fn show_stream(mut self, show_stream: bool) -> Self {
        self.show_stream = show_stream;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    pub fn clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn pixel_transport(mut self, transport: Arc<dyn PixelTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn session_api(mut self, api: Arc<dyn SessionApi>) -> Self {
        self.session_api = Some(api);
        self
    }

    pub fn render_surface_detector<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn RenderSurfaceDetector> + Send + Sync + 'static,
    {
        self.detector_factory = Arc::new(factory);
        self
    }

    /// Build the client and spawn its supervisor. With no target the client
    /// comes up inert: no channel opens and readiness stays false.
    pub fn start(self) -> Result<SessionClient, SessionError> {
        let api: Arc<dyn SessionApi> = match self.session_api {
            Some(api) => api,
            None => Arc::new(ReqwestSessionApi::new()?),
        };
        let auth = Arc::new(StreamAuth::new(&self.config, self.credentials));
        let control = Arc::new(ControlChannel::new());
        let pixels = Arc::new(PixelStreamChannel::new(self.transport));
        let recorder = Arc::new(ExfiltrationRecorder::new());
        let dispatcher =
            MessageDispatcher::new(self.clipboard, self.notifier, recorder.clone());

        // Optimistic until the poller reports otherwise.
        let (exists_tx, exists_rx) = watch::channel(true);
        let (gate, ready_rx) = ReadinessGate::spawn(
            pixels.connected_watch(),
            pixels.canvas_watch(),
            exists_rx,
        );

        let inputs = ClientInputs {
            show_stream: watch::channel(self.show_stream).0,
            interactive: watch::channel(self.interactive).0,
            recording: watch::channel(false).0,
            exfiltrate: watch::channel(false).0,
            user_control: watch::channel(false).0,
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = self.target.map(|target| {
            let sup = Supervisor {
                config: self.config,
                target,
                auth,
                api,
                control: control.clone(),
                pixels: pixels.clone(),
                dispatcher,
                recorder: recorder.clone(),
                detector_factory: self.detector_factory,
                exists_tx,
            };
            tokio::spawn(run_supervisor(
                sup,
                inputs.show_stream.subscribe(),
                inputs.interactive.subscribe(),
                inputs.recording.subscribe(),
                inputs.exfiltrate.subscribe(),
                inputs.user_control.subscribe(),
                shutdown_rx,
            ))
        });

        Ok(SessionClient {
            control,
            pixels,
            recorder,
            inputs,
            ready_rx,
            _gate: gate,
            supervisor: Mutex::new(supervisor),
            shutdown_tx,
        })
    }
}

struct ClientInputs {
    show_stream: watch::Sender<bool>,
    interactive: watch::Sender<bool>,
    recording: watch::Sender<bool>,
    exfiltrate: watch::Sender<bool>,
    user_control: watch::Sender<bool>,
}

/// A running session client. All mutators are fire-and-forget; runtime
/// failures surface as log lines or notifications, never as errors here.
pub struct SessionClient {
    control: Arc<ControlChannel>,
    pixels: Arc<PixelStreamChannel>,
    recorder: Arc<ExfiltrationRecorder>,
    inputs: ClientInputs,
    ready_rx: watch::Receiver<bool>,
    _gate: ReadinessGate,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl SessionClient {
    pub fn builder(config: Config) -> SessionClientBuilder {
        SessionClientBuilder::new(config)
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    pub fn readiness_watch(&self) -> watch::Receiver<bool> {
        self.ready_rx.clone()
    }

    pub fn control_connected_watch(&self) -> watch::Receiver<bool> {
        self.control.connected_watch()
    }

    pub fn pixel_connected_watch(&self) -> watch::Receiver<bool> {
        self.pixels.connected_watch()
    }

    pub fn is_pixel_connected(&self) -> bool {
        self.pixels.is_connected()
    }

    pub fn is_canvas_ready(&self) -> bool {
        self.pixels.is_canvas_ready()
    }

    pub fn recorder(&self) -> &ExfiltrationRecorder {
        &self.recorder
    }

    /// Eligibility predicate: when it flips false every channel tears down;
    /// when it returns true the supervisor dials again.
    pub fn set_show_stream(&self, show_stream: bool) {
        self.inputs.show_stream.send_replace(show_stream);
    }

    pub fn set_interactive(&self, interactive: bool) {
        self.inputs.interactive.send_replace(interactive);
    }

    pub fn set_user_controlling(&self, controlling: bool) {
        self.inputs.user_control.send_replace(controlling);
    }

    pub fn set_recording(&self, recording: bool) {
        self.inputs.recording.send_replace(recording);
    }

    pub fn set_exfiltrate(&self, exfiltrate: bool) {
        self.inputs.exfiltrate.send_replace(exfiltrate);
    }

    /// Stop the supervisor, tear down both channels, and clear the recorder.
    /// Export any recording before calling this.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.control.disconnect();
        self.pixels.disconnect();
        self.recorder.reset();
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        if let Some(handle) = self.supervisor.lock().take() {
            handle.abort();
        }
        self.control.disconnect();
        self.pixels.disconnect();
        self.recorder.reset();
    }
}

struct Supervisor {
    config: Config,
    target: SessionTarget,
    auth: Arc<StreamAuth>,
    api: Arc<dyn SessionApi>,
    control: Arc<ControlChannel>,
    pixels: Arc<PixelStreamChannel>,
    dispatcher: MessageDispatcher,
    recorder: Arc<ExfiltrationRecorder>,
    detector_factory: DetectorFactory,
    exists_tx: watch::Sender<bool>,
}

#[allow(clippy::too_many_arguments)]
async fn run_supervisor(
    sup: Supervisor,
    show_stream: watch::Receiver<bool>,
    interactive: watch::Receiver<bool>,
    recording: watch::Receiver<bool>,
    exfiltrate: watch::Receiver<bool>,
    mut user_control: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ControlEvent>();
    let mut arbiter = ControlArbiter::new();
    let mut control_connected = sup.control.connected_watch();
    let mut control_drops = sup.control.disconnect_watch();
    let mut pixel_drops = sup.pixels.disconnect_watch();
    let mut poller: Option<ExistencePoller> = None;
    let mut channels_up = false;

    let mut show_stream_rx = show_stream;
    let mut interactive_rx = interactive;
    let mut recording_rx = recording;
    let mut exfiltrate_rx = exfiltrate;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let eligible = *show_stream_rx.borrow();
        if eligible && !channels_up {
            if poller.is_none() {
                if let Some(id) = sup.target.browser_session_id() {
                    poller = Some(ExistencePoller::spawn(
                        sup.api.clone(),
                        sup.config.api_base.clone(),
                        sup.auth.clone(),
                        id.to_string(),
                        sup.exists_tx.clone(),
                    ));
                }
            }
            dial_pixels(&sup, &show_stream_rx).await;
            dial_control(&sup, &events_tx, &show_stream_rx).await;
            channels_up = true;
        } else if !eligible && channels_up {
            teardown(&sup, &mut poller);
            channels_up = false;
        }

        let commands = arbiter.evaluate(EvalInput {
            interactive: *interactive_rx.borrow(),
            connected: *control_connected.borrow(),
            recording: *recording_rx.borrow(),
            exfiltrate: *exfiltrate_rx.borrow(),
        });
        for command in commands {
            sup.control.send(command);
        }
        if *recording_rx.borrow() {
            sup.recorder.start();
        } else {
            sup.recorder.stop();
        }

        tokio::select! {
            event = events_rx.recv() => match event {
                Some(ControlEvent::Inbound(message)) => {
                    sup.dispatcher.handle(message, &sup.control);
                }
                Some(ControlEvent::Disconnected) => arbiter.note_disconnected(),
                Some(ControlEvent::Connected) => {}
                None => break,
            },
            _ = show_stream_rx.changed() => {}
            _ = interactive_rx.changed() => {}
            _ = recording_rx.changed() => {}
            _ = exfiltrate_rx.changed() => {}
            result = user_control.changed() => {
                if result.is_ok() {
                    arbiter.set_user_controlling(*user_control.borrow_and_update());
                }
            }
            _ = control_connected.changed() => {}
            _ = control_drops.changed() => {
                if *show_stream_rx.borrow() && !*shutdown.borrow() {
                    sleep(REDIAL_DELAY).await;
                    dial_control(&sup, &events_tx, &show_stream_rx).await;
                }
            }
            _ = pixel_drops.changed() => {
                if *show_stream_rx.borrow() && !*shutdown.borrow() {
                    sleep(REDIAL_DELAY).await;
                    dial_pixels(&sup, &show_stream_rx).await;
                }
            }
            _ = shutdown.changed() => {}
        }
    }

    teardown(&sup, &mut poller);
}

async fn dial_control(
    sup: &Supervisor,
    events_tx: &mpsc::UnboundedSender<ControlEvent>,
    eligible: &watch::Receiver<bool>,
) {
    let query = sup.auth.query_string(&sup.config.client_id).await;
    // Credentials resolved after a teardown must not resurrect the channel.
    if !*eligible.borrow() {
        debug!(target: "periscope::client", "control dial aborted; stream no longer eligible");
        return;
    }
    let url = match build_stream_url(&sup.config.stream_base, &sup.target.messages_route(), &query)
    {
        Ok(url) => url,
        Err(err) => {
            warn!(target: "periscope::client", %err, "invalid control stream url");
            return;
        }
    };
    if let Err(err) = sup.control.connect(url, events_tx.clone()).await {
        warn!(target: "periscope::client", %err, "control channel dial failed");
    }
}

async fn dial_pixels(sup: &Supervisor, eligible: &watch::Receiver<bool>) {
    let query = sup.auth.query_string(&sup.config.client_id).await;
    if !*eligible.borrow() {
        debug!(target: "periscope::client", "pixel dial aborted; stream no longer eligible");
        return;
    }
    let url = match build_stream_url(&sup.config.stream_base, &sup.target.vnc_route(), &query) {
        Ok(url) => url,
        Err(err) => {
            warn!(target: "periscope::client", %err, "invalid pixel stream url");
            return;
        }
    };
    let detector = (sup.detector_factory)();
    if let Err(err) = sup.pixels.connect(url, detector).await {
        warn!(target: "periscope::client", %err, "pixel stream dial failed");
    }
}

fn teardown(sup: &Supervisor, poller: &mut Option<ExistencePoller>) {
    sup.control.disconnect();
    sup.pixels.disconnect();
    if let Some(poller) = poller.take() {
        poller.abort();
    }
    // Back to optimistic for the next attach.
    let _ = sup.exists_tx.send(true);
}
