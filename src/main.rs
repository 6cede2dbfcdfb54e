//! weather-face host simulator.
//!
//! Hosts a `FaceEngine` in a vello/winit window (or headless, logging each
//! frame's text) and plays the watch host: visibility, ambient mode, taps,
//! shape and display properties. Weather comes from a companion reached over
//! a WebSocket relay (`--companion`) or, by default, from a simulated
//! companion on an in-process loopback link.
//!
//! Keys: `A` ambient, `Space`/click tap, `V` visibility, `O` shape,
//! `D` drop link, `C` connect link, `R` companion sync, `Esc` quit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vello::peniko::FontData;
use vello::peniko::color::palette;
use vello::util::{RenderContext, RenderSurface};
use vello::{AaConfig, Renderer, RendererOptions, Scene};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window};

use vello::wgpu;

use weather_face::bridge::spawn_link_monitor;
use weather_face::canvas::RecordingCanvas;
use weather_face::clock::{Clock, SystemClock};
use weather_face::companion::{
    CompanionListener, SimulatedWeatherSync, WeatherSync, spawn_companion_listener,
};
use weather_face::config::{FaceConfig, SurfaceShape};
use weather_face::config_file;
use weather_face::engine::{
    DisplayCapabilities, EngineMessage, FaceEngine, HostEvent, HostServices, TapPhase, drive,
};
use weather_face::icons::ProceduralIcons;
use weather_face::logging;
use weather_face::mailbox::{Mailbox, ProxyMailbox};
use weather_face::render::Bounds;
use weather_face::state_machine::bridge_sm::SyncBridge;
use weather_face::timer::TokioTimerHost;
use weather_face::timezone::TimezoneWatcher;
use weather_face::transport::DataChannel;
use weather_face::transport::loopback::{LoopbackEndpoint, loopback_pair};
use weather_face::transport::ws::WsChannel;
use weather_face::vello_canvas::{VelloCanvas, load_face_font};

/// Weather watch face simulator
#[derive(Parser, Debug)]
#[command(name = "weather-face", version, about = "Weather watch face simulator")]
struct Args {
    /// Start in a 320x320 window instead of fullscreen
    #[arg(short, long)]
    windowed: bool,

    /// Report a round screen to the face
    #[arg(long)]
    round: bool,

    /// Report a display that needs low-bit ambient rendering
    #[arg(long)]
    low_bit_ambient: bool,

    /// Face config file (defaults to ~/.config/weather-face/face.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket relay shared with a companion (e.g. ws://localhost:9200);
    /// without it a simulated companion runs in-process
    #[arg(long)]
    companion: Option<String>,

    /// Run without a window and log every frame
    #[arg(long)]
    headless: bool,

    /// Headless run time in seconds
    #[arg(long, default_value_t = 10)]
    run_secs: u64,
}

impl Args {
    fn shape(&self) -> SurfaceShape {
        if self.round {
            SurfaceShape::Round
        } else {
            SurfaceShape::Rectangular
        }
    }

    fn capabilities(&self) -> DisplayCapabilities {
        DisplayCapabilities {
            low_bit_ambient: self.low_bit_ambient,
        }
    }
}

// ---------------------------------------------------------------------------
// Companion link
// ---------------------------------------------------------------------------

/// The face's end of the companion link plus whatever the simulator can do
/// to it.
enum Link {
    Loopback {
        face: LoopbackEndpoint,
        sync: SimulatedWeatherSync,
        _listener: JoinHandle<()>,
    },
    Remote(Arc<WsChannel>),
}

impl Link {
    fn start(runtime: &Handle, companion_url: Option<&str>) -> (Self, Arc<dyn DataChannel>) {
        if let Some(url) = companion_url {
            info!(target: "bridge", %url, "using companion relay");
            let ws = WsChannel::spawn(runtime, url);
            let channel: Arc<dyn DataChannel> = ws.clone();
            return (Link::Remote(ws), channel);
        }

        let (face, companion) = loopback_pair();
        let companion: Arc<dyn DataChannel> = Arc::new(companion);
        let listener = spawn_companion_listener(
            runtime,
            &companion,
            CompanionListener::new(SimulatedWeatherSync::new(
                Arc::clone(&companion),
                runtime.clone(),
            )),
        );
        let sync = SimulatedWeatherSync::new(companion, runtime.clone());
        face.connect();
        info!(target: "bridge", "using simulated companion");

        let channel: Arc<dyn DataChannel> = Arc::new(face.clone());
        (
            Link::Loopback {
                face,
                sync,
                _listener: listener,
            },
            channel,
        )
    }

    fn drop_link(&self) {
        match self {
            Link::Loopback { face, .. } => face.suspend(),
            Link::Remote(ws) => warn!(target: "bridge", url = ws.url(), "cannot drop a relay link"),
        }
    }

    fn reconnect(&self) {
        match self {
            Link::Loopback { face, .. } => face.connect(),
            Link::Remote(ws) => info!(target: "bridge", url = ws.url(), "relay reconnects on its own"),
        }
    }

    fn companion_sync(&self) {
        match self {
            Link::Loopback { sync, .. } => sync.sync_immediately(),
            Link::Remote(_) => warn!(target: "companion", "no local companion to sync"),
        }
    }
}

/// Everything the engine needs from the host, on `runtime`, posting to
/// `mailbox`. Also starts the link monitor for `channel`.
fn build_engine(
    config: FaceConfig,
    shape: SurfaceShape,
    runtime: &Handle,
    mailbox: Arc<dyn Mailbox>,
    channel: &Arc<dyn DataChannel>,
) -> (FaceEngine, JoinHandle<()>) {
    let services = HostServices {
        clock: Arc::new(SystemClock),
        timer: Box::new(TokioTimerHost::new(runtime.clone(), Arc::clone(&mailbox))),
        timezone: Box::new(TimezoneWatcher::new(Arc::clone(&mailbox))),
        icons: Box::new(ProceduralIcons::default()),
    };
    let mut engine = FaceEngine::new(config, shape, services);
    engine.attach_bridge(SyncBridge::new(
        Arc::clone(channel),
        runtime.clone(),
        Arc::clone(&mailbox),
    ));
    let monitor = spawn_link_monitor(runtime, channel, mailbox);
    (engine, monitor)
}

/// Post `TimeTick` on every minute boundary, as a watch host does in
/// ambient mode.
fn spawn_minute_ticker(runtime: &Handle, mailbox: Arc<dyn Mailbox>) -> JoinHandle<()> {
    runtime.spawn(async move {
        loop {
            let now = SystemClock.now_millis();
            let delay = 60_000 - now.rem_euclid(60_000);
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            if !mailbox.post(EngineMessage::Host(HostEvent::TimeTick)) {
                break;
            }
        }
    })
}

/// The relay client speaks plain `ws://` only.
fn companion_url(raw: &str) -> Result<String> {
    let url = url::Url::parse(raw).with_context(|| format!("invalid companion url {raw}"))?;
    anyhow::ensure!(
        url.scheme() == "ws",
        "companion url must use ws://, got {raw}"
    );
    Ok(url.into())
}

fn load_face_config(path: Option<&PathBuf>) -> Result<FaceConfig> {
    if let Some(path) = path {
        return config_file::load_config(path)
            .with_context(|| format!("loading face config {}", path.display()));
    }
    let path = config_file::face_toml_path();
    if let Err(e) = config_file::ensure_default_toml(&path, &config_file::default_toml_content()) {
        warn!(target: "face", "{e}");
    }
    Ok(config_file::load_or_default(&path))
}

// ---------------------------------------------------------------------------
// Windowed host
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum RenderState {
    Active {
        surface: Box<RenderSurface<'static>>,
        valid_surface: bool,
        window: Arc<Window>,
    },
    Suspended(Option<Arc<Window>>),
}

struct App {
    context: RenderContext,
    renderers: Vec<Option<Renderer>>,
    state: RenderState,
    scene: Scene,
    engine: FaceEngine,
    link: Link,
    windowed: bool,
    font_data: Option<FontData>,
    shape: SurfaceShape,
    ambient: bool,
    visible: bool,
    pointer_down: bool,
}

impl App {
    fn host(&mut self, event: HostEvent) {
        self.engine.handle_host_event(event);
        self.request_frame();
    }

    /// Turn a pending engine invalidation into a window redraw.
    fn request_frame(&mut self) {
        if !self.engine.take_frame_request() {
            return;
        }
        if let RenderState::Active { window, .. } = &self.state {
            window.request_redraw();
        }
    }

    fn on_key(&mut self, event_loop: &ActiveEventLoop, key: &Key) {
        match key {
            Key::Named(NamedKey::Escape) => {
                self.engine.dispatch(EngineMessage::Destroy);
                event_loop.exit();
            }
            Key::Named(NamedKey::Space) => {
                self.host(HostEvent::Tap(TapPhase::Touch));
                self.host(HostEvent::Tap(TapPhase::Tap));
            }
            Key::Character(c) => match c.to_ascii_lowercase().as_str() {
                "a" => {
                    self.ambient = !self.ambient;
                    info!(target: "face", ambient = self.ambient, "host: ambient");
                    self.host(HostEvent::AmbientChanged(self.ambient));
                }
                "v" => {
                    self.visible = !self.visible;
                    info!(target: "face", visible = self.visible, "host: visibility");
                    self.host(HostEvent::Visible(self.visible));
                }
                "o" => {
                    self.shape = match self.shape {
                        SurfaceShape::Round => SurfaceShape::Rectangular,
                        SurfaceShape::Rectangular => SurfaceShape::Round,
                    };
                    info!(target: "face", shape = ?self.shape, "host: shape");
                    self.host(HostEvent::ShapeReported(self.shape));
                }
                "d" => self.link.drop_link(),
                "c" => self.link.reconnect(),
                "r" => self.link.companion_sync(),
                _ => {}
            },
            _ => {}
        }
    }

    fn render(&mut self) {
        let RenderState::Active {
            surface,
            valid_surface,
            ..
        } = &mut self.state
        else {
            return;
        };
        if !*valid_surface {
            return;
        }

        self.scene.reset();
        let width = surface.config.width as f64;
        let height = surface.config.height as f64;
        {
            let mut canvas =
                VelloCanvas::new(&mut self.scene, self.font_data.as_ref(), width, height);
            self.engine.render(&mut canvas, Bounds::new(width, height));
        }

        let device_handle = &self.context.devices[surface.dev_id];
        let Some(renderer) = self.renderers[surface.dev_id].as_mut() else {
            return;
        };
        if let Err(e) = renderer.render_to_texture(
            &device_handle.device,
            &device_handle.queue,
            &self.scene,
            &surface.target_view,
            &vello::RenderParams {
                base_color: palette::css::BLACK,
                width: surface.config.width,
                height: surface.config.height,
                antialiasing_method: AaConfig::Msaa16,
            },
        ) {
            error!(target: "face", "render failed: {e}");
            return;
        }

        let surface_texture = match surface.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(e) => {
                warn!(target: "face", "no surface texture: {e}");
                return;
            }
        };

        let mut encoder =
            device_handle
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Surface Blit"),
                });
        surface.blitter.copy(
            &device_handle.device,
            &mut encoder,
            &surface.target_view,
            &surface_texture
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
        );
        device_handle.queue.submit([encoder.finish()]);
        surface_texture.present();
        let _ = device_handle.device.poll(wgpu::PollType::Poll);
    }
}

impl ApplicationHandler<EngineMessage> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let RenderState::Suspended(cached_window) = &mut self.state else {
            return;
        };

        let window = match cached_window.take() {
            Some(window) => window,
            None => match create_window(event_loop, self.windowed) {
                Ok(window) => window,
                Err(e) => {
                    error!(target: "face", "cannot create window: {e}");
                    event_loop.exit();
                    return;
                }
            },
        };

        let size = window.inner_size();
        let surface_future = self.context.create_surface(
            window.clone(),
            size.width,
            size.height,
            wgpu::PresentMode::AutoVsync,
        );
        let surface = match pollster::block_on(surface_future) {
            Ok(surface) => surface,
            Err(e) => {
                error!(target: "face", "cannot create surface: {e}");
                event_loop.exit();
                return;
            }
        };

        self.renderers
            .resize_with(self.context.devices.len(), || None);
        if self.renderers[surface.dev_id].is_none() {
            match create_renderer(&self.context, &surface) {
                Ok(renderer) => self.renderers[surface.dev_id] = Some(renderer),
                Err(e) => {
                    error!(target: "face", "cannot create renderer: {e}");
                    event_loop.exit();
                    return;
                }
            }
        }

        self.state = RenderState::Active {
            surface: Box::new(surface),
            valid_surface: true,
            window: window.clone(),
        };

        self.visible = true;
        self.host(HostEvent::Visible(true));
        // A fresh surface has no content yet.
        window.request_redraw();
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        if let RenderState::Active { window, .. } = &self.state {
            self.state = RenderState::Suspended(Some(window.clone()));
        }
        self.visible = false;
        self.engine.handle_host_event(HostEvent::Visible(false));
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, msg: EngineMessage) {
        self.engine.dispatch(msg);
        if !self.engine.is_alive() {
            event_loop.exit();
            return;
        }
        self.request_frame();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match &self.state {
            RenderState::Active { window, .. } if window.id() == window_id => {}
            _ => return,
        }

        match event {
            WindowEvent::CloseRequested => {
                self.engine.dispatch(EngineMessage::Destroy);
                event_loop.exit();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        ref logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.on_key(event_loop, logical_key),

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    self.pointer_down = true;
                    self.host(HostEvent::Tap(TapPhase::Touch));
                }
                ElementState::Released if self.pointer_down => {
                    self.pointer_down = false;
                    self.host(HostEvent::Tap(TapPhase::Tap));
                }
                ElementState::Released => {}
            },

            WindowEvent::CursorLeft { .. } if self.pointer_down => {
                self.pointer_down = false;
                self.host(HostEvent::Tap(TapPhase::Cancel));
            }

            WindowEvent::Resized(size) => {
                if let RenderState::Active {
                    surface,
                    valid_surface,
                    window,
                } = &mut self.state
                {
                    if size.width != 0 && size.height != 0 {
                        self.context
                            .resize_surface(surface, size.width, size.height);
                        *valid_surface = true;
                        window.request_redraw();
                    } else {
                        *valid_surface = false;
                    }
                }
            }

            WindowEvent::RedrawRequested => self.render(),

            _ => {}
        }
    }
}

fn create_window(
    event_loop: &ActiveEventLoop,
    windowed: bool,
) -> Result<Arc<Window>, winit::error::OsError> {
    let mut attr = Window::default_attributes().with_title("weather-face");

    if !windowed {
        attr = attr.with_fullscreen(Some(Fullscreen::Borderless(None)));
    } else {
        attr = attr
            .with_inner_size(winit::dpi::LogicalSize::new(320, 320))
            .with_resizable(false);
    }

    event_loop.create_window(attr).map(Arc::new)
}

fn create_renderer(
    render_cx: &RenderContext,
    surface: &RenderSurface<'_>,
) -> Result<Renderer, vello::Error> {
    Renderer::new(
        &render_cx.devices[surface.dev_id].device,
        RendererOptions::default(),
    )
}

fn run_windowed(args: &Args, config: FaceConfig, runtime: &tokio::runtime::Runtime) -> Result<()> {
    let event_loop = EventLoop::<EngineMessage>::with_user_event().build()?;
    let mailbox: Arc<dyn Mailbox> = Arc::new(ProxyMailbox::new(event_loop.create_proxy()));

    let (link, channel) = Link::start(runtime.handle(), args.companion.as_deref());
    let (mut engine, _monitor) = build_engine(
        config,
        args.shape(),
        runtime.handle(),
        Arc::clone(&mailbox),
        &channel,
    );
    let _ticker = spawn_minute_ticker(runtime.handle(), mailbox);
    engine.handle_host_event(HostEvent::PropertiesNegotiated(args.capabilities()));

    let font_data = load_face_font();
    if font_data.is_some() {
        info!(target: "face", "loaded system font");
    } else {
        warn!(target: "face", "no system font found; using bitmap font");
    }

    let mut app = App {
        context: RenderContext::new(),
        renderers: vec![],
        state: RenderState::Suspended(None),
        scene: Scene::new(),
        engine,
        link,
        windowed: args.windowed,
        font_data,
        shape: args.shape(),
        ambient: false,
        visible: false,
        pointer_down: false,
    };

    event_loop.run_app(&mut app)?;
    app.engine.destroy();
    Ok(())
}

// ---------------------------------------------------------------------------
// Headless host
// ---------------------------------------------------------------------------

fn run_headless(args: &Args, config: FaceConfig, runtime: &tokio::runtime::Runtime) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mailbox: Arc<dyn Mailbox> = Arc::new(tx.clone());

    let (_link, channel) = Link::start(runtime.handle(), args.companion.as_deref());
    let (mut engine, _monitor) = build_engine(
        config,
        args.shape(),
        runtime.handle(),
        Arc::clone(&mailbox),
        &channel,
    );
    let _ticker = spawn_minute_ticker(runtime.handle(), mailbox);

    let bounds = match args.shape() {
        SurfaceShape::Round => Bounds::new(320.0, 320.0),
        SurfaceShape::Rectangular => Bounds::new(320.0, 290.0),
    };
    let run_for = Duration::from_secs(args.run_secs);

    runtime.block_on(async move {
        engine.handle_host_event(HostEvent::PropertiesNegotiated(args.capabilities()));
        engine.handle_host_event(HostEvent::ShapeReported(args.shape()));
        engine.handle_host_event(HostEvent::Visible(true));

        tokio::spawn(async move {
            tokio::time::sleep(run_for).await;
            let _ = tx.send(EngineMessage::Destroy);
        });

        drive(&mut engine, &mut rx, |engine| {
            let mut canvas = RecordingCanvas::new();
            engine.render(&mut canvas, bounds);
            info!(target: "face", texts = ?canvas.texts(), "frame");
        })
        .await;
    });
    Ok(())
}

fn main() -> Result<()> {
    let _log_guard = logging::init();
    let mut args = Args::parse();
    info!(target: "face", version = env!("CARGO_PKG_VERSION"), "weather-face starting");

    let config = load_face_config(args.config.as_ref())?;
    args.companion = args.companion.as_deref().map(companion_url).transpose()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating tokio runtime")?;

    let result = if args.headless {
        run_headless(&args, config, &runtime)
    } else {
        run_windowed(&args, config, &runtime)
    };

    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}
