use anyhow::{Context, Result};
use clap::Parser;
use cubefield_render_wgpu::{CubeRenderer, Mesh, MeshData, Shader, read_source};
use cubefield_scene::{DemoConfig, FrameClock, InstanceField, OrbitCamera};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

/// Longest wall-clock gap fed to the clock in one iteration. Larger gaps
/// (window drags, debugger pauses) would otherwise queue hundreds of steps.
const MAX_FRAME_TIME: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(
    name = "cubefield",
    about = "Draws a field of cubes with one draw call per instance"
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of cube instances
    #[arg(short = 'n', long)]
    instances: Option<usize>,

    /// Seed for instance placement (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Fixed logic steps per second
    #[arg(long)]
    tick_rate: Option<f64>,

    /// Vertex stage WGSL source
    #[arg(long)]
    vertex_shader: Option<PathBuf>,

    /// Fragment stage WGSL source
    #[arg(long)]
    fragment_shader: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Camera orbit speed in degrees per second
    #[arg(long, allow_hyphen_values = true)]
    orbit_speed: Option<f32>,
}

impl Cli {
    fn demo_config(&self) -> Result<DemoConfig> {
        let mut config = match &self.config {
            Some(path) => DemoConfig::load(path)?,
            None => DemoConfig::default(),
        };
        if let Some(n) = self.instances {
            config.instance_count = n;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(rate) = self.tick_rate {
            config.tick_rate = rate;
        }
        if let Some(path) = &self.vertex_shader {
            config.vertex_shader = path.clone();
        }
        if let Some(path) = &self.fragment_shader {
            config.fragment_shader = path.clone();
        }
        if let Some(w) = self.width {
            config.width = w;
        }
        if let Some(h) = self.height {
            config.height = h;
        }
        if let Some(speed) = self.orbit_speed {
            config.orbit_speed = speed;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Everything the loop mutates that is not a GPU object.
struct DemoState {
    config: DemoConfig,
    vertex_source: String,
    fragment_source: String,
    field: InstanceField,
    camera: OrbitCamera,
    clock: FrameClock,
    last_frame: Instant,
}

impl DemoState {
    fn new(config: DemoConfig) -> Result<Self> {
        // Both sources are required before any window exists.
        let vertex_source = read_source(&config.vertex_shader)?;
        let fragment_source = read_source(&config.fragment_shader)?;

        let seed = config.seed.unwrap_or_else(rand::random);
        tracing::info!(seed, instances = config.instance_count, "placing instances");
        let mut rng = StdRng::seed_from_u64(seed);
        let field = InstanceField::generate(config.instance_count, &mut rng);

        let camera = OrbitCamera::framing(field.half_extent()).with_orbit_speed(config.orbit_speed);
        let clock = FrameClock::new(config.tick_rate);

        Ok(Self {
            config,
            vertex_source,
            fragment_source,
            field,
            camera,
            clock,
            last_frame: Instant::now(),
        })
    }

    /// Feed elapsed time to the clock, run due logic steps, report FPS.
    /// Returns whether a frame should be rendered.
    fn update(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = (now - self.last_frame).min(MAX_FRAME_TIME);
        self.last_frame = now;

        let tick = self.clock.advance(elapsed);
        let dt = self.clock.step().as_secs_f32();
        for _ in 0..tick.steps {
            self.camera.advance(dt);
        }
        if let Some(fps) = tick.fps {
            println!("FPS: {fps}");
        }
        tick.render
    }
}

struct GpuApp {
    state: DemoState,
    window: Option<Arc<Window>>,
    surface: Option<wgpu::Surface<'static>>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    config: Option<wgpu::SurfaceConfiguration>,
    renderer: Option<CubeRenderer>,
    fatal: Option<anyhow::Error>,
}

impl GpuApp {
    fn new(state: DemoState) -> Self {
        Self {
            state,
            window: None,
            surface: None,
            device: None,
            queue: None,
            config: None,
            renderer: None,
            fatal: None,
        }
    }

    fn init_gpu(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let _span = tracing::info_span!("init_gpu").entered();
        let demo = &self.state.config;

        let attrs = Window::default_attributes()
            .with_title(format!("cubefield ({} instances)", demo.instance_count))
            .with_inner_size(PhysicalSize::new(demo.width, demo.height));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no compatible graphics adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("cubefield_device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .context("failed to create device")?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoNoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        self.state.camera.set_viewport(config.width, config.height);

        let mesh = Mesh::upload(&device, &MeshData::cube())?;
        let shader = Shader::create(
            &device,
            &self.state.vertex_source,
            &self.state.fragment_source,
        )?;
        let renderer = CubeRenderer::new(
            &device,
            surface_format,
            config.width,
            config.height,
            mesh,
            shader,
            self.state.field.len(),
        )?
        .with_clear_color(self.state.config.clear_color);

        tracing::info!(
            "GPU initialized with {} backend on {}",
            adapter.get_info().backend.to_str(),
            adapter.get_info().name
        );

        self.window = Some(window);
        self.surface = Some(surface);
        self.device = Some(device);
        self.queue = Some(queue);
        self.config = Some(config);
        self.renderer = Some(renderer);
        self.state.last_frame = Instant::now();
        Ok(())
    }

    /// Returns true once a frame has been presented.
    fn render_frame(&mut self) -> bool {
        let (Some(surface), Some(device), Some(queue), Some(renderer)) = (
            &self.surface,
            &self.device,
            &self.queue,
            self.renderer.as_mut(),
        ) else {
            return false;
        };

        let output = match surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                if let Some(config) = &self.config {
                    surface.configure(device, config);
                }
                return false;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return false;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        match renderer.render(device, queue, &view, &self.state.camera, &self.state.field) {
            Ok(draws) => {
                tracing::trace!(draws, "frame submitted");
                output.present();
                true
            }
            Err(e) => {
                tracing::error!("render failed: {e}");
                false
            }
        }
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.fatal.is_some() {
            return;
        }
        if let Err(e) = self.init_gpu(event_loop) {
            self.fatal = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let (Some(surface), Some(device), Some(config)) =
                    (&self.surface, &self.device, &mut self.config)
                {
                    config.width = new_size.width.max(1);
                    config.height = new_size.height.max(1);
                    surface.configure(device, config);
                    self.state.camera.set_viewport(config.width, config.height);
                    if let Some(renderer) = &mut self.renderer {
                        renderer.resize(device, config.width, config.height);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if self.render_frame() {
                    self.state.clock.frame_presented();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.state.update() {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("cubefield starting");

    let config = cli.demo_config()?;
    let state = DemoState::new(config)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(state);
    event_loop.run_app(&mut app)?;

    if let Some(e) = app.fatal.take() {
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "cubefield",
            "-n",
            "3",
            "--seed",
            "5",
            "--tick-rate",
            "30",
            "--orbit-speed",
            "-15",
        ]);
        let config = cli.demo_config().unwrap();
        assert_eq!(config.instance_count, 3);
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.tick_rate, 30.0);
        assert_eq!(config.orbit_speed, -15.0);
        assert_eq!(config.width, DemoConfig::default().width);
    }

    #[test]
    fn invalid_flags_fail_validation() {
        let cli = Cli::parse_from(["cubefield", "--instances", "0"]);
        assert!(cli.demo_config().is_err());

        for rate in ["1e-20", "1e12"] {
            let cli = Cli::parse_from(["cubefield", "--tick-rate", rate]);
            assert!(cli.demo_config().is_err(), "tick rate {rate} accepted");
        }
    }

    #[test]
    fn missing_shader_is_fatal_before_window() {
        let config = DemoConfig {
            vertex_shader: PathBuf::from("missing/cube.vert.wgsl"),
            ..DemoConfig::default()
        };
        let err = DemoState::new(config).err().unwrap();
        assert!(err.to_string().contains("missing/cube.vert.wgsl"));
    }

    #[test]
    fn first_update_without_elapsed_time_does_not_render() {
        let config = DemoConfig {
            instance_count: 4,
            seed: Some(1),
            tick_rate: 1.0,
            vertex_shader: PathBuf::from(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/../../shaders/cube.vert.wgsl"
            )),
            fragment_shader: PathBuf::from(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/../../shaders/cube.frag.wgsl"
            )),
            ..DemoConfig::default()
        };
        let mut state = DemoState::new(config).unwrap();
        assert_eq!(state.field.len(), 4);
        // One-second step: an immediate update cannot cross a boundary.
        assert!(!state.update());
    }
}
