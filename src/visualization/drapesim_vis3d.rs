use bevy::log::LogPlugin;
use bevy::prelude::*;
use ftlog::{info, warn};

use crate::configuration::config::DEFAULT_GRAVITY;
use crate::runtime::controller::SimulationThread;
use crate::runtime::snapshot::Snapshot;
use crate::simulation::algebra::{NPoint3, NVec3};
use crate::simulation::edits::ParameterEdit;
use crate::simulation::engine::ThreadMode;
use crate::simulation::forces::Force;
use crate::simulation::params::Parameters;
use crate::simulation::scenario::Scenario;
use crate::visualization::{draw_scene, Overlay, Renderer, Rgb};

/// Distance of the camera from the origin
const CAMERA_DISTANCE: f32 = 30.0;

/// World-space radius of a point of size 1
const POINT_SCALE: f32 = 0.02;

/// Stiffness factor per key press
const STIFFNESS_STEP: f64 = 1.1;

/// Where snapshots come from
#[derive(Resource)]
enum Driver {
    Inline {
        scenario: Box<Scenario>,
        snapshot: Snapshot,
    },
    Threaded(SimulationThread),
}

impl Driver {
    fn apply(&mut self, edit: ParameterEdit) {
        match self {
            Driver::Inline { scenario, .. } => {
                if let Err(e) = scenario.apply_edit(edit) {
                    warn!("Rejected edit: {}", e);
                }
            }
            Driver::Threaded(thread) => {
                if !thread.send(edit) {
                    warn!("Simulation thread is gone, edit dropped");
                }
            }
        }
    }

    fn advance(&mut self, measured: f64) {
        if let Driver::Inline { scenario, snapshot } = self {
            scenario.tick_measured(measured);
            scenario.write_snapshot(snapshot);
        }
    }

    fn with_snapshot<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        match self {
            Driver::Inline { snapshot, .. } => f(snapshot),
            Driver::Threaded(thread) => thread.buffer().read(f),
        }
    }

    fn stop(&mut self) {
        if let Driver::Threaded(thread) = self {
            thread.stop();
        }
    }
}

/// Viewer-side copy of the tunable values, so key presses can step them
#[derive(Resource)]
struct Controls {
    parameters: Parameters,
    gravity: f64,
    gravity_on: bool,
    overlay: Overlay,
}

/// Open the viewer and run until the window closes
///
/// In threaded mode the scenario moves to its own thread and the viewer only
/// reads snapshots; in inline mode it is ticked once per frame.
pub fn run_3d(scenario: Scenario) -> std::io::Result<()> {
    info!(
        "run_3d: starting Bevy 3D viewer with {} particles ({:?} mode)",
        scenario.system.len(),
        scenario.engine.thread_mode
    );

    let controls = Controls {
        parameters: scenario.parameters.clone(),
        gravity: scenario
            .forces
            .iter()
            .find_map(|f| match f {
                Force::Constant(c) => Some(c.force.charge()),
                _ => None,
            })
            .unwrap_or(DEFAULT_GRAVITY),
        gravity_on: true,
        overlay: Overlay::default(),
    };

    let driver = match scenario.engine.thread_mode {
        ThreadMode::Inline => {
            let snapshot = scenario.snapshot();
            Driver::Inline {
                scenario: Box::new(scenario),
                snapshot,
            }
        }
        ThreadMode::Threaded => Driver::Threaded(SimulationThread::spawn(scenario)?),
    };

    App::new()
        .insert_resource(driver)
        .insert_resource(controls)
        // ftlog is the global logger already
        .add_plugins(DefaultPlugins.build().disable::<LogPlugin>())
        .add_systems(Startup, setup_3d)
        .add_systems(Update, (handle_keys, physics_step_3d, draw_3d, shutdown_on_exit).chain())
        .run();

    Ok(())
}

fn setup_3d(mut commands: Commands) {
    commands.spawn(Camera3dBundle {
        camera: Camera {
            clear_color: ClearColorConfig::Custom(Color::srgb(0.05, 0.05, 0.08)),
            ..Default::default()
        },
        transform: Transform::from_xyz(0.0, 0.4 * CAMERA_DISTANCE, CAMERA_DISTANCE)
            .looking_at(Vec3::new(0.0, -3.0, 0.0), Vec3::Y),
        ..Default::default()
    });
}

/// Inline mode only: one tick per frame
fn physics_step_3d(time: Res<Time>, mut driver: ResMut<Driver>) {
    driver.advance(time.delta_seconds_f64());
}

fn draw_3d(driver: Res<Driver>, controls: Res<Controls>, mut gizmos: Gizmos) {
    let mut renderer = GizmoRenderer { gizmos: &mut gizmos };
    driver.with_snapshot(|snapshot| draw_scene(&mut renderer, snapshot, &controls.overlay));
}

// =========================================================================================
// Keyboard -> parameter edits
// =========================================================================================

fn handle_keys(keys: Res<ButtonInput<KeyCode>>, mut driver: ResMut<Driver>, mut controls: ResMut<Controls>) {
    let mut edits = Vec::new();
    let params = &mut controls.parameters;

    if keys.just_pressed(KeyCode::KeyR) {
        edits.push(ParameterEdit::Reset);
    }
    if keys.just_pressed(KeyCode::KeyP) {
        edits.push(ParameterEdit::Pinch);
    }
    if keys.just_pressed(KeyCode::KeyA) {
        params.anchors = params.anchors.next();
        info!("Anchors: {}", params.anchors);
        edits.push(ParameterEdit::Anchors(params.anchors));
    }
    if keys.just_pressed(KeyCode::KeyD) {
        params.direction = params.direction.next();
        info!("Direction: {:?} (press R to apply)", params.direction);
        edits.push(ParameterEdit::Direction(params.direction));
    }
    if keys.just_pressed(KeyCode::ArrowUp) {
        params.stiffness *= STIFFNESS_STEP;
        edits.push(ParameterEdit::Stiffness(params.stiffness));
    }
    if keys.just_pressed(KeyCode::ArrowDown) {
        params.stiffness /= STIFFNESS_STEP;
        edits.push(ParameterEdit::Stiffness(params.stiffness));
    }
    if keys.just_pressed(KeyCode::PageUp) {
        params.n += 1;
        edits.push(ParameterEdit::GridSize(params.n));
        edits.push(ParameterEdit::Reset);
    }
    if keys.just_pressed(KeyCode::PageDown) && params.n > 1 {
        params.n -= 1;
        edits.push(ParameterEdit::GridSize(params.n));
        edits.push(ParameterEdit::Reset);
    }

    let count = params.n * params.n;
    if keys.just_pressed(KeyCode::ArrowRight) {
        params.particle_of_interest = (params.particle_of_interest + 1) % count;
        edits.push(ParameterEdit::ParticleOfInterest(params.particle_of_interest));
    }
    if keys.just_pressed(KeyCode::ArrowLeft) {
        params.particle_of_interest = (params.particle_of_interest + count - 1) % count;
        edits.push(ParameterEdit::ParticleOfInterest(params.particle_of_interest));
    }
    if params.particle_of_interest >= count {
        params.particle_of_interest = 0;
    }

    if keys.just_pressed(KeyCode::KeyG) {
        controls.gravity_on = !controls.gravity_on;
        let g = if controls.gravity_on { controls.gravity } else { 0.0 };
        edits.push(ParameterEdit::Gravity(g));
    }

    let overlay = &mut controls.overlay;
    for (key, layer) in [
        (KeyCode::Digit1, &mut overlay.links),
        (KeyCode::Digit2, &mut overlay.cells),
        (KeyCode::Digit3, &mut overlay.neighbors),
        (KeyCode::Digit4, &mut overlay.lookup_sphere),
        (KeyCode::Digit5, &mut overlay.wall),
    ] {
        if keys.just_pressed(key) {
            *layer = !*layer;
        }
    }

    for edit in edits {
        driver.apply(edit);
    }
}

fn shutdown_on_exit(mut exit: EventReader<AppExit>, mut driver: ResMut<Driver>) {
    if exit.read().next().is_some() {
        driver.stop();
    }
}

// =========================================================================================
// Renderer over Bevy gizmos
// =========================================================================================

struct GizmoRenderer<'a, 'w, 's> {
    gizmos: &'a mut Gizmos<'w, 's>,
}

fn to_vec3(p: &NPoint3) -> Vec3 {
    Vec3::new(p.x as f32, p.y as f32, p.z as f32)
}

fn to_color(c: Rgb) -> Color {
    Color::srgb(c.0, c.1, c.2)
}

impl Renderer for GizmoRenderer<'_, '_, '_> {
    fn draw_points(&mut self, points: &[NPoint3], color: Rgb, size: f32) {
        let color = to_color(color);
        for p in points {
            self.gizmos.sphere(to_vec3(p), Quat::IDENTITY, size * POINT_SCALE, color);
        }
    }

    fn draw_lines(&mut self, lines: &[(NPoint3, NPoint3)], color: Rgb, _width: f32) {
        let color = to_color(color);
        for (a, b) in lines {
            self.gizmos.line(to_vec3(a), to_vec3(b), color);
        }
    }

    fn draw_plane(&mut self, position: &NPoint3, normal: &NVec3, color: Rgb, size: f32) {
        let center = to_vec3(position);
        let n = Vec3::new(normal.x as f32, normal.y as f32, normal.z as f32).normalize_or_zero();
        if n == Vec3::ZERO {
            return;
        }
        // gizmo rects lie in the XY plane
        let rotation = Quat::from_rotation_arc(Vec3::Z, n);
        let color = to_color(color);
        self.gizmos.rect(center, rotation, Vec2::splat(size), color);
        self.gizmos.rect(center, rotation, Vec2::splat(0.5 * size), color);
        self.gizmos.arrow(center, center + n * 2.0, color);
    }
}
