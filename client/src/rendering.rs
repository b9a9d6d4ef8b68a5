use crate::animation::AnimationState;
use crate::session::ConnectionState;
use macroquad::prelude::*;
use shared::appearance::Accessory;
use shared::{AnimationTag, Appearance, PeerId, PLAY_AREA_RADIUS};
use std::f32::consts::PI;

const BODY_SIZE: f32 = 0.8;
const BODY_HEIGHT: f32 = 1.2;
const HEAD_SIZE: f32 = 0.5;
const CAMERA_DISTANCE: f32 = 8.0;
const CAMERA_HEIGHT: f32 = 5.0;

/// Everything needed to draw one avatar
pub struct AvatarView<'a> {
    pub name: &'a str,
    pub appearance: &'a Appearance,
    pub position: shared::Vec3,
    pub rotation: f32,
    pub animation: &'a AnimationState,
}

#[derive(Debug, Clone)]
pub struct HudInfo<'a> {
    pub state: &'a ConnectionState,
    pub local_id: Option<PeerId>,
    pub peer_count: usize,
    pub fake_ping_ms: u64,
}

/// Vertical offset and height stretch for the current animation frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseOffset {
    pub bob: f32,
    pub stretch: f32,
}

pub fn pose_offset(animation: &AnimationState) -> PoseOffset {
    let t = animation.elapsed();
    match animation.current() {
        AnimationTag::Idle => PoseOffset {
            bob: (t * 2.0).sin() * 0.02,
            stretch: 1.0,
        },
        AnimationTag::Walk => PoseOffset {
            bob: (t * 10.0).sin().abs() * 0.08,
            stretch: 1.0,
        },
        AnimationTag::Run => PoseOffset {
            bob: (t * 16.0).sin().abs() * 0.15,
            stretch: 1.0,
        },
        AnimationTag::Crouch => PoseOffset {
            bob: 0.0,
            stretch: 0.7,
        },
        AnimationTag::Jump => {
            let progress = animation.progress().unwrap_or(1.0);
            PoseOffset {
                bob: 0.0,
                stretch: 1.0 + (progress * PI).sin() * 0.15,
            }
        }
    }
}

/// Projects a world point to screen pixels, `None` when behind the camera.
pub fn project_to_screen(view_proj: Mat4, point: Vec3, width: f32, height: f32) -> Option<Vec2> {
    let clip = view_proj * point.extend(1.0);
    if clip.w <= 0.0 {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    Some(vec2(
        (ndc.x + 1.0) * 0.5 * width,
        (1.0 - ndc.y) * 0.5 * height,
    ))
}

fn to_render(v: &shared::Vec3) -> Vec3 {
    vec3(v.x, v.y, v.z)
}

fn to_color(color: shared::Color) -> Color {
    Color::from_rgba(color.r, color.g, color.b, 255)
}

fn facing(rotation: f32) -> Vec3 {
    vec3(rotation.sin(), 0.0, rotation.cos())
}

pub struct Renderer {
    show_labels: bool,
    camera: Camera3D,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            show_labels: true,
            camera: Camera3D {
                position: vec3(0.0, CAMERA_HEIGHT, -CAMERA_DISTANCE),
                target: vec3(0.0, 1.0, 0.0),
                up: vec3(0.0, 1.0, 0.0),
                ..Default::default()
            },
        }
    }

    pub fn show_labels(&self) -> bool {
        self.show_labels
    }

    pub fn toggle_labels(&mut self) {
        self.show_labels = !self.show_labels;
    }

    pub fn render<'a>(
        &mut self,
        local: &AvatarView<'a>,
        peers: &[AvatarView<'a>],
        hud: &HudInfo<'_>,
    ) {
        clear_background(Color::from_rgba(26, 26, 46, 255));

        let anchor = to_render(&local.position);
        self.camera.target = anchor + vec3(0.0, 1.0, 0.0);
        self.camera.position =
            anchor - facing(local.rotation) * CAMERA_DISTANCE + vec3(0.0, CAMERA_HEIGHT, 0.0);
        set_camera(&self.camera);

        self.draw_ground();
        self.draw_avatar(local);
        for peer in peers {
            self.draw_avatar(peer);
        }

        let view_proj = self.camera.matrix();
        set_default_camera();

        if self.show_labels {
            self.draw_label(view_proj, local, YELLOW);
            for peer in peers {
                self.draw_label(view_proj, peer, WHITE);
            }
        }

        self.draw_hud(hud);
    }

    fn draw_ground(&self) {
        let size = PLAY_AREA_RADIUS * 2.0;
        draw_plane(
            vec3(0.0, 0.0, 0.0),
            vec2(size / 2.0, size / 2.0),
            None,
            Color::from_rgba(45, 74, 62, 255),
        );
        draw_grid(
            (size / 5.0) as u32,
            5.0,
            Color::from_rgba(80, 80, 80, 255),
            Color::from_rgba(60, 90, 75, 255),
        );
    }

    fn draw_avatar(&self, avatar: &AvatarView<'_>) {
        let proportions = avatar.appearance.class.proportions();
        let offset = pose_offset(avatar.animation);
        let color = to_color(avatar.appearance.color);
        let base = to_render(&avatar.position) + vec3(0.0, offset.bob, 0.0);
        let forward = facing(avatar.rotation);

        let body_width = BODY_SIZE * proportions.body_scale;
        let body_height = BODY_HEIGHT * proportions.body_scale * offset.stretch;
        let body_center = base + vec3(0.0, body_height / 2.0, 0.0);
        draw_cube(body_center, vec3(body_width, body_height, body_width), None, color);
        draw_cube_wires(body_center, vec3(body_width, body_height, body_width), BLACK);

        let head = HEAD_SIZE * proportions.head_scale;
        let head_center = base + vec3(0.0, body_height + head / 2.0, 0.0);
        draw_cube(head_center, vec3(head, head, head), None, Color::from_rgba(255, 220, 177, 255));

        // Nose shows facing
        let nose = head_center + forward * (head / 2.0 + 0.08);
        draw_cube(nose, vec3(0.12, 0.12, 0.16), None, DARKGRAY);

        let side = vec3(forward.z, 0.0, -forward.x);
        for (slot, accessory) in avatar.appearance.class.accessories().iter().enumerate() {
            let hand = if slot == 0 { side } else { -side };
            let anchor = body_center + hand * (body_width / 2.0 + 0.12);
            self.draw_accessory(*accessory, anchor, head_center, forward);
        }
    }

    fn draw_accessory(&self, accessory: Accessory, anchor: Vec3, head: Vec3, forward: Vec3) {
        match accessory {
            Accessory::Sword => {
                draw_cube(anchor + forward * 0.3, vec3(0.06, 0.06, 0.9), None, LIGHTGRAY)
            }
            Accessory::Shield => draw_cube(anchor, vec3(0.1, 0.7, 0.6), None, BROWN),
            Accessory::Bow => draw_cube(anchor, vec3(0.05, 1.0, 0.1), None, BROWN),
            Accessory::Quiver => {
                draw_cube(anchor - forward * 0.3, vec3(0.2, 0.6, 0.2), None, DARKBROWN)
            }
            Accessory::Staff => draw_cube(anchor, vec3(0.07, 1.6, 0.07), None, PURPLE),
            Accessory::Hat => draw_cube(head + vec3(0.0, 0.35, 0.0), vec3(0.4, 0.3, 0.4), None, PURPLE),
        }
    }

    fn draw_label(&self, view_proj: Mat4, avatar: &AvatarView<'_>, color: Color) {
        let head_top = to_render(&avatar.position) + vec3(0.0, BODY_HEIGHT + HEAD_SIZE + 0.6, 0.0);
        let Some(screen) = project_to_screen(view_proj, head_top, screen_width(), screen_height())
        else {
            return;
        };

        let text = avatar.name;
        let size = measure_text(text, None, 18, 1.0);
        draw_rectangle(
            screen.x - size.width / 2.0 - 4.0,
            screen.y - size.height - 4.0,
            size.width + 8.0,
            size.height + 8.0,
            Color::from_rgba(0, 0, 0, 140),
        );
        draw_text(text, screen.x - size.width / 2.0, screen.y, 18.0, color);
    }

    fn draw_hud(&self, hud: &HudInfo<'_>) {
        let (status, status_color) = match hud.state {
            ConnectionState::Idle => ("Offline".to_string(), GRAY),
            ConnectionState::Joining => ("Joining...".to_string(), YELLOW),
            ConnectionState::Joined(_) => ("Connected".to_string(), GREEN),
            ConnectionState::Disconnected(reason) => (format!("Disconnected: {}", reason), RED),
        };

        draw_rectangle(10.0, 10.0, 10.0, 10.0, status_color);
        draw_text(&status, 28.0, 20.0, 18.0, WHITE);

        let id_text = match hud.local_id {
            Some(id) => format!("You are peer {}", id),
            None => "No id yet".to_string(),
        };
        draw_text(&id_text, 10.0, 42.0, 18.0, WHITE);

        let peers_text = format!("{} other players", hud.peer_count);
        draw_text(&peers_text, 10.0, 62.0, 18.0, WHITE);

        if hud.fake_ping_ms > 0 {
            let ping_text = format!("Simulated ping {}ms", hud.fake_ping_ms);
            draw_text(&ping_text, 10.0, 82.0, 18.0, ORANGE);
        }

        draw_text(
            "WASD move  Shift run  C crouch  Space jump  L labels  Esc quit",
            10.0,
            screen_height() - 12.0,
            16.0,
            LIGHTGRAY,
        );
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
