use clap::Parser;
use client::animation::AnimationState;
use client::input::InputManager;
use client::motion::LocalPlayer;
use client::network::Transport;
use client::rendering::{AvatarView, HudInfo, Renderer};
use client::session::MultiplayerSession;
use log::{error, info};
use macroquad::prelude::{get_frame_time, is_quit_requested, next_frame, prevent_quit, Conf};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::appearance::PALETTE;
use shared::{validate_display_name, Appearance, Color, PeerProfile, PlayerClass, Vec3};
use std::time::{Duration, Instant};

/// How long the final leave gets to reach the relay on exit
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name (random if omitted)
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Avatar color as #rrggbb (random palette color if omitted)
    #[arg(short = 'c', long)]
    color: Option<Color>,

    /// Avatar class: warrior, hunter or mage (random if omitted)
    #[arg(long)]
    class: Option<PlayerClass>,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Window width
    #[arg(short = 'w', long, default_value = "1024")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "768")]
    height: i32,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Presence".to_owned(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

fn build_profile(args: &Args) -> Result<PeerProfile, Box<dyn std::error::Error>> {
    let mut rng = rand::thread_rng();

    let display_name = match &args.name {
        Some(name) => name.trim().to_string(),
        None => format!("Player-{}", rng.gen_range(1000..10000)),
    };
    validate_display_name(&display_name)?;

    let color = args
        .color
        .or_else(|| PALETTE.choose(&mut rng).copied())
        .unwrap_or_default();
    let class = args
        .class
        .or_else(|| PlayerClass::ALL.choose(&mut rng).copied())
        .unwrap_or_default();

    Ok(PeerProfile {
        display_name,
        appearance: Appearance { color, class },
    })
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let profile = build_profile(&args)?;
    let class = profile.appearance.class;
    info!(
        "Playing as {} the {} ({}): {}",
        profile.display_name,
        class,
        profile.appearance.color,
        class.description()
    );

    let mut rng = rand::thread_rng();
    let spawn = Vec3::new(rng.gen_range(-10.0..10.0), 0.0, rng.gen_range(-10.0..10.0));

    let (transport, outbound, inbound) = Transport::connect(&args.server, args.fake_ping)?;
    let mut session = MultiplayerSession::new(profile.clone(), spawn, 0.0, outbound, inbound);
    let mut player = LocalPlayer::new(spawn, 0.0);
    let mut local_animation = AnimationState::new();
    let mut jumps = 0u64;
    let mut input = InputManager::new();
    let mut renderer = Renderer::new();

    prevent_quit();
    session.join(Instant::now());

    loop {
        let now = Instant::now();
        let dt = get_frame_time();

        let (toggles, motion) = input.update();
        if toggles.quit || is_quit_requested() {
            break;
        }
        if toggles.labels {
            renderer.toggle_labels();
            info!("Name labels: {}", renderer.show_labels());
        }

        if player.integrate(&motion, dt) {
            jumps += 1;
        }
        local_animation.select(player.animation_tag(), jumps);
        local_animation.advance(dt);

        session.frame(&player, now, dt);

        let local_view = AvatarView {
            name: &profile.display_name,
            appearance: &profile.appearance,
            position: player.position,
            rotation: player.rotation,
            animation: &local_animation,
        };
        let peers: Vec<AvatarView<'_>> = session
            .registry()
            .all()
            .map(|peer| AvatarView {
                name: peer.display_name(),
                appearance: peer.appearance(),
                position: peer.rendered_pose().position,
                rotation: peer.rendered_pose().rotation,
                animation: peer.animation(),
            })
            .collect();
        let hud = HudInfo {
            state: session.state(),
            local_id: session.local_id(),
            peer_count: peers.len(),
            fake_ping_ms: args.fake_ping,
        };
        renderer.render(&local_view, &peers, &hud);

        next_frame().await;
    }

    session.leave();
    transport.shutdown(SHUTDOWN_GRACE);
    Ok(())
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    info!("Controls: W/S move, A/D turn, Shift run, C crouch, Space jump, L labels, Esc quit");

    if let Err(e) = run(args).await {
        error!("Client error: {}", e);
    }
}
