//! # Presence Client Library
//!
//! Client side of the avatar presence layer. Every connected client publishes its own
//! avatar pose and turns the sparse, unordered, rate-limited updates it receives about
//! everybody else into smooth continuous motion. There is no authoritative simulation:
//! each peer is the only writer of its own state and everyone else dead-reckons it.
//!
//! ## Data Flow
//!
//! ```text
//! motion ─► throttle ─► network (out) ─► relay ─► network (in) ─► registry ─► reconciler ─► rendering
//! ```
//!
//! ## Module Organization
//!
//! ### Motion (`motion`)
//! Local kinematics: turning, walking along the facing direction, running, crouching,
//! jumping under constant gravity, clamped to the play area. Produces the
//! position/rotation/animation tuple the rest of the pipeline consumes.
//!
//! ### Throttle (`throttle`)
//! Decides whether the local pose is worth sending: at most one update per 33 ms, and
//! only when position, rotation or animation actually changed.
//!
//! ### Registry (`registry`)
//! Owns the state of every remote peer: join, move samples, leave. Velocity is
//! estimated from consecutive samples.
//!
//! ### Reconciler (`reconciler`)
//! Runs once per frame for every peer: extrapolates up to 100 ms past the last sample,
//! blends the rendered pose toward that target along the shortest rotation arc, and
//! lets velocity decay once a peer goes quiet.
//!
//! ### Animation (`animation`)
//! Per-peer animation playback: looping tags versus one-shot tags such as jump.
//!
//! ### Session (`session`)
//! `MultiplayerSession` ties the above together with the transport channels and is
//! driven by the render loop through a single `frame` call.
//!
//! ### Network (`network`)
//! UDP transport running on its own tokio runtime, with optional simulated latency.
//!
//! ### Input and Rendering (`input`, `rendering`)
//! macroquad keyboard sampling and 3D drawing of avatars, labels and HUD.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::motion::{LocalPlayer, MotionInput};
//! use client::network::Transport;
//! use client::session::MultiplayerSession;
//! use shared::{Appearance, PeerProfile, Vec3};
//! use std::time::{Duration, Instant};
//!
//! let (transport, outbound, inbound) = Transport::connect("127.0.0.1:8080", 0)?;
//! let profile = PeerProfile {
//!     display_name: "Ada".to_string(),
//!     appearance: Appearance::default(),
//! };
//! let mut player = LocalPlayer::new(Vec3::ZERO, 0.0);
//! let mut session = MultiplayerSession::new(profile, Vec3::ZERO, 0.0, outbound, inbound);
//! session.join(Instant::now());
//!
//! for _ in 0..600 {
//!     let dt = 1.0 / 60.0;
//!     player.integrate(&MotionInput::default(), dt);
//!     session.frame(&player, Instant::now(), dt);
//!     std::thread::sleep(Duration::from_millis(16));
//! }
//!
//! session.leave();
//! transport.shutdown(Duration::from_millis(500));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod animation;
pub mod input;
pub mod motion;
pub mod network;
pub mod reconciler;
pub mod registry;
pub mod rendering;
pub mod session;
pub mod throttle;
