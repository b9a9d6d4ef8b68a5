//! Integration tests for the presence relay and client session
//!
//! These tests run a real relay on a loopback port and talk to it either with raw
//! UDP sockets or through the full client stack.

use assert_approx_eq::assert_approx_eq;
use client::motion::{LocalPlayer, MotionInput};
use client::network::Transport;
use client::session::{ConnectionState, MultiplayerSession};
use server::network::Server;
use server::room::DEFAULT_ROOM;
use shared::{
    decode_packet, encode_packet, AnimationTag, Appearance, Packet, PeerId, PeerProfile, Vec3,
    MAX_DATAGRAM_SIZE, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_test::assert_ok;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

fn profile(name: &str) -> PeerProfile {
    PeerProfile {
        display_name: name.to_string(),
        appearance: Appearance::default(),
    }
}

fn join_packet(name: &str, position: Vec3) -> Packet {
    Packet::Join {
        protocol_version: PROTOCOL_VERSION,
        profile: profile(name),
        position,
        rotation: 0.0,
    }
}

/// Starts a relay on an ephemeral loopback port inside the current runtime.
async fn spawn_relay(timeout_after: Duration) -> SocketAddr {
    let mut server = assert_ok!(Server::new("127.0.0.1:0", 8, timeout_after, DEFAULT_ROOM).await);
    let addr = assert_ok!(server.local_addr());
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

/// RAW PROTOCOL TESTS
mod relay_tests {
    use super::*;

    struct RawClient {
        socket: UdpSocket,
        relay: SocketAddr,
    }

    impl RawClient {
        async fn new(relay: SocketAddr) -> Self {
            let socket = assert_ok!(UdpSocket::bind("127.0.0.1:0").await);
            Self { socket, relay }
        }

        async fn send(&self, packet: &Packet) {
            let data = assert_ok!(encode_packet(packet));
            assert_ok!(self.socket.send_to(&data, self.relay).await);
        }

        async fn recv(&self) -> Packet {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            let received = timeout(RECV_TIMEOUT, self.socket.recv_from(&mut buf))
                .await
                .expect("no packet from relay");
            let (len, _) = assert_ok!(received);
            assert_ok!(decode_packet(&buf[..len]))
        }

        async fn expect_silence(&self) {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            let result = timeout(QUIET_PERIOD, self.socket.recv_from(&mut buf)).await;
            assert!(result.is_err(), "expected no traffic, got a datagram");
        }

        async fn join(&self, name: &str, position: Vec3) -> PeerId {
            self.send(&join_packet(name, position)).await;
            match self.recv().await {
                Packet::Joined { local, .. } => local.id,
                other => panic!("Expected Joined, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn relay_assigns_ids_and_hands_over_roster() {
        let relay = spawn_relay(Duration::from_secs(5)).await;
        let alice = RawClient::new(relay).await;
        let bob = RawClient::new(relay).await;

        let alice_id = alice.join("Alice", Vec3::new(3.0, 0.0, 4.0)).await;
        assert_eq!(alice_id, 1);

        bob.send(&join_packet("Bob", Vec3::ZERO)).await;
        match bob.recv().await {
            Packet::Joined { local, roster } => {
                assert_eq!(local.id, 2);
                assert_eq!(local.display_name, "Bob");
                assert_eq!(roster.len(), 1);
                assert_eq!(roster[0].peer.id, alice_id);
                assert_eq!(roster[0].position, Vec3::new(3.0, 0.0, 4.0));
            }
            other => panic!("Expected Joined, got {:?}", other),
        }

        match alice.recv().await {
            Packet::PeerJoined { entry } => assert_eq!(entry.peer.display_name, "Bob"),
            other => panic!("Expected PeerJoined, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn moves_are_forwarded_but_not_echoed() {
        let relay = spawn_relay(Duration::from_secs(5)).await;
        let alice = RawClient::new(relay).await;
        let bob = RawClient::new(relay).await;

        let alice_id = alice.join("Alice", Vec3::ZERO).await;
        bob.join("Bob", Vec3::ZERO).await;
        alice.recv().await; // PeerJoined for Bob

        alice
            .send(&Packet::Move {
                id: alice_id,
                position: Vec3::new(1.0, 0.0, 2.0),
                rotation: 0.25,
                animation: AnimationTag::Walk,
            })
            .await;

        match bob.recv().await {
            Packet::PeerMoved {
                id,
                position,
                rotation,
                animation,
            } => {
                assert_eq!(id, alice_id);
                assert_eq!(position, Vec3::new(1.0, 0.0, 2.0));
                assert_approx_eq!(rotation, 0.25);
                assert_eq!(animation, AnimationTag::Walk);
            }
            other => panic!("Expected PeerMoved, got {:?}", other),
        }

        alice.expect_silence().await;
    }

    #[tokio::test]
    async fn roster_reflects_latest_move() {
        let relay = spawn_relay(Duration::from_secs(5)).await;
        let alice = RawClient::new(relay).await;
        let alice_id = alice.join("Alice", Vec3::ZERO).await;

        alice
            .send(&Packet::Move {
                id: alice_id,
                position: Vec3::new(-6.0, 0.0, 9.0),
                rotation: 1.5,
                animation: AnimationTag::Run,
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let carol = RawClient::new(relay).await;
        carol.send(&join_packet("Carol", Vec3::ZERO)).await;
        match carol.recv().await {
            Packet::Joined { roster, .. } => {
                assert_eq!(roster[0].position, Vec3::new(-6.0, 0.0, 9.0));
                assert_approx_eq!(roster[0].rotation, 1.5);
                assert_eq!(roster[0].animation, AnimationTag::Run);
            }
            other => panic!("Expected Joined, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn leave_is_broadcast() {
        let relay = spawn_relay(Duration::from_secs(5)).await;
        let alice = RawClient::new(relay).await;
        let bob = RawClient::new(relay).await;

        alice.join("Alice", Vec3::ZERO).await;
        let bob_id = bob.join("Bob", Vec3::ZERO).await;
        alice.recv().await;

        bob.send(&Packet::Leave { id: bob_id }).await;

        match alice.recv().await {
            Packet::PeerLeft { id } => assert_eq!(id, bob_id),
            other => panic!("Expected PeerLeft, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn spoofed_leave_is_ignored() {
        let relay = spawn_relay(Duration::from_secs(5)).await;
        let alice = RawClient::new(relay).await;
        let bob = RawClient::new(relay).await;

        let alice_id = alice.join("Alice", Vec3::ZERO).await;
        bob.join("Bob", Vec3::ZERO).await;
        alice.recv().await;

        // Bob tries to kick Alice
        bob.send(&Packet::Leave { id: alice_id }).await;

        alice.expect_silence().await;
        bob.expect_silence().await;
    }

    #[tokio::test]
    async fn version_mismatch_is_rejected() {
        let relay = spawn_relay(Duration::from_secs(5)).await;
        let client = RawClient::new(relay).await;

        client
            .send(&Packet::Join {
                protocol_version: PROTOCOL_VERSION + 7,
                profile: profile("Future"),
                position: Vec3::ZERO,
                rotation: 0.0,
            })
            .await;

        match client.recv().await {
            Packet::Rejected { reason } => assert!(reason.contains("version")),
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_display_name_is_rejected() {
        let relay = spawn_relay(Duration::from_secs(5)).await;
        let client = RawClient::new(relay).await;

        client
            .send(&join_packet("this name is far too long", Vec3::ZERO))
            .await;

        assert!(matches!(client.recv().await, Packet::Rejected { .. }));
    }

    #[tokio::test]
    async fn garbage_datagrams_are_ignored() {
        let relay = spawn_relay(Duration::from_secs(5)).await;
        let client = RawClient::new(relay).await;

        assert_ok!(client.socket.send_to(&[0xFF; 16], relay).await);
        assert_ok!(client.socket.send_to(&[], relay).await);
        client.expect_silence().await;

        // Still serving afterwards
        assert_eq!(client.join("Alice", Vec3::ZERO).await, 1);
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let relay = spawn_relay(Duration::from_millis(300)).await;
        let alice = RawClient::new(relay).await;
        let bob = RawClient::new(relay).await;

        let alice_id = alice.join("Alice", Vec3::ZERO).await;
        let bob_id = bob.join("Bob", Vec3::ZERO).await;
        alice.recv().await;

        // Alice keeps heartbeating while Bob goes quiet
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            alice.send(&Packet::Heartbeat { id: alice_id }).await;
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            if let Ok(received) =
                timeout(Duration::from_millis(100), alice.socket.recv_from(&mut buf)).await
            {
                let (len, _) = assert_ok!(received);
                assert_eq!(assert_ok!(decode_packet(&buf[..len])), Packet::PeerLeft { id: bob_id });
                break;
            }
            assert!(Instant::now() < deadline, "Bob was never timed out");
        }
    }
}

/// FULL CLIENT STACK TESTS
mod session_tests {
    use super::*;
    use std::thread;

    struct Harness {
        runtime: tokio::runtime::Runtime,
        relay: SocketAddr,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_timeout(Duration::from_secs(5))
        }

        fn with_timeout(timeout_after: Duration) -> Self {
            let runtime = assert_ok!(tokio::runtime::Runtime::new());
            let relay = runtime.block_on(spawn_relay(timeout_after));
            Self { runtime, relay }
        }

        fn connect(&self, name: &str, spawn: Vec3) -> (Transport, MultiplayerSession) {
            let (transport, outbound, inbound) =
                assert_ok!(Transport::connect(&self.relay.to_string(), 0));
            let mut session = MultiplayerSession::new(profile(name), spawn, 0.0, outbound, inbound);
            session.join(Instant::now());
            (transport, session)
        }
    }

    /// Pumps the session until `done` holds or the deadline passes.
    fn pump_until(
        session: &mut MultiplayerSession,
        mut done: impl FnMut(&MultiplayerSession) -> bool,
    ) -> bool {
        let deadline = Instant::now() + RECV_TIMEOUT;
        while Instant::now() < deadline {
            session.drain_inbound(Instant::now());
            if done(session) {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn sessions_join_and_see_each_other() {
        let harness = Harness::new();
        let (_alice_transport, mut alice) = harness.connect("Alice", Vec3::new(2.0, 0.0, 2.0));
        assert!(pump_until(&mut alice, |s| s.local_id().is_some()));

        let (_bob_transport, mut bob) = harness.connect("Bob", Vec3::ZERO);
        assert!(pump_until(&mut bob, |s| s.local_id().is_some()));
        assert!(pump_until(&mut alice, |s| s.registry().len() == 1));

        let alice_id = alice.local_id().unwrap();
        let seen_by_bob = bob.registry().get(alice_id).expect("Alice in Bob's roster");
        assert_eq!(seen_by_bob.display_name(), "Alice");
        assert_eq!(seen_by_bob.rendered_pose().position, Vec3::new(2.0, 0.0, 2.0));

        // Neither side tracks itself
        assert!(!alice.registry().contains(alice_id));
        assert!(!bob.registry().contains(bob.local_id().unwrap()));
    }

    #[test]
    fn local_motion_reaches_remote_renderer() {
        let harness = Harness::new();
        let (_alice_transport, mut alice) = harness.connect("Alice", Vec3::ZERO);
        let (_bob_transport, mut bob) = harness.connect("Bob", Vec3::ZERO);
        assert!(pump_until(&mut alice, |s| s.local_id().is_some()));
        assert!(pump_until(&mut bob, |s| s.local_id().is_some()));
        assert!(pump_until(&mut bob, |s| s.registry().len() == 1));

        let alice_id = alice.local_id().unwrap();
        let mut player = LocalPlayer::new(Vec3::ZERO, 0.0);
        let forward = MotionInput {
            forward: true,
            ..Default::default()
        };
        for _ in 0..30 {
            player.integrate(&forward, 1.0 / 60.0);
        }
        assert!(alice.publish_local(&player, Instant::now()));

        assert!(pump_until(&mut bob, |s| {
            s.registry()
                .get(alice_id)
                .map_or(false, |peer| peer.sample_count() > 0)
        }));

        let sample = *bob.registry().get(alice_id).unwrap().last_sample();
        assert_approx_eq!(sample.position.z, player.position.z);
        assert_eq!(sample.animation, AnimationTag::Walk);

        // Blending only ever moves toward the sample, and extrapolation runs forward
        for _ in 0..60 {
            bob.frame(&LocalPlayer::new(Vec3::ZERO, 0.0), Instant::now(), 1.0 / 60.0);
        }
        let rendered = bob.registry().get(alice_id).unwrap().rendered_pose().position;
        assert!(rendered.z >= sample.position.z - 0.01);
        assert_approx_eq!(rendered.x, 0.0, 0.01);
    }

    #[test]
    fn leaving_session_disappears_from_others() {
        let harness = Harness::new();
        let (_alice_transport, mut alice) = harness.connect("Alice", Vec3::ZERO);
        assert!(pump_until(&mut alice, |s| s.local_id().is_some()));

        let (bob_transport, mut bob) = harness.connect("Bob", Vec3::ZERO);
        assert!(pump_until(&mut bob, |s| s.local_id().is_some()));
        assert!(pump_until(&mut alice, |s| s.registry().len() == 1));

        bob.leave();
        bob_transport.shutdown(Duration::from_millis(500));

        assert!(pump_until(&mut alice, |s| s.registry().is_empty()));
        assert!(matches!(alice.state(), ConnectionState::Joined(_)));
    }

    #[test]
    fn stalled_session_rejoins_after_timeout() {
        let harness = Harness::with_timeout(Duration::from_millis(1500));
        let (_alice_transport, mut alice) = harness.connect("Alice", Vec3::new(1.0, 0.0, 1.0));
        assert!(pump_until(&mut alice, |s| s.local_id().is_some()));
        let (_bob_transport, mut bob) = harness.connect("Bob", Vec3::ZERO);
        assert!(pump_until(&mut bob, |s| s.local_id().is_some()));
        let first_id = alice.local_id().unwrap();

        let idle = LocalPlayer::new(Vec3::ZERO, 0.0);
        let alice_pose = LocalPlayer::new(Vec3::new(1.0, 0.0, 1.0), 0.0);

        // Alice freezes while Bob's heartbeats keep him in the room
        let stall_until = Instant::now() + Duration::from_millis(3500);
        while Instant::now() < stall_until {
            bob.frame(&idle, Instant::now(), 1.0 / 60.0);
            thread::sleep(Duration::from_millis(16));
        }
        assert!(!bob.registry().contains(first_id));
        assert!(matches!(bob.state(), ConnectionState::Joined(_)));

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut was_dropped = false;
        while Instant::now() < deadline {
            alice.frame(&alice_pose, Instant::now(), 1.0 / 60.0);
            bob.frame(&idle, Instant::now(), 1.0 / 60.0);
            was_dropped |= matches!(alice.state(), ConnectionState::Disconnected(_));
            let back = alice
                .local_id()
                .map_or(false, |id| id != first_id && bob.registry().contains(id));
            if was_dropped && back {
                break;
            }
            thread::sleep(Duration::from_millis(16));
        }

        assert!(was_dropped);
        let second_id = alice.local_id().expect("Alice back in the room");
        assert_ne!(second_id, first_id);
        let seen_by_bob = bob.registry().get(second_id).expect("Bob sees the new Alice");
        assert_eq!(seen_by_bob.rendered_pose().position, Vec3::new(1.0, 0.0, 1.0));
        assert!(alice.registry().contains(bob.local_id().unwrap()));
    }
}
