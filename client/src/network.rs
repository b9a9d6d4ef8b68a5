use crate::session::{InboundEvent, OutboundRequest};
use log::{debug, error, info, warn};
use shared::{decode_packet, encode_packet, Packet, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};

/// UDP link to the relay, driven by a private tokio runtime so the render loop
/// only ever touches the two channels.
pub struct Transport {
    runtime: Runtime,
    local_addr: SocketAddr,
    sender_task: JoinHandle<()>,
}

impl Transport {
    /// Binds a local socket and starts the receiver and sender tasks.
    ///
    /// `fake_ping_ms` adds half its value of latency in each direction.
    pub fn connect(
        server_addr: &str,
        fake_ping_ms: u64,
    ) -> Result<
        (
            Self,
            UnboundedSender<OutboundRequest>,
            UnboundedReceiver<InboundEvent>,
        ),
        Box<dyn std::error::Error>,
    > {
        let server_addr: SocketAddr = server_addr.parse()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("transport")
            .enable_all()
            .build()?;

        let socket = runtime.block_on(UdpSocket::bind("0.0.0.0:0"))?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);
        let one_way = Duration::from_millis(fake_ping_ms / 2);

        info!(
            "Transport bound to {} for server {} (fake ping {}ms)",
            local_addr, server_addr, fake_ping_ms
        );

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let sender_task = {
            let _guard = runtime.enter();
            Self::spawn_network_receiver(socket.clone(), server_addr, one_way, inbound_tx);
            Self::spawn_network_sender(socket, server_addr, one_way, outbound_rx)
        };

        Ok((
            Transport {
                runtime,
                local_addr,
                sender_task,
            },
            outbound_tx,
            inbound_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn spawn_network_receiver(
        socket: Arc<UdpSocket>,
        server_addr: SocketAddr,
        one_way: Duration,
        inbound_tx: UnboundedSender<InboundEvent>,
    ) {
        let (delayed_tx, mut delayed_rx) = mpsc::unbounded_channel::<(Instant, InboundEvent)>();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                let (len, addr) = match socket.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                };

                if addr != server_addr {
                    debug!("Ignoring datagram from unknown address {}", addr);
                    continue;
                }

                let event = match decode_packet(&buffer[..len]).map(InboundEvent::try_from) {
                    Ok(Ok(event)) => event,
                    Ok(Err(e)) | Err(e) => {
                        warn!("Discarding packet from server: {}", e);
                        continue;
                    }
                };

                if delayed_tx.send((Instant::now() + one_way, event)).is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some((due, event)) = delayed_rx.recv().await {
                sleep_until(due).await;
                if inbound_tx.send(event).is_err() {
                    debug!("Session dropped, stopping receiver");
                    break;
                }
            }
        });
    }

    fn spawn_network_sender(
        socket: Arc<UdpSocket>,
        server_addr: SocketAddr,
        one_way: Duration,
        mut outbound_rx: UnboundedReceiver<OutboundRequest>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(request) = outbound_rx.recv().await {
                let due = Instant::now() + one_way;
                let packet: Packet = request.into();

                let data = match encode_packet(&packet) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("Failed to encode {}: {}", packet.name(), e);
                        continue;
                    }
                };

                sleep_until(due).await;
                if let Err(e) = socket.send_to(&data, server_addr).await {
                    warn!("Failed to send {}: {}", packet.name(), e);
                }
            }
            debug!("Outbound channel closed, sender stopped");
        })
    }

    /// Waits up to `grace` for queued requests to flush, then stops all tasks.
    /// The outbound sender must already be dropped for the flush to complete early.
    pub fn shutdown(self, grace: Duration) {
        let Transport {
            runtime,
            sender_task,
            ..
        } = self;

        let flushed = runtime.block_on(async { timeout(grace, sender_task).await.is_ok() });
        if !flushed {
            warn!("Outbound queue not flushed within {:?}", grace);
        }
        runtime.shutdown_timeout(Duration::from_millis(100));
        info!("Transport shut down");
    }
}
