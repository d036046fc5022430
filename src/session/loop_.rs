//! The session state machine: `Listening → Serving(client, encoder?) →
//! Listening` on any per-client error, `Terminating` on SIGINT/SIGTERM
//! (SPEC_FULL §4.6). Scheduling is the `tokio` reactor realization of §5's
//! single-threaded cooperative multiplexer (§11.2): one task, one
//! `tokio::select!`, every arm re-armed by the next loop iteration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::unix::AsyncFd;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::audio;
use crate::capture::Capture;
use crate::config::StreamConfig;
use crate::core::{AudioQueue, AudioWaker};
use crate::encode::Encoder;
use crate::error::{Result, StreamError};
use crate::gpu::{self, Colorspace, GpuContext, Range};
use crate::input;
use crate::protocol::Packet;
use crate::session::client::Client;

const TICK_PERIOD: Duration = Duration::from_nanos(16_666_667);

pub async fn run(config: StreamConfig) -> Result<()> {
    ignore_sigpipe();

    let capture = Capture::new()?;
    let render_node = default_render_node();
    let (colorspace, range) = gpu::shaders::resolve(&config);
    let gpu = GpuContext::new(&render_node, colorspace, range)?;

    let audio_queue = match &config.audio {
        Some(_) => Some(Arc::new(AudioQueue::new().map_err(StreamError::Io)?)),
        None => None,
    };
    if let (Some(audio_cfg), Some(queue)) = (&config.audio, &audio_queue) {
        audio::spawn(audio_cfg.clone(), Arc::clone(queue));
    }
    let mut audio_fd = match &audio_queue {
        Some(queue) => Some(AsyncFd::new(AudioWaker(Arc::clone(queue))).map_err(StreamError::Io)?),
        None => None,
    };

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await.map_err(StreamError::Io)?;
    info!(port = config.port, "listening");

    let mut ticker = interval(TICK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sigint = signal(SignalKind::interrupt()).map_err(StreamError::Io)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(StreamError::Io)?;

    let mut client: Option<Client> = None;
    let mut encoder: Option<Encoder> = None;

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                return Ok(());
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => accept_connection(&config, &mut client, &mut encoder, stream, peer).await,
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }

            result = async { audio_fd.as_mut().unwrap().readable().await }, if audio_fd.is_some() => {
                match result {
                    Ok(mut guard) => {
                        let items = audio_queue.as_ref().expect("audio_fd implies audio_queue").drain();
                        guard.clear_ready();
                        if let Some(c) = client.as_mut() {
                            for item in items {
                                let packet = Packet::audio_data(item.pcm, item.latency_ms);
                                if let Err(e) = c.send(&packet).await {
                                    warn!(error = %e, "dropping client: audio send failed");
                                    client = None;
                                    encoder = None;
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "audio wake fd failed, disabling audio for this session");
                        audio_fd = None;
                    }
                }
            }

            _ = ticker.tick(), if client.is_some() => {
                let started = Instant::now();
                if let Err(e) = tick(&capture, &gpu, &mut encoder, client.as_mut().unwrap(), colorspace, range, started).await {
                    warn!(error = %e, "dropping client: encode tick failed");
                    client = None;
                    encoder = None;
                }
            }
        }
    }
}

async fn accept_connection(
    config: &StreamConfig,
    client: &mut Option<Client>,
    encoder: &mut Option<Encoder>,
    stream: tokio::net::TcpStream,
    peer: std::net::SocketAddr,
) {
    if client.is_some() {
        debug!(%peer, "rejecting connection, a client is already being served");
        drop(stream);
        return;
    }

    let sink = match input::open_sink(config.disable_uhid) {
        Ok(sink) => sink,
        Err(e) => {
            warn!(error = %e, "failed to open input sink, rejecting client");
            return;
        }
    };
    let mut new_client = match Client::accept(stream, sink) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "failed to accept client");
            return;
        }
    };

    if let Some(audio_cfg) = &config.audio {
        if let Err(e) = new_client.send(&Packet::audio_config(audio_cfg.wire_body())).await {
            warn!(error = %e, "failed to send audio config, rejecting client");
            return;
        }
    }

    info!(%peer, "client connected");
    *encoder = None;
    *client = Some(new_client);
}

/// One 60 Hz tick: capture, convert, encode, send. Lazily sizes the encoder
/// to the first captured frame's dimensions (SPEC_FULL §4.6).
async fn tick(
    capture: &Capture,
    gpu: &GpuContext,
    encoder: &mut Option<Encoder>,
    client: &mut Client,
    colorspace: Colorspace,
    range: Range,
    started: Instant,
) -> Result<()> {
    let captured = capture.next_frame(gpu)?;

    if encoder.is_none() {
        *encoder = Some(Encoder::new(gpu, captured.width, captured.height, colorspace, range)?);
    }
    let enc = encoder.as_mut().expect("just initialized above");

    gpu.convert(&captured, enc.input_frame())?;
    let frame = enc.encode_frame()?;

    let latency_ms = started.elapsed().as_millis().min(u16::MAX as u128) as u16;
    client.send(&Packet::video(frame.bytes, frame.keyframe, latency_ms)).await
}

fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

/// Scans `/dev/dri` for the first `renderD*` node in name order, falling
/// back to the conventional default when none is found (SPEC_FULL §4.4).
fn default_render_node() -> PathBuf {
    if let Ok(entries) = std::fs::read_dir("/dev/dri") {
        let mut nodes: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with("renderD")))
            .collect();
        nodes.sort();
        if let Some(first) = nodes.into_iter().next() {
            return first;
        }
    }
    PathBuf::from("/dev/dri/renderD128")
}
