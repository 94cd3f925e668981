//! top level client: wires the engine, driver, controller and socket into a
//! running session
use log::{debug, info, trace, warn};
use simple_error::bail;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc,
};

use crate::audio::driver::{AudioDriver, NullDriver};
use crate::common::box_error::BoxError;
use crate::common::get_micro_time;

use super::client_message::ClientMessage;
use super::codec::{Pcm16Codec, PCM16_FOUR_CC};
use super::controller::{DecoderFactory, NinjamController, SessionEvent};
use super::engine::{EngineCommand, NinjamEngine};
use super::session_socket::SessionSocket;

// channel depths: decoded intervals are big, encoded chunks are small and
// frequent
const DECODED_DEPTH: usize = 32;
const CHUNK_DEPTH: usize = 256;

pub struct ClientOptions {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub channel_name: String,
    pub sample_rate: u32,
    pub block_size: usize,
}

/// run one session until the server goes away or `stop` clears.
/// Blocks the calling thread; the audio callback runs on its own thread.
pub fn run(opts: &ClientOptions, stop: Arc<AtomicBool>) -> Result<(), BoxError> {
    let (command_tx, command_rx) = mpsc::channel();
    let (decoded_tx, decoded_rx) = mpsc::sync_channel(DECODED_DEPTH);
    let (chunk_tx, chunk_rx) = mpsc::sync_channel(CHUNK_DEPTH);
    let (status_tx, status_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();

    let mut engine = NinjamEngine::build(
        opts.sample_rate,
        command_rx,
        decoded_rx,
        chunk_tx,
        status_tx,
    );
    let channel_index = engine.add_local_channel(Box::new(Pcm16Codec::new()));
    if command_tx
        .send(EngineCommand::SetTransmit {
            channel_index,
            enabled: true,
        })
        .is_err()
    {
        bail!("engine command channel closed");
    }

    let mut driver = NullDriver::new(Box::new(engine), None, opts.sample_rate, opts.block_size);
    if !driver.start()? {
        bail!("audio driver would not start");
    }

    let factory: DecoderFactory = Box::new(|cc| {
        if cc == PCM16_FOUR_CC {
            Some(Box::new(Pcm16Codec::new()))
        } else {
            None
        }
    });
    let mut controller = NinjamController::build(
        &opts.username,
        &opts.password,
        vec![opts.channel_name.clone()],
        opts.sample_rate,
        Box::new(Pcm16Codec::new()),
        factory,
        command_tx.clone(),
        decoded_tx,
        event_tx,
        get_micro_time(),
    );

    let result = session_loop(&mut controller, opts, &chunk_rx, &status_rx, &event_rx, &stop);
    driver.stop()?;
    result
}

fn session_loop(
    controller: &mut NinjamController,
    opts: &ClientOptions,
    chunk_rx: &mpsc::Receiver<crate::ninjam::AudioChunk>,
    status_rx: &mpsc::Receiver<serde_json::Value>,
    event_rx: &mpsc::Receiver<SessionEvent>,
    stop: &Arc<AtomicBool>,
) -> Result<(), BoxError> {
    let mut socket = SessionSocket::connect(&opts.server, opts.port)?;
    let result = pump_session(controller, &mut socket, chunk_rx, status_rx, event_rx, stop);
    // close open uploads while the socket is still in hand, even when the
    // loop errored, otherwise the server holds the intervals until timeout
    let mut closing = vec![];
    if controller.disconnect(&mut closing).is_ok() {
        for msg in closing {
            if socket.send(&msg).is_err() {
                break;
            }
        }
    }
    result
}

fn pump_session(
    controller: &mut NinjamController,
    socket: &mut SessionSocket,
    chunk_rx: &mpsc::Receiver<crate::ninjam::AudioChunk>,
    status_rx: &mpsc::Receiver<serde_json::Value>,
    event_rx: &mpsc::Receiver<SessionEvent>,
    stop: &Arc<AtomicBool>,
) -> Result<(), BoxError> {
    let mut out: Vec<ClientMessage> = vec![];
    while !stop.load(Ordering::SeqCst) {
        // recv also paces the loop via its read timeout
        if let Some(msg) = socket.recv()? {
            trace!("recv {}", msg);
            controller.handle_message(msg, &mut out)?;
        }
        while let Ok(chunk) = chunk_rx.try_recv() {
            controller.handle_chunk(&chunk, &mut out)?;
        }
        controller.pump(get_micro_time(), &mut out);
        if !out.is_empty() {
            for msg in out.drain(..) {
                socket.send(&msg)?;
            }
            controller.note_traffic(get_micro_time());
        }
        while let Ok(status) = status_rx.try_recv() {
            debug!("status: {}", status);
        }
        while let Ok(event) = event_rx.try_recv() {
            report_event(&event);
        }
    }
    info!("session loop stopping");
    Ok(())
}

fn report_event(event: &SessionEvent) -> () {
    match event {
        SessionEvent::Chat { command, args } => match (command.as_str(), args.as_slice()) {
            ("MSG", [who, text, ..]) => info!("<{}> {}", who, text),
            ("TOPIC", [_, topic, ..]) => info!("topic: {}", topic),
            _ => debug!("chat {} {:?}", command, args),
        },
        SessionEvent::License(text) => info!("server license:\n{}", text),
        SessionEvent::StateChanged(state) => info!("session: {:?}", state),
        SessionEvent::RemoteChannelAdded { key, channel_name } => {
            info!("{} published channel {} ({})", key.username, key.channel_index, channel_name);
        }
        SessionEvent::RemoteChannelRemoved { key } => {
            warn!("{} channel {} went away", key.username, key.channel_index);
        }
    }
}
