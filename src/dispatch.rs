//! Routes raw transport packets through the decode pipeline and republishes
//! the results as terminal events.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::decode::{InterpreterRegistry, Preparser};
use crate::device::{RawPacket, TerminalEvent};

/// Run one packet through the preparser and the active interpreter.
///
/// Decode failures never propagate: they become the literal fallback text so
/// one bad packet cannot tear down a live connection.
pub fn decode_packet(
    preparser: &dyn Preparser,
    registry: &InterpreterRegistry,
    packet: &RawPacket,
) -> String {
    let framed = preparser.interpret(&packet.bytes);
    let interpreter = registry.current();
    match interpreter.interpret(&framed) {
        Ok(text) => text,
        Err(e) => format!("Script error: {e}"),
    }
}

/// Drain a transport's packet channel, decode, and broadcast.
///
/// One task per transport instance: packets are processed strictly in
/// arrival order, and this task is the only place the transport's decode
/// path runs.
pub(crate) fn spawn_decode_task(
    mut packets: mpsc::UnboundedReceiver<RawPacket>,
    preparser: Box<dyn Preparser>,
    registry: Arc<InterpreterRegistry>,
    events: broadcast::Sender<TerminalEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(packet) = packets.recv().await {
            log::debug!(
                "Decoding {} bytes: {}",
                packet.bytes.len(),
                hex::encode(&packet.bytes)
            );
            let text = decode_packet(preparser.as_ref(), &registry, &packet);
            let _ = events.send(TerminalEvent::DataReceived {
                text,
                received_at: packet.received_at,
            });
        }
        log::debug!("Packet channel closed; decode task exiting");
    })
}
