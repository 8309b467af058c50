pub mod lua;
pub mod registry;
pub mod watcher;

pub use lua::LuaInterpreter;
pub use registry::InterpreterRegistry;
pub use watcher::ScriptWatcher;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The interpreter raised while decoding one packet.
    #[error("{0}")]
    Script(String),

    /// A fresh interpreter could not be constructed from its source.
    #[error("failed to load interpreter source: {0}")]
    Load(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Fixed, transport-level decode stage.
///
/// Strips or normalizes transport framing before the semantic interpreter
/// sees the payload. Infallible: framing oddities degrade to shorter
/// payloads, never to errors.
pub trait Preparser: Send + Sync {
    fn interpret(&self, raw: &[u8]) -> Vec<u8>;
}

/// Strips HID report framing: the leading report-ID byte and the trailing
/// zero padding that fills a fixed-size report.
#[derive(Debug, Default)]
pub struct HidPreparser;

impl Preparser for HidPreparser {
    fn interpret(&self, raw: &[u8]) -> Vec<u8> {
        let payload = raw.get(1..).unwrap_or_default();
        let end = payload.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        payload[..end].to_vec()
    }
}

/// Serial payloads carry no transport framing.
#[derive(Debug, Default)]
pub struct PassthroughPreparser;

impl Preparser for PassthroughPreparser {
    fn interpret(&self, raw: &[u8]) -> Vec<u8> {
        raw.to_vec()
    }
}

/// Swappable semantic decode stage: framed bytes to human-readable text.
///
/// Implementations must be shareable across transport decode tasks; a call
/// may run concurrently with the registry swapping the active instance.
pub trait PacketInterpreter: Send + Sync {
    fn interpret(&self, packet: &[u8]) -> Result<String>;
}

/// Built-in default: lossy UTF-8 passthrough.
///
/// Keeps the pipeline functional before any decode script is installed.
#[derive(Debug, Default)]
pub struct Utf8Interpreter;

impl PacketInterpreter for Utf8Interpreter {
    fn interpret(&self, packet: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(packet).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hid_preparser_strips_report_id_and_padding() {
        let framed = HidPreparser.interpret(&[0x00, b'h', b'i', 0, 0, 0]);
        assert_eq!(framed, b"hi".to_vec());
    }

    #[test]
    fn hid_preparser_keeps_interior_zeros() {
        let framed = HidPreparser.interpret(&[0x01, 0xAA, 0x00, 0xBB, 0x00]);
        assert_eq!(framed, vec![0xAA, 0x00, 0xBB]);
    }

    #[test]
    fn hid_preparser_handles_degenerate_reports() {
        assert!(HidPreparser.interpret(&[]).is_empty());
        assert!(HidPreparser.interpret(&[0x01]).is_empty());
        assert!(HidPreparser.interpret(&[0x01, 0, 0, 0]).is_empty());
    }

    #[test]
    fn passthrough_preparser_is_identity() {
        let raw = vec![0x00, 0xFF, 0x10];
        assert_eq!(PassthroughPreparser.interpret(&raw), raw);
    }

    #[test]
    fn utf8_interpreter_is_lossy_not_fallible() {
        assert_eq!(Utf8Interpreter.interpret(b"hello").unwrap(), "hello");
        let text = Utf8Interpreter.interpret(&[0xFF, b'a']).unwrap();
        assert!(text.ends_with('a'));
    }
}
