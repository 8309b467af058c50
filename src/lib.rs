//! termlink: serial and HID terminal transports behind one device contract,
//! feeding a hot-reloadable packet decode pipeline.
//!
//! Raw bytes flow from a transport's reception loop through the fixed
//! [`decode::Preparser`] stage and the swappable [`decode::PacketInterpreter`]
//! stage, and the decoded text is broadcast as
//! [`device::TerminalEvent::DataReceived`]. The active interpreter lives in a
//! shared [`decode::InterpreterRegistry`] and can be replaced while data is
//! arriving; a decode in flight always completes against a whole interpreter.

pub mod decode;
pub mod device;
pub mod dispatch;
pub mod hid;
pub mod serial;

pub use decode::{
    InterpreterRegistry, LuaInterpreter, PacketInterpreter, Preparser, ScriptWatcher,
    Utf8Interpreter,
};
pub use device::{
    ConnectionState, DataDevice, DeviceDescriptor, DeviceError, RawPacket, TerminalEvent,
    TransportKind,
};
pub use hid::HidTransport;
pub use serial::{DataBits, FlowControl, Parity, SerialSettings, SerialTransport, StopBits};
