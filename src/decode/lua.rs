use std::path::Path;
use std::sync::Mutex;

use mlua::{Function, Lua};

use super::{DecodeError, PacketInterpreter, Result};

/// Semantic decoder backed by a Lua script.
///
/// The script must define a global `parse(packet)` function taking the framed
/// packet as a byte string and returning the decoded text:
///
/// ```lua
/// function parse(packet)
///     return string.upper(packet)
/// end
/// ```
pub struct LuaInterpreter {
    // The Lua state is Send but not Sync; the mutex serializes decode calls
    // against this instance.
    lua: Mutex<Lua>,
}

impl std::fmt::Debug for LuaInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaInterpreter").finish_non_exhaustive()
    }
}

impl LuaInterpreter {
    /// Build an interpreter from script source text.
    ///
    /// Fails with [`DecodeError::Load`] if the chunk does not execute or does
    /// not define `parse`, so a broken script is rejected before it can
    /// replace a working interpreter.
    pub fn from_source(source: &str) -> Result<Self> {
        let lua = Lua::new();
        lua.load(source)
            .exec()
            .map_err(|e| DecodeError::Load(e.to_string()))?;

        let _parse: Function = lua
            .globals()
            .get("parse")
            .map_err(|_| DecodeError::Load("script does not define parse(packet)".to_string()))?;

        Ok(Self {
            lua: Mutex::new(lua),
        })
    }

    /// Build an interpreter from the current content of a script file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| DecodeError::Load(format!("{}: {e}", path.display())))?;
        Self::from_source(&source)
    }
}

impl PacketInterpreter for LuaInterpreter {
    fn interpret(&self, packet: &[u8]) -> Result<String> {
        let lua = self.lua.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let parse: Function = lua
            .globals()
            .get("parse")
            .map_err(|e| DecodeError::Script(e.to_string()))?;
        let arg = lua
            .create_string(packet)
            .map_err(|e| DecodeError::Script(e.to_string()))?;
        let text: mlua::String = parse
            .call(arg)
            .map_err(|e| DecodeError::Script(e.to_string()))?;

        // Scripts may return arbitrary byte strings; degrade non-UTF-8
        // output instead of failing the packet.
        Ok(String::from_utf8_lossy(&text.as_bytes()).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_the_parse_entry_point() {
        let interpreter =
            LuaInterpreter::from_source("function parse(packet) return packet .. '!' end").unwrap();
        assert_eq!(interpreter.interpret(b"ping").unwrap(), "ping!");
    }

    #[test]
    fn packet_reaches_the_script_as_a_byte_string() {
        let interpreter = LuaInterpreter::from_source(
            "function parse(packet) return tostring(#packet) end",
        )
        .unwrap();
        assert_eq!(interpreter.interpret(&[0x00, 0xFF, 0x7F]).unwrap(), "3");
    }

    #[test]
    fn rejects_sources_without_parse() {
        assert!(LuaInterpreter::from_source("x = 1").is_err());
    }

    #[test]
    fn rejects_sources_that_do_not_compile() {
        assert!(LuaInterpreter::from_source("function parse(").is_err());
    }

    #[test]
    fn script_raise_is_a_script_error() {
        let interpreter =
            LuaInterpreter::from_source("function parse(packet) error('boom') end").unwrap();
        match interpreter.interpret(b"x") {
            Err(DecodeError::Script(message)) => assert!(message.contains("boom")),
            other => panic!("expected script error, got {other:?}"),
        }
    }
}
