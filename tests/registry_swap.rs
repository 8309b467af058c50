use std::sync::Arc;
use std::thread;

use termlink::decode::{InterpreterRegistry, LuaInterpreter};

const IDENTITY: &str = "function parse(packet) return packet end";
const UPPERCASE: &str = "function parse(packet) return string.upper(packet) end";

/// Swapping the active interpreter while decoders run concurrently: every
/// decode observes the old or the new interpreter in its entirety, never a
/// partially constructed one, and no call is lost.
#[test]
fn every_decode_sees_exactly_one_interpreter() {
    const WORKERS: usize = 4;
    const DECODES_PER_WORKER: usize = 200;

    let _ = env_logger::builder().is_test(true).try_init();

    let registry = Arc::new(InterpreterRegistry::with_interpreter(Arc::new(
        LuaInterpreter::from_source(IDENTITY).expect("script should load"),
    )));

    let mut workers = Vec::new();
    for _ in 0..WORKERS {
        let registry = Arc::clone(&registry);
        workers.push(thread::spawn(move || {
            let mut decoded = Vec::with_capacity(DECODES_PER_WORKER);
            for _ in 0..DECODES_PER_WORKER {
                let interpreter = registry.current();
                decoded.push(interpreter.interpret(b"swap test").expect("decode"));
            }
            decoded
        }));
    }

    for _ in 0..50 {
        registry.install(Arc::new(
            LuaInterpreter::from_source(UPPERCASE).expect("script should load"),
        ));
        registry.install(Arc::new(
            LuaInterpreter::from_source(IDENTITY).expect("script should load"),
        ));
    }

    let mut total = 0;
    for worker in workers {
        let decoded = worker.join().expect("worker panicked");
        total += decoded.len();
        for text in decoded {
            assert!(
                text == "swap test" || text == "SWAP TEST",
                "torn decode result: {text}"
            );
        }
    }
    assert_eq!(total, WORKERS * DECODES_PER_WORKER);
}
