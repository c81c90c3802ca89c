//! Echo worker for the integration tests.
//!
//! Binds to the inherited descriptors, runs the inbound `listen` loop on the
//! main thread, and mirrors every frame back on the outbound channel from a
//! second thread - the split the worker binding is designed around.

use std::process::ExitCode;
use std::sync::mpsc;

fn main() -> ExitCode {
    let Some(capacity) = chime::capacity_from_args() else {
        eprintln!("echo-worker: missing --capacity (not launched through the launcher?)");
        return ExitCode::FAILURE;
    };

    let endpoint = match chime::bind(capacity) {
        Ok(ep) => ep,
        Err(e) => {
            eprintln!("echo-worker: bind failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (mut inbound, mut outbound) = endpoint.split();

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    std::thread::spawn(move || {
        for frame in rx {
            if outbound.send(&frame).is_err() {
                break;
            }
        }
    });

    match inbound.listen(move |bytes| {
        let _ = tx.send(bytes.to_vec());
    }) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("echo-worker: listen ended: {e}");
            ExitCode::FAILURE
        }
    }
}
