//! Misbehaving worker for the integration tests: maps and announces half the
//! capacity the launcher allocated, so establishment must fail with a
//! capacity mismatch instead of letting the two sides truncate each other's
//! frames later.

use std::process::ExitCode;

fn main() -> ExitCode {
    let Some(capacity) = chime::capacity_from_args() else {
        eprintln!("shrunk-worker: missing --capacity");
        return ExitCode::FAILURE;
    };

    let endpoint = match chime::bind(capacity / 2) {
        Ok(ep) => ep,
        Err(e) => {
            eprintln!("shrunk-worker: bind failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    // The supervisor rejects the hello and tears the link down; park until
    // its SIGTERM arrives.
    let (mut inbound, _outbound) = endpoint.split();
    let _ = inbound.listen(|_| {});
    ExitCode::SUCCESS
}
