//! `sh` scripts standing in for node binaries.
//!
//! Every script runs in its node's data directory and writes its pid to a
//! `pid` file there.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::time::Duration;
use twinchain_harness::NodeBinary;

/// Sleeps until a `stop` file appears.
pub const WAIT_FOR_STOP: &str = "echo $$ > pid; while [ ! -e stop ]; do sleep 0.1; done";

/// Exits straight away.
pub const EXIT_EARLY: &str = "echo $$ > pid; exit 3";

/// Records a `SIGTERM` in `got_term` and exits cleanly.
pub const TRAP_TERM: &str =
    "trap 'touch got_term; exit 0' TERM; echo $$ > pid; while true; do sleep 0.1; done";

/// Ignores `SIGTERM`.
pub const IGNORE_TERM: &str = "trap '' TERM; echo $$ > pid; while [ ! -e stop ]; do sleep 0.1; done";

pub fn sh(script: &str) -> NodeBinary {
    NodeBinary {
        program: "sh".into(),
        args: vec!["-c".to_string(), script.to_string()],
    }
}

/// Write `script` to `dir/name` and return a binary reference for the
/// harness configuration.
pub fn script_reference(dir: &Path, name: &str, script: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    format!("sh {}", path.display())
}

pub async fn read_pid(datadir: &Path) -> u32 {
    for _ in 0..50 {
        if let Ok(text) = tokio::fs::read_to_string(datadir.join("pid")).await {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("no pid file in {}", datadir.display());
}

#[cfg(target_os = "linux")]
pub fn process_exists(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// A localhost port nothing listens on.
pub async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
