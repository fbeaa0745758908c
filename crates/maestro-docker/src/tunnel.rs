//! SSH port forwarding for tunneled daemon connections.
//!
//! The tunnel is a plain `ssh -N -L` child process forwarding an ephemeral
//! local port to the daemon port on the remote host. The child is killed
//! when the tunnel is dropped.

use maestro_model::SshTunnelSettings;
use std::net::TcpListener;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{DaemonError, Result};

/// An established SSH tunnel to a remote daemon.
pub struct SshTunnel {
    child: Child,
    local_port: u16,
}

impl SshTunnel {
    /// Opens a tunnel to `host`, forwarding a local port to `remote_port`.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Tunnel`] when ssh exits early or the
    /// forwarded port does not accept connections within `timeout`.
    pub async fn open(
        ssh: &SshTunnelSettings,
        host: &str,
        remote_port: u16,
        timeout: Duration,
    ) -> Result<Self> {
        let local_port = ephemeral_port()?;

        let mut child = Command::new("ssh")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-i")
            .arg(&ssh.key)
            .arg("-p")
            .arg(ssh.port.to_string())
            .arg("-N")
            .arg("-L")
            .arg(format!("{local_port}:127.0.0.1:{remote_port}"))
            .arg(format!("{}@{}", ssh.user, host))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DaemonError::Tunnel(format!("cannot spawn ssh: {e}")))?;

        debug!(host, local_port, remote_port, "waiting for ssh tunnel");

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| DaemonError::Tunnel(format!("ssh wait failed: {e}")))?
            {
                return Err(DaemonError::Tunnel(format!("ssh exited with {status}")));
            }
            if TcpStream::connect(("127.0.0.1", local_port)).await.is_ok() {
                return Ok(Self { child, local_port });
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = child.start_kill();
                return Err(DaemonError::Tunnel(format!(
                    "tunnel to {host} did not come up within {timeout:?}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// The local port the tunnel listens on.
    #[must_use]
    pub const fn local_port(&self) -> u16 {
        self.local_port
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// Picks a free local port by binding to port 0 and releasing it.
fn ephemeral_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
