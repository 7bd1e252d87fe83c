//! Catalog server management - reachability checks and spawning the dev server

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use storyrun_common::Settings;

use crate::error::{E2eError, E2eResult};

/// Grace period between SIGTERM and kill
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Handle to a catalog dev server this process started.
///
/// Call [`CatalogServer::stop`] to shut it down; dropping the handle only
/// signals the process.
pub struct CatalogServer {
    child: Child,
    pub base_url: String,
    pub port: u16,
}

impl CatalogServer {
    /// Spawn `command -p <port>` in `working_dir` and wait until it answers
    pub async fn spawn(
        command: &[String],
        working_dir: &Path,
        port: u16,
        startup_timeout: Duration,
    ) -> E2eResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| E2eError::ServerStartup("catalog_start_command is empty".to_string()))?;
        let base_url = format!("http://localhost:{}", port);

        info!("Starting catalog server on port {}", port);

        let child = Command::new(program)
            .args(args)
            .arg("-p")
            .arg(port.to_string())
            .current_dir(working_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| E2eError::ServerStartup(format!("Failed to spawn {}: {}", program, e)))?;

        let mut server = CatalogServer {
            child,
            base_url,
            port,
        };

        if let Err(err) = server.wait_until_reachable(startup_timeout).await {
            let _ = server.stop().await;
            return Err(err);
        }

        info!("Catalog is running at {}", server.base_url);
        Ok(server)
    }

    async fn wait_until_reachable(&mut self, startup_timeout: Duration) -> E2eResult<()> {
        let client = check_client()?;
        let deadline = Instant::now() + startup_timeout;
        let mut attempts = 0;

        while Instant::now() < deadline {
            attempts += 1;

            if let Some(status) = self.child.try_wait()? {
                return Err(E2eError::ServerStartup(format!(
                    "catalog server exited early with {}",
                    status
                )));
            }
            if probe(&client, &self.base_url).await {
                return Ok(());
            }
            if attempts == 1 {
                info!("Waiting for the catalog to start...");
            }

            sleep(Duration::from_millis(500)).await;
        }

        Err(E2eError::ServerHealthCheck {
            url: self.base_url.clone(),
            attempts,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server: SIGTERM first, then kill after a grace period
    pub async fn stop(&mut self) -> E2eResult<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        info!("Stopping catalog server (pid: {})", pid);

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                && timeout(STOP_GRACE, self.child.wait()).await.is_ok()
            {
                return Ok(());
            }
        }

        debug!("Catalog server did not exit after SIGTERM, killing it");
        self.child.kill().await?;
        Ok(())
    }
}

impl Drop for CatalogServer {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.start_kill();
        }
    }
}

fn check_client() -> E2eResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?)
}

/// Any HTTP response counts as running
async fn probe(client: &reqwest::Client, url: &str) -> bool {
    match client.head(url).send().await {
        Ok(response) => {
            debug!("Catalog answered {} with {}", url, response.status());
            true
        }
        Err(e) => {
            if !e.is_connect() {
                warn!("Catalog check error: {}", e);
            }
            false
        }
    }
}

/// Whether something answers at `url`
pub async fn is_running(url: &str) -> E2eResult<bool> {
    let client = check_client()?;
    Ok(probe(&client, url).await)
}

/// Pre-flight: start the catalog when configured, otherwise require that it
/// already runs at `catalog_server_url`
pub async fn ensure_catalog(
    settings: &Settings,
    working_dir: &Path,
) -> E2eResult<Option<CatalogServer>> {
    if settings.start_catalog_server {
        let server = CatalogServer::spawn(
            &settings.catalog_start_command,
            working_dir,
            settings.catalog_port(),
            Duration::from_secs(settings.catalog_startup_timeout_secs),
        )
        .await?;
        return Ok(Some(server));
    }

    let url = settings.catalog_server_url.clone();
    if is_running(&url).await? {
        debug!("Catalog is running at {}", url);
        Ok(None)
    } else {
        Err(E2eError::CatalogUnreachable { url })
    }
}
