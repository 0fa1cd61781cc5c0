//! `/etc/hosts`-format override file.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::hosts::{HostResolver, HostsError};

/// Edits an `/etc/hosts`-format file in place.
///
/// Comments and unrelated lines are preserved. The file is rewritten in place
/// rather than renamed, since `/etc/hosts` is often a bind mount.
#[derive(Debug)]
pub struct HostsFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<String, HostsError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(HostsError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn store(&self, lines: &[String]) -> Result<(), HostsError> {
        let mut text = lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|source| HostsError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

/// Split a hosts line into its address and names, ignoring comments.
fn parse_line(line: &str) -> Option<(&str, Vec<&str>)> {
    let content = line.split('#').next().unwrap_or_default();
    let mut tokens = content.split_whitespace();
    let ip = tokens.next()?;
    Some((ip, tokens.collect()))
}

fn same_ip(raw: &str, ip: IpAddr) -> bool {
    raw.parse::<IpAddr>().map(|a| a == ip).unwrap_or(false)
}

#[async_trait]
impl HostResolver for HostsFile {
    async fn set(&self, ip: IpAddr, hostname: &str) -> Result<(), HostsError> {
        let _guard = self.lock.lock().await;
        let text = self.load().await?;
        let present = text.lines().filter_map(parse_line).any(|(addr, names)| {
            same_ip(addr, ip) && names.iter().any(|n| n.eq_ignore_ascii_case(hostname))
        });
        if present {
            return Ok(());
        }

        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        lines.push(format!("{ip} {hostname}"));
        self.store(&lines).await?;
        tracing::debug!(hostname, %ip, path = ?self.path, "Host entry added");
        Ok(())
    }

    async fn remove(&self, ip: IpAddr, hostname: &str) -> Result<(), HostsError> {
        let _guard = self.lock.lock().await;
        let text = self.load().await?;

        let mut changed = false;
        let mut lines = Vec::new();
        for line in text.lines() {
            match parse_line(line) {
                Some((addr, names))
                    if same_ip(addr, ip) && names.iter().any(|n| n.eq_ignore_ascii_case(hostname)) =>
                {
                    changed = true;
                    let rest: Vec<&str> = names
                        .into_iter()
                        .filter(|n| !n.eq_ignore_ascii_case(hostname))
                        .collect();
                    if !rest.is_empty() {
                        lines.push(format!("{addr} {}", rest.join(" ")));
                    }
                }
                _ => lines.push(line.to_string()),
            }
        }

        if changed {
            self.store(&lines).await?;
            tracing::debug!(hostname, %ip, path = ?self.path, "Host entry removed");
        }
        Ok(())
    }
}
