/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: Apache-2.0
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Minimal client for the NUT daemon's line protocol. Only the two
//! operations the device model consumes are implemented: listing
//! device names and fetching one device's variables.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, trace};

use crate::errors::NutmegError;
use crate::transform::VarMap;

pub const DEFAULT_NUT_PORT: u16 = 3493;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// TCP client for the daemon. Connections are short-lived: the
/// registry connects at the top of each poll cycle and disconnects at
/// the bottom, so the socket is not held across idle intervals.
pub struct NutClient {
    host: String,
    port: u16,
    timeout: Duration,
    conn: Option<Connection>,
}

impl NutClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            conn: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Establish the TCP connection. Connecting while connected is a
    /// no-op.
    pub async fn connect(&mut self) -> Result<(), NutmegError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let stream = bounded(
            self.timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await?;
        trace!(host = %self.host, port = self.port, "Connected to NUT daemon");
        let (read_half, write_half) = stream.into_split();
        self.conn = Some(Connection {
            reader: BufReader::new(read_half),
            writer: write_half,
        });
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.conn = None;
    }

    /// Names of every device the daemon currently serves (`LIST UPS`).
    pub async fn device_names(&mut self) -> Result<BTreeSet<String>, NutmegError> {
        let timeout = self.timeout;
        let conn = self.conn.as_mut().ok_or(NutmegError::NotConnected)?;
        let result = list_devices(conn, timeout).await;
        if result.is_err() {
            // The line stream is in an unknown state, force a reconnect.
            self.conn = None;
        }
        result
    }

    /// All variables of one device (`LIST VAR <name>`), as variable
    /// name to value list. A variable reported on several lines
    /// accumulates all its values.
    pub async fn device_vars(&mut self, device: &str) -> Result<VarMap, NutmegError> {
        let timeout = self.timeout;
        let conn = self.conn.as_mut().ok_or(NutmegError::NotConnected)?;
        let result = list_vars(conn, device, timeout).await;
        if result.is_err() {
            self.conn = None;
        }
        result
    }
}

async fn list_devices(
    conn: &mut Connection,
    timeout: Duration,
) -> Result<BTreeSet<String>, NutmegError> {
    send_line(conn, "LIST UPS", timeout).await?;

    let mut names = BTreeSet::new();
    loop {
        let line = read_line(conn, timeout).await?;
        if line == "END LIST UPS" {
            break;
        }
        if let Some(err) = line.strip_prefix("ERR ") {
            return Err(NutmegError::protocol(format!("LIST UPS failed: {err}")));
        }
        // Format: UPS <name> "Description"
        let mut parts = line.split_whitespace();
        if parts.next() == Some("UPS") {
            if let Some(name) = parts.next() {
                names.insert(name.to_string());
            }
        }
    }
    debug!(count = names.len(), "Listed NUT devices");
    Ok(names)
}

async fn list_vars(
    conn: &mut Connection,
    device: &str,
    timeout: Duration,
) -> Result<VarMap, NutmegError> {
    send_line(conn, &format!("LIST VAR {device}"), timeout).await?;

    let mut vars = VarMap::new();
    loop {
        let line = read_line(conn, timeout).await?;
        if line.starts_with("END LIST VAR") {
            break;
        }
        if let Some(err) = line.strip_prefix("ERR ") {
            return Err(NutmegError::protocol(format!(
                "LIST VAR {device} failed: {err}"
            )));
        }
        // Format: VAR <name> <variable> "<value>"
        let parts: Vec<&str> = line.splitn(4, ' ').collect();
        if let ["VAR", _, variable, value] = parts.as_slice() {
            vars.entry(variable.to_string())
                .or_default()
                .push(value.trim_matches('"').to_string());
        }
    }
    trace!(device, count = vars.len(), "Listed NUT variables");
    Ok(vars)
}

async fn send_line(
    conn: &mut Connection,
    command: &str,
    timeout: Duration,
) -> Result<(), NutmegError> {
    let line = format!("{command}\n");
    bounded(timeout, async {
        conn.writer.write_all(line.as_bytes()).await?;
        conn.writer.flush().await
    })
    .await
}

async fn read_line(conn: &mut Connection, timeout: Duration) -> Result<String, NutmegError> {
    let mut line = String::new();
    let n = bounded(timeout, conn.reader.read_line(&mut line)).await?;
    if n == 0 {
        return Err(NutmegError::protocol("daemon closed the connection"));
    }
    Ok(line.trim_end().to_string())
}

async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = std::io::Result<T>>,
) -> Result<T, NutmegError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(NutmegError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    /// One-shot daemon fixture: answers LIST UPS and LIST VAR from a
    /// canned device table.
    async fn spawn_daemon() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let (read_half, mut write_half) = socket.split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                    break;
                }
                let response = match line.trim_end() {
                    "LIST UPS" => concat!(
                        "BEGIN LIST UPS\n",
                        "UPS ups-1 \"Eaton 5P\"\n",
                        "UPS epdu-2 \"Eaton ePDU\"\n",
                        "END LIST UPS\n"
                    )
                    .to_string(),
                    "LIST VAR ups-1" => concat!(
                        "BEGIN LIST VAR ups-1\n",
                        "VAR ups-1 input.voltage \"230.0\"\n",
                        "VAR ups-1 ups.status \"OL CHRG\"\n",
                        "VAR ups-1 ups.alarm \"low battery\"\n",
                        "END LIST VAR ups-1\n"
                    )
                    .to_string(),
                    other if other.starts_with("LIST VAR ") => {
                        "ERR UNKNOWN-UPS\n".to_string()
                    }
                    _ => "ERR UNKNOWN-COMMAND\n".to_string(),
                };
                write_half.write_all(response.as_bytes()).await.expect("write");
            }
            // Keep the socket open until the client goes away.
            let mut sink = [0u8; 1];
            let _ = reader.read(&mut sink).await;
        });
        port
    }

    #[tokio::test]
    async fn lists_device_names() {
        let port = spawn_daemon().await;
        let mut client = NutClient::new("127.0.0.1", port);
        client.connect().await.expect("connect");
        assert!(client.is_connected());

        let names = client.device_names().await.expect("list");
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["epdu-2".to_string(), "ups-1".to_string()]
        );
    }

    #[tokio::test]
    async fn lists_device_variables() {
        let port = spawn_daemon().await;
        let mut client = NutClient::new("127.0.0.1", port);
        client.connect().await.expect("connect");

        let vars = client.device_vars("ups-1").await.expect("list vars");
        assert_eq!(vars["input.voltage"], vec!["230.0"]);
        assert_eq!(vars["ups.status"], vec!["OL CHRG"]);
        assert_eq!(vars["ups.alarm"], vec!["low battery"]);
    }

    #[tokio::test]
    async fn err_response_surfaces_as_protocol_error() {
        let port = spawn_daemon().await;
        let mut client = NutClient::new("127.0.0.1", port);
        client.connect().await.expect("connect");

        let err = client.device_vars("nope").await.unwrap_err();
        assert!(matches!(err, NutmegError::Protocol(_)));
        // The connection is dropped so the next cycle starts clean.
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn listing_without_connection_fails() {
        let mut client = NutClient::new("127.0.0.1", 1);
        let err = client.device_names().await.unwrap_err();
        assert!(matches!(err, NutmegError::NotConnected));
    }
}
