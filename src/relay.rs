/**
 * Copyright (c) 2024-2025 ArcX, Inc.
 *
 * This file is part of ArcX Gateway
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::error::AppError;
use crate::model::{Proxy, Scheme};
use crate::persistence::proxy_repo::ProxyRepo;

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const CANDIDATE_POOL: i64 = 20;

// picks an upstream proxy for a relay connection. the source left `ProxyFactory`
// unimplemented (`get_proxy` was a bare `pass`); this fills it in as a random choice
// among the fastest known-alive candidates, rather than always handing back the
// single fastest one and hammering it.
pub struct ProxyFactory {
    repo: ProxyRepo,
}

impl ProxyFactory {
    pub fn new(repo: ProxyRepo) -> Self {
        ProxyFactory { repo }
    }

    pub async fn get_random_alive(&self, scheme: Option<Scheme>) -> Result<Option<Proxy>, AppError> {
        let candidates = self.repo.list_alive(scheme, CANDIDATE_POOL).await?;
        Ok(candidates.choose(&mut rand::thread_rng()).cloned())
    }
}

// transparent TCP relay: reads the client's start line, picks a live upstream proxy,
// forwards the start line (with a Proxy-Authorization header spliced in when the
// upstream needs one) and then copies bytes both ways until either side closes.
pub async fn serve(listen_port: u16, factory: Arc<ProxyFactory>) -> Result<(), AppError> {
    let listener = TcpListener::bind(("0.0.0.0", listen_port))
        .await
        .map_err(|e| AppError::Fatal(format!("failed to bind relay on port {listen_port}: {e}")))?;

    tracing::info!(port = listen_port, "relay listening");

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "relay accept failed");
                continue;
            }
        };

        let factory = Arc::clone(&factory);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, Arc::clone(&factory)).await {
                tracing::debug!(peer = %peer, error = %err, "relay connection ended with an error");
            }
        });
    }
}

async fn handle_connection(client_socket: TcpStream, factory: Arc<ProxyFactory>) -> Result<(), AppError> {
    let mut client_reader = BufReader::new(client_socket);
    let mut start_row = Vec::new();
    tokio::time::timeout(READ_TIMEOUT, client_reader.read_until(b'\n', &mut start_row))
        .await
        .map_err(|_| AppError::Transient("timed out reading client start line".to_string()))?
        .map_err(|e| AppError::Transient(format!("failed to read client start line: {e}")))?;

    if start_row.is_empty() {
        return Ok(());
    }

    let proxy = factory
        .get_random_alive(None)
        .await?
        .ok_or_else(|| AppError::Transient("no live upstream proxy available".to_string()))?;

    let mut upstream = TcpStream::connect((proxy.host.as_str(), proxy.port.unwrap_or_default()))
        .await
        .map_err(|e| AppError::Transient(format!("failed to connect to upstream {}: {e}", proxy.connection_string())))?;

    let mut outbound = start_row.clone();
    if let Some(auth) = proxy.basic_auth() {
        outbound.extend_from_slice(format!("Proxy-Authorization: Basic {auth}\r\n").as_bytes());
    }
    upstream
        .write_all(&outbound)
        .await
        .map_err(|e| AppError::Transient(format!("failed to write start line upstream: {e}")))?;

    let (mut client_recv, mut client_send) = tokio::io::split(client_reader);
    let (mut upstream_recv, mut upstream_send) = upstream.split();

    let client_to_upstream = copy_with_timeout(&mut client_recv, &mut upstream_send);
    let upstream_to_client = copy_with_timeout(&mut upstream_recv, &mut client_send);

    let _ = tokio::join!(client_to_upstream, upstream_to_client);
    Ok(())
}

async fn copy_with_timeout<R, W>(reader: &mut R, writer: &mut W)
where
    R: AsyncReadExt + Unpin,
    W: AsyncWriteExt + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        let read = match tokio::time::timeout(READ_TIMEOUT, reader.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => n,
            Ok(Err(_)) => break,
        };
        if writer.write_all(&buf[..read]).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn copy_with_timeout_forwards_bytes_until_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hello from upstream").await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        server.await.unwrap();

        let (mut sink_read, mut sink_write) = tokio::io::duplex(256);
        copy_with_timeout(&mut client, &mut sink_write).await;
        drop(sink_write);

        let mut collected = Vec::new();
        sink_read.read_to_end(&mut collected).await.unwrap();
        assert_eq!(collected, b"hello from upstream");
    }
}
