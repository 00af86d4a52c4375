//! Loopback endpoint that lets scripts run SQL against the open store.
//!
//! Each connection gets its own task and may send any number of requests.
//! Selects run on the reader and answer with tab-separated rows; anything
//! else runs immediately on the writer and answers with an empty body.
//! Statement failures only reach the log. A malformed request gets
//! `400 Fail` and the connection is closed.

mod request;

pub use request::{
    decode_payload, parse_command, read_request, write_response, Method, Request, RequestError,
    Status,
};

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{anyhow, Result};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::context::AppContext;
use crate::util::one_line;

/// Bind the first free loopback port in the configured range.
pub async fn bind(config: &ServerConfig) -> Result<(TcpListener, u16)> {
    let mut last_err = None;
    for port in config.port_start..=config.port_end {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => {
                let port = listener.local_addr()?.port();
                return Ok((listener, port));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => anyhow!(
            "No free port in {}..={}: {}",
            config.port_start,
            config.port_end,
            e
        ),
        None => anyhow!("Empty port range {}..={}", config.port_start, config.port_end),
    })
}

/// Accept connections until the runtime shuts down.
pub fn spawn(ctx: AppContext, listener: TcpListener) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "script endpoint listening");
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(ctx.clone(), stream, peer));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    })
}

async fn handle_connection(ctx: AppContext, stream: TcpStream, peer: SocketAddr) {
    debug!(%peer, "script connection opened");
    let limit = ctx.config.server.max_request_bytes;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let outcome = match read_request(&mut reader, limit).await {
            Ok(None) => break,
            Ok(Some(req)) => {
                let decoded = decode_payload(&req.payload);
                parse_command(&decoded).map(|sql| (sql.to_string(), req.keep_alive))
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok((sql, keep_alive)) => {
                let body = run_command(&ctx, &sql).await;
                if let Err(e) = write_response(&mut write_half, Status::Ok, &body, keep_alive).await
                {
                    debug!(%peer, error = %e, "reply failed");
                    break;
                }
                if !keep_alive {
                    break;
                }
            }
            Err(e) => {
                warn!(%peer, error = %e, "rejected script request");
                let _ = write_response(&mut write_half, Status::Fail, &e.to_string(), false).await;
                break;
            }
        }
    }

    let _ = write_half.shutdown().await;
    debug!(%peer, "script connection closed");
}

/// Run one script statement and return the reply body.
pub async fn run_command(ctx: &AppContext, sql: &str) -> String {
    let Some(store) = ctx.store() else {
        warn!(sql = %one_line(sql), "--- no store open");
        return String::new();
    };

    // Anything that could write goes to the writer so watchers hear of it.
    if store.is_read_only(sql).await {
        match store
            .query_table(sql, ctx.config.server.max_reply_bytes)
            .await
        {
            Ok(reply) => {
                if reply.truncated {
                    warn!(rows = reply.rows, "script reply truncated");
                }
                debug!(rows = reply.rows, "+++ {}", one_line(sql));
                reply.text
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "--- {}", one_line(sql));
                String::new()
            }
        }
    } else {
        match store.execute(sql).await {
            Ok(()) => info!("+++ {}", one_line(sql)),
            Err(e) => warn!(error = %format!("{:#}", e), "--- {}", one_line(sql)),
        }
        String::new()
    }
}
