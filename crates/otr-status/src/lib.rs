//! Optional HTTP status surface.
//!
//! `GET /` answers with a liveness banner, `GET /health` with a JSON report.
//! Runs on its own thread and only ever reads [`StatusInfo`], which is fixed
//! at startup.

use std::{
    io::Read,
    net::SocketAddr,
    thread::{self, JoinHandle},
};

use anyhow::Context;
use tiny_http::{Header, Method, Request, Response, Server};

use otr_core::status::StatusInfo;

pub struct StatusServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl StatusServer {
    /// Bind `bind:port` and start answering on a background thread.
    pub fn spawn(bind: &str, port: u16, info: StatusInfo) -> anyhow::Result<Self> {
        let server = Server::http((bind, port))
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("bind status server on {bind}:{port}"))?;
        let addr = server
            .server_addr()
            .to_ip()
            .context("status server is not listening on an IP socket")?;

        let handle = thread::Builder::new()
            .name("otr-status".to_string())
            .spawn(move || {
                for req in server.incoming_requests() {
                    if let Err(e) = respond(req, &info) {
                        tracing::debug!(error = %e, "status response failed");
                    }
                }
            })
            .context("spawn status thread")?;

        tracing::info!(%addr, "status server listening");
        Ok(Self { addr, handle })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

fn respond(req: Request, info: &StatusInfo) -> anyhow::Result<()> {
    let path = req.url().split('?').next().unwrap_or("/").to_string();
    let is_read = matches!(req.method(), Method::Get | Method::Head);

    let response = match (is_read, path.as_str()) {
        (true, "/") => Response::from_string(info.banner()),
        (true, "/health") => with_content_type(
            Response::from_data(serde_json::to_vec(&info.health())?),
            "application/json",
        ),
        (false, "/") | (false, "/health") => {
            Response::from_string("method not allowed").with_status_code(405)
        }
        _ => Response::from_string("not found").with_status_code(404),
    };

    req.respond(response)?;
    Ok(())
}

fn with_content_type<R: Read>(resp: Response<R>, value: &str) -> Response<R> {
    match Header::from_bytes(&b"Content-Type"[..], value.as_bytes()) {
        Ok(h) => resp.with_header(h),
        Err(()) => resp,
    }
}
