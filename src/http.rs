//! HTTP API for the feedback board
//!
//! ## Feedback
//! - `GET /feedback?order=votes|recent` - List items with voter names
//! - `POST /feedback` - Submit (JSON or form body)
//! - `GET /feedback/{id}` - Single item
//! - `PUT /feedback/{id}` - Edit (author only)
//! - `POST /feedback/{id}/vote` - Vote up or down
//! - `GET /vote/{id}/{direction}/{voter_id}/{voter_name}` - Browser vote link, redirects to `/`
//!
//! ## Identities
//! - `GET /identities/{voter_id}` - Current name and history
//! - `PUT /identities/{voter_id}` - Set display name
//!
//! ## Export
//! - `GET /export.csv` - CSV download
//! - `GET /backup` - Database snapshot download
//! - `PUT /backup` - Replace the database with an uploaded snapshot
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST -H "Content-Type: application/json" \
//!      -d '{"question":"Add dark mode?","name":"Alice","voter_id":"a1"}' \
//!      http://localhost:5000/feedback
//!
//! curl -X POST -H "Content-Type: application/json" \
//!      -d '{"voter_id":"b1","voter_name":"Bob","direction":"up"}' \
//!      http://localhost:5000/feedback/1/vote
//!
//! curl http://localhost:5000/backup > feedback.db
//! curl -X PUT --data-binary @feedback.db http://localhost:5000/backup
//! ```

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::SiteConfig;
use crate::error::BoardError;
use crate::export;
use crate::models::{Direction, ListOrder};
use crate::services::response::{self, HandlerResult};
use crate::services::{CreateFeedbackInput, EditFeedbackInput, Services};

/// Body of `POST /feedback/{id}/vote`
#[derive(Debug, Deserialize)]
struct VoteRequest {
    #[serde(alias = "upvoter_id")]
    voter_id: String,
    #[serde(default, alias = "upvoter_name")]
    voter_name: String,
    direction: Direction,
}

/// Body of `PUT /identities/{voter_id}`
#[derive(Debug, Deserialize)]
struct IdentityRequest {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    order: Option<String>,
}

#[derive(Debug, Serialize)]
struct IdentityResponse {
    voter_id: String,
    name: String,
    history: Vec<String>,
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    site: SiteConfig,
    bind_addr: SocketAddr,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(services: Arc<Services>, site: SiteConfig, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            site,
            bind_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), BoardError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, hyper::Error>(server.handle_request(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route a request to its handler
    pub async fn handle_request<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        let path = req.uri().path().to_string();
        let method = req.method().clone();
        debug!(method = %method, path = %path, "Incoming request");

        let segments: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let result = match (&method, segments.as_slice()) {
            (&Method::GET, ["health"]) => self.handle_health(),
            (&Method::GET, ["config"]) => Ok(response::ok(&self.site)),

            (&Method::GET, ["feedback"]) => self.handle_list(&req),
            (&Method::POST, ["feedback"]) => self.handle_create(req).await,
            (&Method::GET, ["feedback", id]) => self.handle_get(id),
            (&Method::PUT, ["feedback", id]) => self.handle_edit(id, req).await,
            (&Method::POST, ["feedback", id, "vote"]) => self.handle_vote(id, req).await,
            (&Method::GET, ["vote", id, direction, voter_id, voter_name]) => {
                self.handle_vote_link(id, direction, voter_id, voter_name)
            }

            (&Method::GET, ["identities", voter_id]) => self.handle_get_identity(voter_id),
            (&Method::PUT, ["identities", voter_id]) => self.handle_put_identity(voter_id, req).await,

            (&Method::GET, ["export.csv"]) => self.handle_export_csv(),
            (&Method::GET, ["backup"]) => self.handle_backup_download(),
            (&Method::PUT, ["backup"]) => self.handle_backup_upload(req).await,

            (
                _,
                ["health"]
                | ["config"]
                | ["feedback"]
                | ["feedback", _]
                | ["feedback", _, "vote"]
                | ["vote", _, _, _, _]
                | ["identities", _]
                | ["export.csv"]
                | ["backup"],
            ) => Ok(response::method_not_allowed()),

            _ => Ok(response::not_found("Not Found")),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                if response::status_for(&e).is_server_error() {
                    error!(method = %method, path = %path, error = %e, "Request error");
                } else {
                    debug!(method = %method, path = %path, error = %e, "Request rejected");
                }
                response::error_response(e)
            }
        }
    }

    /// Health check endpoint
    fn handle_health(&self) -> HandlerResult {
        let stats = self.services.db.stats()?;
        Ok(response::ok(&serde_json::json!({
            "status": "ok",
            "feedback": stats.feedback_count,
            "voters": stats.voter_count,
            "schema_version": stats.schema_version,
        })))
    }

    /// GET /feedback
    fn handle_list<B>(&self, req: &Request<B>) -> HandlerResult {
        let query: ListQuery = serde_urlencoded::from_str(req.uri().query().unwrap_or(""))
            .map_err(|e| BoardError::Validation(format!("Invalid query: {}", e)))?;
        let order: ListOrder = query.order.as_deref().unwrap_or("").parse()?;

        let items = self.services.ledger.list(order)?;
        let views = self.services.identities.attach_names(items)?;
        Ok(response::ok(&views))
    }

    /// POST /feedback
    async fn handle_create<B>(&self, req: Request<B>) -> HandlerResult
    where
        B: Body,
        B::Error: Display,
    {
        let input: CreateFeedbackInput = read_input(req).await?;
        let item = self.services.ledger.create(input)?;
        info!(id = item.id, "Feedback submitted");
        Ok(response::created(&item))
    }

    /// GET /feedback/{id}
    fn handle_get(&self, id: &str) -> HandlerResult {
        let id = parse_id(id)?;
        let item = self.services.ledger.get(id)?;
        let view = self
            .services
            .identities
            .attach_names(vec![item])?
            .pop()
            .ok_or_else(|| BoardError::NotFound(format!("Feedback {} not found", id)))?;
        Ok(response::ok(&view))
    }

    /// PUT /feedback/{id}
    async fn handle_edit<B>(&self, id: &str, req: Request<B>) -> HandlerResult
    where
        B: Body,
        B::Error: Display,
    {
        let id = parse_id(id)?;
        let input: EditFeedbackInput = read_input(req).await?;
        Ok(response::from_result(self.services.ledger.edit(id, input)))
    }

    /// POST /feedback/{id}/vote
    async fn handle_vote<B>(&self, id: &str, req: Request<B>) -> HandlerResult
    where
        B: Body,
        B::Error: Display,
    {
        let id = parse_id(id)?;
        let vote: VoteRequest = read_input(req).await?;
        let outcome = self
            .services
            .votes
            .apply_vote(id, &vote.voter_id, &vote.voter_name, vote.direction)?;
        Ok(response::ok(&outcome))
    }

    /// GET /vote/{id}/{direction}/{voter_id}/{voter_name}
    fn handle_vote_link(
        &self,
        id: &str,
        direction: &str,
        voter_id: &str,
        voter_name: &str,
    ) -> HandlerResult {
        let id = parse_id(id)?;
        let direction: Direction = direction.parse()?;
        let voter_id = decode_segment(voter_id)?;
        let voter_name = decode_segment(voter_name)?;

        self.services
            .votes
            .apply_vote(id, &voter_id, &voter_name, direction)?;
        Ok(response::see_other("/"))
    }

    /// GET /identities/{voter_id}
    fn handle_get_identity(&self, voter_id: &str) -> HandlerResult {
        self.identity_response(decode_segment(voter_id)?)
    }

    fn identity_response(&self, voter_id: String) -> HandlerResult {
        let identities = &self.services.identities;
        Ok(response::ok(&IdentityResponse {
            name: identities.display_name(&voter_id)?,
            history: identities.history(&voter_id)?,
            voter_id,
        }))
    }

    /// PUT /identities/{voter_id}
    async fn handle_put_identity<B>(&self, voter_id: &str, req: Request<B>) -> HandlerResult
    where
        B: Body,
        B::Error: Display,
    {
        let voter_id = decode_segment(voter_id)?;
        let body: IdentityRequest = read_input(req).await?;
        self.services.identities.upsert(&voter_id, &body.name)?;
        self.identity_response(voter_id.trim().to_string())
    }

    /// GET /export.csv
    fn handle_export_csv(&self) -> HandlerResult {
        let rows = self.services.ledger.export_all()?;
        let csv = export::feedback_csv(&rows);
        info!(rows = rows.len(), "Serving CSV export");
        Ok(response::attachment(
            "text/csv; charset=utf-8",
            "feedback.csv",
            csv.into_bytes(),
        ))
    }

    /// GET /backup
    fn handle_backup_download(&self) -> HandlerResult {
        let bytes = self.services.db.export_snapshot()?;
        Ok(response::attachment(
            "application/octet-stream",
            "feedback.db",
            bytes,
        ))
    }

    /// PUT /backup
    async fn handle_backup_upload<B>(&self, req: Request<B>) -> HandlerResult
    where
        B: Body,
        B::Error: Display,
    {
        let bytes = read_body(req).await?;
        let stats = self.services.import_snapshot(&bytes)?;
        Ok(response::ok(&stats))
    }
}

fn parse_id(raw: &str) -> Result<i64, BoardError> {
    raw.parse()
        .map_err(|_| BoardError::Validation(format!("Invalid feedback id '{}'", raw)))
}

fn decode_segment(raw: &str) -> Result<String, BoardError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| BoardError::Validation(format!("Invalid path segment: {}", e)))
}

async fn read_body<B>(req: Request<B>) -> Result<Bytes, BoardError>
where
    B: Body,
    B::Error: Display,
{
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| BoardError::Validation(format!("Failed to read body: {}", e)))?;
    Ok(body.to_bytes())
}

/// Decode a JSON body, or a urlencoded form body for browser posts
async fn read_input<T, B>(req: Request<B>) -> Result<T, BoardError>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Display,
{
    let is_form = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    let bytes = read_body(req).await?;
    if is_form {
        serde_urlencoded::from_bytes(&bytes)
            .map_err(|e| BoardError::Validation(format!("Invalid form body: {}", e)))
    } else {
        serde_json::from_slice(&bytes)
            .map_err(|e| BoardError::Validation(format!("Invalid JSON body: {}", e)))
    }
}
