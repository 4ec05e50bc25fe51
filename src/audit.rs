//! Append-only audit log over the document store.
//!
//! Every append loads `logs.json`, pushes one entry, caps the list at the
//! most recent [`MAX_LOG_ENTRIES`] and writes it back. Failures are absorbed
//! and logged locally: auditing never blocks or fails the operation being
//! audited.

use std::sync::Arc;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::store::{DocumentStore, LOGS_PATH};

/// Cap on retained entries; the oldest are dropped on overflow.
pub const MAX_LOG_ENTRIES: usize = 5000;

const MAX_USER_AGENT_LEN: usize = 200;

/// Best-effort request metadata captured alongside an entry.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One immutable audit record. Field names match the stored JSON contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub acao: String,
    pub usuario: String,
    pub detalhes: String,
    pub ip: String,
    pub navegador: String,
    pub so: String,
    pub dispositivo: String,
    #[serde(rename = "userAgent", default)]
    pub user_agent: String,
    #[serde(rename = "dataHora")]
    pub data_hora: String,
}

pub struct AuditSink {
    store: Arc<DocumentStore>,
}

impl AuditSink {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Appends one entry. Never fails from the caller's point of view; any
    /// error is logged and swallowed.
    pub async fn append(
        &self,
        action: &str,
        actor: &str,
        detail: &str,
        context: Option<&RequestContext>,
    ) {
        if let Err(err) = self.try_append(action, actor, detail, context).await {
            error!(error = %err, action, "failed to append audit log entry");
        }
    }

    async fn try_append(
        &self,
        action: &str,
        actor: &str,
        detail: &str,
        context: Option<&RequestContext>,
    ) -> anyhow::Result<()> {
        let mut entries: Vec<AuditEntry> = self
            .store
            .load_list(LOGS_PATH)
            .await
            .context("loading audit log")?;
        entries.push(build_entry(action, actor, detail, context));
        if entries.len() > MAX_LOG_ENTRIES {
            let excess = entries.len() - MAX_LOG_ENTRIES;
            entries.drain(..excess);
        }
        self.store
            .save_document(LOGS_PATH, &entries, "Novo log de auditoria")
            .await
            .context("saving audit log")?;
        Ok(())
    }
}

fn build_entry(
    action: &str,
    actor: &str,
    detail: &str,
    context: Option<&RequestContext>,
) -> AuditEntry {
    let user_agent = context
        .and_then(|ctx| ctx.user_agent.clone())
        .unwrap_or_default();
    let ip = match context {
        None => "sistema".to_string(),
        Some(ctx) => match ctx.ip.as_deref() {
            None | Some("") => "desconhecido".to_string(),
            Some("::1") => "localhost".to_string(),
            Some(ip) => ip.to_string(),
        },
    };
    let now = Utc::now();
    AuditEntry {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        acao: action.to_string(),
        usuario: actor.to_string(),
        detalhes: detail.to_string(),
        ip,
        navegador: detect_browser(&user_agent).to_string(),
        so: detect_os(&user_agent).to_string(),
        dispositivo: detect_device(&user_agent).to_string(),
        user_agent: user_agent.chars().take(MAX_USER_AGENT_LEN).collect(),
        data_hora: now.format("%d/%m/%Y, %H:%M:%S").to_string(),
    }
}

// Heuristic substring matching, not a full user-agent parser. Approximate
// results are acceptable for the audit trail.
fn detect_browser(ua: &str) -> &'static str {
    if ua.contains("Chrome") && !ua.contains("Edg") {
        "Chrome"
    } else if ua.contains("Firefox") {
        "Firefox"
    } else if ua.contains("Safari") && !ua.contains("Chrome") {
        "Safari"
    } else if ua.contains("Edg") {
        "Microsoft Edge"
    } else if ua.contains("Opera") || ua.contains("OPR") {
        "Opera"
    } else {
        "Desconhecido"
    }
}

fn detect_os(ua: &str) -> &'static str {
    if ua.contains("Windows NT") {
        "Windows"
    } else if ua.contains("Mac OS X") {
        "macOS"
    } else if ua.contains("Linux") {
        "Linux"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("iOS") {
        "iOS"
    } else {
        "Desconhecido"
    }
}

fn detect_device(ua: &str) -> &'static str {
    if ua.contains("Mobile") {
        "Mobile"
    } else if ua.contains("Tablet") {
        "Tablet"
    } else {
        "Desktop"
    }
}
