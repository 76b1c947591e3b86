//! HAR 1.2 export of recorded traffic.

use crate::network::{CapturedEvent, EventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HAR format version written
pub const HAR_VERSION: &str = "1.2";

/// HAR root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Har {
    /// Log
    pub log: HarLog,
}

/// HAR log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarLog {
    /// Format version
    pub version: String,
    /// Producing tool
    pub creator: HarCreator,
    /// Entries in request order
    pub entries: Vec<HarEntry>,
}

/// Tool that produced the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarCreator {
    /// Name
    pub name: String,
    /// Version
    pub version: String,
}

/// One request/response exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
    /// Request start, ISO 8601
    pub started_date_time: String,
    /// Total time in milliseconds, -1 if unknown
    pub time: i64,
    /// Request
    pub request: HarRequest,
    /// Response
    pub response: HarResponse,
    /// Cache info (always empty)
    pub cache: serde_json::Map<String, serde_json::Value>,
    /// Timings
    pub timings: HarTimings,
}

/// Name/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarNameValue {
    /// Name
    pub name: String,
    /// Value
    pub value: String,
}

/// Request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPostData {
    /// MIME type
    pub mime_type: String,
    /// Body text
    pub text: String,
}

/// Request half
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    /// Method
    pub method: String,
    /// URL
    pub url: String,
    /// Protocol
    pub http_version: String,
    /// Headers (not captured)
    pub headers: Vec<HarNameValue>,
    /// Parsed query string
    pub query_string: Vec<HarNameValue>,
    /// Body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_data: Option<HarPostData>,
    /// Header size, -1 if unknown
    pub headers_size: i64,
    /// Body size, -1 if unknown
    pub body_size: i64,
}

/// Response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
    /// Size in bytes
    pub size: i64,
    /// MIME type
    pub mime_type: String,
    /// Body text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Response half
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
    /// Status, 0 if no response was seen
    pub status: u16,
    /// Status text
    pub status_text: String,
    /// Protocol
    pub http_version: String,
    /// Headers (not captured)
    pub headers: Vec<HarNameValue>,
    /// Body
    pub content: HarContent,
    /// Redirect target
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    /// Header size, -1 if unknown
    pub headers_size: i64,
    /// Body size, -1 if unknown
    pub body_size: i64,
}

/// Phase timings in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarTimings {
    /// Sending
    pub send: i64,
    /// Waiting for the first byte
    pub wait: i64,
    /// Receiving
    pub receive: i64,
}

/// Build a HAR from recorded events.
///
/// Requests are paired with responses by transport request id. Responses
/// without a recorded request still produce an entry from the request body
/// they carry; requests that never got a response get status 0.
#[must_use]
pub fn export(events: &[CapturedEvent]) -> Har {
    let mut entries: Vec<(u64, HarEntry)> = Vec::new();
    let mut pending: HashMap<String, usize> = HashMap::new();

    for event in events {
        match event.kind {
            EventKind::Request => {
                let index = entries.len();
                entries.push((event.timestamp_ms, unanswered(event)));
                if let Some(id) = &event.request_id {
                    let _ = pending.insert(id.clone(), index);
                }
            }
            EventKind::Response => {
                let paired = event
                    .request_id
                    .as_ref()
                    .and_then(|id| pending.remove(id));
                match paired {
                    Some(index) => {
                        let (started, entry) = &mut entries[index];
                        answer(entry, *started, event);
                    }
                    None => {
                        let started = event.request_timestamp_ms.unwrap_or(event.timestamp_ms);
                        let mut entry = unanswered(event);
                        entry.started_date_time = iso_time(started);
                        entry.request.post_data = event.request_body.as_deref().map(post_data);
                        entry.request.body_size = body_size(event.request_body.as_deref());
                        answer(&mut entry, started, event);
                        entries.push((started, entry));
                    }
                }
            }
        }
    }

    entries.sort_by_key(|(started, _)| *started);
    Har {
        log: HarLog {
            version: HAR_VERSION.to_string(),
            creator: HarCreator {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            entries: entries.into_iter().map(|(_, entry)| entry).collect(),
        },
    }
}

fn unanswered(event: &CapturedEvent) -> HarEntry {
    let body = match event.kind {
        EventKind::Request => event.body.as_deref(),
        EventKind::Response => None,
    };
    HarEntry {
        started_date_time: iso_time(event.timestamp_ms),
        time: -1,
        request: HarRequest {
            method: event.method.as_str().to_string(),
            url: event.url.clone(),
            http_version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            query_string: query_string(&event.url),
            post_data: body.map(post_data),
            headers_size: -1,
            body_size: body_size(body),
        },
        response: HarResponse {
            status: 0,
            status_text: String::new(),
            http_version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            content: HarContent {
                size: 0,
                mime_type: String::new(),
                text: None,
            },
            redirect_url: String::new(),
            headers_size: -1,
            body_size: -1,
        },
        cache: serde_json::Map::new(),
        timings: HarTimings {
            send: 0,
            wait: -1,
            receive: 0,
        },
    }
}

fn answer(entry: &mut HarEntry, started_ms: u64, response: &CapturedEvent) {
    let elapsed = i64::try_from(response.timestamp_ms.saturating_sub(started_ms)).unwrap_or(i64::MAX);
    let text = response.body.clone();
    entry.time = elapsed;
    entry.timings.wait = elapsed;
    entry.response.status = response.status.unwrap_or(0);
    entry.response.content = HarContent {
        size: body_size(text.as_deref()).max(0),
        mime_type: mime_for(text.as_deref()).to_string(),
        text,
    };
    entry.response.body_size = body_size(response.body.as_deref());
}

fn post_data(body: &str) -> HarPostData {
    HarPostData {
        mime_type: mime_for(Some(body)).to_string(),
        text: body.to_string(),
    }
}

fn body_size(body: Option<&str>) -> i64 {
    body.map_or(-1, |b| i64::try_from(b.len()).unwrap_or(i64::MAX))
}

fn mime_for(body: Option<&str>) -> &'static str {
    match body {
        Some(b) if serde_json::from_str::<serde_json::Value>(b).is_ok() => "application/json",
        Some(_) => "text/plain",
        None => "",
    }
}

fn query_string(url: &str) -> Vec<HarNameValue> {
    let Some((_, query)) = url.split_once('?') else {
        return Vec::new();
    };
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            HarNameValue {
                name: name.to_string(),
                value: value.to_string(),
            }
        })
        .collect()
}

fn iso_time(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
