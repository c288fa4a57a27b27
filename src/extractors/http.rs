//! Network-facing extractors: HTTP status errors, connection failures
//! and DNS resolution failures.

use super::{inherit_event_context, SignalExtractor};
use crate::models::{ExecutionEvent, FailureSignal, SignalType};
use regex::Regex;

const HTTP_CONFIDENCE: f64 = 0.85;
const CONNECTION_CONFIDENCE: f64 = 0.9;
const DNS_CONFIDENCE: f64 = 0.9;

pub struct HttpErrorExtractor {
    status_in_context: Regex,
    method_url: Regex,
}

impl HttpErrorExtractor {
    pub fn new() -> Self {
        Self {
            status_in_context: Regex::new(
                r"(?i)(?:status(?:\s+code)?|http/[\d.]+|returned|response)\D{0,10}\b(?P<status>[45]\d{2})\b",
            )
            .unwrap(),
            method_url: Regex::new(
                r"\b(?P<method>GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)\b\s+(?P<url>https?://\S+|/\S+)",
            )
            .unwrap(),
        }
    }

    fn status_of(&self, event: &ExecutionEvent) -> Option<String> {
        if let Some(status) = event.metadata.get("http_status") {
            let parsed: u16 = status.parse().ok()?;
            if parsed >= 400 {
                return Some(status.clone());
            }
            return None;
        }
        self.status_in_context
            .captures(&event.message)
            .map(|c| c["status"].to_string())
    }
}

impl Default for HttpErrorExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalExtractor for HttpErrorExtractor {
    fn name(&self) -> &'static str {
        "http_error"
    }

    fn extract(&self, events: &[ExecutionEvent]) -> Vec<FailureSignal> {
        let mut signals = Vec::new();
        for event in events {
            let Some(status) = self.status_of(event) else {
                continue;
            };

            let mut signal =
                FailureSignal::new(SignalType::HttpError, event.message.clone(), HTTP_CONFIDENCE)
                    .with_pattern("http.status")
                    .with_metadata("http_status", status);
            if let Some(method) = event.metadata.get("http_method") {
                signal = signal.with_metadata("http_method", method.clone());
            }
            if let Some(url) = event.metadata.get("http_url") {
                signal = signal.with_metadata("http_url", url.clone());
            }
            if let Some(caps) = self.method_url.captures(&event.message) {
                signal = signal
                    .with_metadata("http_method", caps["method"].to_string())
                    .with_metadata("http_url", caps["url"].to_string());
            }
            signals.push(inherit_event_context(signal, event));
        }
        signals
    }
}

pub struct ConnectionErrorExtractor {
    keywords: Vec<&'static str>,
}

impl ConnectionErrorExtractor {
    pub fn new() -> Self {
        Self {
            keywords: vec![
                "connection refused",
                "connection reset",
                "econnrefused",
                "econnreset",
                "socket closed",
                "socket hang up",
                "broken pipe",
                "connection aborted",
            ],
        }
    }
}

impl Default for ConnectionErrorExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalExtractor for ConnectionErrorExtractor {
    fn name(&self) -> &'static str {
        "connection_error"
    }

    fn extract(&self, events: &[ExecutionEvent]) -> Vec<FailureSignal> {
        let mut signals = Vec::new();
        for event in events {
            let lowered = event.message.to_lowercase();
            let matched: Vec<&str> = self
                .keywords
                .iter()
                .copied()
                .filter(|k| lowered.contains(k))
                .collect();
            if matched.is_empty() {
                continue;
            }
            let mut signal = FailureSignal::new(
                SignalType::ConnectionError,
                event.message.clone(),
                CONNECTION_CONFIDENCE,
            )
            .with_pattern("connection.keyword");
            for keyword in matched {
                signal = signal.with_keyword(keyword);
            }
            signals.push(inherit_event_context(signal, event));
        }
        signals
    }
}

pub struct DnsErrorExtractor {
    keywords: Vec<&'static str>,
}

impl DnsErrorExtractor {
    pub fn new() -> Self {
        Self {
            keywords: vec![
                "name resolution",
                "getaddrinfo",
                "unknown host",
                "unknownhostexception",
                "nodename nor servname",
                "dns lookup failed",
            ],
        }
    }
}

impl Default for DnsErrorExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalExtractor for DnsErrorExtractor {
    fn name(&self) -> &'static str {
        "dns_error"
    }

    fn extract(&self, events: &[ExecutionEvent]) -> Vec<FailureSignal> {
        let mut signals = Vec::new();
        for event in events {
            let lowered = event.message.to_lowercase();
            let matched: Vec<&str> = self
                .keywords
                .iter()
                .copied()
                .filter(|k| lowered.contains(k))
                .collect();
            if matched.is_empty() {
                continue;
            }
            let mut signal = FailureSignal::new(
                SignalType::DnsError,
                event.message.clone(),
                DNS_CONFIDENCE,
            )
            .with_pattern("dns.keyword");
            for keyword in matched {
                signal = signal.with_keyword(keyword);
            }
            signals.push(inherit_event_context(signal, event));
        }
        signals
    }
}
