//! DNS lookups used by domain verification

use crate::error::DnsError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub type DnsResult<T> = Result<T, DnsError>;

/// TXT and CNAME lookups returning zero or more strings
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn lookup_txt(&self, name: &str) -> DnsResult<Vec<String>>;

    async fn lookup_cname(&self, name: &str) -> DnsResult<Vec<String>>;
}

/// Resolver answering from fixed tables. Unknown names are NXDOMAIN.
#[derive(Debug, Default)]
pub struct StaticResolver {
    txt: Arc<RwLock<HashMap<String, Vec<String>>>>,
    cname: Arc<RwLock<HashMap<String, Vec<String>>>>,
    txt_lookups: AtomicUsize,
    cname_lookups: AtomicUsize,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_txt(&self, name: &str, records: Vec<String>) {
        self.txt.write().await.insert(name.to_ascii_lowercase(), records);
    }

    pub async fn set_cname(&self, name: &str, target: &str) {
        self.cname
            .write()
            .await
            .insert(name.to_ascii_lowercase(), vec![target.to_string()]);
    }

    pub fn txt_lookups(&self) -> usize {
        self.txt_lookups.load(Ordering::SeqCst)
    }

    pub fn cname_lookups(&self) -> usize {
        self.cname_lookups.load(Ordering::SeqCst)
    }

    async fn answer(
        table: &RwLock<HashMap<String, Vec<String>>>,
        name: &str,
    ) -> DnsResult<Vec<String>> {
        table
            .read()
            .await
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| DnsError::NxDomain(name.to_string()))
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn lookup_txt(&self, name: &str) -> DnsResult<Vec<String>> {
        self.txt_lookups.fetch_add(1, Ordering::SeqCst);
        Self::answer(&self.txt, name).await
    }

    async fn lookup_cname(&self, name: &str) -> DnsResult<Vec<String>> {
        self.cname_lookups.fetch_add(1, Ordering::SeqCst);
        Self::answer(&self.cname, name).await
    }
}

const RCODE_NXDOMAIN: u32 = 3;
const TYPE_CNAME: u16 = 5;
const TYPE_TXT: u16 = 16;

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

/// DNS-over-HTTPS resolver speaking the `application/dns-json` format
pub struct DohResolver {
    client: Client,
    endpoint: String,
}

impl DohResolver {
    pub fn new(endpoint: &str) -> DnsResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DnsError::Lookup {
                name: endpoint.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    async fn query(&self, name: &str, record_type: u16) -> DnsResult<Vec<String>> {
        let lookup_error = |e: reqwest::Error| DnsError::Lookup {
            name: name.to_string(),
            message: e.to_string(),
        };

        let type_param = match record_type {
            TYPE_TXT => "TXT",
            _ => "CNAME",
        };
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", name), ("type", type_param)])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await
            .map_err(lookup_error)?
            .error_for_status()
            .map_err(lookup_error)?;

        let body: DohResponse = response
            .json()
            .await
            .map_err(|e| DnsError::InvalidResponse(e.to_string()))?;

        parse_answers(name, body, record_type)
    }
}

fn parse_answers(name: &str, body: DohResponse, record_type: u16) -> DnsResult<Vec<String>> {
    match body.status {
        0 => {}
        RCODE_NXDOMAIN => return Err(DnsError::NxDomain(name.to_string())),
        rcode => {
            return Err(DnsError::Lookup {
                name: name.to_string(),
                message: format!("rcode {rcode}"),
            })
        }
    }

    Ok(body
        .answer
        .into_iter()
        .filter(|a| a.record_type == record_type)
        .map(|a| match record_type {
            TYPE_TXT => unquote_txt(&a.data),
            _ => a.data,
        })
        .collect())
}

/// Join the quoted character-strings of a TXT record
fn unquote_txt(data: &str) -> String {
    let trimmed = data.trim();
    if !trimmed.starts_with('"') {
        return trimmed.to_string();
    }
    trimmed
        .split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, s)| s)
        .collect()
}

#[async_trait]
impl DnsResolver for DohResolver {
    async fn lookup_txt(&self, name: &str) -> DnsResult<Vec<String>> {
        self.query(name, TYPE_TXT).await
    }

    async fn lookup_cname(&self, name: &str) -> DnsResult<Vec<String>> {
        self.query(name, TYPE_CNAME).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver() {
        let dns = StaticResolver::new();
        dns.set_txt("_verify.example.com", vec!["ferry-verify=abc".into()])
            .await;
        dns.set_cname("Example.com", "app.svc.example.net.").await;

        assert_eq!(
            dns.lookup_txt("_verify.example.com").await.unwrap(),
            vec!["ferry-verify=abc".to_string()]
        );
        assert_eq!(
            dns.lookup_cname("example.com").await.unwrap(),
            vec!["app.svc.example.net.".to_string()]
        );
        assert_eq!(
            dns.lookup_txt("missing.example.com").await,
            Err(DnsError::NxDomain("missing.example.com".into()))
        );
        assert_eq!(dns.txt_lookups(), 2);
        assert_eq!(dns.cname_lookups(), 1);
    }

    #[test]
    fn test_unquote_txt() {
        assert_eq!(unquote_txt("\"ferry-verify=abc\""), "ferry-verify=abc");
        assert_eq!(unquote_txt("\"part one \" \"part two\""), "part one part two");
        assert_eq!(unquote_txt("bare"), "bare");
    }

    #[test]
    fn test_parse_doh_answers() {
        let body: DohResponse = serde_json::from_str(
            r#"{
                "Status": 0,
                "Answer": [
                    {"name": "example.com.", "type": 5, "TTL": 300, "data": "app.svc.example.net."},
                    {"name": "app.svc.example.net.", "type": 1, "TTL": 300, "data": "10.0.0.1"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            parse_answers("example.com", body, TYPE_CNAME).unwrap(),
            vec!["app.svc.example.net.".to_string()]
        );

        let nx: DohResponse = serde_json::from_str(r#"{"Status": 3}"#).unwrap();
        assert!(matches!(
            parse_answers("nope.example", nx, TYPE_TXT),
            Err(DnsError::NxDomain(_))
        ));

        let servfail: DohResponse = serde_json::from_str(r#"{"Status": 2}"#).unwrap();
        assert!(matches!(
            parse_answers("x.example", servfail, TYPE_TXT),
            Err(DnsError::Lookup { .. })
        ));
    }
}
