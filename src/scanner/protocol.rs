//! Scanner wire protocol: line-oriented JSON over stdin/stdout.
//!
//! One command per line, one response per command, FIFO. Responses are
//! `{status: "ok", ...}` or `{status: "error", error, detail}`.

use serde::{Deserialize, Serialize};

use super::ScannerError;

/// A command written to the scanner's stdin as one JSON line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ScannerCommand {
    Scan {
        token: String,
        drive_id: String,
        folder_path: String,
    },
    DiffHashes {
        token: String,
        known: Vec<KnownFile>,
    },
    Fetch {
        token: String,
        drive_id: String,
        item_id: String,
    },
    HashLocal {
        path: String,
    },
}

impl ScannerCommand {
    /// Idempotent commands get one retry after a transport failure;
    /// `fetch` does not.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Self::Fetch { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Scan { .. } => "scan",
            Self::DiffHashes { .. } => "diff_hashes",
            Self::Fetch { .. } => "fetch",
            Self::HashLocal { .. } => "hash_local",
        }
    }
}

/// One entry of the store's knowledge sent to `diff_hashes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownFile {
    pub id: String,
    pub drive_id: String,
    pub item_id: String,
    pub hash: String,
}

/// A remote file listed by `scan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteItem {
    pub item_id: String,
    pub drive_id: String,
    pub name: String,
    pub size: u64,
    pub modified_at: String,
    /// Absent when the remote store has not computed a content hash;
    /// diffing treats such files as changed.
    pub sha256: Option<String>,
    pub quick_xor: Option<String>,
    pub web_url: Option<String>,
}

/// One entry of a `diff_hashes` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffEntry {
    pub id: String,
    pub item_id: String,
    #[serde(default)]
    pub old_hash: Option<String>,
    #[serde(default)]
    pub new_hash: Option<String>,
}

/// `diff_hashes` classification of the known set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffOutcome {
    #[serde(default)]
    pub changed: Vec<DiffEntry>,
    #[serde(default)]
    pub unchanged: Vec<DiffEntry>,
    #[serde(default)]
    pub missing: Vec<DiffEntry>,
}

/// `fetch` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchPayload {
    pub sha256: String,
    pub size: u64,
    pub content_base64: String,
}

/// `scan` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanPayload {
    pub items: Vec<RemoteItem>,
}

/// `hash_local` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct HashLocalPayload {
    pub sha256: String,
}

/// Envelope every response line parses into first.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

/// Parse one response line into its typed payload.
pub fn parse_response<T: serde::de::DeserializeOwned>(line: &str) -> Result<T, ScannerError> {
    let envelope: ResponseEnvelope = serde_json::from_str(line)
        .map_err(|e| ScannerError::Protocol(format!("unparseable response line: {e}")))?;

    match envelope.status.as_str() {
        "ok" => serde_json::from_value(envelope.payload)
            .map_err(|e| ScannerError::Protocol(format!("payload shape mismatch: {e}"))),
        "error" => {
            let error = envelope.error.unwrap_or_else(|| "unknown".to_string());
            let detail = envelope.detail.unwrap_or_default();
            // Remote HTTP failures are reported as "remote_api:<status>".
            if let Some(status) = error
                .strip_prefix("remote_api:")
                .and_then(|s| s.parse::<u16>().ok())
            {
                return Err(ScannerError::RemoteApi { status, detail });
            }
            Err(ScannerError::Command { error, detail })
        }
        other => Err(ScannerError::Protocol(format!(
            "unknown response status '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_serialise_with_cmd_tag() {
        let cmd = ScannerCommand::Scan {
            token: "tok".into(),
            drive_id: "d1".into(),
            folder_path: "/Contracts".into(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"cmd\":\"scan\""));
        assert!(json.contains("\"folder_path\":\"/Contracts\""));
    }

    #[test]
    fn fetch_is_not_idempotent() {
        let fetch = ScannerCommand::Fetch {
            token: "t".into(),
            drive_id: "d".into(),
            item_id: "i".into(),
        };
        assert!(!fetch.is_idempotent());

        let diff = ScannerCommand::DiffHashes {
            token: "t".into(),
            known: vec![],
        };
        assert!(diff.is_idempotent());
    }

    #[test]
    fn ok_scan_response_parses() {
        let line = r#"{"status":"ok","items":[{"item_id":"i1","drive_id":"d1",
            "name":"Koch_FOB_2026.docx","size":145320,"modified_at":"2026-03-01T10:00:00Z",
            "sha256":"a1b2","quick_xor":null,"web_url":"https://example/f"}]}"#
            .replace('\n', "");
        let payload: ScanPayload = parse_response(&line).unwrap();
        assert_eq!(payload.items.len(), 1);
        assert_eq!(payload.items[0].name, "Koch_FOB_2026.docx");
        assert_eq!(payload.items[0].size, 145_320);
    }

    #[test]
    fn missing_sha256_deserialises_as_none() {
        let line = r#"{"status":"ok","items":[{"item_id":"i1","drive_id":"d1",
            "name":"x.pdf","size":10,"modified_at":"2026-03-01T10:00:00Z"}]}"#
            .replace('\n', "");
        let payload: ScanPayload = parse_response(&line).unwrap();
        assert!(payload.items[0].sha256.is_none());
    }

    #[test]
    fn diff_response_parses() {
        let line = r#"{"status":"ok",
            "changed":[{"id":"c42","item_id":"i42","old_hash":"d3","new_hash":"ef"}],
            "unchanged":[{"id":"c1","item_id":"i1"}],
            "missing":[]}"#
            .replace('\n', "");
        let outcome: DiffOutcome = parse_response(&line).unwrap();
        assert_eq!(outcome.changed.len(), 1);
        assert_eq!(outcome.changed[0].old_hash.as_deref(), Some("d3"));
        assert_eq!(outcome.unchanged.len(), 1);
        assert!(outcome.missing.is_empty());
    }

    #[test]
    fn error_response_maps_to_command_error() {
        let err =
            parse_response::<ScanPayload>(r#"{"status":"error","error":"forbidden","detail":"no access"}"#)
                .unwrap_err();
        match err {
            ScannerError::Command { error, detail } => {
                assert_eq!(error, "forbidden");
                assert_eq!(detail, "no access");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn remote_api_error_carries_status() {
        let err = parse_response::<ScanPayload>(
            r#"{"status":"error","error":"remote_api:429","detail":"throttled"}"#,
        )
        .unwrap_err();
        match err {
            ScannerError::RemoteApi { status, .. } => assert_eq!(status, 429),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn garbage_line_is_protocol_error() {
        let err = parse_response::<ScanPayload>("not json at all").unwrap_err();
        assert!(matches!(err, ScannerError::Protocol(_)));
    }
}
