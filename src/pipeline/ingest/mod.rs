//! Ingestor: scan → fetch → extract → parse → version.
//!
//! Two scan modes plus a manual upload path, all funnelling into the
//! same per-file pipeline. File processing is pipelined with a bounded
//! in-flight count; one file's failure never cancels the others, it
//! lands in the scan summary instead.

pub mod crosscheck;
pub mod llm;

pub use crosscheck::{crosscheck, CrosscheckReport};
pub use llm::{HttpLlmClient, LlmClient, LlmConfig, LlmError, LlmExtraction};

use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use sha2::Digest;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::models::{
    Contract, CounterpartyType, Direction, Incoterm, Provenance, ReviewStatus, SourceFormat,
    TemplateType, TermType, VerificationStatus,
};
use crate::persist::PersistAdapter;
use crate::pipeline::extraction::{DocumentExtractor, ExtractError};
use crate::pipeline::parsing::{ClauseParser, ParseOutput};
use crate::registry::TemplateRegistry;
use crate::scanner::{RemoteItem, ScannerClient, ScannerError};
use crate::store::{ContractStore, IngestOutcome, StoreError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Scanner(#[from] ScannerError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("persist write failed: {0}")]
    Persist(String),
}

/// Scan configuration for one watched folder.
#[derive(Debug, Clone)]
pub struct IngestorConfig {
    pub drive_id: String,
    pub folder_path: String,
    /// Product group this folder belongs to.
    pub product_group: String,
    /// Bounded in-flight count for per-file processing.
    pub max_in_flight: usize,
}

impl IngestorConfig {
    pub fn new(drive_id: &str, folder_path: &str, product_group: &str) -> Self {
        Self {
            drive_id: drive_id.to_string(),
            folder_path: folder_path.to_string(),
            product_group: product_group.to_string(),
            max_in_flight: 4,
        }
    }
}

/// Manual upload input, bypassing the scanner.
#[derive(Debug, Clone)]
pub struct ManualIngest {
    pub counterparty: String,
    pub counterparty_type: CounterpartyType,
    pub product_group: String,
    pub source_file_bytes: Vec<u8>,
    pub source_file_name: String,
    pub contract_number: Option<String>,
    pub company: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
}

/// Per-scan aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub new_files: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub missing: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// The orchestrator. Cheap to clone; scans spawn per-file tasks over
/// clones of the shared handles.
#[derive(Clone)]
pub struct Ingestor {
    scanner: Arc<ScannerClient>,
    store: Arc<ContractStore>,
    extractor: Arc<DocumentExtractor>,
    parser: ClauseParser,
    registry: TemplateRegistry,
    llm: Option<Arc<dyn LlmClient>>,
    persist: Option<PersistAdapter>,
    config: IngestorConfig,
}

impl Ingestor {
    pub fn new(
        scanner: Arc<ScannerClient>,
        store: Arc<ContractStore>,
        extractor: Arc<DocumentExtractor>,
        registry: TemplateRegistry,
        config: IngestorConfig,
    ) -> Self {
        Self {
            scanner,
            store,
            extractor,
            parser: ClauseParser::new(registry.clone()),
            registry,
            llm: None,
            persist: None,
            config,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_persist(mut self, persist: PersistAdapter) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Full scan: list the folder, classify against the store, ingest
    /// new and changed files, verify the rest.
    pub async fn full_scan(&self) -> Result<ScanSummary, IngestError> {
        let started = Instant::now();
        let items = self
            .scanner
            .scan(&self.config.drive_id, &self.config.folder_path)
            .await?;

        let mut summary = ScanSummary::default();
        let mut to_process: Vec<(RemoteItem, Option<Contract>)> = Vec::new();

        for item in items {
            match self.store.find_by_remote_item(&item.item_id) {
                Some(existing)
                    if item.sha256.as_deref() == Some(existing.provenance.file_hash.as_str()) =>
                {
                    summary.unchanged += 1;
                    self.store.update_verification(
                        &existing.contract_id,
                        VerificationStatus::Verified,
                        Utc::now(),
                    )?;
                }
                Some(existing) => {
                    summary.changed += 1;
                    to_process.push((item, Some(existing)));
                }
                None => {
                    // The item may be a moved or renamed copy of known
                    // content.
                    let by_hash = item
                        .sha256
                        .as_deref()
                        .and_then(|h| self.store.find_by_file_hash(h));
                    match by_hash {
                        Some(existing) => {
                            summary.unchanged += 1;
                            self.store.update_verification(
                                &existing.contract_id,
                                VerificationStatus::Verified,
                                Utc::now(),
                            )?;
                        }
                        None => {
                            summary.new_files += 1;
                            to_process.push((item, None));
                        }
                    }
                }
            }
        }

        self.process_files(to_process, &mut summary).await;
        summary.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            new = summary.new_files,
            changed = summary.changed,
            unchanged = summary.unchanged,
            errors = summary.errors.len(),
            "full scan complete"
        );
        Ok(summary)
    }

    /// Delta scan: hash-diff the store's knowledge against the remote
    /// using metadata only, then fetch just the changes.
    pub async fn delta_scan(&self) -> Result<ScanSummary, IngestError> {
        let started = Instant::now();
        let known = self.store.known_files();
        if known.is_empty() {
            return Ok(ScanSummary {
                duration_ms: started.elapsed().as_millis() as u64,
                ..ScanSummary::default()
            });
        }

        let outcome = self.scanner.diff_hashes(known).await?;
        let mut summary = ScanSummary::default();

        for entry in &outcome.unchanged {
            summary.unchanged += 1;
            if let Err(e) =
                self.store
                    .update_verification(&entry.id, VerificationStatus::Verified, Utc::now())
            {
                summary.errors.push(format!("{}: {e}", entry.id));
            }
        }

        // A missing file keeps its contract, flagged until operations
        // decides otherwise.
        for entry in &outcome.missing {
            summary.missing += 1;
            if let Err(e) = self.store.update_verification(
                &entry.id,
                VerificationStatus::FileNotFound,
                Utc::now(),
            ) {
                summary.errors.push(format!("{}: {e}", entry.id));
            }
        }

        let mut to_process: Vec<(RemoteItem, Option<Contract>)> = Vec::new();
        for entry in &outcome.changed {
            summary.changed += 1;
            match self.store.get(&entry.id) {
                Some(existing) => {
                    let item = RemoteItem {
                        item_id: entry.item_id.clone(),
                        drive_id: existing
                            .provenance
                            .remote_drive_id
                            .clone()
                            .unwrap_or_else(|| self.config.drive_id.clone()),
                        name: existing.provenance.source_file_name.clone(),
                        size: 0,
                        modified_at: String::new(),
                        sha256: entry.new_hash.clone(),
                        quick_xor: None,
                        web_url: None,
                    };
                    to_process.push((item, Some(existing)));
                }
                None => summary
                    .errors
                    .push(format!("{}: changed entry unknown to store", entry.id)),
            }
        }

        self.process_files(to_process, &mut summary).await;
        summary.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            changed = summary.changed,
            unchanged = summary.unchanged,
            missing = summary.missing,
            errors = summary.errors.len(),
            "delta scan complete"
        );
        Ok(summary)
    }

    /// Manual upload: same pipeline, caller supplies what the remote
    /// store would have.
    pub async fn ingest_manual(&self, input: ManualIngest) -> Result<IngestOutcome, IngestError> {
        let text = self
            .extractor
            .extract(&input.source_file_bytes, &input.source_file_name)?;
        let parse = self.parser.parse(&text);
        let llm_crosscheck = self.second_pass(&text, &parse).await;

        let sha256 = hex::encode(sha2::Sha256::digest(&input.source_file_bytes));
        let format = SourceFormat::from_file_name(&input.source_file_name)
            .ok_or_else(|| ExtractError::UnsupportedFormat(input.source_file_name.clone()))?;

        let mut contract = self.contract_from_parse(
            &parse,
            &input.counterparty,
            input.counterparty_type,
            &input.product_group,
        );
        contract.provenance = Provenance {
            source_file_name: input.source_file_name.clone(),
            source_format: format,
            file_size_bytes: input.source_file_bytes.len() as u64,
            file_hash: sha256,
            previous_hash: String::new(),
            remote_item_id: None,
            remote_drive_id: None,
            last_verified_at: None,
            verification_status: VerificationStatus::Unverified,
        };
        contract.contract_number = input.contract_number;
        contract.company = input.company;
        contract.effective_date = input.effective_date;
        contract.expiry_date = input.expiry_date;
        contract.llm_crosscheck = llm_crosscheck;

        let outcome = self.store.ingest(contract)?;
        self.write_through(&outcome).await?;
        Ok(outcome)
    }

    /// Run new/changed files through fetch → extract → parse → ingest
    /// with a bounded in-flight count. Individual failures are
    /// collected, never propagated.
    async fn process_files(
        &self,
        files: Vec<(RemoteItem, Option<Contract>)>,
        summary: &mut ScanSummary,
    ) {
        let limiter = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks: JoinSet<Result<(), String>> = JoinSet::new();

        for (item, existing) in files {
            let this = self.clone();
            let limiter = Arc::clone(&limiter);
            let name = item.name.clone();
            tasks.spawn(async move {
                let _permit = limiter.acquire_owned().await.map_err(|e| e.to_string())?;
                this.process_remote_file(item, existing)
                    .await
                    .map(|_| ())
                    .map_err(|e| format!("{name}: {e}"))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(message)) => summary.errors.push(message),
                Err(join_error) => summary.errors.push(format!("task failed: {join_error}")),
            }
        }
    }

    async fn process_remote_file(
        &self,
        item: RemoteItem,
        existing: Option<Contract>,
    ) -> Result<IngestOutcome, IngestError> {
        let content = self.scanner.fetch(&item.drive_id, &item.item_id).await?;
        let text = self.extractor.extract(&content.bytes, &item.name)?;
        let parse = self.parser.parse(&text);
        let llm_crosscheck = self.second_pass(&text, &parse).await;

        let format = SourceFormat::from_file_name(&item.name)
            .ok_or_else(|| ExtractError::UnsupportedFormat(item.name.clone()))?;

        let mut contract = match &existing {
            // A changed file keeps the commercial identity of the
            // version it replaces.
            Some(prior) => {
                let mut c = self.contract_from_parse(
                    &parse,
                    &prior.counterparty,
                    prior.counterparty_type,
                    &prior.product_group,
                );
                c.contract_number = prior.contract_number.clone();
                c.company = prior.company.clone();
                c.effective_date = prior.effective_date;
                c.expiry_date = prior.expiry_date;
                if c.incoterm.is_none() {
                    c.incoterm = prior.incoterm;
                }
                c
            }
            None => {
                let counterparty = derive_counterparty(&item.name);
                self.contract_from_parse(
                    &parse,
                    &counterparty,
                    CounterpartyType::Supplier,
                    &self.config.product_group,
                )
            }
        };

        contract.provenance = Provenance {
            source_file_name: item.name.clone(),
            source_format: format,
            file_size_bytes: content.bytes.len() as u64,
            file_hash: content.sha256.clone(),
            previous_hash: String::new(),
            remote_item_id: Some(item.item_id.clone()),
            remote_drive_id: Some(item.drive_id.clone()),
            last_verified_at: Some(Utc::now()),
            verification_status: VerificationStatus::Verified,
        };
        contract.llm_crosscheck = llm_crosscheck;

        let outcome = self.store.ingest(contract)?;
        self.write_through(&outcome).await?;
        Ok(outcome)
    }

    /// Optional LLM second pass; failures surface as a warning in the
    /// log, never as an ingest failure.
    async fn second_pass(&self, text: &str, parse: &ParseOutput) -> Option<serde_json::Value> {
        let llm = self.llm.as_ref()?;

        let snapshot = self.registry.snapshot();
        let inventory: Vec<&str> = snapshot
            .canonical_clauses()
            .keys()
            .map(|k| k.as_str())
            .collect();
        let families: Vec<&str> = snapshot
            .family_signatures()
            .keys()
            .map(|k| k.as_str())
            .collect();

        match llm
            .extract(text, &inventory.join(", "), &families.join(", "))
            .await
        {
            Ok(extraction) => {
                let report =
                    crosscheck(&parse.clauses, parse.family_id.as_deref(), &extraction);
                Some(report.to_json())
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM second pass failed; deterministic parse stands alone");
                None
            }
        }
    }

    /// Classification and content from a parse.
    fn contract_from_parse(
        &self,
        parse: &ParseOutput,
        counterparty: &str,
        counterparty_type: CounterpartyType,
        product_group: &str,
    ) -> Contract {
        let snapshot = self.registry.snapshot();

        let incoterm = parse
            .clauses
            .iter()
            .find(|c| c.clause_id == "INCOTERMS")
            .and_then(|c| c.extracted_fields.get("incoterm"))
            .and_then(|v| v.as_text())
            .and_then(|code| code.parse::<Incoterm>().ok());

        let family = parse
            .family_id
            .as_deref()
            .and_then(|id| snapshot.family_signatures().get(id));
        let term_type = family.map(|f| f.term_type).unwrap_or(TermType::Spot);
        let direction = family.map(|f| f.direction).unwrap_or(match counterparty_type {
            CounterpartyType::Supplier => Direction::Buy,
            CounterpartyType::Customer => Direction::Sell,
        });
        let template_type = match (direction, term_type) {
            (Direction::Buy, TermType::LongTerm) => TemplateType::Purchase,
            (Direction::Buy, TermType::Spot) => TemplateType::SpotPurchase,
            (Direction::Sell, TermType::LongTerm) => TemplateType::Sale,
            (Direction::Sell, TermType::Spot) => TemplateType::SpotSale,
        };
        let incoterm = incoterm.or_else(|| family.and_then(|f| f.default_incoterms.first().copied()));

        Contract {
            contract_id: Uuid::new_v4().to_string(),
            version: 0,
            provenance: Provenance {
                source_file_name: String::new(),
                source_format: SourceFormat::Txt,
                file_size_bytes: 0,
                file_hash: String::new(),
                previous_hash: String::new(),
                remote_item_id: None,
                remote_drive_id: None,
                last_verified_at: None,
                verification_status: VerificationStatus::Unverified,
            },
            template_type,
            incoterm,
            family_id: parse.family_id.clone(),
            term_type,
            company: None,
            contract_number: None,
            effective_date: None,
            expiry_date: None,
            counterparty: counterparty.to_string(),
            counterparty_type,
            product_group: product_group.to_string(),
            open_position: None,
            status: ReviewStatus::Draft,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            sap_validated: false,
            sap_discrepancies: Vec::new(),
            clauses: parse.clauses.clone(),
            parse_warnings: parse.warnings.iter().map(|w| w.to_string()).collect(),
            llm_crosscheck: None,
            ingested_at: Utc::now(),
        }
    }

    /// Durability before the outcome is handed back.
    async fn write_through(&self, outcome: &IngestOutcome) -> Result<(), IngestError> {
        let Some(persist) = &self.persist else {
            return Ok(());
        };
        let id = match outcome {
            IngestOutcome::Created { contract_id, .. } => contract_id,
            IngestOutcome::Unchanged { contract_id } => contract_id,
        };
        if let Some(contract) = self.store.get(id) {
            persist
                .record_contract(contract)
                .await
                .map_err(|e| IngestError::Persist(e.to_string()))?;
        }
        Ok(())
    }
}

/// Counterparty from the desk's file naming convention: leading tokens
/// up to the first incoterm code or year.
fn derive_counterparty(file_name: &str) -> String {
    let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(file_name);
    let words: Vec<&str> = stem
        .split(['_', '-', ' '])
        .take_while(|token| {
            let upper = token.to_ascii_uppercase();
            let is_incoterm = upper.parse::<Incoterm>().is_ok();
            let is_year = token.len() == 4 && token.chars().all(|c| c.is_ascii_digit());
            !is_incoterm && !is_year && !token.is_empty()
        })
        .collect();
    if words.is_empty() {
        stem.to_string()
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::token::{BearerToken, TokenSource};
    use crate::scanner::{ScannerConfig, TokenProvider};
    use async_trait::async_trait;
    use base64::Engine;

    const CONTRACT_TEXT: &str = "\
1. Product and Specifications
Anhydrous ammonia, minimum 99.5 percent purity.

2. Quantity Tolerance
40,000 MT +/- 10 percent at seller's option.

3. Delivery Term
FOB Donaldsonville, Incoterms 2020.

5. Price
US$ 335/MT FOB Donaldsonville.

6. Payment
Net 30 days from bill of lading date.";

    struct StaticToken;

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn fetch(&self) -> Result<BearerToken, ScannerError> {
            Ok(BearerToken {
                access_token: "tok".into(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            })
        }
    }

    /// A scanner fake: scan lists one docx-named txt file; fetch serves
    /// its bytes. Implemented as a shell script speaking the real wire
    /// protocol.
    fn fake_scanner_script(content: &str) -> String {
        let b64 = base64::engine::general_purpose::STANDARD.encode(content.as_bytes());
        let sha = hex::encode(sha2::Sha256::digest(content.as_bytes()));
        let size = content.len();
        format!(
            r#"while read -r line; do
                case "$line" in
                  *'"cmd":"scan"'*)
                    printf '%s\n' '{{"status":"ok","items":[{{"item_id":"i1","drive_id":"d1","name":"Koch_FOB_2026.txt","size":{size},"modified_at":"2026-03-01T10:00:00Z","sha256":"{sha}","quick_xor":null,"web_url":null}}]}}' ;;
                  *'"cmd":"fetch"'*)
                    printf '%s\n' '{{"status":"ok","sha256":"{sha}","size":{size},"content_base64":"{b64}"}}' ;;
                  *'"cmd":"diff_hashes"'*)
                    printf '%s\n' '{{"status":"ok","changed":[],"unchanged":[],"missing":[]}}' ;;
                  *) printf '%s\n' '{{"status":"error","error":"unknown","detail":""}}' ;;
                esac
            done"#
        )
    }

    fn scanner_for(script: String) -> Arc<ScannerClient> {
        let mut config = ScannerConfig::new("/bin/sh");
        config.args = vec!["-c".into(), script];
        config.command_timeout = std::time::Duration::from_secs(5);
        Arc::new(ScannerClient::new(
            config,
            Arc::new(TokenProvider::new(Arc::new(StaticToken))),
        ))
    }

    fn ingestor_with(script: String) -> (Arc<Ingestor>, Arc<ContractStore>) {
        let store = Arc::new(ContractStore::new());
        let ingestor = Arc::new(Ingestor::new(
            scanner_for(script),
            store.clone(),
            Arc::new(DocumentExtractor::new()),
            TemplateRegistry::seeded(),
            IngestorConfig::new("d1", "/Contracts/Ammonia", "ammonia"),
        ));
        (ingestor, store)
    }

    #[tokio::test]
    async fn full_scan_ingests_new_file() {
        let (ingestor, store) = ingestor_with(fake_scanner_script(CONTRACT_TEXT));

        let summary = ingestor.full_scan().await.unwrap();
        assert_eq!(summary.new_files, 1);
        assert_eq!(summary.changed, 0);
        assert!(summary.errors.is_empty(), "errors: {:?}", summary.errors);

        let contracts = store.list_by_product_group("ammonia");
        assert_eq!(contracts.len(), 1);
        let contract = &contracts[0];
        assert_eq!(contract.version, 1);
        assert_eq!(contract.counterparty, "Koch");
        assert_eq!(contract.incoterm, Some(Incoterm::Fob));
        assert_eq!(contract.provenance.previous_hash, "");
        assert!(contract
            .clauses
            .iter()
            .any(|c| c.clause_id == "PRICE" && c.value == Some(335.0)));
    }

    #[tokio::test]
    async fn rescan_of_same_content_verifies_not_reingests() {
        let (ingestor, store) = ingestor_with(fake_scanner_script(CONTRACT_TEXT));

        ingestor.full_scan().await.unwrap();
        let second = ingestor.full_scan().await.unwrap();

        assert_eq!(second.new_files, 0);
        assert_eq!(second.unchanged, 1);

        let contracts = store.list_by_product_group("ammonia");
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].version, 1);
        assert_eq!(
            contracts[0].provenance.verification_status,
            VerificationStatus::Verified
        );
        assert!(contracts[0].provenance.last_verified_at.is_some());
    }

    #[tokio::test]
    async fn delta_scan_empty_store_is_empty_summary() {
        let (ingestor, _) = ingestor_with(fake_scanner_script(CONTRACT_TEXT));
        let summary = ingestor.delta_scan().await.unwrap();
        assert_eq!(summary, ScanSummary { duration_ms: summary.duration_ms, ..Default::default() });
    }

    #[tokio::test]
    async fn delta_scan_all_unchanged_verifies_everything() {
        let (ingestor, store) = ingestor_with(fake_scanner_script(CONTRACT_TEXT));
        ingestor.full_scan().await.unwrap();

        let id = store.list_by_product_group("ammonia")[0].contract_id.clone();
        // diff_hashes reports everything unchanged via a dedicated fake.
        let unchanged_script = format!(
            r#"while read -r line; do
                printf '%s\n' '{{"status":"ok","changed":[],"unchanged":[{{"id":"{id}","item_id":"i1"}}],"missing":[]}}'
            done"#
        );
        let ingestor2 = Arc::new(Ingestor::new(
            scanner_for(unchanged_script),
            store.clone(),
            Arc::new(DocumentExtractor::new()),
            TemplateRegistry::seeded(),
            IngestorConfig::new("d1", "/Contracts/Ammonia", "ammonia"),
        ));

        let summary = ingestor2.delta_scan().await.unwrap();
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.changed, 0);
        assert_eq!(
            store.get(&id).unwrap().provenance.verification_status,
            VerificationStatus::Verified
        );
    }

    #[tokio::test]
    async fn delta_scan_missing_marks_file_not_found() {
        let (ingestor, store) = ingestor_with(fake_scanner_script(CONTRACT_TEXT));
        ingestor.full_scan().await.unwrap();
        let id = store.list_by_product_group("ammonia")[0].contract_id.clone();

        let missing_script = format!(
            r#"while read -r line; do
                printf '%s\n' '{{"status":"ok","changed":[],"unchanged":[],"missing":[{{"id":"{id}","item_id":"i1"}}]}}'
            done"#
        );
        let ingestor2 = Arc::new(Ingestor::new(
            scanner_for(missing_script),
            store.clone(),
            Arc::new(DocumentExtractor::new()),
            TemplateRegistry::seeded(),
            IngestorConfig::new("d1", "/Contracts/Ammonia", "ammonia"),
        ));

        let summary = ingestor2.delta_scan().await.unwrap();
        assert_eq!(summary.missing, 1);
        // Kept, not invalidated.
        assert_eq!(
            store.get(&id).unwrap().provenance.verification_status,
            VerificationStatus::FileNotFound
        );
    }

    #[tokio::test]
    async fn delta_scan_changed_creates_chained_version() {
        let (ingestor, store) = ingestor_with(fake_scanner_script(CONTRACT_TEXT));
        ingestor.full_scan().await.unwrap();
        let v1 = store.list_by_product_group("ammonia")[0].clone();
        let old_hash = v1.provenance.file_hash.clone();

        // The changed fake serves revised content for the same item.
        let revised = CONTRACT_TEXT.replace("US$ 335/MT", "US$ 355/MT");
        let revised_b64 = base64::engine::general_purpose::STANDARD.encode(revised.as_bytes());
        let revised_sha = hex::encode(sha2::Sha256::digest(revised.as_bytes()));
        let revised_len = revised.len();
        let id = v1.contract_id.clone();
        let changed_script = format!(
            r#"while read -r line; do
                case "$line" in
                  *'"cmd":"diff_hashes"'*)
                    printf '%s\n' '{{"status":"ok","changed":[{{"id":"{id}","item_id":"i1","old_hash":"{old_hash}","new_hash":"{revised_sha}"}}],"unchanged":[],"missing":[]}}' ;;
                  *'"cmd":"fetch"'*)
                    printf '%s\n' '{{"status":"ok","sha256":"{revised_sha}","size":{revised_len},"content_base64":"{revised_b64}"}}' ;;
                esac
            done"#
        );
        let ingestor2 = Arc::new(Ingestor::new(
            scanner_for(changed_script),
            store.clone(),
            Arc::new(DocumentExtractor::new()),
            TemplateRegistry::seeded(),
            IngestorConfig::new("d1", "/Contracts/Ammonia", "ammonia"),
        ));

        let summary = ingestor2.delta_scan().await.unwrap();
        assert_eq!(summary.changed, 1);
        assert!(summary.errors.is_empty(), "errors: {:?}", summary.errors);

        let contracts = store.list_by_product_group("ammonia");
        assert_eq!(contracts.len(), 2);
        let v2 = contracts.iter().find(|c| c.version == 2).unwrap();
        assert_eq!(v2.provenance.previous_hash, old_hash);
        assert_eq!(v2.counterparty, v1.counterparty);
        assert!(v2
            .clauses
            .iter()
            .any(|c| c.clause_id == "PRICE" && c.value == Some(355.0)));
    }

    #[tokio::test]
    async fn manual_ingest_runs_same_pipeline() {
        let (ingestor, store) = ingestor_with(fake_scanner_script(CONTRACT_TEXT));

        let outcome = ingestor
            .ingest_manual(ManualIngest {
                counterparty: "Trammo".into(),
                counterparty_type: CounterpartyType::Customer,
                product_group: "ammonia".into(),
                source_file_bytes: CONTRACT_TEXT.as_bytes().to_vec(),
                source_file_name: "Trammo_CFR_2026.txt".into(),
                contract_number: Some("TR-2026-009".into()),
                company: Some("Desk Trading AG".into()),
                effective_date: NaiveDate::from_ymd_opt(2026, 1, 1),
                expiry_date: NaiveDate::from_ymd_opt(2026, 12, 31),
            })
            .await
            .unwrap();

        let IngestOutcome::Created { contract_id, version } = outcome else {
            panic!()
        };
        assert_eq!(version, 1);
        let contract = store.get(&contract_id).unwrap();
        assert_eq!(contract.counterparty, "Trammo");
        assert_eq!(contract.contract_number.as_deref(), Some("TR-2026-009"));
        assert!(!contract.clauses.is_empty());
        assert!(contract.provenance.remote_item_id.is_none());
    }

    #[tokio::test]
    async fn llm_cross_check_recorded_but_not_authoritative() {
        struct DisagreeingLlm;

        #[async_trait]
        impl LlmClient for DisagreeingLlm {
            async fn extract(
                &self,
                _text: &str,
                _inventory: &str,
                _families: &str,
            ) -> Result<LlmExtraction, LlmError> {
                Ok(LlmExtraction {
                    clauses: vec![llm::LlmClause {
                        clause_id: "PRICE".into(),
                        parameter: Some("price_usd_ton".into()),
                        operator: Some("eq".into()),
                        value: Some(999.0),
                        unit: Some("$/ton".into()),
                        section_ref: None,
                        confidence: Some("high".into()),
                    }],
                    family_id: None,
                })
            }
        }

        let store = Arc::new(ContractStore::new());
        let ingestor = Arc::new(
            Ingestor::new(
                scanner_for(fake_scanner_script(CONTRACT_TEXT)),
                store.clone(),
                Arc::new(DocumentExtractor::new()),
                TemplateRegistry::seeded(),
                IngestorConfig::new("d1", "/Contracts/Ammonia", "ammonia"),
            )
            .with_llm(Arc::new(DisagreeingLlm)),
        );

        ingestor.full_scan().await.unwrap();
        let contract = store.list_by_product_group("ammonia")[0].clone();

        // The deterministic value stands.
        let price = contract
            .clauses
            .iter()
            .find(|c| c.clause_id == "PRICE")
            .unwrap();
        assert_eq!(price.value, Some(335.0));

        // The disagreement is on record for review.
        let report = contract.llm_crosscheck.expect("cross-check recorded");
        let mismatches = report["value_mismatches"].as_array().unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0]["llm"], 999.0);
    }

    #[tokio::test]
    async fn llm_failure_never_fails_ingest() {
        struct BrokenLlm;

        #[async_trait]
        impl LlmClient for BrokenLlm {
            async fn extract(
                &self,
                _: &str,
                _: &str,
                _: &str,
            ) -> Result<LlmExtraction, LlmError> {
                Err(LlmError::Timeout)
            }
        }

        let store = Arc::new(ContractStore::new());
        let ingestor = Arc::new(
            Ingestor::new(
                scanner_for(fake_scanner_script(CONTRACT_TEXT)),
                store.clone(),
                Arc::new(DocumentExtractor::new()),
                TemplateRegistry::seeded(),
                IngestorConfig::new("d1", "/Contracts/Ammonia", "ammonia"),
            )
            .with_llm(Arc::new(BrokenLlm)),
        );

        let summary = ingestor.full_scan().await.unwrap();
        assert!(summary.errors.is_empty());
        let contract = store.list_by_product_group("ammonia")[0].clone();
        assert!(contract.llm_crosscheck.is_none());
        assert!(!contract.clauses.is_empty());
    }

    #[test]
    fn counterparty_derivation_from_file_names() {
        assert_eq!(derive_counterparty("Koch_FOB_2026.docx"), "Koch");
        assert_eq!(derive_counterparty("Yara_International_CFR_2025.pdf"), "Yara International");
        assert_eq!(derive_counterparty("Trammo-DAP-2026.txt"), "Trammo");
        assert_eq!(derive_counterparty("2026_Koch.docx"), "2026_Koch");
    }
}
