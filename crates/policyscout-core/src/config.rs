//! Pipeline configuration and the domestic country profile.
//!
//! Both structs deserialize from JSON with every field optional, falling
//! back to the defaults below.

use serde::{Deserialize, Serialize};

use crate::countries::canonical_peer;

/// The country gap analysis compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomesticProfile {
    pub country: String,
    /// Adjective used in prompts, e.g. "Irish".
    pub adjective: String,
    /// Hostname substrings that mark a citation as a domestic source.
    pub domains: Vec<String>,
    /// Sites the gap-analysis query restricts itself to.
    pub search_sites: Vec<String>,
    /// Domain substrings that make a domestic source a government document.
    pub government_markers: Vec<String>,
    /// Institutions a pilot proposal should reference, lead partner first.
    pub institutions: Vec<String>,
}

impl Default for DomesticProfile {
    fn default() -> Self {
        let strings = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        Self {
            country: "Ireland".into(),
            adjective: "Irish".into(),
            domains: strings(&[
                "gov.ie",
                "oireachtas.ie",
                "enterprise.gov.ie",
                "dbei.gov.ie",
                "irishtimes.com",
                "independent.ie",
                "rte.ie",
                "siliconrepublic.com",
                "businesspost.ie",
                "thejournal.ie",
            ]),
            search_sites: strings(&[
                "gov.ie",
                "oireachtas.ie",
                "enterprise.gov.ie",
                "irishtimes.com",
                "siliconrepublic.com",
            ]),
            government_markers: strings(&["gov", "oireachtas"]),
            institutions: strings(&["Enterprise Ireland", "IDA"]),
        }
    }
}

impl DomesticProfile {
    /// The first configured domain contained in the URL's hostname.
    pub fn match_domain(&self, url: &str) -> Option<&str> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        self.domains
            .iter()
            .find(|d| host.contains(d.as_str()))
            .map(String::as_str)
    }

    pub fn is_government_domain(&self, domain: &str) -> bool {
        self.government_markers.iter().any(|m| domain.contains(m.as_str()))
    }

    /// Lead institution for pilot proposals.
    pub fn lead_institution(&self) -> &str {
        self.institutions
            .first()
            .map(String::as_str)
            .unwrap_or(&self.country)
    }

    /// Canonical name if `input` is the domestic country or a peer.
    pub fn searchable(&self, input: &str) -> Option<String> {
        if input.trim().eq_ignore_ascii_case(&self.country) {
            return Some(self.country.clone());
        }
        canonical_peer(input).map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Policies processed concurrently in vetting and gap analysis.
    pub batch_size: usize,
    /// Pause between batches, in milliseconds.
    pub batch_pause_ms: u64,
    pub domestic: DomesticProfile,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_pause_ms: 200,
            domestic: DomesticProfile::default(),
        }
    }
}
