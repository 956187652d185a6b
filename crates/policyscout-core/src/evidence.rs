//! Citation-backed evidence items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a stored claim, in characters.
pub const MAX_CLAIM_CHARS: usize = 500;

str_enum! {
    pub enum SourceType {
        OecdReport => "oecd_report",
        News => "news",
        GovDoc => "gov_doc",
        Academic => "academic",
        Blog => "blog",
        ThinkTank => "think_tank",
    }
}

impl SourceType {
    /// OECD reports, academic papers, and government documents.
    pub fn is_high_quality(&self) -> bool {
        matches!(self, Self::OecdReport | Self::Academic | Self::GovDoc)
    }

    /// Classify a citation URL by substring of its hostname.
    ///
    /// Falls back to the raw URL text when it does not parse.
    pub fn infer_from_url(url: &str) -> Self {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .unwrap_or_else(|| url.to_ascii_lowercase());
        if host.contains("oecd") {
            Self::OecdReport
        } else if host.contains("gov") {
            Self::GovDoc
        } else if host.contains("edu") || host.contains("academic") {
            Self::Academic
        } else {
            Self::News
        }
    }
}

str_enum! {
    pub enum EvidenceType {
        SuccessMetric => "success_metric",
        Criticism => "criticism",
        UnintendedConsequence => "unintended_consequence",
        AdoptionRate => "adoption_rate",
    }
}

str_enum! {
    pub enum Sentiment {
        Positive => "positive",
        Negative => "negative",
        Neutral => "neutral",
    }
}

/// One claim backed by a single citation.
///
/// `policy_id` stays `None` until the owning policy is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: Uuid,
    pub policy_id: Option<Uuid>,
    pub url: String,
    pub title: Option<String>,
    pub publisher: Option<String>,
    pub retrieved_at: Option<DateTime<Utc>>,
    pub source_type: SourceType,
    pub publication_date: Option<String>,
    pub evidence_type: EvidenceType,
    pub claim: String,
    pub excerpt: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub confidence: Option<f64>,
    pub is_domestic_source: bool,
    pub domestic_domain: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Evidence {
    /// A fresh, unowned evidence item with the optional fields empty.
    pub fn new(
        url: impl Into<String>,
        evidence_type: EvidenceType,
        source_type: SourceType,
        claim: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            policy_id: None,
            url: url.into(),
            title: None,
            publisher: None,
            retrieved_at: Some(now),
            source_type,
            publication_date: None,
            evidence_type,
            claim: claim.into(),
            excerpt: None,
            sentiment: None,
            confidence: None,
            is_domestic_source: false,
            domestic_domain: None,
            created_at: now,
        }
    }

    /// Check the row-level constraints both stores enforce.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("evidence url is empty".into());
        }
        let claim_len = self.claim.chars().count();
        if claim_len > MAX_CLAIM_CHARS {
            return Err(format!(
                "evidence claim is {claim_len} chars (max {MAX_CLAIM_CHARS})"
            ));
        }
        if let Some(c) = self.confidence
            && !(0.0..=1.0).contains(&c)
        {
            return Err(format!("evidence confidence {c} outside [0, 1]"));
        }
        Ok(())
    }
}

/// Truncate a claim to [`MAX_CLAIM_CHARS`] characters.
pub fn clamp_claim(text: &str) -> String {
    text.chars().take(MAX_CLAIM_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_source_types() {
        assert_eq!(
            SourceType::infer_from_url("https://www.oecd.org/sti/report.pdf"),
            SourceType::OecdReport
        );
        assert_eq!(
            SourceType::infer_from_url("https://www.gov.uk/guidance/rd-tax"),
            SourceType::GovDoc
        );
        assert_eq!(
            SourceType::infer_from_url("https://economics.mit.edu/paper"),
            SourceType::Academic
        );
        assert_eq!(
            SourceType::infer_from_url("https://academic.oup.com/article"),
            SourceType::Academic
        );
        assert_eq!(
            SourceType::infer_from_url("https://www.reuters.com/story"),
            SourceType::News
        );
    }

    #[test]
    fn infer_uses_host_not_path() {
        assert_eq!(
            SourceType::infer_from_url("https://news.example.com/oecd-gov-edu"),
            SourceType::News
        );
    }

    #[test]
    fn infer_tolerates_unparsable_url() {
        assert_eq!(SourceType::infer_from_url("not a url gov"), SourceType::GovDoc);
        assert_eq!(SourceType::infer_from_url(""), SourceType::News);
    }

    #[test]
    fn high_quality_sources() {
        assert!(SourceType::OecdReport.is_high_quality());
        assert!(SourceType::GovDoc.is_high_quality());
        assert!(SourceType::Academic.is_high_quality());
        assert!(!SourceType::News.is_high_quality());
        assert!(!SourceType::ThinkTank.is_high_quality());
    }

    #[test]
    fn validate_rejects_bad_rows() {
        let ok = Evidence::new("https://a.gov", EvidenceType::Criticism, SourceType::GovDoc, "x");
        assert!(ok.validate().is_ok());

        let mut empty_url = ok.clone();
        empty_url.url = " ".into();
        assert!(empty_url.validate().is_err());

        let mut long_claim = ok.clone();
        long_claim.claim = "a".repeat(501);
        assert!(long_claim.validate().is_err());

        let mut bad_conf = ok;
        bad_conf.confidence = Some(1.5);
        assert!(bad_conf.validate().is_err());
    }

    #[test]
    fn clamp_claim_counts_chars() {
        let s = "é".repeat(600);
        assert_eq!(clamp_claim(&s).chars().count(), 500);
        assert_eq!(clamp_claim("short"), "short");
    }
}
