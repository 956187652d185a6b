//! Peer countries and the agency/specialisation context used to build
//! country-tailored research queries.

/// Countries research runs may target.
pub const PEER_COUNTRIES: &[&str] = &[
    "Singapore",
    "Denmark",
    "Israel",
    "Estonia",
    "Finland",
    "Netherlands",
    "New Zealand",
    "South Korea",
    "United Kingdom",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountryContext {
    pub country: &'static str,
    /// Most prominent agency first.
    pub agencies: &'static [&'static str],
    pub specializations: &'static [&'static str],
}

impl CountryContext {
    /// "A OR B" over the first two agencies.
    pub fn agency_mention(&self) -> String {
        self.agencies
            .iter()
            .take(2)
            .copied()
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    pub fn primary_agency(&self) -> &'static str {
        self.agencies.first().copied().unwrap_or(self.country)
    }
}

const CONTEXTS: &[CountryContext] = &[
    CountryContext {
        country: "Singapore",
        agencies: &["Enterprise Singapore", "EDB", "IMDA", "A*STAR"],
        specializations: &["fintech hub", "smart nation", "biotech", "maritime innovation"],
    },
    CountryContext {
        country: "Denmark",
        agencies: &["Innovation Fund Denmark", "Danish Business Authority", "Vaekstfonden"],
        specializations: &["green transition", "life sciences", "wind energy", "circular economy"],
    },
    CountryContext {
        country: "Israel",
        agencies: &["Israel Innovation Authority", "Chief Scientist Office", "BIRD Foundation"],
        specializations: &["cybersecurity", "agritech", "defense tech", "startup nation"],
    },
    CountryContext {
        country: "Estonia",
        agencies: &["Enterprise Estonia", "e-Estonia", "Startup Estonia"],
        specializations: &["e-residency", "digital government", "cybersecurity", "fintech"],
    },
    CountryContext {
        country: "Finland",
        agencies: &["Business Finland", "Finnvera", "Sitra"],
        specializations: &["cleantech", "gaming industry", "health tech", "circular economy"],
    },
    CountryContext {
        country: "Netherlands",
        agencies: &["RVO", "Invest-NL", "StartupDelta", "Holland High Tech"],
        specializations: &["agrifood", "water management", "logistics", "high-tech systems"],
    },
    CountryContext {
        country: "New Zealand",
        agencies: &["Callaghan Innovation", "NZTE", "MBIE"],
        specializations: &["agritech", "screen industry", "space tech", "Maori innovation"],
    },
    CountryContext {
        country: "South Korea",
        agencies: &["KISED", "KOTRA", "TIPS Program", "K-Startup Grand Challenge"],
        specializations: &["K-content", "semiconductors", "battery tech", "smart manufacturing"],
    },
];

/// Query context for a country, if one is known.
pub fn country_context(country: &str) -> Option<&'static CountryContext> {
    CONTEXTS.iter().find(|c| c.country == country)
}

pub fn is_peer_country(country: &str) -> bool {
    PEER_COUNTRIES.contains(&country)
}

/// Match user input against the peer list, ignoring case and surrounding
/// whitespace.
pub fn canonical_peer(input: &str) -> Option<&'static str> {
    let input = input.trim();
    PEER_COUNTRIES
        .iter()
        .copied()
        .find(|c| c.eq_ignore_ascii_case(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_context_is_a_peer() {
        for ctx in CONTEXTS {
            assert!(is_peer_country(ctx.country), "{} not a peer", ctx.country);
            assert!(!ctx.agencies.is_empty());
            assert!(ctx.specializations.len() >= 2);
        }
    }

    #[test]
    fn united_kingdom_has_no_context() {
        assert!(is_peer_country("United Kingdom"));
        assert!(country_context("United Kingdom").is_none());
    }

    #[test]
    fn agency_mention_uses_first_two() {
        let ctx = country_context("Estonia").unwrap();
        assert_eq!(ctx.agency_mention(), "Enterprise Estonia OR e-Estonia");
        assert_eq!(ctx.primary_agency(), "Enterprise Estonia");
    }

    #[test]
    fn canonical_peer_ignores_case() {
        assert_eq!(canonical_peer(" south korea "), Some("South Korea"));
        assert_eq!(canonical_peer("Atlantis"), None);
    }
}
