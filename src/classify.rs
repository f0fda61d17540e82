use crate::participant::ParticipantRecord;
use std::fmt;

/// The round-1 public key submitted by clients that contributed the
/// ceremony's default secret (the G2 generator).
pub const DEFAULT_TRIVIAL_PUBKEY: &str = concat!(
    "0x93e02b6052719f607dacd3a088274f65596bd0d09920b61ab5da61bbdc7f5049",
    "334cf11213945d57e5ac7d055d042b7e024aa2b2f08f0a91260805272dc51051",
    "c6e47ad4fa403b02b4510b647ae3d1770bac0326a805bbefd48056c8c121bdb8",
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BotLabel {
    Trivial,
    MissingBlsSignature,
    MissingEcdsaSignature,
    Normal,
}

impl BotLabel {
    pub const ALL: [BotLabel; 4] = [
        BotLabel::Trivial,
        BotLabel::MissingBlsSignature,
        BotLabel::MissingEcdsaSignature,
        BotLabel::Normal,
    ];

    pub fn is_suspect(&self) -> bool {
        *self != BotLabel::Normal
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BotLabel::Trivial => "trivial contribution",
            BotLabel::MissingBlsSignature => "no bls signature",
            BotLabel::MissingEcdsaSignature => "no ecdsa signature",
            BotLabel::Normal => "normal",
        }
    }
}

impl fmt::Display for BotLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered classification rules. The first rule that matches wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotRules {
    pub trivial_pubkey: String,
}

impl Default for BotRules {
    fn default() -> Self {
        Self {
            trivial_pubkey: DEFAULT_TRIVIAL_PUBKEY.to_string(),
        }
    }
}

impl BotRules {
    pub fn new(trivial_pubkey: impl Into<String>) -> Self {
        Self {
            trivial_pubkey: trivial_pubkey.into(),
        }
    }

    pub fn classify(&self, record: &ParticipantRecord) -> BotLabel {
        let first = record.first_round();
        if first.pot_pubkey == self.trivial_pubkey {
            BotLabel::Trivial
        } else if first.bls_signature.trim().is_empty() {
            BotLabel::MissingBlsSignature
        } else if record.address.is_some() && record.ecdsa_signature.trim().is_empty() {
            BotLabel::MissingEcdsaSignature
        } else {
            BotLabel::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pubkey: &str, bls: &str, ecdsa: &str, with_address: bool) -> ParticipantRecord {
        let id = "eth|0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
        let mut record = ParticipantRecord::new(id, Default::default(), ecdsa);
        record.witnesses[0].pot_pubkey = pubkey.to_string();
        record.witnesses[0].bls_signature = bls.to_string();
        if with_address {
            record.address = Some("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap());
        }
        record
    }

    #[test]
    fn test_trivial_key_has_priority() {
        let rules = BotRules::default();
        let row = record(DEFAULT_TRIVIAL_PUBKEY, "", "", true);
        assert_eq!(rules.classify(&row), BotLabel::Trivial);
    }

    #[test]
    fn test_missing_bls_signature() {
        let rules = BotRules::default();
        let row = record("0xabc", "", "0xsig", true);
        assert_eq!(rules.classify(&row), BotLabel::MissingBlsSignature);
    }

    #[test]
    fn test_missing_ecdsa_only_for_chain_identities() {
        let rules = BotRules::default();
        let row = record("0xabc", "0xbls", "", true);
        assert_eq!(rules.classify(&row), BotLabel::MissingEcdsaSignature);
        assert_eq!(rules.classify(&record("0xabc", "0xbls", "", false)), BotLabel::Normal);
    }

    #[test]
    fn test_normal() {
        let rules = BotRules::default();
        let label = rules.classify(&record("0xabc", "0xbls", "0xecdsa", true));
        assert_eq!(label, BotLabel::Normal);
        assert!(!label.is_suspect());
    }

    #[test]
    fn test_injected_trivial_key() {
        let rules = BotRules::new("0xfeed");
        assert_eq!(rules.classify(&record("0xfeed", "0xbls", "0xecdsa", true)), BotLabel::Trivial);
        let row = record(DEFAULT_TRIVIAL_PUBKEY, "0xbls", "0xecdsa", true);
        assert_eq!(rules.classify(&row), BotLabel::Normal);
    }

    #[test]
    fn test_classify_does_not_mutate() {
        let rules = BotRules::default();
        let row = record(DEFAULT_TRIVIAL_PUBKEY, "", "", true);
        let before = row.clone();
        rules.classify(&row);
        assert_eq!(row, before);
    }
}
