//! Influence evidence records.
//!
//! Evidence is produced by the external analyzer. The core stores and
//! forwards it; the payload is never inspected.

use crate::roster::CharacterId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The kind of influence a piece of evidence describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// The character triggers or decides events.
    Causal,
    /// The character persuades, intimidates, or allies with others.
    Social,
    /// The character changes the rules, stakes, or setting.
    World,
    /// The character introduces or resolves conflict.
    Pacing,
    /// Scenes or plot center on the character.
    NarrativeGravity,
}

impl EvidenceType {
    pub const ALL: [EvidenceType; 5] = [
        EvidenceType::Causal,
        EvidenceType::Social,
        EvidenceType::World,
        EvidenceType::Pacing,
        EvidenceType::NarrativeGravity,
    ];

    /// Get the display name for this evidence type.
    pub fn name(&self) -> &'static str {
        match self {
            EvidenceType::Causal => "causal",
            EvidenceType::Social => "social",
            EvidenceType::World => "world",
            EvidenceType::Pacing => "pacing",
            EvidenceType::NarrativeGravity => "narrative_gravity",
        }
    }
}

/// One piece of influence evidence about a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceEvidence {
    pub character_id: CharacterId,
    pub evidence_type: EvidenceType,
    /// Analyzer-defined content.
    pub payload: Value,
    /// Chapter the evidence was committed in. Set by the aggregator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    /// Chunk the evidence arrived with. Set by the aggregator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
}

impl InfluenceEvidence {
    /// Create evidence without provenance.
    pub fn new(character_id: CharacterId, evidence_type: EvidenceType, payload: Value) -> Self {
        Self {
            character_id,
            evidence_type,
            payload,
            chapter_id: None,
            chunk_index: None,
        }
    }

    /// Stamp where this evidence was committed.
    pub fn with_provenance(mut self, chapter_id: impl Into<String>, chunk_index: usize) -> Self {
        self.chapter_id = Some(chapter_id.into());
        self.chunk_index = Some(chunk_index);
        self
    }
}

/// Evidence counts by type for one character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceTotals {
    pub causal: u64,
    pub social: u64,
    pub world: u64,
    pub pacing: u64,
    pub narrative_gravity: u64,
}

impl EvidenceTotals {
    pub fn add(&mut self, evidence_type: EvidenceType) {
        match evidence_type {
            EvidenceType::Causal => self.causal += 1,
            EvidenceType::Social => self.social += 1,
            EvidenceType::World => self.world += 1,
            EvidenceType::Pacing => self.pacing += 1,
            EvidenceType::NarrativeGravity => self.narrative_gravity += 1,
        }
    }

    pub fn get(&self, evidence_type: EvidenceType) -> u64 {
        match evidence_type {
            EvidenceType::Causal => self.causal,
            EvidenceType::Social => self.social,
            EvidenceType::World => self.world,
            EvidenceType::Pacing => self.pacing,
            EvidenceType::NarrativeGravity => self.narrative_gravity,
        }
    }

    pub fn total(&self) -> u64 {
        EvidenceType::ALL.iter().map(|t| self.get(*t)).sum()
    }
}

/// Count evidence records per character and type.
pub fn totals_by_character(evidence: &[InfluenceEvidence]) -> BTreeMap<CharacterId, EvidenceTotals> {
    let mut totals: BTreeMap<CharacterId, EvidenceTotals> = BTreeMap::new();
    for record in evidence {
        totals
            .entry(record.character_id.clone())
            .or_default()
            .add(record.evidence_type);
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evidence_type_wire_names() {
        let json = serde_json::to_string(&EvidenceType::NarrativeGravity).unwrap();
        assert_eq!(json, "\"narrative_gravity\"");
        for t in EvidenceType::ALL {
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.name()));
        }
    }

    #[test]
    fn test_payload_is_kept_verbatim() {
        let payload = json!({"summary": "Jon opens the gate", "scene": [1, 2]});
        let evidence = InfluenceEvidence::new("char_001".into(), EvidenceType::Causal, payload.clone())
            .with_provenance("ch1", 3);

        let round: InfluenceEvidence =
            serde_json::from_value(serde_json::to_value(&evidence).unwrap()).unwrap();
        assert_eq!(round.payload, payload);
        assert_eq!(round.chapter_id.as_deref(), Some("ch1"));
        assert_eq!(round.chunk_index, Some(3));
    }

    #[test]
    fn test_missing_provenance_deserializes() {
        let evidence: InfluenceEvidence = serde_json::from_value(json!({
            "character_id": "char_002",
            "evidence_type": "social",
            "payload": "persuades the council"
        }))
        .unwrap();
        assert!(evidence.chapter_id.is_none());
        assert_eq!(evidence.evidence_type, EvidenceType::Social);
    }

    #[test]
    fn test_totals_by_character() {
        let jon: CharacterId = "char_001".into();
        let arya: CharacterId = "char_002".into();
        let evidence = vec![
            InfluenceEvidence::new(jon.clone(), EvidenceType::Causal, Value::Null),
            InfluenceEvidence::new(jon.clone(), EvidenceType::Causal, Value::Null),
            InfluenceEvidence::new(jon.clone(), EvidenceType::Pacing, Value::Null),
            InfluenceEvidence::new(arya.clone(), EvidenceType::NarrativeGravity, Value::Null),
        ];

        let totals = totals_by_character(&evidence);
        assert_eq!(totals[&jon].causal, 2);
        assert_eq!(totals[&jon].pacing, 1);
        assert_eq!(totals[&jon].total(), 3);
        assert_eq!(totals[&arya].get(EvidenceType::NarrativeGravity), 1);
    }
}
