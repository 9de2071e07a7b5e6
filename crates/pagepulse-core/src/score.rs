//! Weighted aggregate score over Lighthouse audits.
//!
//! Every audit contributes `score * weight`, where the weight comes from the
//! first `auditRefs` entry whose `id` equals the audit's `id`. Audits the
//! category does not reference contribute nothing. A missing or non-numeric
//! audit score counts as 0, so the sum is always finite for finite weights.

use std::collections::BTreeMap;

use crate::model::{Audit, AuditRef};

/// Weight of `audit_id` in `refs`, or 0 if the category does not reference it.
pub fn audit_weight(audit_id: &str, refs: &[AuditRef]) -> f64 {
    refs.iter()
        .find(|r| r.id == audit_id)
        .map(|r| r.weight)
        .unwrap_or(0.0)
}

/// Sum of `score * weight` over all audits. Returns 0 for an empty map.
///
/// The audit's own `id` field is used for the join; an audit whose `id` is
/// blank falls back to its map key.
pub fn compute_score(audits: &BTreeMap<String, Audit>, refs: &[AuditRef]) -> f64 {
    audits
        .iter()
        .map(|(key, audit)| {
            let id = if audit.id.is_empty() { key } else { &audit.id };
            audit.score_value() * audit_weight(id, refs)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn audit(id: &str, score: Value) -> Audit {
        Audit {
            id: id.into(),
            score,
            numeric_value: None,
        }
    }

    fn aref(id: &str, weight: f64) -> AuditRef {
        AuditRef {
            id: id.into(),
            weight,
        }
    }

    #[test]
    fn empty_audits_score_zero() {
        assert_eq!(compute_score(&BTreeMap::new(), &[aref("interactive", 10.0)]), 0.0);
        assert_eq!(compute_score(&BTreeMap::new(), &[]), 0.0);
    }

    #[test]
    fn weighted_sum_of_referenced_audits() {
        let mut audits = BTreeMap::new();
        audits.insert("speed-index".into(), audit("speed-index", json!(0.5)));
        audits.insert("interactive".into(), audit("interactive", json!(0.8)));
        audits.insert("total-blocking-time".into(), audit("total-blocking-time", json!(1)));
        let refs = [
            aref("speed-index", 10.0),
            aref("interactive", 10.0),
            aref("total-blocking-time", 30.0),
        ];
        let score = compute_score(&audits, &refs);
        assert!((score - (5.0 + 8.0 + 30.0)).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn unreferenced_audit_contributes_nothing() {
        let mut audits = BTreeMap::new();
        audits.insert("interactive".into(), audit("interactive", json!(1)));
        audits.insert("uses-http2".into(), audit("uses-http2", json!(1)));
        assert_eq!(compute_score(&audits, &[aref("interactive", 2.0)]), 2.0);
    }

    #[test]
    fn first_matching_ref_wins() {
        let mut audits = BTreeMap::new();
        audits.insert("interactive".into(), audit("interactive", json!(1)));
        let refs = [aref("interactive", 3.0), aref("interactive", 7.0)];
        assert_eq!(compute_score(&audits, &refs), 3.0);
    }

    #[test]
    fn null_score_counts_as_zero() {
        let mut audits = BTreeMap::new();
        audits.insert("interactive".into(), audit("interactive", Value::Null));
        audits.insert("speed-index".into(), audit("speed-index", json!(1)));
        let refs = [aref("interactive", 10.0), aref("speed-index", 1.0)];
        let score = compute_score(&audits, &refs);
        assert!(score.is_finite());
        assert_eq!(score, 1.0);
    }

    #[test]
    fn join_uses_audit_id_not_map_key() {
        let mut audits = BTreeMap::new();
        audits.insert("renamed".into(), audit("interactive", json!(1)));
        audits.insert("blank".into(), audit("", json!(1)));
        let refs = [aref("interactive", 4.0), aref("blank", 1.0), aref("renamed", 100.0)];
        assert_eq!(compute_score(&audits, &refs), 5.0);
    }
}
