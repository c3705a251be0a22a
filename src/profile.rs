// src/profile.rs
// Travel profile accumulation: pure data-model logic, no I/O.
//
// The profile is filled in incrementally from the structured payloads the
// assistant appends to its replies. Merging never erases a known field,
// and the readiness gate is the single authority on when the interview
// has collected enough to recommend a destination.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Structured partial profile extracted from free-form chat.
///
/// `budget_in_brl` is integer centavos. `activities` is kept lowercased
/// and deduplicated; `BTreeSet` keeps iteration order stable so the
/// recommendation lookup is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TravelProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_iata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_in_brl: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub activities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

/// How many of the four required fields the interview still needs.
pub const TOTAL_REQUIRED_FIELDS: u32 = 4;

fn present(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn normalize_activity(raw: &str) -> Option<String> {
    let a = raw.trim().to_lowercase();
    if a.is_empty() { None } else { Some(a) }
}

impl TravelProfile {
    /// True iff every required field is populated: origin IATA, a positive
    /// budget, at least one activity, and a trip purpose. This is the sole
    /// gate for `interview_complete`.
    pub fn is_ready_for_recommendation(&self) -> bool {
        present(&self.origin_iata)
            && self.budget_in_brl.is_some_and(|b| b > 0)
            && !self.activities.is_empty()
            && present(&self.purpose)
    }

    /// Count of required fields already known (advisory, for interview
    /// progress reporting).
    pub fn fields_known(&self) -> u32 {
        [
            present(&self.origin_iata),
            self.budget_in_brl.is_some_and(|b| b > 0),
            !self.activities.is_empty(),
            present(&self.purpose),
        ]
        .iter()
        .filter(|known| **known)
        .count() as u32
    }

    /// Required fields still missing, in interview order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !present(&self.origin_iata) {
            missing.push("origin");
        }
        if !self.budget_in_brl.is_some_and(|b| b > 0) {
            missing.push("budget");
        }
        if self.activities.is_empty() {
            missing.push("activities");
        }
        if !present(&self.purpose) {
            missing.push("purpose");
        }
        missing
    }

    /// Build a profile from a loosely-typed extraction object, tolerating
    /// the field shapes models actually emit (numbers as strings, a single
    /// activity instead of an array).
    pub fn from_extraction(v: &Value) -> Self {
        let string_field = |key: &str| -> Option<String> {
            v.get(key)
                .and_then(|x| x.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let budget = v.get("budget_in_brl").and_then(|b| {
            b.as_i64()
                .or_else(|| b.as_f64().map(|f| f.round() as i64))
                .or_else(|| b.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
        });

        let mut activities = BTreeSet::new();
        match v.get("activities") {
            Some(Value::Array(items)) => {
                for item in items {
                    if let Some(a) = item.as_str().and_then(normalize_activity) {
                        activities.insert(a);
                    }
                }
            }
            Some(Value::String(s)) => {
                if let Some(a) = normalize_activity(s) {
                    activities.insert(a);
                }
            }
            _ => {}
        }

        Self {
            origin_name: string_field("origin_name"),
            origin_iata: string_field("origin_iata").map(|s| s.to_uppercase()),
            budget_in_brl: budget,
            activities,
            purpose: string_field("purpose").map(|s| s.to_lowercase()),
        }
    }
}

/// Merge a partial extraction into an existing profile.
///
/// Present incoming scalars overwrite; absent incoming fields never erase
/// existing values. Activities are unioned (case-normalized, deduplicated).
pub fn merge(existing: &TravelProfile, incoming: &TravelProfile) -> TravelProfile {
    let pick = |old: &Option<String>, new: &Option<String>| -> Option<String> {
        if present(new) { new.clone() } else { old.clone() }
    };

    let mut activities = existing.activities.clone();
    for a in &incoming.activities {
        if let Some(normalized) = normalize_activity(a) {
            activities.insert(normalized);
        }
    }

    TravelProfile {
        origin_name: pick(&existing.origin_name, &incoming.origin_name),
        origin_iata: pick(&existing.origin_iata, &incoming.origin_iata),
        budget_in_brl: incoming.budget_in_brl.or(existing.budget_in_brl),
        activities,
        purpose: pick(&existing.purpose, &incoming.purpose),
    }
}

/// Budget threshold (centavos) separating the near and far picks per theme.
const BUDGET_SPLIT_BRL_CENTS: i64 = 400_000;

/// Deterministic destination pick for a completed profile.
///
/// Keyed by the first matching activity theme (activities iterate in
/// BTreeSet order) and a budget band; callers must have passed the
/// readiness gate first.
pub fn recommend_destination(profile: &TravelProfile) -> String {
    let generous = profile.budget_in_brl.unwrap_or(0) >= BUDGET_SPLIT_BRL_CENTS;

    for activity in &profile.activities {
        let themed = match theme_of(activity) {
            Theme::Beach => {
                if generous {
                    Some("Fernando de Noronha")
                } else {
                    Some("Maragogi")
                }
            }
            Theme::Trail => {
                if generous {
                    Some("Chapada dos Veadeiros")
                } else {
                    Some("Chapada Diamantina")
                }
            }
            Theme::Culture => {
                if generous {
                    Some("Salvador")
                } else {
                    Some("Ouro Preto")
                }
            }
            Theme::Other => None,
        };
        if let Some(destination) = themed {
            return destination.to_string();
        }
    }

    if generous { "Gramado" } else { "Rio de Janeiro" }.to_string()
}

enum Theme {
    Beach,
    Trail,
    Culture,
    Other,
}

fn theme_of(activity: &str) -> Theme {
    match activity {
        a if a.contains("praia") || a.contains("mergulho") || a.contains("surf") => Theme::Beach,
        a if a.contains("trilha") || a.contains("caminhada") || a.contains("ecoturismo") => {
            Theme::Trail
        }
        a if a.contains("museu") || a.contains("cultura") || a.contains("gastronomia")
            || a.contains("história") || a.contains("historia") =>
        {
            Theme::Culture
        }
        _ => Theme::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_profile() -> TravelProfile {
        TravelProfile {
            origin_name: Some("São Paulo".into()),
            origin_iata: Some("GRU".into()),
            budget_in_brl: Some(300_000),
            activities: ["trilhas".to_string()].into_iter().collect(),
            purpose: Some("lazer".into()),
        }
    }

    #[test]
    fn readiness_gate_all_sixteen_combinations() {
        let full = full_profile();
        for mask in 0u8..16 {
            let profile = TravelProfile {
                origin_name: full.origin_name.clone(),
                origin_iata: if mask & 1 != 0 { full.origin_iata.clone() } else { None },
                budget_in_brl: if mask & 2 != 0 { full.budget_in_brl } else { None },
                activities: if mask & 4 != 0 {
                    full.activities.clone()
                } else {
                    BTreeSet::new()
                },
                purpose: if mask & 8 != 0 { full.purpose.clone() } else { None },
            };
            assert_eq!(
                profile.is_ready_for_recommendation(),
                mask == 0b1111,
                "mask {:04b} should{} be ready",
                mask,
                if mask == 0b1111 { "" } else { " not" }
            );
        }
    }

    #[test]
    fn readiness_rejects_zero_budget() {
        let mut profile = full_profile();
        profile.budget_in_brl = Some(0);
        assert!(!profile.is_ready_for_recommendation());
    }

    #[test]
    fn merge_never_drops_existing_fields() {
        let existing = full_profile();
        let update = TravelProfile {
            budget_in_brl: Some(500_000),
            ..Default::default()
        };
        let merged = merge(&existing, &update);
        assert_eq!(merged.origin_iata.as_deref(), Some("GRU"));
        assert_eq!(merged.budget_in_brl, Some(500_000));
        assert_eq!(merged.purpose.as_deref(), Some("lazer"));
        assert!(merged.activities.contains("trilhas"));
    }

    #[test]
    fn merge_empty_string_does_not_erase() {
        let existing = full_profile();
        let update = TravelProfile {
            purpose: Some("   ".into()),
            ..Default::default()
        };
        let merged = merge(&existing, &update);
        assert_eq!(merged.purpose.as_deref(), Some("lazer"));
    }

    #[test]
    fn merge_unions_activities_case_normalized() {
        let existing = full_profile();
        let update = TravelProfile {
            activities: ["Trilhas".to_string(), "PRAIA ".to_string()]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let merged = merge(&existing, &update);
        assert_eq!(merged.activities.len(), 2);
        assert!(merged.activities.contains("trilhas"));
        assert!(merged.activities.contains("praia"));
    }

    #[test]
    fn merge_is_associative_for_disjoint_updates() {
        let base = TravelProfile::default();
        let u1 = TravelProfile {
            origin_iata: Some("GRU".into()),
            ..Default::default()
        };
        let u2 = TravelProfile {
            purpose: Some("lazer".into()),
            budget_in_brl: Some(100_000),
            ..Default::default()
        };
        assert_eq!(merge(&merge(&base, &u1), &u2), merge(&base, &merge(&u1, &u2)));
    }

    #[test]
    fn fields_known_counts_required_fields_only() {
        let mut profile = TravelProfile::default();
        assert_eq!(profile.fields_known(), 0);
        profile.origin_name = Some("Campinas".into()); // not a required field
        assert_eq!(profile.fields_known(), 0);
        profile.origin_iata = Some("VCP".into());
        profile.budget_in_brl = Some(50_000);
        assert_eq!(profile.fields_known(), 2);
        assert_eq!(profile.missing_fields(), vec!["activities", "purpose"]);
    }

    #[test]
    fn extraction_tolerates_loose_shapes() {
        let v = json!({
            "origin_name": "São Paulo",
            "origin_iata": "gru",
            "budget_in_brl": "300000",
            "activities": "Trilhas",
            "purpose": "Lazer"
        });
        let profile = TravelProfile::from_extraction(&v);
        assert_eq!(profile.origin_iata.as_deref(), Some("GRU"));
        assert_eq!(profile.budget_in_brl, Some(300_000));
        assert!(profile.activities.contains("trilhas"));
        assert_eq!(profile.purpose.as_deref(), Some("lazer"));
    }

    #[test]
    fn recommendation_is_deterministic_by_theme_and_budget() {
        let mut profile = full_profile();
        assert_eq!(recommend_destination(&profile), "Chapada Diamantina");
        profile.budget_in_brl = Some(800_000);
        assert_eq!(recommend_destination(&profile), "Chapada dos Veadeiros");
        profile.activities = ["praia".to_string()].into_iter().collect();
        assert_eq!(recommend_destination(&profile), "Fernando de Noronha");
        profile.activities = ["pescaria".to_string()].into_iter().collect();
        assert_eq!(recommend_destination(&profile), "Gramado");
    }
}
