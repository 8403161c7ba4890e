//! Stage catalog for the tech-support call
//!
//! The call moves forward through a fixed list of stages. Each stage carries
//! the victim's objective and the keywords that reveal the caller reached it.

use serde::Serialize;

/// Identifier reported in every snapshot
pub const SCENARIO_NAME: &str = "tech_support_microsoft";

/// One phase of the simulated call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub key: &'static str,
    pub name: &'static str,
    pub objective: &'static str,
    pub trigger_keywords: &'static [&'static str],
}

/// Ordered stages; the index is the stage identity
pub static STAGES: [Stage; 5] = [
    Stage {
        key: "contact_opening",
        name: "Ouverture",
        objective: "Rester poli mais lent. Faire repeter l'identite de l'appelant.",
        trigger_keywords: &["bonjour", "microsoft", "support", "service technique", "windows"],
    },
    Stage {
        key: "problem_claim",
        name: "Probleme annonce",
        objective: "Demander des precisions confuses sur le probleme pretendu.",
        trigger_keywords: &["virus", "alerte", "infecte", "erreur", "securite"],
    },
    Stage {
        key: "remote_access_request",
        name: "Acces distant",
        objective: "Faire semblant de ne pas trouver le menu Demarrer et ralentir au maximum.",
        trigger_keywords: &["teamviewer", "anydesk", "acces distant", "installer", "telecharger"],
    },
    Stage {
        key: "credential_or_payment",
        name: "Identifiants ou paiement",
        objective: "Refuser de partager tout mot de passe et demander une preuve officielle.",
        trigger_keywords: &["mot de passe", "password", "carte bancaire", "paiement", "iban", "code"],
    },
    Stage {
        key: "pressure_closing",
        name: "Pression finale",
        objective: "Rester calme, multiplier les interruptions et ne rien divulguer.",
        trigger_keywords: &["urgent", "tout de suite", "maintenant", "vite", "dernier avertissement"],
    },
];

/// Audience interruptions used to complete a short selection
pub const FILLER_CHOICES: [&str; 3] = [
    "On sonne a la porte",
    "Le chien aboie dans le jardin",
    "La tele est allumee trop fort",
];

/// Stage at `index`, clamped to the last stage
pub fn stage(index: usize) -> &'static Stage {
    &STAGES[index.min(last_stage_index())]
}

pub fn last_stage_index() -> usize {
    STAGES.len() - 1
}

/// Index of the stage with `key` (trimmed, case-insensitive)
pub fn stage_index_for_key(key: &str) -> Option<usize> {
    let key = key.trim().to_lowercase();
    STAGES.iter().position(|s| s.key == key)
}

pub fn stage_names() -> Vec<String> {
    STAGES.iter().map(|s| s.name.to_string()).collect()
}

/// Keyword scan from `current` to the last stage.
///
/// Returns the furthest stage whose keywords occur in `latest_text`, never
/// less than `current` and never past the last stage.
pub fn detect_stage(latest_text: &str, current: usize) -> usize {
    let text = latest_text.to_lowercase();
    let mut next = current;

    for (idx, stage) in STAGES.iter().enumerate().skip(current) {
        if stage.trigger_keywords.iter().any(|kw| text.contains(kw)) {
            next = next.max(idx);
        }
    }

    next.min(last_stage_index())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_opening_keywords() {
        assert_eq!(detect_stage("Bonjour, support Microsoft", 0), 0);
    }

    #[test]
    fn test_detect_takes_furthest_match() {
        // "installer" (remote access) and "urgent" (pressure) in one line
        assert_eq!(detect_stage("Il faut installer ca, c'est URGENT", 0), 4);
        assert_eq!(detect_stage("installez anydesk maintenant", 1), 4);
        assert_eq!(detect_stage("telecharger anydesk", 0), 2);
    }

    #[test]
    fn test_detect_never_regresses() {
        assert_eq!(detect_stage("bonjour windows", 3), 3);
        assert_eq!(detect_stage("rien de special", 2), 2);
    }

    #[test]
    fn test_detect_clamps_out_of_range_current() {
        assert_eq!(detect_stage("bonjour", 9), last_stage_index());
    }

    #[test]
    fn test_key_lookup() {
        assert_eq!(stage_index_for_key(" Remote_Access_Request "), Some(2));
        assert_eq!(stage_index_for_key("closing"), None);
        assert_eq!(stage(42).key, "pressure_closing");
    }
}
