//! Offline spelling fixes for audience proposals
//!
//! Only whole words made of letters and longer than two characters are
//! touched: a table of frequent typos first, then accent restoration from a
//! lexicon of words the scenario uses.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::scenario::STAGES;
use crate::text_safety::{fold, match_word_case};

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+|[^\w\s]+|\s+").unwrap());

static CATALOG_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-zÀ-ÖØ-öø-ÿ]+").unwrap());

static SPACE_BEFORE_PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.;:!?])").unwrap());
static SPACE_AFTER_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([(\[{])\s+").unwrap());
static SPACE_BEFORE_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([)\]}])").unwrap());
static SPACED_APOSTROPHE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+'\s*").unwrap());
static VOUS_ETE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bvous\s+ete\b").unwrap());

const LEXICON_SEEDS: &[&str] = &[
    "proposition", "propositions", "audience", "selection", "sélection", "selectionner",
    "sélectionner", "choix", "vote", "simule", "simulé", "arnaqueur", "jean", "dubois",
    "bonjour", "ordinateur", "telechargement", "téléchargement", "telephone", "téléphone",
    "microsoft", "support", "service", "technique", "windows", "porte", "sonne", "chien",
    "jardin", "bruit", "voisins", "enfants", "dehors", "attendez", "secondes", "urgent",
    "rappel", "message", "adresse", "identite", "identité", "bancaire", "paiement",
    "virement", "appel", "appelant", "preuve", "officielle", "calme", "interruption",
    "interrompu", "reponse", "réponse", "repondre", "répondre", "etre", "être", "etes",
    "êtes", "tres", "très", "deja", "déjà", "ca", "ça", "poli", "lent", "repeter",
    "répéter", "precisions", "précisions", "probleme", "problème", "acces", "accès",
    "distant", "installer", "demarrer", "démarrer", "identifiants", "mot", "passe",
    "pression", "finale",
];

const KNOWN_TYPOS: &[(&str, &str)] = &[
    ("propositon", "proposition"),
    ("propostion", "proposition"),
    ("propositons", "propositions"),
    ("reponse", "réponse"),
    ("reponses", "réponses"),
    ("selection", "sélection"),
    ("selectionner", "sélectionner"),
    ("selectionne", "sélectionne"),
    ("simule", "simulé"),
    ("simules", "simulés"),
    ("simulee", "simulée"),
    ("simulees", "simulées"),
    ("etes", "êtes"),
    ("etre", "être"),
    ("tres", "très"),
    ("deja", "déjà"),
    ("ca", "ça"),
    ("aout", "août"),
    ("arret", "arrêt"),
    ("arrete", "arrête"),
    ("probleme", "problème"),
    ("problemes", "problèmes"),
    ("precisions", "précisions"),
    ("precision", "précision"),
    ("acces", "accès"),
    ("identite", "identité"),
    ("telephone", "téléphone"),
    ("telecharger", "télécharger"),
    ("demarrer", "démarrer"),
    ("repeter", "répéter"),
    ("apel", "appel"),
    ("apelant", "appelant"),
    ("appell", "appel"),
    ("recu", "reçu"),
    ("securite", "sécurité"),
];

/// Word-level corrector built once per moderator
#[derive(Debug, Clone)]
pub struct SpellingCorrector {
    typos: HashMap<String, String>,
    lexicon: HashMap<String, String>,
}

impl Default for SpellingCorrector {
    fn default() -> Self {
        Self::new()
    }
}

impl SpellingCorrector {
    pub fn new() -> Self {
        let typos = KNOWN_TYPOS
            .iter()
            .map(|(wrong, right)| (fold(wrong), right.to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();

        let mut words: Vec<String> = LEXICON_SEEDS.iter().map(|w| w.to_string()).collect();
        for stage in STAGES.iter() {
            let texts = [stage.name, stage.objective]
                .into_iter()
                .chain(stage.trigger_keywords.iter().copied());
            for text in texts {
                words.extend(CATALOG_WORD_RE.find_iter(text).map(|m| m.as_str().to_string()));
            }
        }

        let mut lexicon: HashMap<String, String> = HashMap::new();
        for word in words {
            let token = word.trim().to_lowercase();
            let key = fold(&token);
            if key.is_empty() {
                continue;
            }
            let replace = match lexicon.get(&key) {
                None => true,
                Some(chosen) => prefer(&token, chosen),
            };
            if replace {
                lexicon.insert(key, token);
            }
        }

        Self { typos, lexicon }
    }

    /// Correct every eligible word of `text` and tidy French spacing
    pub fn correct(&self, text: &str) -> String {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return String::new();
        }

        let corrected: String = TOKEN_RE
            .find_iter(&normalized)
            .map(|m| {
                let token = m.as_str();
                if token.chars().all(char::is_alphabetic) {
                    self.correct_word(token)
                } else {
                    token.to_string()
                }
            })
            .collect();

        polish_french_spacing(&corrected)
    }

    fn correct_word(&self, word: &str) -> String {
        let folded = fold(&word.to_lowercase());
        // Very short words are left alone: too ambiguous to fix
        if folded.chars().count() <= 2 {
            return word.to_string();
        }
        self.typos
            .get(&folded)
            .or_else(|| self.lexicon.get(&folded))
            .map(|target| match_word_case(word, target))
            .unwrap_or_else(|| word.to_string())
    }
}

/// Longer spelling wins; on equal length the accented one
fn prefer(candidate: &str, chosen: &str) -> bool {
    let (c_len, o_len) = (candidate.chars().count(), chosen.chars().count());
    c_len > o_len || (c_len == o_len && !candidate.is_ascii() && chosen.is_ascii())
}

fn polish_french_spacing(text: &str) -> String {
    let out = SPACE_BEFORE_PUNCT_RE.replace_all(text, "${1}");
    let out = SPACE_AFTER_OPEN_RE.replace_all(&out, "${1}");
    let out = SPACE_BEFORE_CLOSE_RE.replace_all(&out, "${1}");
    let out = SPACED_APOSTROPHE_RE.replace_all(&out, "'");
    let out = VOUS_ETE_RE.replace_all(&out, "vous êtes");
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
