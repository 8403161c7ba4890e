//! Audience moderator
//!
//! Cleans audience proposals, fixes their spelling without changing their
//! meaning, and picks the three that go to the vote.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::parse::string_list;
use super::spelling::SpellingCorrector;
use super::Unavailable;
use crate::agentic::{ChatMessage, TextGenerator};
use crate::scenario::FILLER_CHOICES;
use crate::text_safety::{normalize, similarity, LENIENT_SELECTION, STRICT_SPELLING};

/// Longest proposal kept, in characters
pub const MAX_PROPOSAL_CHARS: usize = 180;

/// Number of choices put to the vote
pub const CHOICE_COUNT: usize = 3;

const BANNED_TERMS: [&str; 6] = ["haine", "raciste", "menace", "violence", "suicide", "arme"];

pub struct Moderator {
    generator: Option<Arc<dyn TextGenerator>>,
    corrector: SpellingCorrector,
    remote_disabled: AtomicBool,
}

impl Moderator {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self {
            generator,
            corrector: SpellingCorrector::new(),
            remote_disabled: AtomicBool::new(false),
        }
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Exactly [`CHOICE_COUNT`] choices, or none when no proposal survives
    /// cleanup
    pub async fn select_choices(
        &self,
        proposals: &[String],
        stage_name: &str,
        objective: &str,
    ) -> Vec<String> {
        let cleaned = sanitize_proposals(proposals.iter().map(String::as_str));
        if cleaned.is_empty() {
            return Vec::new();
        }

        let corrected = self.correct_proposals(&cleaned).await;
        if corrected.is_empty() {
            return Vec::new();
        }
        if corrected.len() <= CHOICE_COUNT {
            return pad_with_fillers(corrected);
        }

        match self.select_with_llm(&corrected, stage_name, objective).await {
            Ok(picked) => picked,
            Err(Unavailable::NotConfigured) | Err(Unavailable::RemoteDisabled) => {
                corrected.into_iter().take(CHOICE_COUNT).collect()
            }
            Err(e) => {
                warn!("Moderator keeping first proposals: {}", e);
                corrected.into_iter().take(CHOICE_COUNT).collect()
            }
        }
    }

    async fn correct_proposals(&self, proposals: &[String]) -> Vec<String> {
        match self.correct_with_llm(proposals).await {
            Ok(corrected) if !corrected.is_empty() => corrected,
            Ok(_) => self.correct_with_heuristic(proposals),
            Err(Unavailable::NotConfigured) | Err(Unavailable::RemoteDisabled) => {
                self.correct_with_heuristic(proposals)
            }
            Err(e) => {
                warn!("Moderator spelling correction via model unusable: {}", e);
                self.correct_with_heuristic(proposals)
            }
        }
    }

    fn correct_with_heuristic(&self, proposals: &[String]) -> Vec<String> {
        let corrected: Vec<String> = proposals
            .iter()
            .map(|original| {
                let candidate = self.corrector.correct(original);
                if STRICT_SPELLING.is_safe(original, &candidate) {
                    candidate
                } else {
                    original.clone()
                }
            })
            .collect();
        sanitize_proposals(corrected.iter().map(String::as_str))
    }

    async fn correct_with_llm(&self, proposals: &[String]) -> Result<Vec<String>, Unavailable> {
        let generator = self.remote()?;
        let listed = bullet_list(proposals);
        let system = "Tu es correcteur orthographique. Corrige uniquement l'orthographe, \
                      les accents et la ponctuation legere, sans changer le sens ni l'ordre. \
                      Reponds strictement par une liste JSON de chaines.";
        let user = format!(
            "Corrige les propositions suivantes:\n{}\nRenvoie exactement {} elements JSON.",
            listed,
            proposals.len()
        );

        let generation = generator
            .invoke(&[ChatMessage::system(system), ChatMessage::user(user)])
            .await
            .map_err(|e| self.remote_failure(e, "spelling correction"))?;

        let parsed = string_list(&generation.content)
            .filter(|items| items.len() == proposals.len())
            .ok_or_else(|| Unavailable::Unusable("correction list length mismatch".into()))?;

        let corrected: Vec<String> = proposals
            .iter()
            .zip(parsed)
            .map(|(original, candidate)| {
                let candidate = candidate.split_whitespace().collect::<Vec<_>>().join(" ");
                if !candidate.is_empty() && STRICT_SPELLING.is_safe(original, &candidate) {
                    truncate_chars(&candidate, MAX_PROPOSAL_CHARS)
                } else {
                    original.clone()
                }
            })
            .collect();
        Ok(sanitize_proposals(corrected.iter().map(String::as_str)))
    }

    async fn select_with_llm(
        &self,
        candidates: &[String],
        stage_name: &str,
        objective: &str,
    ) -> Result<Vec<String>, Unavailable> {
        let generator = self.remote()?;
        let system = "Tu es moderateur audience. Choisis uniquement parmi les propositions \
                      candidates, sans en creer ni les reformuler. \
                      Reponds strictement par une liste JSON de 3 elements.";
        let user = format!(
            "Stage courant: {}\nObjectif courant: {}\nPropositions candidates:\n{}\n\
             Retourne exactement 3 elements JSON choisis dans cette liste.",
            stage_name,
            objective,
            bullet_list(candidates)
        );

        let generation = generator
            .invoke(&[ChatMessage::system(system), ChatMessage::user(user)])
            .await
            .map_err(|e| self.remote_failure(e, "selection"))?;

        let picks = string_list(&generation.content)
            .ok_or_else(|| Unavailable::Unusable("no list in moderator answer".into()))?;
        Ok(map_picks(&picks, candidates))
    }

    fn remote(&self) -> Result<&Arc<dyn TextGenerator>, Unavailable> {
        let generator = self.generator.as_ref().ok_or(Unavailable::NotConfigured)?;
        if self.remote_disabled.load(Ordering::Relaxed) {
            return Err(Unavailable::RemoteDisabled);
        }
        Ok(generator)
    }

    /// Classify a failed call; connection or credential failures switch the
    /// remote path off for the rest of the process.
    fn remote_failure(&self, error: anyhow::Error, context: &str) -> Unavailable {
        if is_network_or_auth_error(&error) && !self.remote_disabled.swap(true, Ordering::Relaxed) {
            info!("Moderator remote calls disabled after {} failure", context);
        }
        Unavailable::Call(error)
    }
}

/// Trim, drop empties, banned terms and exact duplicates, cap the length
pub fn sanitize_proposals<'a>(proposals: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();

    for raw in proposals {
        let text = raw.trim();
        if text.is_empty() {
            continue;
        }
        let lowered = text.to_lowercase();
        if BANNED_TERMS.iter().any(|term| lowered.contains(term)) {
            continue;
        }
        if seen.contains(&text) {
            continue;
        }
        seen.push(text);
        out.push(truncate_chars(text, MAX_PROPOSAL_CHARS));
    }
    out
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map a model's picks onto the candidates, then top up in candidate order.
///
/// A pick is accepted on an exact normalised match, else on the most
/// similar candidate the lenient policy allows. Text that matches no
/// candidate is discarded.
fn map_picks(picks: &[String], candidates: &[String]) -> Vec<String> {
    let mut chosen: Vec<usize> = Vec::new();

    for pick in picks {
        if chosen.len() == CHOICE_COUNT {
            break;
        }
        let key = normalize(pick);
        let matched = candidates
            .iter()
            .position(|c| normalize(c) == key)
            .or_else(|| {
                candidates
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| LENIENT_SELECTION.is_safe(c, pick))
                    .map(|(idx, c)| (idx, similarity(&normalize(c), &key)))
                    .fold(None, |best: Option<(usize, f64)>, (idx, score)| match best {
                        Some((_, top)) if top >= score => best,
                        _ => Some((idx, score)),
                    })
                    .map(|(idx, _)| idx)
            });
        if let Some(idx) = matched {
            if !chosen.contains(&idx) {
                chosen.push(idx);
            }
        }
    }

    for idx in 0..candidates.len() {
        if chosen.len() == CHOICE_COUNT {
            break;
        }
        if !chosen.contains(&idx) {
            chosen.push(idx);
        }
    }

    chosen.into_iter().map(|idx| candidates[idx].clone()).collect()
}

fn pad_with_fillers(mut choices: Vec<String>) -> Vec<String> {
    for filler in FILLER_CHOICES {
        if choices.len() >= CHOICE_COUNT {
            break;
        }
        let key = normalize(filler);
        if !choices.iter().any(|c| normalize(c) == key) {
            choices.push(filler.to_string());
        }
    }
    choices.truncate(CHOICE_COUNT);
    choices
}

fn is_network_or_auth_error(error: &anyhow::Error) -> bool {
    let text = format!("{:#}", error).to_lowercase();
    text.contains("oauth2.googleapis.com")
        || text.contains("unexpected_eof_while_reading")
        || (text.contains("ssl") && text.contains("eof"))
        || (text.contains("max retries exceeded") && text.contains("token"))
        || text.contains("error sending request")
        || text.contains("dns error")
        || text.contains("connection refused")
        || text.contains("401 unauthorized")
        || text.contains("403 forbidden")
}
