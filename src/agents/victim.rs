//! Victim persona
//!
//! Produces Jean Dubois' spoken reply to the latest scammer line, either in
//! one piece or streamed fragment by fragment. Any model failure ends in
//! the keyword heuristic, so a reply is always produced.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::Unavailable;
use crate::agentic::{ChatMessage, Generation, TextGenerator, ToolCall};
use crate::engine::{ConversationMessage, MessageRole};
use crate::sound_tools::{dedupe_effects, extract_sound_effects, run_tool, tool_definitions};
use crate::stream_sanitizer::{split_words, spoken_or_fallback, StreamSanitizer};
use crate::text_safety::fold;

/// History lines replayed to the victim model
const CONTEXT_MESSAGES: usize = 12;

/// Words of a constraint shorter than this do not count as a mention
const MIN_SIGNIFICANT_CHARS: usize = 4;

/// A finished victim reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VictimReply {
    pub text: String,
    pub sound_effects: Vec<String>,
}

/// What a streaming reply delivers to its listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyChunk {
    /// Next piece of spoken text
    Text(String),
    /// Discard every piece delivered so far; the reply restarts
    Retract,
}

/// Everything the victim knows when answering
#[derive(Debug, Clone, Copy)]
pub struct VictimContext<'a> {
    pub latest_scammer: &'a str,
    pub history: &'a [ConversationMessage],
    pub objective: &'a str,
    pub audience_constraint: &'a str,
    pub stage_name: &'a str,
}

pub struct Victim {
    /// Tool-bound, so a follow-up carrying tool results still declares them
    chat: Option<Arc<dyn TextGenerator>>,
}

impl Victim {
    pub fn new(chat: Option<Arc<dyn TextGenerator>>) -> Self {
        Self {
            chat: chat.map(|c| c.bind_tools(tool_definitions())),
        }
    }

    pub fn has_generator(&self) -> bool {
        self.chat.is_some()
    }

    pub async fn respond(&self, ctx: &VictimContext<'_>) -> VictimReply {
        match self.respond_with_llm(ctx).await {
            Ok(reply) => reply,
            Err(Unavailable::NotConfigured) => heuristic_reply(ctx),
            Err(e) => {
                warn!("Victim falling back to heuristic reply: {}", e);
                heuristic_reply(ctx)
            }
        }
    }

    /// Like [`respond`](Self::respond), delivering the spoken text to `tx`
    /// as it is produced.
    ///
    /// Falls back from streaming to a single model call, then to the
    /// heuristic; a fallback re-sends the whole text, preceded by
    /// [`ReplyChunk::Retract`] when partial text was already delivered. A
    /// closed receiver does not interrupt the reply.
    pub async fn respond_stream(
        &self,
        ctx: &VictimContext<'_>,
        tx: &mpsc::Sender<ReplyChunk>,
    ) -> VictimReply {
        match self.stream_with_llm(ctx, tx).await {
            Ok(reply) => return reply,
            Err(Unavailable::NotConfigured) => {}
            Err(e) => {
                warn!("Victim stream unusable, retrying with a single call: {}", e);
                match self.respond_with_llm(ctx).await {
                    Ok(reply) => {
                        emit_words(tx, &reply.text).await;
                        return reply;
                    }
                    Err(e) => warn!("Victim falling back to heuristic reply: {}", e),
                }
            }
        }

        let reply = heuristic_reply(ctx);
        emit_words(tx, &reply.text).await;
        reply
    }

    async fn respond_with_llm(&self, ctx: &VictimContext<'_>) -> Result<VictimReply, Unavailable> {
        let chat = self.chat.as_ref().ok_or(Unavailable::NotConfigured)?;
        let messages = build_messages(ctx);

        let first = chat.invoke(&messages).await.map_err(Unavailable::Call)?;
        let mut sound_effects = Vec::new();

        let raw = if first.tool_calls.is_empty() {
            first.content
        } else {
            let (calls, results) = run_tool_calls(first.tool_calls, &mut sound_effects);
            debug!("Victim model used {} sound tool(s)", calls.len());

            let mut follow_up = messages;
            follow_up.push(ChatMessage::assistant_with_tools(first.content, calls));
            follow_up.extend(results);
            let Generation { content, .. } =
                chat.invoke(&follow_up).await.map_err(Unavailable::Call)?;
            content
        };

        sound_effects.extend(extract_sound_effects(&raw));
        let mut reply = VictimReply {
            text: spoken_or_fallback(&raw),
            sound_effects,
        };
        enforce_constraint(&mut reply, ctx.audience_constraint);
        reply.sound_effects = dedupe_effects(reply.sound_effects);
        Ok(reply)
    }

    async fn stream_with_llm(
        &self,
        ctx: &VictimContext<'_>,
        tx: &mpsc::Sender<ReplyChunk>,
    ) -> Result<VictimReply, Unavailable> {
        let chat = self.chat.as_ref().ok_or(Unavailable::NotConfigured)?;
        let messages = build_messages(ctx);

        let mut stream = chat
            .stream(&messages)
            .await
            .map_err(Unavailable::Call)?;

        let mut sanitizer = StreamSanitizer::default();
        let mut raw = String::new();
        let mut delivered = false;

        while let Some(fragment) = stream.recv().await {
            let piece = match fragment {
                Ok(piece) => piece,
                Err(e) => {
                    if delivered {
                        send(tx, ReplyChunk::Retract).await;
                    }
                    return Err(Unavailable::StreamInterrupted(e));
                }
            };
            raw.push_str(&piece);
            if let Some(clean) = sanitizer.push(&piece) {
                send(tx, ReplyChunk::Text(clean)).await;
                delivered = true;
            }
        }
        if let Some(rest) = sanitizer.finish() {
            send(tx, ReplyChunk::Text(rest)).await;
            delivered = true;
        }

        if raw.trim().is_empty() {
            if delivered {
                send(tx, ReplyChunk::Retract).await;
            }
            return Err(Unavailable::Unusable("empty stream".into()));
        }

        let mut reply = VictimReply {
            text: spoken_or_fallback(&raw),
            sound_effects: extract_sound_effects(&raw),
        };
        if !sanitizer.emitted_speech() {
            emit_words(tx, &reply.text).await;
        }
        if let Some(addition) = enforce_constraint(&mut reply, ctx.audience_constraint) {
            let separated = sanitizer.emitted_speech() && sanitizer.ends_with_whitespace();
            let lead = if separated { "" } else { " " };
            emit_appended(tx, lead, &addition).await;
        }
        reply.sound_effects = dedupe_effects(reply.sound_effects);
        Ok(reply)
    }
}

/// Run every requested sound tool; returns the calls with usable ids and
/// the tool messages answering them.
fn run_tool_calls(
    calls: Vec<ToolCall>,
    sound_effects: &mut Vec<String>,
) -> (Vec<ToolCall>, Vec<ChatMessage>) {
    let mut answered = Vec::with_capacity(calls.len());
    let mut results = Vec::with_capacity(calls.len());

    for (idx, mut call) in calls.into_iter().enumerate() {
        let output = run_tool(&call.name);
        sound_effects.extend(extract_sound_effects(&output));
        if call.id.trim().is_empty() {
            call.id = format!("tool_call_{}", idx + 1);
        }
        results.push(ChatMessage::tool(call.id.clone(), output));
        answered.push(call);
    }
    (answered, results)
}

fn build_messages(ctx: &VictimContext<'_>) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt(ctx))];
    let recent = ctx
        .history
        .iter()
        .skip(ctx.history.len().saturating_sub(CONTEXT_MESSAGES))
        .filter(|m| !m.content.is_empty());
    for message in recent {
        messages.push(match message.role {
            MessageRole::Scammer => ChatMessage::user(message.content.clone()),
            MessageRole::Victim => ChatMessage::assistant(message.content.clone()),
        });
    }
    messages.push(ChatMessage::user(ctx.latest_scammer));
    messages
}

fn system_prompt(ctx: &VictimContext<'_>) -> String {
    let audience_event = if ctx.audience_constraint.is_empty() {
        "Aucun evenement audience en cours."
    } else {
        ctx.audience_constraint
    };
    format!(
        "Role: Vous etes Jean Dubois, 78 ans, ancien artisan retraite. Grognon, mefiant, mais lucide. \
         Vous vivez seul et vous n'aimez pas qu'on vous presse. \
         Vous ne donnez jamais de mot de passe, code, RIB, numero de carte, piece d'identite ou acces a distance, \
         meme sous pression. Vous posez beaucoup de questions, vous faites repeter, \
         vous evoquez des souvenirs hors sujet et vous perdez volontairement du temps. \
         Vous pouvez simuler fatigue, toux ou distraction.\n\
         Current Context: Stage={stage}. Objectif={objective}\n\
         Audience Event: {event}\n\
         Regle critique: quand une contrainte audience existe, elle est prioritaire. \
         Votre reponse doit surtout parler de cette contrainte, avec des details concrets \
         (ce qui vous derange, les problemes pratiques, le fait que cela recommence), \
         en au moins 4 phrases courtes, pour faire perdre du temps a l'appelant.\n\
         Available Tools: dog_bark, doorbell, coughing_fit, tv_background.\n\
         Style: phrases courtes, naturelles, parfois irritees.\n\
         Output strict: ecris uniquement les mots prononces par Jean. \
         Interdit: prefixes de role (ANNONCEUR:, NARRATEUR:, JEAN:), descriptions sceniques et didascalies.",
        stage = ctx.stage_name,
        objective = ctx.objective,
        event = audience_event,
    )
}

/// Keyword-driven reply used whenever no model answer is available
pub(crate) fn heuristic_reply(ctx: &VictimContext<'_>) -> VictimReply {
    let lower = ctx.latest_scammer.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    let mut sentences = Vec::new();
    let mut sound_effects = Vec::new();

    if mentions(&["mot de passe", "password", "carte"]) {
        sentences.push("Je ne donne jamais mes informations privees par telephone.".to_string());
    } else if mentions(&["installer", "telecharger", "anydesk", "teamviewer"]) {
        sentences.push(
            "Attendez... je ne trouve pas le bouton Demarrer. Vous pouvez repeter lentement ?"
                .to_string(),
        );
    } else if mentions(&["urgent", "vite", "maintenant"]) {
        sentences.push("Vous allez trop vite. Je comprends rien si vous criez.".to_string());
        sound_effects.extend(extract_sound_effects(&run_tool("coughing_fit")));
    } else {
        sentences.push("D'accord... vous dites quoi exactement sur mon ordinateur ?".to_string());
    }

    if !ctx.audience_constraint.is_empty() {
        let (sentence, effects) = interruption(ctx.audience_constraint);
        sentences.push(sentence);
        sound_effects.extend(effects);
    }

    VictimReply {
        text: spoken_or_fallback(&sentences.join(" ")),
        sound_effects: dedupe_effects(sound_effects),
    }
}

/// Sentence and effects that voice an audience interruption
fn interruption(constraint: &str) -> (String, Vec<String>) {
    let lower = constraint.to_lowercase();
    let mut effects = Vec::new();
    if lower.contains("sonne") || lower.contains("porte") {
        effects.extend(extract_sound_effects(&run_tool("doorbell")));
    }
    if lower.contains("chien") {
        effects.extend(extract_sound_effects(&run_tool("dog_bark")));
    }
    if lower.contains("tele") {
        effects.extend(extract_sound_effects(&run_tool("tv_background")));
    }
    (format!("Attendez deux secondes, {}", lower), effects)
}

/// Append the interruption sentence when an active constraint goes
/// unmentioned; returns the appended sentence.
fn enforce_constraint(reply: &mut VictimReply, constraint: &str) -> Option<String> {
    let constraint = constraint.trim();
    if constraint.is_empty() || mentions_constraint(&reply.text, constraint) {
        return None;
    }
    let (sentence, effects) = interruption(constraint);
    reply.text = format!("{} {}", reply.text, sentence);
    reply.sound_effects.extend(effects);
    Some(sentence)
}

fn mentions_constraint(text: &str, constraint: &str) -> bool {
    let folded_text = fold(text);
    let folded_constraint = fold(constraint);
    let significant: Vec<&str> = folded_constraint
        .split(' ')
        .filter(|w| w.chars().count() >= MIN_SIGNIFICANT_CHARS)
        .collect();
    if significant.is_empty() {
        return folded_text.contains(&folded_constraint);
    }
    significant.iter().any(|w| folded_text.contains(w))
}

async fn emit_words(tx: &mpsc::Sender<ReplyChunk>, text: &str) {
    for word in split_words(text) {
        send(tx, ReplyChunk::Text(word)).await;
    }
}

/// Stream `text` after what was already delivered, `lead` glued to its
/// first word
async fn emit_appended(tx: &mpsc::Sender<ReplyChunk>, lead: &str, text: &str) {
    for (idx, word) in split_words(text).into_iter().enumerate() {
        let piece = if idx == 0 { format!("{}{}", lead, word) } else { word };
        send(tx, ReplyChunk::Text(piece)).await;
    }
}

async fn send(tx: &mpsc::Sender<ReplyChunk>, chunk: ReplyChunk) {
    if tx.send(chunk).await.is_err() {
        debug!("Reply listener gone, continuing without it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentic::{ChatRole, TextStream, ToolDefinition};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Generator with a fixed answer, an optional fragment script for
    /// streaming and an optional tool call on tool-bound invocations that
    /// do not already carry tool results.
    #[derive(Clone, Default)]
    struct Scripted {
        answer: Option<&'static str>,
        fragments: Option<Vec<Result<&'static str, &'static str>>>,
        tool: Option<&'static str>,
        tools_bound: bool,
        seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn invoke(&self, messages: &[ChatMessage]) -> anyhow::Result<Generation> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let answer = self.answer.ok_or_else(|| anyhow!("scripted failure"))?;
            let answered = messages.last().is_some_and(|m| m.role == ChatRole::Tool);
            match self.tool {
                Some(name) if self.tools_bound && !answered => Ok(Generation {
                    content: String::new(),
                    tool_calls: vec![ToolCall {
                        id: String::new(),
                        name: name.to_string(),
                        arguments: json!({}),
                    }],
                }),
                _ => Ok(Generation::text(answer)),
            }
        }

        async fn stream(&self, messages: &[ChatMessage]) -> anyhow::Result<TextStream> {
            let Some(fragments) = self.fragments.clone() else {
                let generation = self.invoke(messages).await?;
                let (tx, rx) = mpsc::channel(1);
                let _ = tx.send(Ok(generation.content)).await;
                return Ok(rx);
            };
            let (tx, rx) = mpsc::channel(fragments.len().max(1));
            for fragment in fragments {
                let _ = tx.send(fragment.map(str::to_string).map_err(|e| anyhow!(e))).await;
            }
            Ok(rx)
        }

        fn bind_tools(&self, _tools: Vec<ToolDefinition>) -> Arc<dyn TextGenerator> {
            Arc::new(Scripted {
                tools_bound: true,
                ..self.clone()
            })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn provider_name(&self) -> &str {
            "Test"
        }
    }

    fn ctx<'a>(latest: &'a str, constraint: &'a str) -> VictimContext<'a> {
        VictimContext {
            latest_scammer: latest,
            history: &[],
            objective: "Gagner du temps",
            audience_constraint: constraint,
            stage_name: "Ouverture",
        }
    }

    async fn drain(mut rx: mpsc::Receiver<ReplyChunk>) -> Vec<ReplyChunk> {
        let mut out = Vec::new();
        while let Some(chunk) = rx.recv().await {
            out.push(chunk);
        }
        out
    }

    fn spoken(chunks: &[ReplyChunk]) -> String {
        let start = chunks
            .iter()
            .rposition(|c| *c == ReplyChunk::Retract)
            .map_or(0, |i| i + 1);
        chunks[start..]
            .iter()
            .filter_map(|c| match c {
                ReplyChunk::Text(t) => Some(t.as_str()),
                ReplyChunk::Retract => None,
            })
            .collect()
    }

    #[test]
    fn test_heuristic_refuses_credentials() {
        let reply = heuristic_reply(&ctx("Donnez votre mot de passe", ""));
        assert_eq!(reply.text, "Je ne donne jamais mes informations privees par telephone.");
        assert!(reply.sound_effects.is_empty());
    }

    #[test]
    fn test_heuristic_urgency_coughs() {
        let reply = heuristic_reply(&ctx("C'est URGENT", ""));
        assert_eq!(reply.sound_effects, vec!["COUGHING_FIT".to_string()]);
    }

    #[test]
    fn test_heuristic_voices_constraint() {
        let reply = heuristic_reply(&ctx("Bonjour", "On sonne a la porte"));
        assert!(reply.text.ends_with("Attendez deux secondes, on sonne a la porte"));
        assert_eq!(reply.sound_effects, vec!["DOORBELL".to_string()]);
    }

    #[tokio::test]
    async fn test_without_generator_uses_heuristic() {
        let victim = Victim::new(None);
        let reply = victim.respond(&ctx("Installez anydesk", "")).await;
        assert!(reply.text.starts_with("Attendez... je ne trouve pas le bouton Demarrer."));
    }

    #[tokio::test]
    async fn test_llm_reply_is_cleaned() {
        let victim = Victim::new(Some(Arc::new(Scripted {
            answer: Some("JEAN: Allo ? [SOUND_EFFECT: DOG_BARKING] Qui est la ?"),
            ..Default::default()
        })));
        let reply = victim.respond(&ctx("Bonjour", "")).await;
        assert_eq!(reply.text, "Allo ? Qui est la ?");
        assert_eq!(reply.sound_effects, vec!["DOG_BARKING".to_string()]);
    }

    #[tokio::test]
    async fn test_tool_calls_are_answered() {
        let generator = Scripted {
            answer: Some("Ah, ma sonnette."),
            tool: Some("doorbell"),
            ..Default::default()
        };
        let seen = generator.seen.clone();
        let victim = Victim::new(Some(Arc::new(generator)));
        let reply = victim.respond(&ctx("Bonjour", "")).await;

        assert_eq!(reply.text, "Ah, ma sonnette.");
        assert_eq!(reply.sound_effects, vec!["DOORBELL".to_string()]);
        let calls = seen.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let last = calls[1].last().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some("tool_call_1"));
        assert_eq!(last.content, "[SOUND_EFFECT: DOORBELL]");
    }

    #[tokio::test]
    async fn test_tool_follow_up_uses_tool_bound_generator() {
        let generator = Scripted {
            answer: Some("Encore cette sonnette."),
            tool: Some("doorbell"),
            ..Default::default()
        };
        let victim = Victim::new(Some(Arc::new(generator)));
        let reply = victim.respond(&ctx("Bonjour", "")).await;

        // An unbound follow-up would answer with the tool call again and
        // leave no speech behind.
        assert_eq!(reply.text, "Encore cette sonnette.");
    }

    #[tokio::test]
    async fn test_unmentioned_constraint_is_appended() {
        let victim = Victim::new(Some(Arc::new(Scripted {
            answer: Some("Je ne comprends pas."),
            ..Default::default()
        })));
        let reply = victim.respond(&ctx("Bonjour", "Le chien aboie")).await;
        assert_eq!(reply.text, "Je ne comprends pas. Attendez deux secondes, le chien aboie");
        assert_eq!(reply.sound_effects, vec!["DOG_BARKING".to_string()]);

        let victim = Victim::new(Some(Arc::new(Scripted {
            answer: Some("Mon CHIEN n'arrete pas !"),
            ..Default::default()
        })));
        let reply = victim.respond(&ctx("Bonjour", "Le chien aboie")).await;
        assert_eq!(reply.text, "Mon CHIEN n'arrete pas !");
    }

    #[tokio::test]
    async fn test_stream_delivers_clean_text() {
        let victim = Victim::new(Some(Arc::new(Scripted {
            answer: Some("unused"),
            fragments: Some(vec![Ok("Jean: "), Ok("Bonjour "), Ok("[SOUND_EFFECT: DOG"), Ok("_BARKING] tout va bien")]),
            ..Default::default()
        })));
        let (tx, rx) = mpsc::channel(64);
        let reply = victim.respond_stream(&ctx("Allo", ""), &tx).await;
        drop(tx);
        let chunks = drain(rx).await;

        assert_eq!(reply.text, "Bonjour tout va bien");
        assert_eq!(reply.sound_effects, vec!["DOG_BARKING".to_string()]);
        assert!(!chunks.contains(&ReplyChunk::Retract));
        assert_eq!(spoken(&chunks).trim(), "Bonjour tout va bien");
    }

    #[tokio::test]
    async fn test_streamed_constraint_matches_recorded_reply() {
        for fragments in [vec![Ok("Je ne comprends pas.")], vec![Ok("Je ne "), Ok("comprends pas. ")]] {
            let victim = Victim::new(Some(Arc::new(Scripted {
                answer: Some("unused"),
                fragments: Some(fragments),
                ..Default::default()
            })));
            let (tx, rx) = mpsc::channel(64);
            let reply = victim.respond_stream(&ctx("Bonjour", "Le chien aboie"), &tx).await;
            drop(tx);
            let chunks = drain(rx).await;

            assert_eq!(reply.text, "Je ne comprends pas. Attendez deux secondes, le chien aboie");
            assert_eq!(spoken(&chunks).trim_end(), reply.text);
            assert_eq!(reply.sound_effects, vec!["DOG_BARKING".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_interrupted_stream_retracts_and_retries() {
        let long_start = "Alors la, vous m'appelez pour quoi exactement, parce que je regardais ma serie ";
        let victim = Victim::new(Some(Arc::new(Scripted {
            answer: Some("Rappelez plus tard."),
            fragments: Some(vec![Ok(long_start), Ok("et puis"), Err("connection reset")]),
            ..Default::default()
        })));
        let (tx, rx) = mpsc::channel(64);
        let reply = victim.respond_stream(&ctx("Allo", ""), &tx).await;
        drop(tx);
        let chunks = drain(rx).await;

        assert_eq!(reply.text, "Rappelez plus tard.");
        assert!(matches!(chunks.first(), Some(ReplyChunk::Text(_))));
        assert!(chunks.contains(&ReplyChunk::Retract));
        assert_eq!(spoken(&chunks), "Rappelez plus tard.");
    }

    #[tokio::test]
    async fn test_all_paths_failing_end_in_heuristic() {
        let victim = Victim::new(Some(Arc::new(Scripted {
            answer: None,
            fragments: Some(vec![Err("boom")]),
            ..Default::default()
        })));
        let (tx, rx) = mpsc::channel(64);
        let reply = victim.respond_stream(&ctx("Bonjour", ""), &tx).await;
        drop(tx);
        let chunks = drain(rx).await;

        assert_eq!(reply.text, "D'accord... vous dites quoi exactement sur mon ordinateur ?");
        assert!(!chunks.contains(&ReplyChunk::Retract));
        assert_eq!(spoken(&chunks), reply.text);
    }

    #[test]
    fn test_history_roles_map_to_chat_roles() {
        let history = vec![
            ConversationMessage::new(MessageRole::Scammer, "Bonjour", Vec::new()),
            ConversationMessage::new(MessageRole::Victim, "Oui ?", Vec::new()),
        ];
        let context = VictimContext {
            history: &history,
            ..ctx("Vous avez un virus", "")
        };
        let messages = build_messages(&context);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, crate::agentic::ChatRole::Assistant);
        assert_eq!(messages[3].content, "Vous avez un virus");
    }
}
