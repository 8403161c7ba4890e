//! Whole-turn behaviour of the engine with heuristic and scripted agents

mod common;

use std::sync::Arc;

use tokio::sync::mpsc;

use common::{drain, engine_with, heuristic_engine, spoken, Scripted};
use scam_call_sim::agents::ReplyChunk;
use scam_call_sim::engine::MessageRole;
use scam_call_sim::SimError;

#[tokio::test]
async fn test_stages_advance_and_never_regress() {
    let engine = heuristic_engine();

    let snapshot = engine.step("Bonjour, support Microsoft").await.unwrap();
    assert_eq!(snapshot.stage_index, 0);
    assert_eq!(snapshot.stage_name, "Ouverture");

    let snapshot = engine.step("installez anydesk maintenant").await.unwrap();
    assert!(snapshot.stage_index >= 2);
    let reached = snapshot.stage_index;

    let snapshot = engine.step("Bonjour, ici Windows").await.unwrap();
    assert_eq!(snapshot.stage_index, reached);
    assert_eq!(snapshot.turn_count, 3);
    assert_eq!(snapshot.messages.len(), 6);
}

#[tokio::test]
async fn test_messages_alternate_roles() {
    let engine = heuristic_engine();
    engine.step("Vous avez un virus").await.unwrap();
    let snapshot = engine.step("Donnez le mot de passe").await.unwrap();

    let roles: Vec<MessageRole> = snapshot.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::Scammer,
            MessageRole::Victim,
            MessageRole::Scammer,
            MessageRole::Victim
        ]
    );
    assert_eq!(
        snapshot.messages[3].content,
        "Je ne donne jamais mes informations privees par telephone."
    );
}

#[tokio::test]
async fn test_voted_constraint_lasts_two_turns() {
    let engine = heuristic_engine();
    let snapshot = engine
        .select_choices(Some(vec!["Le chien aboie dans le jardin".to_string()]))
        .await;
    assert_eq!(snapshot.selected_choices.len(), 3);

    let snapshot = engine.vote_choice(0).await.unwrap();
    assert_eq!(snapshot.audience_constraint, "Le chien aboie dans le jardin");
    assert_eq!(snapshot.audience_constraint_turns_left, 2);
    assert_eq!(snapshot.last_winner, "Le chien aboie dans le jardin");

    let snapshot = engine.step("Bonjour").await.unwrap();
    assert_eq!(snapshot.audience_constraint_turns_left, 1);
    let reply = &snapshot.messages[1];
    assert!(reply.content.contains("le chien aboie dans le jardin"));
    assert_eq!(reply.sound_effects, vec!["DOG_BARKING".to_string()]);

    let snapshot = engine.step("Bonjour").await.unwrap();
    assert_eq!(snapshot.audience_constraint_turns_left, 0);
    assert!(snapshot.audience_constraint.is_empty());

    let snapshot = engine.step("Bonjour").await.unwrap();
    assert!(!snapshot.messages[5].content.contains("Attendez deux secondes"));
}

#[tokio::test]
async fn test_director_cannot_move_backward() {
    let director = Scripted::answering(
        r#"{"next_stage_key": "contact_opening", "objective": "Recommencer", "reason": "retour"}"#,
    )
    .first(r#"{"next_stage_key": "credential_or_payment", "objective": "", "reason": "paiement"}"#);
    let engine = engine_with(Some(director), None, None);

    let snapshot = engine.step("Payez maintenant").await.unwrap();
    assert_eq!(snapshot.stage_index, 3);
    assert_eq!(snapshot.director_reason, "paiement");
    assert_eq!(snapshot.stage_name, "Identifiants ou paiement");

    let snapshot = engine.step("Bonjour").await.unwrap();
    assert_eq!(snapshot.stage_index, 3);
    assert_eq!(snapshot.director_reason, "retour");
    assert_ne!(snapshot.current_objective, "Recommencer");
}

#[tokio::test]
async fn test_stream_failure_retracts_then_retries() {
    let opening = "Ecoutez, je ne sais pas qui vous etes, mais ma fille m'a dit de me mefier ";
    let victim = Scripted::answering("Je vais appeler ma fille.")
        .with_fragments(&[Ok(opening), Ok("de ce genre "), Err("connection reset by peer")]);
    let engine = engine_with(None, None, Some(victim));

    let (tx, rx) = mpsc::channel(128);
    let listener = tokio::spawn(drain(rx));
    let snapshot = engine.step_stream("Bonjour", tx).await.unwrap();
    let chunks = listener.await.unwrap();

    assert!(chunks.contains(&ReplyChunk::Retract));
    assert_eq!(spoken(&chunks), "Je vais appeler ma fille.");
    assert_eq!(snapshot.messages[1].content, "Je vais appeler ma fille.");
    assert_eq!(snapshot.turn_count, 1);
}

#[tokio::test]
async fn test_streamed_reply_with_constraint_matches_recorded_reply() {
    let victim = Scripted::answering("unused").with_fragments(&[Ok("Je ne "), Ok("comprends pas.")]);
    let engine = engine_with(None, None, Some(victim));
    engine
        .select_choices(Some(vec!["Le chien aboie dans le jardin".to_string()]))
        .await;
    engine.vote_choice(0).await.unwrap();

    let (tx, rx) = mpsc::channel(128);
    let listener = tokio::spawn(drain(rx));
    let snapshot = engine.step_stream("Bonjour", tx).await.unwrap();
    let chunks = listener.await.unwrap();

    let recorded = &snapshot.messages[1];
    assert_eq!(
        recorded.content,
        "Je ne comprends pas. Attendez deux secondes, le chien aboie dans le jardin"
    );
    assert_eq!(spoken(&chunks), recorded.content);
    assert_eq!(recorded.sound_effects, vec!["DOG_BARKING".to_string()]);
    assert_eq!(snapshot.audience_constraint_turns_left, 1);
}

#[tokio::test]
async fn test_stream_without_generator_sends_heuristic_words() {
    let engine = heuristic_engine();
    let (tx, rx) = mpsc::channel(128);
    let listener = tokio::spawn(drain(rx));
    let snapshot = engine.step_stream("C'est urgent", tx).await.unwrap();
    let chunks = listener.await.unwrap();

    assert!(chunks.len() > 1);
    assert_eq!(spoken(&chunks), snapshot.messages[1].content);
    assert_eq!(snapshot.messages[1].sound_effects, vec!["COUGHING_FIT".to_string()]);
}

#[tokio::test]
async fn test_stream_validation_sends_nothing() {
    let engine = heuristic_engine();
    let (tx, rx) = mpsc::channel(8);
    let err = engine.step_stream("  ", tx).await.unwrap_err();
    assert!(matches!(err, SimError::Validation(_)));
    assert!(drain(rx).await.is_empty());
}

#[tokio::test]
async fn test_selection_is_zero_or_three() {
    let engine = heuristic_engine();

    let snapshot = engine.select_choices(None).await;
    assert!(snapshot.selected_choices.is_empty());

    engine.submit_proposal("Le facteur sonne").await.unwrap();
    let snapshot = engine.select_choices(None).await;
    assert_eq!(snapshot.selected_choices.len(), 3);
    assert!(snapshot.pending_proposals.is_empty());

    let many: Vec<String> = (1..=6).map(|i| format!("Interruption numero {}", i)).collect();
    let snapshot = engine.select_choices(Some(many)).await;
    assert_eq!(snapshot.selected_choices.len(), 3);
    assert_eq!(snapshot.selected_choices[0], "Interruption numero 1");

    let snapshot = engine
        .select_choices(Some(vec!["violence".to_string(), "  ".to_string()]))
        .await;
    assert!(snapshot.selected_choices.is_empty());
}

#[tokio::test]
async fn test_moderator_model_picks_only_candidates() {
    let moderator = Scripted::answering(r#"["Proposition D", "Une invention", "Proposition B"]"#);
    let calls = moderator.calls.clone();
    let engine = engine_with(None, Some(moderator), None);

    let proposals: Vec<String> = ["A", "B", "C", "D"]
        .iter()
        .map(|s| format!("Proposition {}", s))
        .collect();
    let snapshot = engine.select_choices(Some(proposals)).await;

    assert_eq!(
        snapshot.selected_choices,
        vec!["Proposition D", "Proposition B", "Proposition A"]
    );
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_simulated_vote_without_choices_changes_nothing() {
    let engine = heuristic_engine();
    engine.step("Bonjour").await.unwrap();
    let before = engine.snapshot().await;

    let err = engine.simulate_vote().await.unwrap_err();
    assert_eq!(
        err,
        SimError::Validation("Aucun choix audience disponible pour un vote simule.".to_string())
    );
    assert_eq!(engine.snapshot().await, before);
}

#[tokio::test]
async fn test_simulated_vote_picks_a_selected_choice() {
    let engine = heuristic_engine();
    let selected = engine
        .select_choices(Some(vec!["On sonne a la porte".to_string()]))
        .await
        .selected_choices;
    let snapshot = engine.simulate_vote().await.unwrap();
    assert!(selected.contains(&snapshot.audience_constraint));
    assert_eq!(snapshot.audience_constraint_turns_left, 2);
}

#[tokio::test]
async fn test_concurrent_steps_are_serialised() {
    let engine = Arc::new(heuristic_engine());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.step(&format!("Bonjour {}", i)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.turn_count, 8);
    assert_eq!(snapshot.messages.len(), 16);
    for pair in snapshot.messages.chunks(2) {
        assert_eq!(pair[0].role, MessageRole::Scammer);
        assert_eq!(pair[1].role, MessageRole::Victim);
    }
}

#[tokio::test]
async fn test_snapshot_reports_model_availability() {
    let engine = engine_with(
        Some(Scripted::failing()),
        Some(Scripted::failing()),
        Some(Scripted::failing()),
    );
    let snapshot = engine.step("Bonjour").await.unwrap();
    assert!(snapshot.llm.llm_enabled);
    assert_eq!(snapshot.messages.len(), 2);
}
