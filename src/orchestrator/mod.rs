//! Turn orchestrator — the dialogue policy.
//!
//! Given the conversation so far and a new user utterance, decides whether
//! to request clarification, ask the next stored question, emit a generic
//! follow-up, or request a plan. The branch order is the policy contract:
//! later branches are reachable only when earlier ones are excluded.

use std::sync::Arc;

use crate::config::PortalConfig;
use crate::error::ServiceError;
use crate::intelligence::{ConversationTurn, IntelligenceService};
use crate::session::{Clarify, Plan, Session};

/// Fixed closing line once a plan already exists.
const CLOSING_MESSAGE: &str = "Your plan is ready. The most valuable next step \
is a real conversation — book a call whenever it suits you.";

/// Acknowledgment prefixed to the first generic follow-up.
const FOLLOW_UP_ACK: &str = "Thanks, that helps.";

/// Rotation of generic follow-up prompts used when clarify questions are
/// exhausted but it is too early to plan.
const FOLLOW_UP_PROMPTS: &[&str] = &[
    "What would success look like for you six months in?",
    "Is there anything you've already tried that didn't work out?",
    "Who else will be involved in this decision?",
    "What's the single biggest constraint you're working within?",
];

/// Intro sentence ahead of the plan summary, by trigger.
const PLAN_INTRO_NORMAL: &str = "I have enough context now — here's what I'd suggest.";
const PLAN_INTRO_TURN_LIMIT: &str =
    "We've covered a lot of ground, so let me pull this together.";
const PLAN_INTRO_CONFUSION: &str =
    "No problem — let me simplify things and sketch a direction for you.";

/// Phrases that signal the user is uncertain. Checked against the
/// lowercased utterance once the turn threshold is reached.
const CONFUSION_PHRASES: &[&str] = &[
    "not sure",
    "don't know",
    "dont know",
    "confused",
    "unsure",
    "no idea",
    "haven't decided",
    "havent decided",
    "still figuring",
    "overwhelmed",
    "too many options",
    "can't decide",
    "cant decide",
];

/// What the orchestrator decided for this turn.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// A plan already exists; redirect the user to a human conversation.
    Closing(String),
    /// First intelligence exchange: store the clarify data and reply with
    /// the understanding plus the first question.
    AskClarify { reply: String, clarify: Clarify },
    /// Ask the next stored clarify question verbatim.
    AskQuestion(String),
    /// Too early to plan; emit one generic follow-up and await more input.
    FollowUp(String),
    /// The plan was generated; reply with an intro plus its summary.
    PlanReady { reply: String, plan: Plan },
}

impl TurnOutcome {
    /// The assistant reply text for this outcome.
    pub fn reply(&self) -> &str {
        match self {
            Self::Closing(text) | Self::AskQuestion(text) | Self::FollowUp(text) => text,
            Self::AskClarify { reply, .. } | Self::PlanReady { reply, .. } => reply,
        }
    }
}

/// Why the plan branch fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanTrigger {
    Normal,
    TurnLimit,
    Confusion,
}

/// Dialogue policy over one session.
///
/// Holds the cross-turn counters the decision branches need: which clarify
/// question was asked last and how many generic follow-ups have gone out.
/// Counters are only advanced after a branch fully resolves, so a failed
/// intelligence call leaves the policy ready to retry the same branch.
pub struct TurnOrchestrator {
    intelligence: Arc<dyn IntelligenceService>,
    config: PortalConfig,
    /// Index of the last clarify question asked, once clarify data exists.
    question_index: Option<usize>,
    /// How many generic follow-ups have been emitted this session.
    follow_up_count: usize,
}

impl TurnOrchestrator {
    pub fn new(intelligence: Arc<dyn IntelligenceService>, config: PortalConfig) -> Self {
        Self {
            intelligence,
            config,
            question_index: None,
            follow_up_count: 0,
        }
    }

    /// Clear per-session counters. Called when a session starts or ends.
    pub fn reset(&mut self) {
        self.question_index = None;
        self.follow_up_count = 0;
    }

    /// Decide the next dialogue action for a just-received utterance.
    ///
    /// `session` must already contain the current utterance as its latest
    /// user message; the user turn number is the count of user messages.
    pub async fn next_turn(
        &mut self,
        session: &Session,
        utterance: &str,
    ) -> Result<TurnOutcome, ServiceError> {
        let user_turn = session.user_message_count();
        let confused = self.is_confused(user_turn, utterance);
        let limit_reached = user_turn >= self.config.max_turns;
        let shortcut = limit_reached || confused;

        // 1. Plan already exists — never restart the dialogue.
        if session.plan.is_some() {
            return Ok(TurnOutcome::Closing(CLOSING_MESSAGE.to_string()));
        }

        // 2. No clarify data yet — run the first intelligence exchange,
        // unless the turn limit or confusion forces a plan instead.
        if session.clarify.is_none() && !shortcut {
            let clarify = self
                .intelligence
                .clarify(utterance, session.privacy_mode)
                .await?;
            tracing::debug!(questions = clarify.questions.len(), "Clarify generated");
            let Some(first_question) = clarify.questions.first() else {
                return Err(ServiceError::InvalidResponse {
                    endpoint: "clarify".to_string(),
                    reason: "no questions returned".to_string(),
                });
            };
            let reply = format!("{} {}", clarify.understanding, first_question);
            self.question_index = Some(0);
            return Ok(TurnOutcome::AskClarify { reply, clarify });
        }

        // 3. More stored questions remain — ask the next one verbatim.
        if let Some(clarify) = &session.clarify {
            let last_asked = self.question_index.unwrap_or(0);
            if !shortcut && last_asked + 1 < clarify.questions.len() {
                let next = last_asked + 1;
                self.question_index = Some(next);
                return Ok(TurnOutcome::AskQuestion(clarify.questions[next].clone()));
            }
        }

        // 4. Questions exhausted but too early to plan — one generic
        // follow-up, then await the next input.
        if !shortcut && user_turn < self.config.min_turns_for_plan {
            let prompt = FOLLOW_UP_PROMPTS[self.follow_up_count % FOLLOW_UP_PROMPTS.len()];
            let text = if self.follow_up_count == 0 {
                format!("{FOLLOW_UP_ACK} {prompt}")
            } else {
                prompt.to_string()
            };
            self.follow_up_count += 1;
            return Ok(TurnOutcome::FollowUp(text));
        }

        // 5. Generate the plan from the full conversation, including the
        // utterance that triggered this turn.
        let trigger = if confused {
            PlanTrigger::Confusion
        } else if limit_reached {
            PlanTrigger::TurnLimit
        } else {
            PlanTrigger::Normal
        };
        let conversation = ConversationTurn::from_session(session);
        let plan = self
            .intelligence
            .plan(&conversation, session.privacy_mode)
            .await?;
        tracing::info!(?trigger, turn = user_turn, "Plan generated");
        let intro = match trigger {
            PlanTrigger::Normal => PLAN_INTRO_NORMAL,
            PlanTrigger::TurnLimit => PLAN_INTRO_TURN_LIMIT,
            PlanTrigger::Confusion => PLAN_INTRO_CONFUSION,
        };
        let reply = format!("{} {}", intro, plan.summary);
        Ok(TurnOutcome::PlanReady { reply, plan })
    }

    /// Keyword heuristic: the user sounds stuck and further questioning
    /// would not help.
    fn is_confused(&self, user_turn: usize, utterance: &str) -> bool {
        if user_turn < self.config.confusion_min_turn {
            return false;
        }
        let lower = utterance.to_lowercase();
        CONFUSION_PHRASES.iter().any(|phrase| lower.contains(phrase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::session::{Message, Plan, PrivacyMode, Role};

    /// Scripted intelligence stub that records which endpoint was hit.
    struct ScriptedIntelligence {
        clarify: Clarify,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedIntelligence {
        fn new(questions: &[&str]) -> Self {
            Self {
                clarify: Clarify {
                    understanding: "You want a new website.".to_string(),
                    questions: questions.iter().map(|q| q.to_string()).collect(),
                },
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IntelligenceService for ScriptedIntelligence {
        async fn clarify(
            &self,
            _user_message: &str,
            _privacy_mode: PrivacyMode,
        ) -> Result<Clarify, ServiceError> {
            self.calls.lock().unwrap().push("clarify");
            Ok(self.clarify.clone())
        }

        async fn plan(
            &self,
            _conversation: &[ConversationTurn],
            _privacy_mode: PrivacyMode,
        ) -> Result<Plan, ServiceError> {
            self.calls.lock().unwrap().push("plan");
            Ok(Plan {
                summary: "Start with a focused discovery sprint.".to_string(),
                key_insights: vec!["clear goal".to_string()],
                next_steps: vec![],
                estimated_scope: "medium".to_string(),
                calendly_purpose: "discovery".to_string(),
                tags: vec!["web".to_string()],
            })
        }

        async fn transcribe(
            &self,
            _audio: Vec<u8>,
            _language: Option<&str>,
        ) -> Result<Option<String>, ServiceError> {
            unreachable!("orchestrator never transcribes")
        }
    }

    /// Failing stub for retry-semantics tests.
    struct FailingIntelligence;

    #[async_trait]
    impl IntelligenceService for FailingIntelligence {
        async fn clarify(
            &self,
            _user_message: &str,
            _privacy_mode: PrivacyMode,
        ) -> Result<Clarify, ServiceError> {
            Err(ServiceError::Status {
                endpoint: "clarify".to_string(),
                status: 500,
            })
        }

        async fn plan(
            &self,
            _conversation: &[ConversationTurn],
            _privacy_mode: PrivacyMode,
        ) -> Result<Plan, ServiceError> {
            Err(ServiceError::Status {
                endpoint: "plan".to_string(),
                status: 500,
            })
        }

        async fn transcribe(
            &self,
            _audio: Vec<u8>,
            _language: Option<&str>,
        ) -> Result<Option<String>, ServiceError> {
            unreachable!()
        }
    }

    fn session_with_turns(user_turns: &[&str]) -> Session {
        let mut session = Session::new(PrivacyMode::OnTheRecord);
        for (i, turn) in user_turns.iter().enumerate() {
            session.messages.push(Message::new(Role::User, *turn));
            if i + 1 < user_turns.len() {
                session
                    .messages
                    .push(Message::new(Role::Assistant, "noted"));
            }
        }
        session
    }

    fn orchestrator(intelligence: Arc<dyn IntelligenceService>) -> TurnOrchestrator {
        TurnOrchestrator::new(intelligence, PortalConfig::default())
    }

    #[tokio::test]
    async fn first_turn_requests_clarify() {
        let intelligence = Arc::new(ScriptedIntelligence::new(&["Budget?", "Timeline?"]));
        let mut orch = orchestrator(intelligence.clone());

        let session = session_with_turns(&["I want a new website"]);
        let outcome = orch
            .next_turn(&session, "I want a new website")
            .await
            .unwrap();

        match outcome {
            TurnOutcome::AskClarify { reply, clarify } => {
                assert_eq!(reply, "You want a new website. Budget?");
                assert_eq!(clarify.questions.len(), 2);
            }
            other => panic!("expected AskClarify, got {other:?}"),
        }
        assert_eq!(intelligence.calls(), vec!["clarify"]);
    }

    #[tokio::test]
    async fn second_turn_asks_stored_question_verbatim() {
        let intelligence = Arc::new(ScriptedIntelligence::new(&["Budget?", "Timeline?"]));
        let mut orch = orchestrator(intelligence.clone());

        let mut session = session_with_turns(&["I want a new website"]);
        let first = orch
            .next_turn(&session, "I want a new website")
            .await
            .unwrap();
        let TurnOutcome::AskClarify { clarify, .. } = first else {
            panic!("expected clarify");
        };
        session.clarify = Some(clarify);
        session.messages.push(Message::new(Role::Assistant, "…"));
        session
            .messages
            .push(Message::new(Role::User, "mid-size budget, e-commerce"));

        let outcome = orch
            .next_turn(&session, "mid-size budget, e-commerce")
            .await
            .unwrap();
        match outcome {
            TurnOutcome::AskQuestion(text) => assert_eq!(text, "Timeline?"),
            other => panic!("expected AskQuestion, got {other:?}"),
        }
        // No extra intelligence calls for stored questions.
        assert_eq!(intelligence.calls(), vec!["clarify"]);
    }

    #[tokio::test]
    async fn exhausted_questions_before_min_turns_yield_follow_up() {
        // clarify has 2 questions, last one already asked (index 1),
        // user turn 4 < MIN_TURNS_FOR_PLAN — must follow up, not plan.
        let intelligence = Arc::new(ScriptedIntelligence::new(&["Budget?", "Timeline?"]));
        let mut orch = orchestrator(intelligence.clone());
        orch.question_index = Some(1);

        let mut session = session_with_turns(&["a", "b", "c", "d"]);
        session.clarify = Some(Clarify {
            understanding: "u".to_string(),
            questions: vec!["Budget?".to_string(), "Timeline?".to_string()],
        });

        let outcome = orch.next_turn(&session, "d").await.unwrap();
        match outcome {
            TurnOutcome::FollowUp(text) => {
                assert!(text.starts_with(FOLLOW_UP_ACK), "first follow-up is acked");
            }
            other => panic!("expected FollowUp, got {other:?}"),
        }
        assert!(intelligence.calls().is_empty());
    }

    #[tokio::test]
    async fn follow_ups_rotate_and_only_first_is_acked() {
        let intelligence = Arc::new(ScriptedIntelligence::new(&["Budget?"]));
        let mut orch = orchestrator(intelligence);
        orch.question_index = Some(0);

        let mut session = session_with_turns(&["a", "b", "c"]);
        session.clarify = Some(Clarify {
            understanding: "u".to_string(),
            questions: vec!["Budget?".to_string()],
        });

        let first = orch.next_turn(&session, "c").await.unwrap();
        let TurnOutcome::FollowUp(first) = first else {
            panic!("expected follow-up");
        };
        session.messages.push(Message::new(Role::Assistant, "…"));
        session.messages.push(Message::new(Role::User, "d"));
        let second = orch.next_turn(&session, "d").await.unwrap();
        let TurnOutcome::FollowUp(second) = second else {
            panic!("expected follow-up");
        };
        assert!(first.contains(FOLLOW_UP_PROMPTS[0]));
        assert!(second.contains(FOLLOW_UP_PROMPTS[1]));
        assert!(!second.starts_with(FOLLOW_UP_ACK));
    }

    #[tokio::test]
    async fn turn_limit_forces_plan_even_without_clarify() {
        let intelligence = Arc::new(ScriptedIntelligence::new(&["Budget?"]));
        let mut orch = orchestrator(intelligence.clone());

        let turns: Vec<String> = (1..=9).map(|i| format!("turn {i}")).collect();
        let refs: Vec<&str> = turns.iter().map(String::as_str).collect();
        let session = session_with_turns(&refs);
        assert_eq!(session.user_message_count(), 9);

        let outcome = orch.next_turn(&session, "turn 9").await.unwrap();
        match outcome {
            TurnOutcome::PlanReady { reply, .. } => {
                assert!(reply.starts_with(PLAN_INTRO_TURN_LIMIT));
            }
            other => panic!("expected PlanReady, got {other:?}"),
        }
        assert_eq!(intelligence.calls(), vec!["plan"]);
    }

    #[tokio::test]
    async fn confusion_shortcuts_to_plan_with_confusion_intro() {
        let intelligence = Arc::new(ScriptedIntelligence::new(&["Budget?", "Timeline?"]));
        let mut orch = orchestrator(intelligence.clone());
        orch.question_index = Some(0);

        let mut session = session_with_turns(&["a", "b", "c", "I'm not sure anymore"]);
        session.clarify = Some(Clarify {
            understanding: "u".to_string(),
            questions: vec!["Budget?".to_string(), "Timeline?".to_string()],
        });

        // Turn 4 < MIN_TURNS_FOR_PLAN, a question remains — confusion
        // still overrides both.
        let outcome = orch
            .next_turn(&session, "I'm not sure anymore")
            .await
            .unwrap();
        match outcome {
            TurnOutcome::PlanReady { reply, .. } => {
                assert!(reply.starts_with(PLAN_INTRO_CONFUSION));
            }
            other => panic!("expected PlanReady, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn confusion_keywords_ignored_before_threshold_turn() {
        let intelligence = Arc::new(ScriptedIntelligence::new(&["Budget?"]));
        let mut orch = orchestrator(intelligence.clone());

        let session = session_with_turns(&["I'm not sure where to start"]);
        let outcome = orch
            .next_turn(&session, "I'm not sure where to start")
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::AskClarify { .. }));
    }

    #[tokio::test]
    async fn existing_plan_yields_closing_message() {
        let intelligence = Arc::new(ScriptedIntelligence::new(&["Budget?"]));
        let mut orch = orchestrator(intelligence.clone());

        let mut session = session_with_turns(&["one more thing"]);
        session.plan = Some(Plan {
            summary: "done".to_string(),
            key_insights: vec![],
            next_steps: vec![],
            estimated_scope: "small".to_string(),
            calendly_purpose: "call".to_string(),
            tags: vec![],
        });

        let outcome = orch.next_turn(&session, "one more thing").await.unwrap();
        match outcome {
            TurnOutcome::Closing(text) => assert_eq!(text, CLOSING_MESSAGE),
            other => panic!("expected Closing, got {other:?}"),
        }
        assert!(intelligence.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_clarify_leaves_branch_retryable() {
        let mut orch = orchestrator(Arc::new(FailingIntelligence));
        let session = session_with_turns(&["hello"]);

        let err = orch.next_turn(&session, "hello").await.unwrap_err();
        assert!(matches!(err, ServiceError::Status { status: 500, .. }));
        // Counters untouched — the same branch fires on retry.
        assert!(orch.question_index.is_none());

        let mut orch = orchestrator(Arc::new(ScriptedIntelligence::new(&["Budget?"])));
        orch.question_index = None;
        let outcome = orch.next_turn(&session, "hello").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::AskClarify { .. }));
    }

    #[tokio::test]
    async fn empty_clarify_questions_are_an_invalid_response() {
        let intelligence = Arc::new(ScriptedIntelligence::new(&[]));
        let mut orch = orchestrator(intelligence);
        let session = session_with_turns(&["hello"]);

        let err = orch.next_turn(&session, "hello").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidResponse { .. }));
        // The branch stays retryable.
        assert!(orch.question_index.is_none());
    }

    #[tokio::test]
    async fn scenario_three_turns_two_questions() {
        // Three typed inputs against a clarify of exactly two questions.
        let intelligence = Arc::new(ScriptedIntelligence::new(&["Budget?", "Timeline?"]));
        let mut orch = orchestrator(intelligence.clone());

        let mut session = session_with_turns(&["I want a new website"]);
        let turn1 = orch
            .next_turn(&session, "I want a new website")
            .await
            .unwrap();
        let TurnOutcome::AskClarify { reply, clarify } = turn1 else {
            panic!("turn 1 must request clarify");
        };
        assert!(reply.ends_with("Budget?"));
        session.clarify = Some(clarify);
        session.messages.push(Message::new(Role::Assistant, reply));

        session
            .messages
            .push(Message::new(Role::User, "mid-size budget, e-commerce"));
        let turn2 = orch
            .next_turn(&session, "mid-size budget, e-commerce")
            .await
            .unwrap();
        let TurnOutcome::AskQuestion(question) = turn2 else {
            panic!("turn 2 must ask the stored question");
        };
        assert_eq!(question, "Timeline?");
        session.messages.push(Message::new(Role::Assistant, question));

        session
            .messages
            .push(Message::new(Role::User, "three months timeline"));
        let turn3 = orch
            .next_turn(&session, "three months timeline")
            .await
            .unwrap();
        assert!(
            matches!(turn3, TurnOutcome::FollowUp(_)),
            "turn 3 (< 5) must follow up, not plan"
        );
        assert_eq!(intelligence.calls(), vec!["clarify"]);
    }
}
