use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assess_core::model::{
    AiFeedback, AnswerKey, Choice, Difficulty, OwnerId, Question, QuestionId, Recommendation,
    Scope, TopicId,
};
use assess_core::time::fixed_clock;
use async_trait::async_trait;
use services::ai::{AdviceRequest, AssessmentAdvisor};
use services::{AdvisorError, AppServices, EngineConfig, StartOptions};
use storage::repository::Storage;

const OWNER: OwnerId = OwnerId::new(3);

enum Behaviour {
    Answer,
    Fail,
    Hang,
}

struct StubAdvisor {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl StubAdvisor {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AssessmentAdvisor for StubAdvisor {
    async fn advise(&self, request: &AdviceRequest) -> Result<AiFeedback, AdvisorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Answer => Ok(AiFeedback {
                summary: format!("You scored {}.", request.total_score),
                recommendation: Recommendation {
                    level: "beginner".into(),
                    focus_topics: vec!["controls".into()],
                    suggested_actions: vec!["Review the explanations.".into()],
                },
            }),
            Behaviour::Fail => Err(AdvisorError::EmptyResponse),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(AdvisorError::EmptyResponse)
            }
        }
    }
}

async fn services_with(advisor: Arc<StubAdvisor>) -> AppServices {
    let storage = Storage::in_memory();
    let question = Question::new(
        QuestionId::new(1),
        vec![TopicId::new(1)],
        1,
        "Who approves a change?",
        vec![Choice::new("A", "the owner"), Choice::new("B", "anyone")],
        AnswerKey::Single {
            correct: "A".into(),
        },
        None,
        Difficulty::Beginner,
    )
    .unwrap();
    storage.questions.upsert_question(&question).await.unwrap();

    let config = EngineConfig {
        enrichment_timeout: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let advisor: Arc<dyn AssessmentAdvisor> = advisor;
    AppServices::with_parts(storage, fixed_clock(), config, Some(advisor))
}

async fn submit_one(app: &AppServices) -> services::SubmitOutcome {
    let manager = app.sessions();
    let scope = Scope::Topic(TopicId::new(1));
    let started = manager
        .start(OWNER, scope, StartOptions::default())
        .await
        .unwrap();
    app.answers()
        .save(started.session.id, OWNER, started.items[0].id, "A", None)
        .await
        .unwrap();
    manager.submit(started.session.id, OWNER, false).await.unwrap()
}

#[tokio::test]
async fn feedback_attaches_after_submit() {
    let advisor = StubAdvisor::new(Behaviour::Answer);
    let app = services_with(Arc::clone(&advisor)).await;

    let outcome = submit_one(&app).await;
    assert!(!outcome.result.is_enriched());
    outcome.enrichment.expect("enrichment spawned").await.unwrap();
    assert_eq!(advisor.calls.load(Ordering::SeqCst), 1);

    let detail = app
        .sessions()
        .detail(outcome.result.session_id, OWNER)
        .await
        .unwrap();
    assert_eq!(detail.result.ai_summary.as_deref(), Some("You scored 100."));
    let recommendation = detail.result.ai_recommendation.unwrap();
    assert_eq!(recommendation.level, "beginner");
    assert_eq!(recommendation.focus_topics, vec!["controls"]);
}

#[tokio::test]
async fn advisor_failure_leaves_result_intact() {
    let advisor = StubAdvisor::new(Behaviour::Fail);
    let app = services_with(Arc::clone(&advisor)).await;

    let outcome = submit_one(&app).await;
    assert_eq!(outcome.result.total_score, 100);
    outcome.enrichment.unwrap().await.unwrap();

    let detail = app
        .sessions()
        .detail(outcome.result.session_id, OWNER)
        .await
        .unwrap();
    assert!(!detail.result.is_enriched());
    assert_eq!(detail.result.total_score, 100);
}

#[tokio::test(start_paused = true)]
async fn slow_advisor_times_out_without_blocking_submit() {
    let advisor = StubAdvisor::new(Behaviour::Hang);
    let app = services_with(Arc::clone(&advisor)).await;

    let outcome = submit_one(&app).await;
    assert_eq!(outcome.result.total_score, 100);
    outcome.enrichment.unwrap().await.unwrap();
    assert_eq!(advisor.calls.load(Ordering::SeqCst), 1);

    let detail = app
        .sessions()
        .detail(outcome.result.session_id, OWNER)
        .await
        .unwrap();
    assert!(detail.result.ai_summary.is_none());
}
