use std::collections::HashMap;

use assess_core::model::{
    AiFeedback, Answer, AnswerKey, AnswerValue, AssessmentResult, Choice, Difficulty,
    DifficultyFilter, Item, ItemId, OwnerId, Question, QuestionId, Recommendation, Response,
    Scope, Session, SessionId, SessionState, TopicId,
};
use assess_core::time::fixed_now;
use chrono::Duration;
use storage::repository::{AnswerRepository, QuestionRepository, SessionRepository, StorageError};
use storage::sqlite::SqliteRepository;

async fn memory_repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:memdb_{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn multi_question(id: u64, topics: &[u64], order_no: u32, difficulty: Difficulty) -> Question {
    Question::new(
        QuestionId::new(id),
        topics.iter().copied().map(TopicId::new).collect(),
        order_no,
        format!("Which statements about item {id} hold?"),
        vec![
            Choice::new("A", "first"),
            Choice::new("B", "second"),
            Choice::new("C", "third"),
        ],
        AnswerKey::Multi {
            correct: ["A".into(), "B".into()].into_iter().collect(),
        },
        Some("A and B both hold.".into()),
        difficulty,
    )
    .unwrap()
}

fn running_session(owner: u64, scope: Scope, questions: &[Question]) -> Session {
    let items = questions
        .iter()
        .zip(1..)
        .map(|(q, order_no)| Item::snapshot(ItemId::generate(), order_no, q))
        .collect();
    let mut session = Session::new(
        SessionId::generate(),
        OwnerId::new(owner),
        scope,
        items,
        fixed_now(),
    )
    .unwrap();
    session.begin().unwrap();
    session
}

fn result_for(session: &Session, score: u8, minutes_later: i64) -> AssessmentResult {
    AssessmentResult {
        session_id: session.id(),
        total_score: score,
        raw_score: f64::from(score),
        responses: session
            .items()
            .iter()
            .map(|item| Response {
                item_id: item.id,
                order_no: item.order_no,
                is_correct: score == 100,
                credit: f64::from(score) / 100.0,
            })
            .collect(),
        breakdown: Vec::new(),
        submitted_at: fixed_now() + Duration::minutes(minutes_later),
        ai_summary: None,
        ai_recommendation: None,
    }
}

#[tokio::test]
async fn questions_roundtrip_with_topics_and_filters() {
    let repo = memory_repo("questions").await;

    let q1 = multi_question(1, &[2, 1], 2, Difficulty::Beginner);
    let q2 = multi_question(2, &[1], 1, Difficulty::Advanced);
    let retired = multi_question(3, &[1], 3, Difficulty::Beginner).with_active(false);
    for q in [&q1, &q2, &retired] {
        repo.upsert_question(q).await.unwrap();
    }

    let fetched = repo.get_question(QuestionId::new(1)).await.unwrap();
    assert_eq!(fetched, q1);
    assert_eq!(fetched.topic_ids(), &[TopicId::new(1), TopicId::new(2)]);

    let topic: Vec<u64> = repo
        .active_for_topic(TopicId::new(1))
        .await
        .unwrap()
        .iter()
        .map(|q| q.id().value())
        .collect();
    assert_eq!(topic, vec![2, 1]);

    let beginner = DifficultyFilter::Only(Difficulty::Beginner);
    assert_eq!(repo.count_active(beginner).await.unwrap(), 1);
    assert_eq!(repo.count_active(DifficultyFilter::Mixed).await.unwrap(), 2);
    assert_eq!(repo.active_pool(beginner).await.unwrap(), vec![q1]);

    let err = repo.get_question(QuestionId::new(99)).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn open_slot_is_claimed_atomically() {
    let repo = memory_repo("open_slot").await;
    let bank = vec![multi_question(1, &[1], 1, Difficulty::Beginner)];

    let first = running_session(1, Scope::Global, &bank);
    repo.create_session(&first).await.unwrap();

    let second = running_session(1, Scope::Global, &bank);
    let err = repo.create_session(&second).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    // A different learner or scope has its own slot.
    repo.create_session(&running_session(2, Scope::Global, &bank))
        .await
        .unwrap();
    repo.create_session(&running_session(1, Scope::Topic(TopicId::new(1)), &bank))
        .await
        .unwrap();

    repo.discard_session(first.id(), fixed_now()).await.unwrap();
    let err = repo
        .discard_session(first.id(), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    repo.create_session(&second).await.unwrap();
    let open = repo
        .find_open(OwnerId::new(1), Scope::Global)
        .await
        .unwrap()
        .expect("open session");
    assert_eq!(open, second);
}

#[tokio::test]
async fn answers_upsert_until_submission() {
    let repo = memory_repo("answers").await;
    let bank = vec![
        multi_question(1, &[1], 1, Difficulty::Beginner),
        multi_question(2, &[1], 2, Difficulty::Beginner),
    ];
    let session = running_session(1, Scope::Global, &bank);
    repo.create_session(&session).await.unwrap();

    let item = session.items()[0].id;
    let first = Answer::new(
        session.id(),
        item,
        AnswerValue::parse(session.items()[0].kind(), "B,A").unwrap(),
        fixed_now(),
    );
    repo.save_answer(&first).await.unwrap();

    let overwrite = Answer::new(
        session.id(),
        item,
        AnswerValue::parse(session.items()[0].kind(), "C , A").unwrap(),
        fixed_now() + Duration::seconds(30),
    );
    repo.save_answer(&overwrite).await.unwrap();

    let stored = repo.answers_for(session.id()).await.unwrap();
    assert_eq!(stored, vec![overwrite.clone()]);
    assert_eq!(stored[0].value.to_wire(), "A,C");

    repo.complete_session(session.id(), &result_for(&session, 50, 1), 80)
        .await
        .unwrap();
    let err = repo.save_answer(&first).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
    assert_eq!(repo.answers_for(session.id()).await.unwrap(), vec![overwrite]);
}

#[tokio::test]
async fn results_are_written_once_and_accept_feedback() {
    let repo = memory_repo("results").await;
    let bank = vec![multi_question(1, &[1], 1, Difficulty::Beginner)];
    let session = running_session(1, Scope::Global, &bank);
    repo.create_session(&session).await.unwrap();

    let result = result_for(&session, 100, 5);
    let stats = repo.complete_session(session.id(), &result, 80).await.unwrap();
    assert!(stats.is_none());
    let err = repo
        .complete_session(session.id(), &result, 80)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let missing = repo
        .complete_session(SessionId::generate(), &result, 80)
        .await
        .unwrap_err();
    assert!(matches!(missing, StorageError::NotFound));

    let stored = repo.get_session(session.id()).await.unwrap();
    assert_eq!(stored.state(), SessionState::Submitted);
    assert_eq!(stored.submitted_at(), Some(result.submitted_at));
    assert_eq!(repo.get_result(session.id()).await.unwrap(), result);

    let feedback = AiFeedback {
        summary: "Solid grasp of the basics.".into(),
        recommendation: Recommendation {
            level: "intermediate".into(),
            focus_topics: vec!["Board duties".into()],
            suggested_actions: vec!["Review committee charters".into()],
        },
    };
    repo.attach_feedback(session.id(), &feedback).await.unwrap();
    let enriched = repo.get_result(session.id()).await.unwrap();
    assert_eq!(enriched.ai_summary.as_deref(), Some("Solid grasp of the basics."));
    assert_eq!(enriched.ai_recommendation, Some(feedback.recommendation));
    assert_eq!(enriched.total_score, 100);
}

#[tokio::test]
async fn history_lists_submitted_sessions_newest_first() {
    let repo = memory_repo("history").await;
    let bank = vec![
        multi_question(1, &[1], 1, Difficulty::Beginner),
        multi_question(2, &[1], 2, Difficulty::Beginner),
    ];

    let mut submitted = Vec::new();
    for topic in 1..=3 {
        let session = running_session(9, Scope::Topic(TopicId::new(topic)), &bank);
        repo.create_session(&session).await.unwrap();
        let minutes = i64::try_from(topic).unwrap();
        let stats = repo
            .complete_session(session.id(), &result_for(&session, 40, minutes), 80)
            .await
            .unwrap()
            .expect("topic sessions record quiz stats");
        assert_eq!(stats.attempt_count, 1);
        assert!(!stats.passed);
        submitted.push(session.id());
    }
    let unfinished = running_session(9, Scope::Global, &bank);
    repo.create_session(&unfinished).await.unwrap();

    let page = repo.list_submitted(OwnerId::new(9), 2, 0).await.unwrap();
    assert_eq!(page.total, 3);
    let ids: Vec<SessionId> = page.rows.iter().map(|r| r.session_id).collect();
    assert_eq!(ids, vec![submitted[2], submitted[1]]);
    assert_eq!(page.rows[0].question_count, 2);
    assert_eq!(page.rows[0].total_score, 40);
    assert_eq!(page.rows[0].started_at, fixed_now());

    let rest = repo.list_submitted(OwnerId::new(9), 2, 2).await.unwrap();
    assert_eq!(rest.rows.len(), 1);
    assert_eq!(rest.rows[0].session_id, submitted[0]);

    let nobody = repo.list_submitted(OwnerId::new(10), 2, 0).await.unwrap();
    assert_eq!(nobody.total, 0);
    assert!(nobody.rows.is_empty());
}

#[tokio::test]
async fn topic_quiz_stats_accumulate_across_attempts() {
    let repo = memory_repo("topic_quiz").await;
    let bank = vec![multi_question(1, &[6], 1, Difficulty::Beginner)];
    let scope = Scope::Topic(TopicId::new(6));
    let owner = OwnerId::new(4);

    let mut last = None;
    for (minutes, score) in [(1, 90), (2, 55), (3, 70)] {
        let session = running_session(4, scope, &bank);
        repo.create_session(&session).await.unwrap();
        last = repo
            .complete_session(session.id(), &result_for(&session, score, minutes), 80)
            .await
            .unwrap();
        assert_eq!(last.map(|s| s.last_session_id), Some(session.id()));
    }

    let stored = repo
        .topic_quiz_stats(owner, TopicId::new(6))
        .await
        .unwrap()
        .expect("stats stored");
    assert_eq!(Some(stored), last);
    assert_eq!(stored.attempt_count, 3);
    assert_eq!(stored.last_score, 70);
    assert_eq!(stored.best_score, 90);
    assert_eq!(stored.pass_threshold, 80);
    assert!(!stored.can_mark_complete());
    assert_eq!(stored.updated_at, fixed_now() + Duration::minutes(3));

    assert!(
        repo.topic_quiz_stats(OwnerId::new(5), TopicId::new(6))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn open_session_and_answers_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("assess.sqlite3").display()
    );
    let bank = vec![
        multi_question(1, &[1], 1, Difficulty::Beginner),
        multi_question(2, &[1], 2, Difficulty::Intermediate),
    ];
    let session = running_session(3, Scope::Topic(TopicId::new(1)), &bank);

    let before: HashMap<ItemId, Answer> = {
        let repo = SqliteRepository::connect(&url).await.expect("connect");
        repo.migrate().await.expect("migrate");
        repo.create_session(&session).await.unwrap();
        let answer = Answer::new(
            session.id(),
            session.items()[1].id,
            AnswerValue::parse(session.items()[1].kind(), "A").unwrap(),
            fixed_now(),
        );
        repo.save_answer(&answer).await.unwrap();
        let answers = repo.answers_for(session.id()).await.unwrap();
        repo.close().await;
        answers.into_iter().map(|a| (a.item_id, a)).collect()
    };

    let reopened = SqliteRepository::connect(&url).await.expect("reconnect");
    reopened.migrate().await.expect("migrate is idempotent");
    let resumed = reopened
        .find_open(OwnerId::new(3), Scope::Topic(TopicId::new(1)))
        .await
        .unwrap()
        .expect("session survives restart");
    assert_eq!(resumed, session);

    let after: HashMap<ItemId, Answer> = reopened
        .answers_for(session.id())
        .await
        .unwrap()
        .into_iter()
        .map(|a| (a.item_id, a))
        .collect();
    assert_eq!(after, before);
    assert_eq!(after.len(), 1);
}
