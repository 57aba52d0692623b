use assess_core::model::{
    AnswerKey, Choice, Difficulty, OwnerId, Question, QuestionId, Scope, TopicId,
};
use assess_core::time::fixed_now;
use services::{AppServices, Clock, StartOptions};

const OWNER: OwnerId = OwnerId::new(11);

fn question(id: u64, order_no: u32) -> Question {
    Question::new(
        QuestionId::new(id),
        vec![TopicId::new(2)],
        order_no,
        format!("Who signs off change {id}?"),
        vec![Choice::new("A", "the board"), Choice::new("B", "nobody")],
        AnswerKey::Single {
            correct: "A".into(),
        },
        None,
        Difficulty::Beginner,
    )
    .unwrap()
}

#[tokio::test]
async fn resume_after_reopening_the_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("assess.sqlite3").display()
    );
    let scope = Scope::Topic(TopicId::new(2));
    let clock = Clock::fixed(fixed_now());

    let (started, saved) = {
        let app = AppServices::new_sqlite(&url, clock).await.expect("open");
        for (id, order_no) in [(1, 1), (2, 2), (3, 3)] {
            app.storage()
                .questions
                .upsert_question(&question(id, order_no))
                .await
                .unwrap();
        }
        let started = app
            .sessions()
            .start(OWNER, scope, StartOptions::default())
            .await
            .unwrap();
        let saved = app
            .answers()
            .save(started.session.id, OWNER, started.items[1].id, "B", None)
            .await
            .unwrap();
        (started, saved)
    };

    let reopened = AppServices::new_sqlite(&url, clock).await.expect("reopen");
    let resumed = reopened.sessions().resume(OWNER, scope).await.unwrap();
    assert_eq!(resumed.session, started.session);
    assert_eq!(resumed.items, started.items);
    assert_eq!(resumed.answers.len(), 1);
    assert_eq!(resumed.answers[0].item_id, saved.item_id);
    assert_eq!(resumed.answers[0].order_no, 2);
    assert_eq!(resumed.answers[0].value, "B");
    assert_eq!(resumed.answers[0].saved_at, fixed_now());
    assert_eq!(resumed.progress, saved.progress);

    let outcome = reopened
        .sessions()
        .submit(started.session.id, OWNER, true)
        .await
        .unwrap();
    assert_eq!(outcome.result.total_score, 0);
    let stats = outcome.topic_quiz.expect("topic quiz stats");
    assert_eq!(stats.attempt_count, 1);
    assert!(!stats.can_mark_complete());
}
