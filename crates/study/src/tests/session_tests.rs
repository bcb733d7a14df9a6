use super::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use shared::domain::{Condition, HelpfulRating, TurnRole};

use crate::plan::SequenceSlot;

struct StubResponder {
    reply: String,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubResponder {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: "too late".to_string(),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssistantResponder for StubResponder {
    async fn respond(&self, _message: &str, _history: &[Turn]) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone()
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

#[derive(Default)]
struct MemoryRecorder {
    records: Mutex<Vec<ResponseRecord>>,
    fail: bool,
}

impl MemoryRecorder {
    fn failing() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    fn records(&self) -> Vec<ResponseRecord> {
        self.records.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ResponseRecorder for MemoryRecorder {
    async fn record(&self, record: &ResponseRecord) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("disk full");
        }
        self.records.lock().expect("lock").push(record.clone());
        Ok(())
    }
}

fn sample_cases() -> Vec<Case> {
    ["Case A", "Case B", "Case C", "Case D"]
        .into_iter()
        .enumerate()
        .map(|(index, text)| Case {
            index,
            source_file: format!("case{}.html", index + 1),
            text: text.to_string(),
        })
        .collect()
}

fn easy_first_plan() -> StudyPlan {
    StudyPlan::new(vec![
        SequenceSlot::new(Condition::Ai).with_difficulty("Easy"),
        SequenceSlot::new(Condition::Reference),
        SequenceSlot::new(Condition::Ai),
        SequenceSlot::new(Condition::Reference),
    ])
}

fn session_with(
    plan: StudyPlan,
    responder: Arc<StubResponder>,
    recorder: Arc<MemoryRecorder>,
) -> StudySession {
    SessionFactory::new(plan, sample_cases(), responder, recorder)
        .expect("valid plan")
        .create()
}

fn session() -> (StudySession, Arc<StubResponder>, Arc<MemoryRecorder>) {
    let responder = StubResponder::replying("hi there");
    let recorder = Arc::new(MemoryRecorder::default());
    let session = session_with(easy_first_plan(), responder.clone(), recorder.clone());
    (session, responder, recorder)
}

fn example_answers() -> AnswerBuffer {
    AnswerBuffer {
        section_a: "x".into(),
        helpful_a: HelpfulRating::Yes,
        section_b: String::new(),
        helpful_b: HelpfulRating::No,
        section_c: String::new(),
        helpful_c: HelpfulRating::Yes,
    }
}

#[test]
fn new_sessions_start_on_the_welcome_page() {
    let (session, _, _) = session();
    assert_eq!(session.state(), StudyState::Welcome);
    assert_eq!(session.view(), StudyView::Welcome { total_cases: 4 });
}

#[test]
fn start_shows_first_case_with_fresh_buffers() {
    let (mut session, _, _) = session();
    let view = session.start().expect("start");
    let case = view.as_case().expect("case view");

    assert_eq!(session.state(), StudyState::InCase(0));
    assert_eq!(case.ordinal, 1);
    assert_eq!(case.case_text, "Case A");
    assert!(case.ai_visible);
    assert_eq!(case.condition_label, "Case 1/4 - AI (Easy)");
    assert_eq!(case.progress, "Progress: Case 1 of 4");
    assert!(case.answers.is_blank());
    assert!(case.conversation.is_empty());
}

#[test]
fn start_is_rejected_mid_study() {
    let (mut session, _, _) = session();
    session.start().expect("start");
    let err = session.start().expect_err("second start");
    assert_eq!(
        err,
        StudyError::InvalidTransition {
            operation: "start",
            state: StudyState::InCase(0)
        }
    );
}

#[test]
fn load_case_shows_assistant_only_for_ai_slots() {
    let (session, _, _) = session();
    let plan = easy_first_plan();
    for (index, slot) in plan.slots().iter().enumerate() {
        let view = session.load_case(index);
        let case = view.as_case().expect("case view");
        assert_eq!(case.ai_visible, slot.condition == Condition::Ai);
        assert!(case.conversation.is_empty());
    }
    assert!(session.load_case(4).is_complete());
}

#[tokio::test]
async fn chat_then_advance_records_answers_and_clears_conversation() {
    let (mut session, _, recorder) = session();
    session.start().expect("start");

    let conversation = session.submit_message("hello").await.expect("chat");
    assert_eq!(
        conversation,
        [Turn::user("hello"), Turn::assistant("hi there")]
    );

    let view = session.advance(example_answers()).await.expect("advance");

    let records = recorder.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].case_ordinal, 1);
    assert_eq!(records[0].condition, Condition::Ai);
    assert_eq!(records[0].difficulty.as_deref(), Some("Easy"));
    assert_eq!(records[0].case_file, "case1.html");
    assert_eq!(records[0].session_id, session.id());
    assert_eq!(records[0].answers, example_answers());
    assert!(session.conversation().is_empty());

    let case = view.as_case().expect("next case");
    assert_eq!(case.ordinal, 2);
    assert!(!case.ai_visible);
    assert!(case.conversation.is_empty());
}

#[tokio::test]
async fn blank_messages_do_not_reach_the_assistant() {
    let (mut session, responder, _) = session();
    session.start().expect("start");

    for blank in ["", "   ", "\n\t"] {
        let conversation = session.submit_message(blank).await.expect("chat");
        assert!(conversation.is_empty());
    }
    assert_eq!(responder.calls(), 0);
}

#[tokio::test]
async fn chat_is_unavailable_for_reference_cases() {
    let (mut session, responder, _) = session();
    assert_eq!(
        session.submit_message("early").await.expect_err("welcome"),
        StudyError::AssistantUnavailable
    );

    session.start().expect("start");
    session.advance(AnswerBuffer::default()).await.expect("advance");

    let err = session.submit_message("hello").await.expect_err("reference");
    assert_eq!(err, StudyError::AssistantUnavailable);
    assert_eq!(
        session.clear_conversation().expect_err("reference"),
        StudyError::AssistantUnavailable
    );
    assert_eq!(responder.calls(), 0);
}

#[tokio::test]
async fn manual_clear_empties_the_conversation_without_moving() {
    let (mut session, _, recorder) = session();
    session.start().expect("start");
    session.submit_message("one").await.expect("chat");
    session.submit_message("two").await.expect("chat");
    assert_eq!(session.conversation().len(), 4);

    session.clear_conversation().expect("clear");
    assert!(session.conversation().is_empty());
    assert_eq!(session.state(), StudyState::InCase(0));
    assert!(recorder.records().is_empty());
}

#[tokio::test]
async fn chat_never_touches_answers() {
    let (mut session, _, _) = session();
    session.start().expect("start");
    session.update_answers(1, example_answers()).expect("draft");

    session.submit_message("hello").await.expect("chat");

    assert_eq!(session.answers(), &example_answers());
    assert_eq!(session.state(), StudyState::InCase(0));
}

#[tokio::test]
async fn draft_answers_show_up_in_view_but_reset_on_advance() {
    let (mut session, _, _) = session();
    session.start().expect("start");
    session.update_answers(1, example_answers()).expect("draft");

    let view = session.view();
    assert_eq!(view.as_case().expect("case").answers, example_answers());

    session.advance(example_answers()).await.expect("advance");
    assert!(session.answers().is_blank());
}

#[tokio::test]
async fn full_pass_records_each_case_once_in_order() {
    let (mut session, _, recorder) = session();
    session.start().expect("start");

    let mut last = None;
    for _ in 0..4 {
        last = Some(session.advance(AnswerBuffer::default()).await.expect("advance"));
    }

    assert_eq!(last, Some(StudyView::Complete { recorded_cases: 4 }));
    assert_eq!(session.state(), StudyState::Complete);
    let records = recorder.records();
    assert_eq!(
        records.iter().map(|r| r.case_ordinal).collect::<Vec<_>>(),
        [1, 2, 3, 4]
    );
    assert_eq!(
        records.iter().map(|r| r.condition).collect::<Vec<_>>(),
        [
            Condition::Ai,
            Condition::Reference,
            Condition::Ai,
            Condition::Reference
        ]
    );
    assert!(records.iter().all(|r| r.answers.is_blank()));
    assert_eq!(session.recorded(), [1, 2, 3, 4]);
}

#[tokio::test]
async fn fifth_advance_is_rejected_without_a_record() {
    let (mut session, _, recorder) = session();
    session.start().expect("start");
    for _ in 0..4 {
        session.advance(AnswerBuffer::default()).await.expect("advance");
    }

    let err = session
        .advance(example_answers())
        .await
        .expect_err("terminal");
    assert_eq!(err, StudyError::AlreadyComplete);
    assert_eq!(recorder.records().len(), 4);
    assert_eq!(session.state(), StudyState::Complete);
}

#[tokio::test]
async fn advance_before_start_is_rejected() {
    let (mut session, _, recorder) = session();
    let err = session
        .advance(AnswerBuffer::default())
        .await
        .expect_err("welcome");
    assert_eq!(err, StudyError::NotStarted);
    assert!(recorder.records().is_empty());
}

#[tokio::test]
async fn recorder_failure_does_not_block_progress() {
    let responder = StubResponder::replying("ok");
    let mut session = session_with(easy_first_plan(), responder, MemoryRecorder::failing());
    session.start().expect("start");

    let view = session
        .advance(example_answers())
        .await
        .expect("advance despite failure");

    assert_eq!(session.state(), StudyState::InCase(1));
    assert_eq!(view.as_case().expect("case").ordinal, 2);
}

struct StalledRecorder;

#[async_trait]
impl ResponseRecorder for StalledRecorder {
    async fn record(&self, _record: &ResponseRecord) -> anyhow::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn stalled_recorder_times_out_and_the_study_moves_on() {
    let mut session = SessionFactory::new(
        easy_first_plan(),
        sample_cases(),
        StubResponder::replying("ok"),
        Arc::new(StalledRecorder),
    )
    .expect("valid plan")
    .with_record_timeout(Duration::from_millis(50))
    .create();
    session.start().expect("start");

    let view = tokio::time::timeout(Duration::from_secs(2), session.advance(example_answers()))
        .await
        .expect("advance finished")
        .expect("advance");

    assert_eq!(view.as_case().expect("case").ordinal, 2);
    assert_eq!(session.state(), StudyState::InCase(1));
    assert_eq!(session.recorded(), &[1]);
}

#[tokio::test]
async fn draft_for_a_previous_case_is_rejected() {
    let (mut session, _, _) = session();
    session.start().expect("start");
    session.advance(AnswerBuffer::default()).await.expect("advance");

    let err = session
        .update_answers(1, example_answers())
        .expect_err("stale draft");
    assert!(matches!(
        err,
        StudyError::InvalidTransition {
            state: StudyState::InCase(1),
            ..
        }
    ));
    assert!(session.answers().is_blank());

    session.update_answers(2, example_answers()).expect("current draft");
    assert_eq!(session.answers(), &example_answers());
}

#[tokio::test]
async fn drafts_need_an_open_case() {
    let (mut session, _, _) = session();
    assert_eq!(
        session.update_answers(1, example_answers()),
        Err(StudyError::NotStarted)
    );
}

#[tokio::test]
async fn restart_only_from_complete_and_keeps_records() {
    let (mut session, _, recorder) = session();
    assert!(matches!(
        session.restart(),
        Err(StudyError::InvalidTransition {
            operation: "restart",
            ..
        })
    ));

    session.start().expect("start");
    for _ in 0..4 {
        session.advance(AnswerBuffer::default()).await.expect("advance");
    }

    let view = session.restart().expect("restart");
    assert_eq!(view, StudyView::Welcome { total_cases: 4 });
    assert_eq!(session.state(), StudyState::Welcome);
    assert!(session.recorded().is_empty());
    assert_eq!(recorder.records().len(), 4);

    session.start().expect("second pass");
    session.advance(AnswerBuffer::default()).await.expect("advance");
    assert_eq!(recorder.records().len(), 5);
    assert_eq!(recorder.records()[4].case_ordinal, 1);
}

#[tokio::test]
async fn slow_assistant_times_out_into_an_apology_turn() {
    let responder = StubResponder::slow(Duration::from_secs(5));
    let recorder = Arc::new(MemoryRecorder::default());
    let mut session = SessionFactory::new(easy_first_plan(), sample_cases(), responder, recorder)
        .expect("valid plan")
        .with_reply_timeout(Duration::from_millis(50))
        .create();
    session.start().expect("start");

    let conversation = session.submit_message("anyone there?").await.expect("chat");

    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation[0].role, TurnRole::User);
    assert_eq!(conversation[1], Turn::assistant(APOLOGY_REPLY));
}

#[test]
fn slots_can_point_at_any_loaded_case() {
    let plan = StudyPlan::new(vec![
        SequenceSlot::new(Condition::Ai).with_case(3),
        SequenceSlot::new(Condition::Reference).with_case(2),
        SequenceSlot::new(Condition::Ai).with_case(1),
        SequenceSlot::new(Condition::Reference).with_case(0),
    ]);
    let session = session_with(
        plan,
        StubResponder::replying("ok"),
        Arc::new(MemoryRecorder::default()),
    );
    let view = session.load_case(0);
    assert_eq!(view.as_case().expect("case").case_text, "Case D");
}

#[test]
fn factory_rejects_plans_that_reference_missing_cases() {
    let plan = StudyPlan::new(vec![
        SequenceSlot::new(Condition::Ai),
        SequenceSlot::new(Condition::Reference),
        SequenceSlot::new(Condition::Ai).with_case(9),
        SequenceSlot::new(Condition::Reference),
    ]);
    let result = SessionFactory::new(
        plan,
        sample_cases(),
        StubResponder::replying("ok"),
        Arc::new(MemoryRecorder::default()),
    );
    assert!(matches!(
        result,
        Err(PlanError::CaseOutOfRange {
            slot: 3,
            case_index: 9,
            ..
        })
    ));
}
