use shared::{
    domain::{AnswerBuffer, Condition, HelpfulRating, SessionId},
    protocol::ResponseRecord,
};
use storage::{read_records, JsonFileRecorder, ResponseRecorder};

#[tokio::test]
async fn full_pass_of_records_reads_back_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let recorder = JsonFileRecorder::new(dir.path());
    let session_id = SessionId::new();
    let plan = [
        Condition::Ai,
        Condition::Reference,
        Condition::Ai,
        Condition::Reference,
    ];

    for (slot, condition) in plan.into_iter().enumerate() {
        let record = ResponseRecord {
            case_ordinal: slot + 1,
            condition,
            difficulty: (slot == 0).then(|| "Easy".to_string()),
            case_file: format!("case{}.html", slot + 1),
            session_id,
            timestamp: 1_700_000_000.0 + slot as f64,
            answers: AnswerBuffer {
                helpful_b: HelpfulRating::No,
                ..AnswerBuffer::default()
            },
        };
        recorder.record(&record).await.expect("record");
    }

    let records = read_records(dir.path()).await.expect("read back");
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.session_id == session_id));
    assert_eq!(
        records.iter().map(|r| r.condition).collect::<Vec<_>>(),
        plan
    );
    assert_eq!(records[0].difficulty.as_deref(), Some("Easy"));
    assert!(records[0].answers.section_a.is_empty());
}
