use super::*;
use chrono::TimeZone;

fn sample_session() -> VoterSession {
    VoterSession {
        institutional_email: "2203sen001@school.edu".into(),
        session_token: SessionToken("tok-123".into()),
        device_id: Some(DeviceId("device-abc".into())),
        remaining_positions: vec![Position::from("President"), Position::from("Treasurer")],
        deadline: Utc.with_ymd_and_hms(2025, 10, 11, 13, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn saves_and_loads_session_round_trip() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let session = sample_session();
    storage.save_session(&session).await.expect("save");

    let loaded = storage.load_session().await.expect("load").expect("some");
    assert_eq!(loaded, session);
}

#[tokio::test]
async fn save_session_replaces_existing_record() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let mut session = sample_session();
    storage.save_session(&session).await.expect("save");

    session.remaining_positions = vec![Position::from("Treasurer")];
    storage.save_session(&session).await.expect("save again");

    let loaded = storage.load_session().await.expect("load").expect("some");
    assert_eq!(loaded.remaining_positions, vec![Position::from("Treasurer")]);
}

#[tokio::test]
async fn clear_session_purges_session_and_buffered_votes() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_session(&sample_session())
        .await
        .expect("save");
    storage
        .record_buffered_vote(
            &Position::from("President"),
            &BufferedVote {
                candidate_id: CandidateId("candidate111".into()),
                candidate_name: "Ada Obi".into(),
            },
        )
        .await
        .expect("buffer");

    storage.clear_session().await.expect("clear");

    assert!(storage.load_session().await.expect("load").is_none());
    assert!(storage.buffered_votes().await.expect("votes").is_empty());
}

#[tokio::test]
async fn buffered_vote_upserts_per_position() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let position = Position::from("President");
    storage
        .record_buffered_vote(
            &position,
            &BufferedVote {
                candidate_id: CandidateId("candidate111".into()),
                candidate_name: "Ada Obi".into(),
            },
        )
        .await
        .expect("first");
    storage
        .record_buffered_vote(
            &position,
            &BufferedVote {
                candidate_id: CandidateId("candidate112".into()),
                candidate_name: "Bola Tunde".into(),
            },
        )
        .await
        .expect("second");

    let votes = storage.buffered_votes().await.expect("votes");
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].1.candidate_id, CandidateId("candidate112".into()));
}

#[tokio::test]
async fn device_id_is_stable_across_calls_and_session_clears() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage.ensure_device_id().await.expect("first");
    assert!(first.0.starts_with("device-"));

    storage.clear_session().await.expect("clear");
    let second = storage.ensure_device_id().await.expect("second");
    assert_eq!(first, second);
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("booth_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("booth.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}
