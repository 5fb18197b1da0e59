mod support;

use std::thread;

use fearcast::classifier::{Backend, Classifier};
use fearcast::config;
use fearcast::dataset::CsvRowSource;
use fearcast::ml::mlp::MlpClassifier;
use fearcast::session::{
    NotReady, PredictionError, PredictionInput, Session, SessionError, SessionSettings,
    SessionState, StatusTone, TickOutcome, TrainingRejected,
};
use support::{env::ConfigHomeGuard, fixtures::write_dataset};
use tempfile::tempdir;

fn input() -> PredictionInput {
    PredictionInput {
        date: "2021-02-10".into(),
        price: "20050".into(),
        volume: "1050".into(),
    }
}

fn loaded_session(rows: usize) -> (tempfile::TempDir, Session<MlpClassifier>) {
    let dir = tempdir().unwrap();
    let path = write_dataset(dir.path(), rows);
    let mut session = Session::new(MlpClassifier::default(), SessionSettings::default());
    let summary = session
        .initialize(Backend::Accelerated, &mut CsvRowSource::from_path(&path))
        .unwrap();
    assert_eq!(summary.examples_added, rows);
    (dir, session)
}

fn train(session: &mut Session<MlpClassifier>) -> usize {
    let run = session.begin_training().unwrap();
    let mut epochs = 0usize;
    let outcome = run.execute(&mut |_| epochs += 1);
    assert!(outcome.result.is_ok());
    session.finish_training(outcome).unwrap();
    epochs
}

#[test]
fn load_train_expire_cycle() {
    let (_dir, mut session) = loaded_session(100);
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.backend(), Some(Backend::Cpu));
    assert_eq!(session.with_model(|model| model.example_count()), 100);

    assert_eq!(train(&mut session), 32);
    assert_eq!(session.state(), SessionState::Trained);
    assert_eq!(session.ttl_remaining(), Some(15));

    let mut outcomes = Vec::new();
    for _ in 0..16 {
        outcomes.push(session.tick());
    }
    assert_eq!(outcomes[13], TickOutcome::Counting { remaining: 1 });
    assert_eq!(outcomes[14], TickOutcome::Expired);
    assert_eq!(outcomes[15], TickOutcome::Idle);
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(
        session.predict(&input()),
        Err(PredictionError::NotReady(NotReady::NotTrained))
    );
}

#[test]
fn prediction_shortens_ttl_and_decorates_the_label() {
    let (_dir, mut session) = loaded_session(100);
    train(&mut session);
    session.tick();
    session.tick();

    let outcome = session.predict(&input()).unwrap();
    assert!(["Fear", "Greed"].contains(&outcome.label.as_str()));
    assert!((0.0..=100.0).contains(&outcome.confidence_pct));
    assert!(!outcome.advice.is_empty());
    assert_eq!(session.ttl_remaining(), Some(5));
    assert_eq!(session.status().tone, StatusTone::Success);

    session.tick();
    session.predict(&input()).unwrap();
    assert_eq!(session.ttl_remaining(), Some(4));
}

#[test]
fn retraining_restarts_the_countdown() {
    let (_dir, mut session) = loaded_session(60);
    train(&mut session);
    for _ in 0..10 {
        session.tick();
    }
    assert_eq!(session.ttl_remaining(), Some(5));
    train(&mut session);
    assert_eq!(session.ttl_remaining(), Some(15));
}

#[test]
fn training_on_a_worker_blocks_a_second_run() {
    let (_dir, mut session) = loaded_session(100);
    let run = session.begin_training().unwrap();
    let worker = thread::spawn(move || run.execute(&mut |_| {}));

    assert_eq!(
        session.begin_training().err(),
        Some(TrainingRejected::AlreadyTraining)
    );
    assert_eq!(
        session.predict(&input()),
        Err(PredictionError::NotReady(NotReady::NotTrained))
    );
    assert_eq!(session.tick(), TickOutcome::Idle);

    let outcome = worker.join().unwrap();
    session.finish_training(outcome).unwrap();
    assert_eq!(session.state(), SessionState::Trained);
}

#[test]
fn malformed_rows_are_counted_not_fatal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dataset.csv");
    std::fs::write(
        &path,
        "Date,Volume,Rate,Prediction,Extra\n\
         2021-01-01,100,30000,Fear,x\n\
         2021-01-02,,30000,Fear,x\n\
         2021-02-30,100,30000,Fear,x\n\
         2021-01-04,abc,30000,Greed,x\n\
         2021-01-05,200,45000,Greed,x\n\
         2021-01-06,200,45000,,x\n",
    )
    .unwrap();
    let mut session = Session::new(MlpClassifier::default(), SessionSettings::default());
    let summary = session
        .initialize(Backend::Cpu, &mut CsvRowSource::from_path(&path))
        .unwrap();
    assert_eq!(summary.rows_seen, 6);
    assert_eq!(summary.examples_added, 2);
    assert_eq!(summary.rows_rejected(), 4);
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn empty_dataset_still_reaches_ready_but_training_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dataset.csv");
    std::fs::write(&path, "date,volume,rate,prediction\n").unwrap();
    let mut session = Session::new(MlpClassifier::default(), SessionSettings::default());
    let summary = session
        .initialize(Backend::Cpu, &mut CsvRowSource::from_path(&path))
        .unwrap();
    assert!(summary.normalize_error.is_some());
    assert_eq!(session.state(), SessionState::Ready);

    let outcome = session.begin_training().unwrap().execute(&mut |_| {});
    assert!(outcome.result.is_err());
    session.finish_training(outcome).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.status().text.starts_with("Training failed: "));
}

#[test]
fn unreadable_dataset_is_fatal() {
    let dir = tempdir().unwrap();
    let mut session = Session::new(MlpClassifier::default(), SessionSettings::default());
    let err = session
        .initialize(
            Backend::Cpu,
            &mut CsvRowSource::from_path(dir.path().join("missing.csv")),
        )
        .unwrap_err();
    assert!(matches!(err, SessionError::Dataset(_)));
    assert_eq!(session.state(), SessionState::Unready);
    assert_eq!(session.status().tone, StatusTone::Error);
}

#[test]
fn config_home_settings_drive_the_session() {
    let home = tempdir().unwrap();
    let _guard = ConfigHomeGuard::set(home.path());
    let root = home.path().join(".fearcast");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(
        root.join("config.toml"),
        "[training]\nepochs = 4\n[session]\nttl_units = 6\npost_prediction_floor = 2\n",
    )
    .unwrap();

    let settings = config::load_or_default().unwrap();
    assert_eq!(settings.training.epochs, 4);

    let data = tempdir().unwrap();
    let path = write_dataset(data.path(), 40);
    let mut session = Session::new(
        MlpClassifier::new(settings.mlp_options()),
        settings.session_settings(),
    );
    session
        .initialize(settings.backend.preferred, &mut CsvRowSource::from_path(&path))
        .unwrap();
    assert_eq!(train(&mut session), 4);
    assert_eq!(session.ttl_remaining(), Some(6));
    session.predict(&input()).unwrap();
    assert_eq!(session.ttl_remaining(), Some(2));
}
